use bitvault_tx::error::{WalletError, WalletResult};
use bitvault_tx::keys::{KeyBag, MemoryKeyBag};
use bitvault_tx::proposed::ProposedTransaction;
use bitvault_tx::signers::{
    DerivedKeySigner, InputOutcome, SignerChain, SignerKind, SignerReport, SignerState, TransactionSigner,
};
use std::cell::Cell;
use std::rc::Rc;

use test_helpers::{p2pkh_output, setup, spending_tx, wallet_key};

/// Signer that reports a failure on input 0
struct FailingSigner;

impl TransactionSigner for FailingSigner {
    fn name(&self) -> &str {
        "flaky"
    }

    fn sign_inputs(&self, _proposal: &mut ProposedTransaction<'_>, _key_bag: &dyn KeyBag) -> WalletResult<SignerReport> {
        let mut report = SignerReport::new(self.name());
        report.record(0, InputOutcome::Failed(WalletError::Signing("device unplugged".into())));
        Ok(report)
    }
}

/// Signer whose whole run fails with a fixed error
struct ErroringSigner(fn() -> WalletError);

impl TransactionSigner for ErroringSigner {
    fn name(&self) -> &str {
        "broken"
    }

    fn sign_inputs(&self, _proposal: &mut ProposedTransaction<'_>, _key_bag: &dyn KeyBag) -> WalletResult<SignerReport> {
        Err((self.0)())
    }
}

/// Stateful signer whose readiness the test controls
struct ToggleSigner {
    ready: Rc<Cell<bool>>,
    runs: Rc<Cell<usize>>,
}

impl TransactionSigner for ToggleSigner {
    fn name(&self) -> &str {
        "toggle"
    }

    fn kind(&self) -> SignerKind {
        SignerKind::Stateful
    }

    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn sign_inputs(&self, _proposal: &mut ProposedTransaction<'_>, _key_bag: &dyn KeyBag) -> WalletResult<SignerReport> {
        self.runs.set(self.runs.get() + 1);
        Ok(SignerReport::new(self.name()))
    }
}

fn fixture() -> (Vec<bitvault_tx::types::SpendableOutput>, MemoryKeyBag) {
    let key = wallet_key(40);
    let pool = vec![p2pkh_output(1, &key, 10_000)];
    let mut bag = MemoryKeyBag::new();
    bag.add_key(key);
    (pool, bag)
}

#[test]
fn test_signers_run_in_registration_order() {
    setup();
    let (pool, bag) = fixture();
    let runs = Rc::new(Cell::new(0));
    let mut chain = SignerChain::with_local_signer();
    chain
        .add_signer(Box::new(ToggleSigner {
            ready: Rc::new(Cell::new(true)),
            runs: runs.clone(),
        }))
        .unwrap();
    assert_eq!(chain.signer_names(), vec!["local", "toggle"]);

    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    let report = chain.sign(&mut proposal, &bag).unwrap();

    let names: Vec<&str> = report.reports().iter().map(|r| r.signer()).collect();
    assert_eq!(names, vec!["local", "toggle"]);
    assert_eq!(runs.get(), 1);
    assert_eq!(chain.states(), &[SignerState::Executed, SignerState::Executed]);
}

#[test]
fn test_unready_signer_cannot_join() {
    let mut chain = SignerChain::with_local_signer();
    let err = chain.add_signer(Box::new(DerivedKeySigner::new("cosigner"))).unwrap_err();
    assert!(matches!(err, WalletError::SignerNotReady { ref signer } if signer == "cosigner"));
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_signer_losing_readiness_stops_chain_before_any_signing() {
    setup();
    let (pool, bag) = fixture();
    let ready = Rc::new(Cell::new(true));
    let runs = Rc::new(Cell::new(0));
    let mut chain = SignerChain::with_local_signer();
    chain
        .add_signer(Box::new(ToggleSigner {
            ready: ready.clone(),
            runs: runs.clone(),
        }))
        .unwrap();

    ready.set(false);
    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    let err = chain.sign(&mut proposal, &bag).unwrap_err();

    assert!(matches!(err, WalletError::SignerNotReady { ref signer } if signer == "toggle"));
    assert_eq!(runs.get(), 0);
    // The local signer did not run either
    assert!(proposal.input_script(0).unwrap().is_empty());
    assert_eq!(chain.states()[1], SignerState::NotReady);

    // Ready again: the next attempt goes through
    ready.set(true);
    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    chain.sign(&mut proposal, &bag).unwrap();
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_reported_failure_aborts_chain() {
    setup();
    let (pool, bag) = fixture();
    let runs = Rc::new(Cell::new(0));
    let mut chain = SignerChain::with_local_signer();
    chain.add_signer(Box::new(FailingSigner)).unwrap();
    chain
        .add_signer(Box::new(ToggleSigner {
            ready: Rc::new(Cell::new(true)),
            runs: runs.clone(),
        }))
        .unwrap();

    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    match chain.sign(&mut proposal, &bag) {
        Err(WalletError::SignerChainAborted { signer, input, reason }) => {
            assert_eq!(signer, "flaky");
            assert_eq!(input, Some(0));
            assert!(reason.contains("device unplugged"));
        }
        other => panic!("expected SignerChainAborted, got {:?}", other.map(|r| r.signed_inputs())),
    }
    // Signers after the failing one never run
    assert_eq!(runs.get(), 0);
}

#[test]
fn test_signer_errors_are_wrapped() {
    setup();
    let (pool, bag) = fixture();
    let mut chain = SignerChain::new();
    chain
        .add_signer(Box::new(ErroringSigner(|| WalletError::Script("bad opcode".into()))))
        .unwrap();

    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    match chain.sign(&mut proposal, &bag) {
        Err(WalletError::SignerChainAborted { signer, input, .. }) => {
            assert_eq!(signer, "broken");
            assert_eq!(input, None);
        }
        other => panic!("expected SignerChainAborted, got {:?}", other.map(|r| r.signed_inputs())),
    }
}

#[test]
fn test_locked_key_error_passes_through() {
    setup();
    let (pool, bag) = fixture();
    let mut chain = SignerChain::new();
    chain
        .add_signer(Box::new(ErroringSigner(|| WalletError::KeyEncrypted { input: 3 })))
        .unwrap();

    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    assert!(matches!(
        chain.sign(&mut proposal, &bag),
        Err(WalletError::KeyEncrypted { input: 3 })
    ));
}

#[test]
fn test_empty_chain_signs_nothing() {
    setup();
    let (pool, bag) = fixture();
    let mut chain = SignerChain::new();
    assert!(chain.is_empty());

    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    let report = chain.sign(&mut proposal, &bag).unwrap();
    assert!(report.reports().is_empty());
    assert!(proposal.input_script(0).unwrap().is_empty());
}
