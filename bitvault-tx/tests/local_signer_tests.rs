use bitcoin::consensus::encode::serialize;
use bitcoin::{OutPoint, ScriptBuf};
use bitvault_tx::error::WalletError;
use bitvault_tx::keys::{DecryptingKeyBag, KeyCrypter, MemoryKeyBag, WalletKey};
use bitvault_tx::proposed::ProposedTransaction;
use bitvault_tx::signers::{SignerChain, SkipReason};
use bitvault_tx::verify::{ScriptVerifier, StandardScriptVerifier};

use test_helpers::{
    output, p2pkh_output, setup, spending_tx, spending_tx_for, txid, wallet_key, TEST_CRYPTER, TEST_ITERATIONS,
    TEST_SALT,
};

fn verifies(tx: &bitcoin::Transaction, input: usize, script_pubkey: &ScriptBuf) -> bool {
    StandardScriptVerifier::new()
        .verify(tx, input, script_pubkey, true)
        .unwrap_or(false)
}

#[test]
fn test_signs_p2pkh_and_p2pk_inputs() {
    setup();
    let k1 = wallet_key(1);
    let k2 = wallet_key(2);
    let pool = vec![
        p2pkh_output(1, &k1, 40_000),
        output(2, 25_000, ScriptBuf::new_p2pk(k2.public_key()), 6),
    ];
    let mut bag = MemoryKeyBag::new();
    bag.add_key(k1);
    bag.add_key(k2);

    let mut chain = SignerChain::with_local_signer();
    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    let report = chain.sign(&mut proposal, &bag).unwrap();
    assert_eq!(report.signed_inputs(), vec![0, 1]);

    let tx = proposal.into_transaction();
    assert!(verifies(&tx, 0, &pool[0].script_pubkey));
    assert!(verifies(&tx, 1, &pool[1].script_pubkey));
}

#[test]
fn test_second_pass_changes_nothing() {
    setup();
    let key = wallet_key(3);
    let pool = vec![p2pkh_output(1, &key, 40_000)];
    let mut bag = MemoryKeyBag::new();
    bag.add_key(key);

    let mut chain = SignerChain::with_local_signer();
    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    chain.sign(&mut proposal, &bag).unwrap();
    let first = proposal.into_transaction();

    let mut proposal = ProposedTransaction::connect(first.clone(), &pool);
    let report = chain.sign(&mut proposal, &bag).unwrap();
    let second = proposal.into_transaction();

    assert_eq!(serialize(&first), serialize(&second));
    assert!(report.signed_inputs().is_empty());
    assert_eq!(
        report.report_for("local").unwrap().skipped_inputs(),
        vec![(0, SkipReason::AlreadySpendable)]
    );
}

#[test]
fn test_unsignable_inputs_are_skipped_not_failed() {
    setup();
    let ours = wallet_key(4);
    let theirs = wallet_key(5);
    let watched = wallet_key(6);
    let pool = vec![
        p2pkh_output(1, &theirs, 10_000),
        p2pkh_output(2, &ours, 10_000),
        p2pkh_output(3, &watched, 10_000),
        output(4, 10_000, ScriptBuf::from(vec![0x51]), 6),
    ];
    let mut outpoints: Vec<OutPoint> = pool.iter().map(|o| o.outpoint).collect();
    // An input whose output the wallet has never seen
    outpoints.push(OutPoint::new(txid(200), 3));

    let mut bag = MemoryKeyBag::new();
    bag.add_key(ours);
    bag.add_key(WalletKey::watch_only(*watched.public_key()));

    let mut chain = SignerChain::with_local_signer();
    let mut proposal = ProposedTransaction::connect(spending_tx_for(outpoints), &pool);
    let report = chain.sign(&mut proposal, &bag).unwrap();

    let local = report.report_for("local").unwrap();
    assert!(local.is_success());
    assert_eq!(local.signed_inputs(), vec![1]);
    assert_eq!(
        local.skipped_inputs(),
        vec![
            (0, SkipReason::NoLocalKey),
            (2, SkipReason::MissingPrivateKey),
            (3, SkipReason::UnsupportedScript),
            (4, SkipReason::NotConnected),
        ]
    );
    assert!(proposal.input_script(0).unwrap().is_empty());
    assert!(proposal.input_script(4).unwrap().is_empty());
}

#[test]
fn test_encrypted_key_stops_signing() {
    setup();
    let plain = wallet_key(7);
    let locked = wallet_key(8);
    let pool = vec![
        p2pkh_output(1, &plain, 10_000),
        p2pkh_output(2, &locked, 10_000),
        p2pkh_output(3, &plain, 10_000),
    ];
    let mut bag = MemoryKeyBag::new();
    bag.add_key(plain);
    bag.add_key(locked.encrypt(&TEST_CRYPTER).unwrap());

    let mut chain = SignerChain::with_local_signer();
    let mut proposal = ProposedTransaction::connect(spending_tx(&pool), &pool);
    let err = chain.sign(&mut proposal, &bag).unwrap_err();
    assert!(matches!(err, WalletError::KeyEncrypted { input: 1 }));

    // Signing ran in input order and stopped at the locked key
    assert!(!proposal.input_script(0).unwrap().is_empty());
    assert!(proposal.input_script(1).unwrap().is_empty());
    assert!(proposal.input_script(2).unwrap().is_empty());
}

#[test]
fn test_retry_with_unlocked_keys() {
    setup();
    let key = wallet_key(9);
    let pool = vec![p2pkh_output(1, &key, 10_000), p2pkh_output(2, &key, 20_000)];
    let mut bag = MemoryKeyBag::new();
    bag.add_key(key);
    bag.encrypt_all(&TEST_CRYPTER).unwrap();

    let unsigned = spending_tx(&pool);
    let mut chain = SignerChain::with_local_signer();

    let mut attempt = ProposedTransaction::connect(unsigned.clone(), &pool);
    assert!(matches!(
        chain.sign(&mut attempt, &bag),
        Err(WalletError::KeyEncrypted { input: 0 })
    ));

    // The wrong password leaves the key locked
    let wrong = KeyCrypter::from_password("not the password", &TEST_SALT, TEST_ITERATIONS).unwrap();
    let mut attempt = ProposedTransaction::connect(unsigned.clone(), &pool);
    assert!(matches!(
        chain.sign(&mut attempt, &DecryptingKeyBag::new(&bag, &wrong)),
        Err(WalletError::KeyEncrypted { input: 0 })
    ));

    let mut attempt = ProposedTransaction::connect(unsigned, &pool);
    let report = chain
        .sign(&mut attempt, &DecryptingKeyBag::new(&bag, &TEST_CRYPTER))
        .unwrap();
    assert_eq!(report.signed_inputs(), vec![0, 1]);

    let tx = attempt.into_transaction();
    assert!(verifies(&tx, 0, &pool[0].script_pubkey));
    assert!(verifies(&tx, 1, &pool[1].script_pubkey));
}

#[test]
fn test_signing_only_touches_input_scripts() {
    setup();
    let key = wallet_key(10);
    let pool = vec![p2pkh_output(1, &key, 10_000)];
    let mut bag = MemoryKeyBag::new();
    bag.add_key(key);

    let unsigned = spending_tx(&pool);
    let mut chain = SignerChain::with_local_signer();
    let mut proposal = ProposedTransaction::connect(unsigned.clone(), &pool);
    chain.sign(&mut proposal, &bag).unwrap();
    let signed = proposal.into_transaction();

    assert_eq!(signed.output, unsigned.output);
    assert_eq!(signed.lock_time, unsigned.lock_time);
    assert_eq!(signed.input[0].previous_output, unsigned.input[0].previous_output);
    assert_eq!(signed.input[0].sequence, unsigned.input[0].sequence);
}
