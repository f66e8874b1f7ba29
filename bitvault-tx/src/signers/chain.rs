//! Ordered signer chain
//!
//! Signers run strictly in registration order, one at a time, each over the
//! whole transaction. The first failure stops the chain; the proposal is then
//! discarded by the caller, so nothing partially signed escapes.
//!
//! Each signer moves through `NotReady -> Ready -> Executed` during an
//! attempt.

use log::{debug, info};

use crate::error::{WalletError, WalletResult};
use crate::keys::KeyBag;
use crate::logging::{log_params, log_transaction, LogLevel};
use crate::proposed::ProposedTransaction;
use crate::signers::local::LocalTransactionSigner;
use crate::signers::{SignerReport, TransactionSigner};

/// Lifecycle of a signer within one signing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerState {
    NotReady,
    Ready,
    Executed,
}

/// Reports of every signer that ran, in order
#[derive(Debug, Default)]
pub struct ChainReport {
    reports: Vec<SignerReport>,
}

impl ChainReport {
    pub fn reports(&self) -> &[SignerReport] {
        &self.reports
    }

    /// Inputs signed by any signer, ascending
    pub fn signed_inputs(&self) -> Vec<usize> {
        let mut inputs: Vec<usize> = self.reports.iter().flat_map(|r| r.signed_inputs()).collect();
        inputs.sort_unstable();
        inputs.dedup();
        inputs
    }

    /// Report of the signer named `name`
    pub fn report_for(&self, name: &str) -> Option<&SignerReport> {
        self.reports.iter().find(|r| r.signer() == name)
    }
}

/// Signers applied to a proposed transaction in registration order
pub struct SignerChain {
    signers: Vec<Box<dyn TransactionSigner>>,
    states: Vec<SignerState>,
}

impl SignerChain {
    /// An empty chain
    pub fn new() -> Self {
        Self {
            signers: Vec::new(),
            states: Vec::new(),
        }
    }

    /// A chain with the local signer first
    pub fn with_local_signer() -> Self {
        let mut chain = Self::new();
        chain.signers.push(Box::new(LocalTransactionSigner::new()));
        chain.states.push(SignerState::Ready);
        chain
    }

    /// Append a signer; only ready signers may join
    pub fn add_signer(&mut self, signer: Box<dyn TransactionSigner>) -> WalletResult<()> {
        if !signer.is_ready() {
            return Err(WalletError::SignerNotReady {
                signer: signer.name().to_string(),
            });
        }
        debug!("Adding {:?} signer '{}' to chain", signer.kind(), signer.name());
        self.signers.push(signer);
        self.states.push(SignerState::Ready);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn signer_names(&self) -> Vec<&str> {
        self.signers.iter().map(|s| s.name()).collect()
    }

    /// State of each signer after the last attempt
    pub fn states(&self) -> &[SignerState] {
        &self.states
    }

    /// Run every signer over `proposal`
    ///
    /// Fails with the first signer error. `KeyEncrypted`,
    /// `InconsistentDerivationPath` and `SignerNotReady` are returned as is;
    /// any other failure becomes `SignerChainAborted`.
    pub fn sign(&mut self, proposal: &mut ProposedTransaction<'_>, key_bag: &dyn KeyBag) -> WalletResult<ChainReport> {
        // Readiness is checked for every signer before any of them runs
        for (signer, state) in self.signers.iter().zip(self.states.iter_mut()) {
            if !signer.is_ready() {
                *state = SignerState::NotReady;
                return Err(WalletError::SignerNotReady {
                    signer: signer.name().to_string(),
                });
            }
            *state = SignerState::Ready;
        }

        let mut report = ChainReport::default();
        for (signer, state) in self.signers.iter().zip(self.states.iter_mut()) {
            let signer_report = signer.sign_inputs(proposal, key_bag).map_err(|e| abort_error(signer.name(), e))?;
            *state = SignerState::Executed;

            if let Some((input, err)) = signer_report.failure() {
                log_transaction(
                    LogLevel::Error,
                    "Signer chain aborted",
                    Some(log_params(vec![
                        ("signer", signer.name().to_string()),
                        ("input", input.to_string()),
                    ])),
                );
                return Err(WalletError::SignerChainAborted {
                    signer: signer.name().to_string(),
                    input: Some(input),
                    reason: err.to_string(),
                });
            }
            report.reports.push(signer_report);
        }

        info!(
            "Signer chain finished: {} signers, {} inputs signed",
            self.signers.len(),
            report.signed_inputs().len()
        );
        Ok(report)
    }
}

impl Default for SignerChain {
    fn default() -> Self {
        Self::new()
    }
}

fn abort_error(signer: &str, err: WalletError) -> WalletError {
    match err {
        WalletError::KeyEncrypted { .. }
        | WalletError::InconsistentDerivationPath { .. }
        | WalletError::SignerNotReady { .. }
        | WalletError::SignerChainAborted { .. } => err,
        other => WalletError::SignerChainAborted {
            signer: signer.to_string(),
            input: other.input_index(),
            reason: other.to_string(),
        },
    }
}
