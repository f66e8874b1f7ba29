//! First-pass signer using keys held by the wallet
//!
//! Runs first in every chain. For each input, in order:
//!
//! 1. skip inputs with no connected output (signed elsewhere)
//! 2. skip inputs whose script already satisfies the locking script
//! 3. resolve redeem data; skip when there is no key with private material
//! 4. sign with `SIGHASH_ALL` over the redeem script
//! 5. insert the signature at the key's slot (0 for single-key scripts)
//! 6. record the key's derivation path against the locking script
//!
//! Skips are logged as warnings, never errors. A locked key aborts the whole call with
//! `KeyEncrypted`; inputs before it keep their new signatures.

use bitcoin::secp256k1::{All, Secp256k1};
use log::{debug, warn};

use crate::error::{WalletError, WalletResult};
use crate::input_script::ScriptTemplate;
use crate::keys::KeyBag;
use crate::logging::{log_params, log_transaction, LogLevel};
use crate::proposed::ProposedTransaction;
use crate::redeem::{resolve_connected_redeem_data, RedeemLookup};
use crate::signature::{EcdsaSignatureCalculator, SignatureCalculator};
use crate::signers::{sign_and_insert, InputOutcome, SignerReport, SkipReason, TransactionSigner};
use crate::verify::{ScriptVerifier, StandardScriptVerifier};

/// Signs every input the wallet's own keys can sign
pub struct LocalTransactionSigner {
    verifier: Box<dyn ScriptVerifier>,
    calculator: Box<dyn SignatureCalculator>,
    secp: Secp256k1<All>,
}

impl LocalTransactionSigner {
    pub fn new() -> Self {
        Self {
            verifier: Box::new(StandardScriptVerifier::new()),
            calculator: Box::new(EcdsaSignatureCalculator::new()),
            secp: Secp256k1::new(),
        }
    }

    /// Replace the script verification capability
    pub fn with_verifier(mut self, verifier: Box<dyn ScriptVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace the signature computation capability
    pub fn with_calculator(mut self, calculator: Box<dyn SignatureCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    fn sign_input(
        &self,
        proposal: &mut ProposedTransaction<'_>,
        index: usize,
        key_bag: &dyn KeyBag,
    ) -> WalletResult<InputOutcome> {
        let output = match proposal.connected_output(index) {
            Some(output) => output,
            None => return Ok(InputOutcome::Skipped(SkipReason::NotConnected)),
        };
        let script_pubkey = &output.script_pubkey;

        // A matching redeem-script hash alone is not enough: the multisig must also be satisfied
        match self.verifier.verify(proposal.partial_tx(), index, script_pubkey, true) {
            Ok(true) => return Ok(InputOutcome::Skipped(SkipReason::AlreadySpendable)),
            Ok(false) => {}
            Err(e) => debug!("Input {} could not be verified, signing anyway: {}", index, e),
        }

        let redeem = match resolve_connected_redeem_data(output, key_bag) {
            RedeemLookup::Resolved(redeem) => redeem,
            RedeemLookup::NoLocalKey => return Ok(InputOutcome::Skipped(SkipReason::NoLocalKey)),
            RedeemLookup::Unrecognized => return Ok(InputOutcome::Skipped(SkipReason::UnsupportedScript)),
        };
        let template = match ScriptTemplate::classify(script_pubkey) {
            Some(template) => template,
            None => return Ok(InputOutcome::Skipped(SkipReason::UnsupportedScript)),
        };

        let candidates: Vec<usize> = redeem.full_keys().map(|(i, _)| i).collect();
        if candidates.is_empty() {
            return Ok(InputOutcome::Skipped(SkipReason::MissingPrivateKey));
        }

        let mut outcome = InputOutcome::Skipped(SkipReason::AlreadySigned);
        for key_index in candidates {
            match sign_and_insert(
                proposal,
                index,
                template,
                &redeem,
                key_index,
                self.calculator.as_ref(),
                &self.secp,
            ) {
                Ok(InputOutcome::Signed) => {
                    if let Some(path) = redeem.keys[key_index].derivation_path() {
                        proposal.record_key_path(script_pubkey, path)?;
                    }
                    return Ok(InputOutcome::Signed);
                }
                Ok(_) => continue,
                Err(WalletError::MissingKey { .. }) => {
                    outcome = InputOutcome::Skipped(SkipReason::MissingPrivateKey);
                }
                Err(e @ WalletError::KeyEncrypted { .. }) => return Err(e),
                Err(e) => return Ok(InputOutcome::Failed(e)),
            }
        }
        Ok(outcome)
    }
}

impl Default for LocalTransactionSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSigner for LocalTransactionSigner {
    fn name(&self) -> &str {
        "local"
    }

    fn sign_inputs(&self, proposal: &mut ProposedTransaction<'_>, key_bag: &dyn KeyBag) -> WalletResult<SignerReport> {
        let mut report = SignerReport::new(self.name());

        for index in 0..proposal.input_count() {
            let outcome = self.sign_input(proposal, index, key_bag)?;
            match &outcome {
                InputOutcome::Signed => debug!("Signed input {}", index),
                InputOutcome::Skipped(reason) => warn!("Skipping input {}: {}", index, reason),
                InputOutcome::Failed(e) => warn!("Failed to sign input {}: {}", index, e),
            }

            let failed = matches!(outcome, InputOutcome::Failed(_));
            report.record(index, outcome);
            if failed {
                break;
            }
        }

        log_transaction(
            LogLevel::Info,
            "Local signer finished",
            Some(log_params(vec![
                ("inputs", proposal.input_count().to_string()),
                ("signed", report.signed_inputs().len().to_string()),
            ])),
        );
        Ok(report)
    }
}
