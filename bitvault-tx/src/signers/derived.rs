//! Cosigner that derives its key from the path the first signer recorded
//!
//! In a P2SH multisig wallet every cosigner's key for a given script sits at
//! the same derivation path below that cosigner's account key. The first
//! signer records the path it used in the [`ProposedTransaction`]; this
//! signer reads it back, derives its own key at that path and signs.
//!
//! Stateful: not ready until an account key is attached.

use bitcoin::bip32::ExtendedPrivKey;
use bitcoin::secp256k1::{All, Secp256k1};
use log::{debug, warn};

use crate::error::{WalletError, WalletResult};
use crate::input_script::ScriptTemplate;
use crate::keys::{KeyBag, WalletKey};
use crate::proposed::ProposedTransaction;
use crate::redeem::{resolve_connected_redeem_data, RedeemData, RedeemLookup};
use crate::signature::EcdsaSignatureCalculator;
use crate::signers::{sign_and_insert, InputOutcome, SignerKind, SignerReport, SkipReason, TransactionSigner};
use crate::verify::{ScriptVerifier, StandardScriptVerifier};

/// P2SH cosigner holding an account extended private key
pub struct DerivedKeySigner {
    name: String,
    account: Option<ExtendedPrivKey>,
    verifier: StandardScriptVerifier,
    calculator: EcdsaSignatureCalculator,
    secp: Secp256k1<All>,
}

impl DerivedKeySigner {
    /// A signer with no account key yet
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            account: None,
            verifier: StandardScriptVerifier::new(),
            calculator: EcdsaSignatureCalculator::new(),
            secp: Secp256k1::new(),
        }
    }

    /// Attach the account key, making the signer ready
    pub fn set_account_key(&mut self, account: ExtendedPrivKey) {
        self.account = Some(account);
    }

    pub fn with_account_key(mut self, account: ExtendedPrivKey) -> Self {
        self.set_account_key(account);
        self
    }

    fn sign_input(
        &self,
        account: &ExtendedPrivKey,
        proposal: &mut ProposedTransaction<'_>,
        index: usize,
        key_bag: &dyn KeyBag,
    ) -> WalletResult<InputOutcome> {
        let output = match proposal.connected_output(index) {
            Some(output) => output,
            None => return Ok(InputOutcome::Skipped(SkipReason::NotConnected)),
        };
        let script_pubkey = &output.script_pubkey;

        if ScriptTemplate::classify(script_pubkey) != Some(ScriptTemplate::PayToScriptHash) {
            return Ok(InputOutcome::Skipped(SkipReason::UnsupportedScript));
        }
        if let Ok(true) = self.verifier.verify(proposal.partial_tx(), index, script_pubkey, true) {
            return Ok(InputOutcome::Skipped(SkipReason::AlreadySpendable));
        }

        let path = match proposal.key_path(script_pubkey) {
            Some(path) => path.clone(),
            None => return Ok(InputOutcome::Skipped(SkipReason::NoKeyPath)),
        };

        let redeem = match resolve_connected_redeem_data(output, key_bag) {
            RedeemLookup::Resolved(redeem) => redeem,
            RedeemLookup::NoLocalKey => return Ok(InputOutcome::Skipped(SkipReason::NoRedeemData)),
            RedeemLookup::Unrecognized => return Ok(InputOutcome::Skipped(SkipReason::UnsupportedScript)),
        };

        let key = WalletKey::from_xpriv(account, &path)?;
        let key_index = match redeem.key_index(key.public_key()) {
            Some(index) => index,
            None => return Ok(InputOutcome::Skipped(SkipReason::NoLocalKey)),
        };

        // Sign with the derived key in place of whatever the bag knows for that slot
        let mut keys = redeem.keys.clone();
        keys[key_index] = key;
        let redeem = RedeemData::multisig(keys, redeem.redeem_script);

        let outcome = sign_and_insert(
            proposal,
            index,
            ScriptTemplate::PayToScriptHash,
            &redeem,
            key_index,
            &self.calculator,
            &self.secp,
        );
        match outcome {
            Ok(InputOutcome::Signed) => {
                proposal.record_key_path(script_pubkey, &path)?;
                Ok(InputOutcome::Signed)
            }
            Ok(other) => Ok(other),
            Err(e) => Ok(InputOutcome::Failed(e)),
        }
    }
}

impl TransactionSigner for DerivedKeySigner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SignerKind {
        SignerKind::Stateful
    }

    fn is_ready(&self) -> bool {
        self.account.is_some()
    }

    fn sign_inputs(&self, proposal: &mut ProposedTransaction<'_>, key_bag: &dyn KeyBag) -> WalletResult<SignerReport> {
        let mut report = SignerReport::new(&self.name);
        let account = match &self.account {
            Some(account) => account,
            None => {
                return Err(WalletError::SignerNotReady {
                    signer: self.name.clone(),
                })
            }
        };

        for index in 0..proposal.input_count() {
            let outcome = self.sign_input(account, proposal, index, key_bag)?;
            match &outcome {
                InputOutcome::Signed => debug!("{} signed input {}", self.name, index),
                InputOutcome::Skipped(reason) => debug!("{} skipping input {}: {}", self.name, index, reason),
                InputOutcome::Failed(e) => warn!("{} failed on input {}: {}", self.name, index, e),
            }
            let failed = matches!(outcome, InputOutcome::Failed(_));
            report.record(index, outcome);
            if failed {
                break;
            }
        }
        Ok(report)
    }
}
