//! Transaction signers and the chain that runs them
//!
//! A signer looks at the whole [`ProposedTransaction`] and decides per input
//! whether it can contribute. The per-input result is an [`InputOutcome`]:
//!
//! - `Signed`: a signature was inserted
//! - `Skipped`: nothing to do here, a later signer may finish the input
//! - `Failed`: the signer hit an error; the chain aborts
//!
//! Errors returned from [`TransactionSigner::sign_inputs`] itself are
//! terminal for the whole attempt (a locked key, an inconsistent derivation
//! path).

pub mod chain;
pub mod derived;
pub mod local;

use bitcoin::secp256k1::{All, Secp256k1};
use std::fmt;

use crate::error::{WalletError, WalletResult};
use crate::input_script::ScriptTemplate;
use crate::keys::KeyBag;
use crate::proposed::ProposedTransaction;
use crate::redeem::RedeemData;
use crate::signature::{signature_slot, SigHashMode, SignatureCalculator, SignatureSlot};

pub use chain::{ChainReport, SignerChain, SignerState};
pub use derived::DerivedKeySigner;
pub use local::LocalTransactionSigner;

/// Whether a signer needs setup before it can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    /// Pure function of its inputs, always ready
    Stateless,
    /// Needs setup (a device, an account key) before it is ready
    Stateful,
}

/// Why a signer left an input alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The input's connected output is unknown; assumed signed elsewhere
    NotConnected,
    /// The input script already satisfies the locking script
    AlreadySpendable,
    /// The wallet has no redeem data for the output
    NoRedeemData,
    /// Recognized script, but no local key for it
    NoLocalKey,
    /// Keys are known but none carries private material
    MissingPrivateKey,
    /// Every controlled key has already signed, or every slot is filled
    AlreadySigned,
    /// No derivation path recorded for the script yet
    NoKeyPath,
    /// Locking script type this signer does not handle
    UnsupportedScript,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotConnected => "no connected output",
            SkipReason::AlreadySpendable => "already spendable",
            SkipReason::NoRedeemData => "no redeem data",
            SkipReason::NoLocalKey => "no local key",
            SkipReason::MissingPrivateKey => "missing private key",
            SkipReason::AlreadySigned => "already signed",
            SkipReason::NoKeyPath => "no key path recorded",
            SkipReason::UnsupportedScript => "unsupported script",
        };
        f.write_str(text)
    }
}

/// Result of one signer on one input
#[derive(Debug)]
pub enum InputOutcome {
    Signed,
    Skipped(SkipReason),
    Failed(WalletError),
}

/// Per-input outcomes of one signer run
#[derive(Debug)]
pub struct SignerReport {
    signer: String,
    outcomes: Vec<(usize, InputOutcome)>,
}

impl SignerReport {
    pub fn new(signer: &str) -> Self {
        Self {
            signer: signer.to_string(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, input: usize, outcome: InputOutcome) {
        self.outcomes.push((input, outcome));
    }

    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn outcomes(&self) -> &[(usize, InputOutcome)] {
        &self.outcomes
    }

    /// Inputs this signer signed
    pub fn signed_inputs(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, InputOutcome::Signed))
            .map(|(i, _)| *i)
            .collect()
    }

    /// Inputs this signer skipped, with the reason
    pub fn skipped_inputs(&self) -> Vec<(usize, SkipReason)> {
        self.outcomes
            .iter()
            .filter_map(|(i, o)| match o {
                InputOutcome::Skipped(reason) => Some((*i, *reason)),
                _ => None,
            })
            .collect()
    }

    /// First failure, if any
    pub fn failure(&self) -> Option<(usize, &WalletError)> {
        self.outcomes.iter().find_map(|(i, o)| match o {
            InputOutcome::Failed(e) => Some((*i, e)),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }
}

/// A signing authority in the chain
pub trait TransactionSigner {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    fn kind(&self) -> SignerKind {
        SignerKind::Stateless
    }

    /// Whether the signer can run now; stateless signers always can
    fn is_ready(&self) -> bool {
        true
    }

    /// Sign whatever inputs this signer can, in input order
    fn sign_inputs(&self, proposal: &mut ProposedTransaction<'_>, key_bag: &dyn KeyBag) -> WalletResult<SignerReport>;
}

/// Sign input `index` with key `key_index` of `redeem` and insert the signature
///
/// Builds the empty template first when the input script is still empty.
/// Always signs with [`SigHashMode::All`]. Returns `Skipped(AlreadySigned)`
/// when the key's signature is already present or every slot is taken.
pub(crate) fn sign_and_insert(
    proposal: &mut ProposedTransaction<'_>,
    index: usize,
    template: ScriptTemplate,
    redeem: &RedeemData,
    key_index: usize,
    calculator: &dyn SignatureCalculator,
    secp: &Secp256k1<All>,
) -> WalletResult<InputOutcome> {
    let key = redeem
        .keys
        .get(key_index)
        .ok_or_else(|| WalletError::InvalidArgument(format!("No key at index {}", key_index)))?;

    let script_sig = match proposal.input_script(index) {
        Some(current) if !current.is_empty() => current.to_owned(),
        Some(_) => template.empty_input_script(key.public_key(), &redeem.redeem_script)?,
        None => {
            return Err(WalletError::InvalidArgument(format!("Input {} out of range", index)));
        }
    };

    let position = match template {
        ScriptTemplate::PayToScriptHash => {
            let present = template.signatures(&script_sig)?;
            let slots = template.slot_count(&script_sig)?;
            match signature_slot(
                secp,
                proposal.partial_tx(),
                index,
                &redeem.redeem_script,
                &redeem.public_keys(),
                key_index,
                &present,
            ) {
                SignatureSlot::Insert(position) if position < slots && present.len() < slots => position,
                _ => return Ok(InputOutcome::Skipped(SkipReason::AlreadySigned)),
            }
        }
        _ => 0,
    };

    let signature = calculator.calculate_signature(
        proposal.partial_tx(),
        index,
        key,
        &redeem.redeem_script,
        SigHashMode::All,
        false,
    )?;

    let updated = template.insert_signature(&script_sig, &signature.to_vec(), position)?;
    proposal.set_input_script(index, updated)?;
    Ok(InputOutcome::Signed)
}
