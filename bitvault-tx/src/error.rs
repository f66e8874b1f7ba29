//! Standardized error handling for transaction construction
//!
//! Every fallible operation in this crate returns [`WalletResult`]. The error
//! kinds split into two groups:
//!
//! - **Skip-level**: [`WalletError::MissingKey`]. A signer absorbs it, logs it
//!   and leaves the input for a later signer.
//! - **Terminal**: everything else. The signing attempt unwinds immediately and
//!   the partially signed transaction is discarded.
//!
//! # Usage
//!
//! ```
//! use bitvault_tx::error::WalletError;
//!
//! let err = WalletError::KeyEncrypted { input: 2 };
//! assert!(err.is_terminal());
//! assert_eq!(err.input_index(), Some(2));
//! ```

use bitcoin::bip32::DerivationPath;
use bitcoin::Amount;
use thiserror::Error;

/// Result alias used across the crate
pub type WalletResult<T> = Result<T, WalletError>;

/// Errors raised while selecting coins or signing a proposed transaction
#[derive(Debug, Error)]
pub enum WalletError {
    /// Selection could not meet the target
    #[error("Insufficient funds: needed {needed}, available {available} (short by {shortfall})")]
    InsufficientFunds {
        needed: Amount,
        available: Amount,
        shortfall: Amount,
    },

    /// A required private key is locked; unlock the keys and retry the whole attempt
    #[error("Private key for input {input} is encrypted")]
    KeyEncrypted { input: usize },

    /// The key pair carries no private material
    #[error("No private key available for input {input}")]
    MissingKey { input: usize },

    /// A signer in the chain reported failure
    #[error("Signer '{signer}' aborted the signing chain (input {input:?}): {reason}")]
    SignerChainAborted {
        signer: String,
        input: Option<usize>,
        reason: String,
    },

    /// A stateful signer was asked to run before it was set up
    #[error("Signer '{signer}' is not ready")]
    SignerNotReady { signer: String },

    /// A signer tried to record a derivation path that conflicts with the recorded one
    #[error("Conflicting derivation path for script {script}: recorded {recorded}, attempted {attempted}")]
    InconsistentDerivationPath {
        script: String,
        recorded: DerivationPath,
        attempted: DerivationPath,
    },

    #[error("Amount math error: {0}")]
    AmountMathError(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Signing error: {0}")]
    Signing(String),

    /// Key encryption or decryption failure (wrong password, corrupt ciphertext)
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalletError {
    /// Whether this error aborts the current signing attempt
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WalletError::MissingKey { .. })
    }

    /// Index of the input the error refers to, if any
    pub fn input_index(&self) -> Option<usize> {
        match self {
            WalletError::KeyEncrypted { input } | WalletError::MissingKey { input } => Some(*input),
            WalletError::SignerChainAborted { input, .. } => *input,
            _ => None,
        }
    }
}

impl From<bitcoin::secp256k1::Error> for WalletError {
    fn from(err: bitcoin::secp256k1::Error) -> Self {
        WalletError::Signing(format!("secp256k1 error: {}", err))
    }
}

impl From<bitcoin::bip32::Error> for WalletError {
    fn from(err: bitcoin::bip32::Error) -> Self {
        WalletError::Signing(format!("BIP32 derivation error: {}", err))
    }
}
