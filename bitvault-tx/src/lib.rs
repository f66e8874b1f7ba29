//! BitVault Transaction Construction
//!
//! This crate builds and signs payments for the BitVault Bitcoin wallet:
//! it picks which wallet-owned outputs fund a payment, then passes the
//! unsigned transaction through an ordered chain of signers until every input
//! carries a valid script signature.
//!
//! # Modules
//!
//! - `types`: Spendable outputs and Bitcoin constants
//! - `math`: Checked amount arithmetic
//! - `error`: Error kinds shared by every operation
//! - `logging`: Security-aware logging infrastructure
//! - `config`: Selection and signing configuration
//! - `coin_selection`: Coin selection strategies
//! - `keys`: Wallet keys, key encryption and the key bag capability
//! - `redeem`: Resolving the keys and script needed to spend an output
//! - `input_script`: Building input scripts and inserting signatures
//! - `signature`: Sighash computation and signature creation
//! - `verify`: Checking input scripts against locking scripts
//! - `proposed`: The transaction under construction
//! - `signers`: Transaction signers and the signer chain
//! - `wallet_operations`: End-to-end payment construction
//!
//! # Security Considerations
//!
//! - Private keys stay behind the [`keys::KeyBag`] capability and are never logged
//! - Encrypted keys are only unlocked for the duration of a signing attempt
//! - A failed signing attempt never leaves a partially signed transaction behind

/// Core domain types
pub mod types;

/// Checked amount arithmetic
pub mod math;

/// Error handling
pub mod error;

/// Secure logging functionality
pub mod logging;

/// Configuration management
pub mod config;

/// Coin selection algorithms
pub mod coin_selection;

/// Key management for signing
pub mod keys;

/// Redeem data resolution
pub mod redeem;

/// Input script templates
pub mod input_script;

/// Signature computation
pub mod signature;

/// Script verification
pub mod verify;

/// Transaction under construction
pub mod proposed;

/// Transaction signers
pub mod signers;

/// Payment construction
pub mod wallet_operations;

pub use coin_selection::{CoinSelection, CoinSelector, DefaultCoinSelector, SelectionStrategy, TieBreak};
pub use config::Config;
pub use error::{WalletError, WalletResult};
pub use keys::{DecryptingKeyBag, KeyBag, KeyCrypter, MemoryKeyBag, WalletKey};
pub use proposed::ProposedTransaction;
pub use redeem::{resolve_connected_redeem_data, RedeemData, RedeemLookup};
pub use signers::{
    ChainReport, DerivedKeySigner, LocalTransactionSigner, SignerChain, SignerReport, TransactionSigner,
};
pub use types::{SpendableOutput, DUST_THRESHOLD, MAX_BITCOIN_SUPPLY, SATS_PER_BTC};
pub use wallet_operations::{CompletedTransaction, SendRequest, TransactionComposer};

pub use bitcoin::{Amount, OutPoint, Transaction, Txid};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::sync::Once;

static INIT: Once = Once::new();

/// Library initialization
///
/// Sets up logging with the default configuration. Safe to call more than
/// once; later calls return the first call's result.
pub fn init() -> Result<(), String> {
    thread_local! {
        static INIT_RESULT: std::cell::RefCell<Option<Result<(), String>>> = std::cell::RefCell::new(None);
    }

    let mut needs_init = false;
    INIT.call_once(|| {
        needs_init = true;
    });

    if needs_init {
        let config = logging::LogConfig::default();
        let result = logging::init(&config).map_err(|e| format!("Failed to initialize logging: {}", e));
        INIT_RESULT.with(|cell| {
            *cell.borrow_mut() = Some(result.clone());
        });
        result
    } else {
        INIT_RESULT.with(|cell| cell.borrow().clone().unwrap_or(Ok(())))
    }
}
