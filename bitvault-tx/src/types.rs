//! Coin model for BitVault transaction construction
//!
//! These types describe the wallet-owned outputs that can fund a payment.
//! The selection and signing code only ever borrows them: selectors return
//! references into the caller's pool and signers read the connected output of
//! each input, but neither mutates wallet state.
//!
//! IMPORTANT: These types MUST NOT contain private keys. Key material lives
//! behind the [`KeyBag`](crate::keys::KeyBag) capability.

use bitcoin::{Amount, OutPoint, ScriptBuf, TxOut, Txid};
use std::fmt;

use crate::error::{WalletError, WalletResult};

// Constants for Bitcoin-specific values

/// Constant for dust threshold (minimum output value)
pub const DUST_THRESHOLD: u64 = 546;

/// Constant for satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Constant for maximum Bitcoin supply in satoshis
pub const MAX_BITCOIN_SUPPLY: u64 = 21_000_000 * SATS_PER_BTC;

/// Connection state of a spendable output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Not referenced by any transaction input
    Unspent,
    /// Claimed by input `input` of transaction `txid`
    ClaimedBy { txid: Txid, input: usize },
}

/// A prior transaction output the wallet may spend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableOutput {
    /// Reference to the transaction output (txid and vout)
    pub outpoint: OutPoint,

    /// Value held by the output
    pub value: Amount,

    /// Locking script of the output
    pub script_pubkey: ScriptBuf,

    /// Number of confirmations (0 for unconfirmed)
    pub confirmations: u32,

    /// Is this a change output from one of our own transactions?
    pub is_change: bool,

    /// Whether the output is still unspent, and which input claims it otherwise
    pub state: OutputState,
}

impl SpendableOutput {
    /// Create an unspent, non-change output
    pub fn new(outpoint: OutPoint, value: Amount, script_pubkey: ScriptBuf, confirmations: u32) -> Self {
        Self {
            outpoint,
            value,
            script_pubkey,
            confirmations,
            is_change: false,
            state: OutputState::Unspent,
        }
    }

    /// Mark this output as change from one of our own transactions
    pub fn as_change(mut self) -> Self {
        self.is_change = true;
        self
    }

    /// Check if no input currently claims this output
    pub fn is_available(&self) -> bool {
        self.state == OutputState::Unspent
    }

    /// Record that input `input` of `txid` spends this output
    ///
    /// Fails if another input already claims it.
    pub fn claim(&mut self, txid: Txid, input: usize) -> WalletResult<()> {
        match self.state {
            OutputState::Unspent => {
                self.state = OutputState::ClaimedBy { txid, input };
                Ok(())
            }
            OutputState::ClaimedBy { txid: by, input: idx } if by == txid && idx == input => Ok(()),
            OutputState::ClaimedBy { txid: by, input: idx } => Err(WalletError::InvalidArgument(format!(
                "Output {} is already claimed by {}:{}",
                self.outpoint, by, idx
            ))),
        }
    }

    /// Release a claim, making the output spendable again
    pub fn release(&mut self) {
        self.state = OutputState::Unspent;
    }

    /// The output as it appears in its funding transaction
    pub fn to_tx_out(&self) -> TxOut {
        TxOut {
            value: self.value.to_sat(),
            script_pubkey: self.script_pubkey.clone(),
        }
    }

    /// Get a unique identifier for this output
    pub fn id(&self) -> String {
        format!("{}:{}", self.outpoint.txid, self.outpoint.vout)
    }
}

impl fmt::Display for SpendableOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} sat, {} conf)", self.id(), self.value.to_sat(), self.confirmations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn output() -> SpendableOutput {
        SpendableOutput::new(
            OutPoint::new(Txid::all_zeros(), 1),
            Amount::from_sat(10_000),
            ScriptBuf::new(),
            3,
        )
    }

    #[test]
    fn test_claim_and_release() {
        let mut out = output();
        let spender = Txid::from_byte_array([7u8; 32]);
        assert!(out.is_available());

        out.claim(spender, 0).unwrap();
        assert!(!out.is_available());
        // Claiming again from the same input is a no-op
        out.claim(spender, 0).unwrap();
        // A different input may not claim it
        assert!(out.claim(spender, 1).is_err());

        out.release();
        assert!(out.is_available());
    }

    #[test]
    fn test_to_tx_out_preserves_value_and_script() {
        let out = output();
        let tx_out = out.to_tx_out();
        assert_eq!(tx_out.value, 10_000);
        assert_eq!(tx_out.script_pubkey, out.script_pubkey);
        assert_eq!(out.id(), format!("{}:1", Txid::all_zeros()));
    }
}
