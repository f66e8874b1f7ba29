//! The transaction being signed, shared by every signer in a chain
//!
//! A [`ProposedTransaction`] lives for one signing attempt. Signers receive it
//! by exclusive borrow, one at a time, and may replace input scripts and
//! record which derivation path they used for a locking script. The path map
//! is append-only: recording the same path again is fine, recording a
//! different one is an [`WalletError::InconsistentDerivationPath`].

use bitcoin::bip32::DerivationPath;
use bitcoin::{Script, ScriptBuf, Transaction};
use std::collections::BTreeMap;

use crate::error::{WalletError, WalletResult};
use crate::logging::{log_params, log_transaction, LogLevel};
use crate::types::SpendableOutput;

/// Partial transaction plus per-script key derivation paths
#[derive(Debug, Clone)]
pub struct ProposedTransaction<'a> {
    partial_tx: Transaction,
    connected: Vec<Option<&'a SpendableOutput>>,
    key_paths: BTreeMap<ScriptBuf, DerivationPath>,
}

impl<'a> ProposedTransaction<'a> {
    /// Wrap `partial_tx`, with `connected[i]` the output input `i` spends
    pub fn new(partial_tx: Transaction, connected: Vec<Option<&'a SpendableOutput>>) -> WalletResult<Self> {
        if connected.len() != partial_tx.input.len() {
            return Err(WalletError::InvalidArgument(format!(
                "{} connected outputs for {} inputs",
                connected.len(),
                partial_tx.input.len()
            )));
        }
        Ok(Self {
            partial_tx,
            connected,
            key_paths: BTreeMap::new(),
        })
    }

    /// Wrap `partial_tx`, connecting each input to the pool output with the same outpoint
    ///
    /// Inputs spending outputs outside `pool` stay unconnected.
    pub fn connect(partial_tx: Transaction, pool: &'a [SpendableOutput]) -> Self {
        let connected = partial_tx
            .input
            .iter()
            .map(|tx_in| pool.iter().find(|o| o.outpoint == tx_in.previous_output))
            .collect();
        Self {
            partial_tx,
            connected,
            key_paths: BTreeMap::new(),
        }
    }

    pub fn partial_tx(&self) -> &Transaction {
        &self.partial_tx
    }

    pub fn input_count(&self) -> usize {
        self.partial_tx.input.len()
    }

    /// Output spent by input `index`, if known
    pub fn connected_output(&self, index: usize) -> Option<&'a SpendableOutput> {
        self.connected.get(index).copied().flatten()
    }

    pub fn input_script(&self, index: usize) -> Option<&Script> {
        self.partial_tx.input.get(index).map(|tx_in| tx_in.script_sig.as_script())
    }

    /// Replace the input script of input `index`
    pub fn set_input_script(&mut self, index: usize, script_sig: ScriptBuf) -> WalletResult<()> {
        let count = self.partial_tx.input.len();
        let tx_in = self
            .partial_tx
            .input
            .get_mut(index)
            .ok_or_else(|| WalletError::InvalidArgument(format!("Input {} out of range ({} inputs)", index, count)))?;
        tx_in.script_sig = script_sig;
        Ok(())
    }

    /// Derivation path recorded for `script_pubkey`
    pub fn key_path(&self, script_pubkey: &Script) -> Option<&DerivationPath> {
        self.key_paths.get(script_pubkey)
    }

    /// Record the derivation path of the key that signed for `script_pubkey`
    pub fn record_key_path(&mut self, script_pubkey: &Script, path: &DerivationPath) -> WalletResult<()> {
        match self.key_paths.get(script_pubkey) {
            Some(recorded) if recorded == path => Ok(()),
            Some(recorded) => {
                let script = format!("{:x}", script_pubkey);
                log_transaction(
                    LogLevel::Warn,
                    "Conflicting derivation path",
                    Some(log_params(vec![
                        ("script", script.clone()),
                        ("recorded", recorded.to_string()),
                        ("attempted", path.to_string()),
                    ])),
                );
                Err(WalletError::InconsistentDerivationPath {
                    script,
                    recorded: recorded.clone(),
                    attempted: path.clone(),
                })
            }
            None => {
                self.key_paths.insert(script_pubkey.to_owned(), path.clone());
                Ok(())
            }
        }
    }

    pub fn key_paths(&self) -> &BTreeMap<ScriptBuf, DerivationPath> {
        &self.key_paths
    }

    /// Finish the attempt and take the transaction
    pub fn into_transaction(self) -> Transaction {
        self.partial_tx
    }
}
