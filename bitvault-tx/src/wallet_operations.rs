//! Wallet-facing entry point for building and signing payments
//!
//! # Flow
//!
//! 1. Select coins covering `amount + fee` with the configured selector
//! 2. Fail with `InsufficientFunds` (carrying the shortfall) if they don't
//! 3. Assemble the unsigned transaction: recipient output, plus a change
//!    output unless the change is dust, in which case it goes to the fee
//! 4. Run the signer chain over a [`ProposedTransaction`]
//! 5. Report which inputs still lack valid signatures
//!
//! The candidate pool is only borrowed. Nothing leaves this module on
//! failure; [`CompletedTransaction::claim_inputs`] is the explicit step that
//! marks the spent outputs in the wallet's pool.
//!
//! Fee estimation is not done here; the caller supplies the absolute fee.

use bitcoin::absolute::LockTime;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use log::info;

use crate::coin_selection::{selector_for, CoinSelector};
use crate::config::Config;
use crate::error::{WalletError, WalletResult};
use crate::keys::KeyBag;
use crate::logging::{log_core, log_params, log_transaction, LogLevel};
use crate::math;
use crate::proposed::ProposedTransaction;
use crate::signers::{ChainReport, SignerChain, TransactionSigner};
use crate::types::SpendableOutput;
use crate::verify::{ScriptVerifier, StandardScriptVerifier};

/// A payment to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Locking script of the recipient
    pub recipient: ScriptBuf,
    /// Value paid to the recipient
    pub amount: Amount,
    /// Absolute fee
    pub fee: Amount,
    /// Locking script for change
    pub change_script: ScriptBuf,
}

/// A built and signed payment
#[derive(Debug)]
pub struct CompletedTransaction {
    pub transaction: Transaction,
    /// Spent outpoints, in input order
    pub inputs: Vec<OutPoint>,
    /// Value of the spent outputs
    pub gathered: Amount,
    /// Change output value, if one was created
    pub change: Option<Amount>,
    /// Final fee, including any dust change
    pub fee: Amount,
    pub report: ChainReport,
    /// Inputs that do not yet satisfy their locking script
    pub missing_signatures: Vec<usize>,
}

impl CompletedTransaction {
    /// Whether every input is signed
    pub fn is_complete(&self) -> bool {
        self.missing_signatures.is_empty()
    }

    /// Mark the spent outputs in `pool` as claimed by this transaction
    pub fn claim_inputs(&self, pool: &mut [SpendableOutput]) -> WalletResult<()> {
        let txid = self.transaction.txid();
        for (index, outpoint) in self.inputs.iter().enumerate() {
            if let Some(output) = pool.iter_mut().find(|o| o.outpoint == *outpoint) {
                output.claim(txid, index)?;
            }
        }
        Ok(())
    }
}

/// Builds payments from a candidate pool and signs them with a signer chain
pub struct TransactionComposer {
    config: Config,
    selector: Box<dyn CoinSelector>,
    chain: SignerChain,
    verifier: StandardScriptVerifier,
}

impl TransactionComposer {
    /// Composer with the configured selector and the local signer
    ///
    /// Fails if `config` does not validate.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let selector = selector_for(&config.selection);
        Ok(Self {
            config,
            selector,
            chain: SignerChain::with_local_signer(),
            verifier: StandardScriptVerifier::new(),
        })
    }

    /// Replace the coin selector
    pub fn with_selector(mut self, selector: Box<dyn CoinSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Append a signer after the ones already registered
    pub fn add_signer(&mut self, signer: Box<dyn TransactionSigner>) -> WalletResult<()> {
        self.chain.add_signer(signer)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chain(&self) -> &SignerChain {
        &self.chain
    }

    /// Select, build and sign a payment
    pub fn complete(
        &mut self,
        request: &SendRequest,
        candidates: &[SpendableOutput],
        key_bag: &dyn KeyBag,
    ) -> WalletResult<CompletedTransaction> {
        let dust_threshold = self.config.selection.dust_threshold;
        math::validate_amount(request.amount)?;
        if math::is_dust(request.amount.to_sat(), dust_threshold) {
            return Err(WalletError::InvalidArgument(format!(
                "Payment of {} sat is at or below the dust threshold",
                request.amount.to_sat()
            )));
        }
        let target = math::checked_add(request.amount, request.fee)?;

        let selection = self
            .selector
            .select(target, candidates.iter().collect())?
            .require(target)?;

        log_core(
            LogLevel::Info,
            "Coins selected",
            Some(log_params(vec![
                ("selector", self.selector.name().to_string()),
                ("inputs", selection.len().to_string()),
                ("gathered", selection.gathered().to_sat().to_string()),
            ])),
        );

        let mut change = Some(math::checked_sub(selection.gathered(), target)?);
        let mut fee = request.fee;
        if let Some(value) = change {
            if math::is_dust(value.to_sat(), dust_threshold) {
                fee = math::checked_add(fee, value)?;
                change = None;
            }
        }

        let inputs = selection.outpoints();
        let mut outputs = vec![TxOut {
            value: request.amount.to_sat(),
            script_pubkey: request.recipient.clone(),
        }];
        if let Some(value) = change {
            outputs.push(TxOut {
                value: value.to_sat(),
                script_pubkey: request.change_script.clone(),
            });
        }

        let unsigned = build_unsigned(&inputs, outputs);
        let (transaction, report) = self.sign_transaction(&unsigned, candidates, key_bag)?;
        let missing_signatures = self.unsigned_inputs(&transaction, candidates);

        info!(
            "Completed transaction {} ({} inputs, {} still unsigned)",
            transaction.txid(),
            inputs.len(),
            missing_signatures.len()
        );

        Ok(CompletedTransaction {
            transaction,
            inputs,
            gathered: selection.gathered(),
            change,
            fee,
            report,
            missing_signatures,
        })
    }

    /// Run the signer chain over a copy of `tx`
    ///
    /// `tx` itself is never modified, so it stays available for a retry when
    /// signing fails.
    pub fn sign_transaction(
        &mut self,
        tx: &Transaction,
        pool: &[SpendableOutput],
        key_bag: &dyn KeyBag,
    ) -> WalletResult<(Transaction, ChainReport)> {
        let mut proposal = ProposedTransaction::connect(tx.clone(), pool);
        match self.chain.sign(&mut proposal, key_bag) {
            Ok(report) => Ok((proposal.into_transaction(), report)),
            Err(e) => {
                log_transaction(
                    LogLevel::Error,
                    "Signing attempt failed",
                    Some(log_params(vec![("error", e.to_string())])),
                );
                Err(e)
            }
        }
    }

    /// Inputs of `tx` that do not satisfy the output they spend
    pub fn unsigned_inputs(&self, tx: &Transaction, pool: &[SpendableOutput]) -> Vec<usize> {
        tx.input
            .iter()
            .enumerate()
            .filter(|(index, tx_in)| {
                match pool.iter().find(|o| o.outpoint == tx_in.previous_output) {
                    Some(output) => !matches!(
                        self.verifier.verify(tx, *index, &output.script_pubkey, true),
                        Ok(true)
                    ),
                    None => true,
                }
            })
            .map(|(index, _)| index)
            .collect()
    }
}

fn build_unsigned(inputs: &[OutPoint], output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: 1,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            })
            .collect(),
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::MemoryKeyBag;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn request(amount: u64, fee: u64) -> SendRequest {
        SendRequest {
            recipient: ScriptBuf::from(vec![0x51]),
            amount: Amount::from_sat(amount),
            fee: Amount::from_sat(fee),
            change_script: ScriptBuf::from(vec![0x52]),
        }
    }

    fn pool(values: &[u64]) -> Vec<SpendableOutput> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                SpendableOutput::new(
                    OutPoint::new(Txid::all_zeros(), i as u32),
                    Amount::from_sat(*v),
                    ScriptBuf::new(),
                    6,
                )
            })
            .collect()
    }

    #[test]
    fn test_insufficient_funds_reports_shortfall() {
        let mut composer = TransactionComposer::from_config(Config::default()).unwrap();
        let result = composer.complete(&request(10_000, 1_000), &pool(&[4_000, 5_000]), &MemoryKeyBag::new());
        match result {
            Err(WalletError::InsufficientFunds { shortfall, .. }) => assert_eq!(shortfall, Amount::from_sat(2_000)),
            other => panic!("unexpected {:?}", other.map(|c| c.transaction)),
        }
    }

    #[test]
    fn test_dust_change_goes_to_fee() {
        let mut composer = TransactionComposer::from_config(Config::default()).unwrap();
        let completed = composer
            .complete(&request(10_000, 1_000), &pool(&[11_300]), &MemoryKeyBag::new())
            .unwrap();
        assert_eq!(completed.change, None);
        assert_eq!(completed.fee, Amount::from_sat(1_300));
        assert_eq!(completed.transaction.output.len(), 1);
        // Nothing could be signed with an empty bag
        assert_eq!(completed.missing_signatures, vec![0]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.selection.min_confirmations = 0;
        assert!(TransactionComposer::from_config(config).is_err());

        let mut config = Config::default();
        config.selection.dust_threshold = crate::types::MAX_BITCOIN_SUPPLY;
        assert!(TransactionComposer::from_config(config).is_err());
    }

    #[test]
    fn test_rejects_dust_payment() {
        let mut composer = TransactionComposer::from_config(Config::default()).unwrap();
        assert!(composer
            .complete(&request(100, 0), &pool(&[10_000]), &MemoryKeyBag::new())
            .is_err());
    }
}
