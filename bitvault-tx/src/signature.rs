//! Signature computation for legacy (non-witness) inputs
//!
//! Signatures commit to the legacy sighash of the transaction. The script
//! code is the locking script for P2PKH/P2PK and the redeem script for P2SH.

use bitcoin::ecdsa;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{PublicKey, Script, Transaction};

use crate::error::{WalletError, WalletResult};
use crate::keys::WalletKey;

/// Which outputs a signature commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigHashMode {
    /// Every input and output
    #[default]
    All,
    /// No outputs
    None,
    /// Only the output with the same index as the input
    Single,
}

/// Combine a mode and the anyone-can-pay flag into a sighash type
pub fn sighash_type(mode: SigHashMode, anyone_can_pay: bool) -> EcdsaSighashType {
    match (mode, anyone_can_pay) {
        (SigHashMode::All, false) => EcdsaSighashType::All,
        (SigHashMode::None, false) => EcdsaSighashType::None,
        (SigHashMode::Single, false) => EcdsaSighashType::Single,
        (SigHashMode::All, true) => EcdsaSighashType::AllPlusAnyoneCanPay,
        (SigHashMode::None, true) => EcdsaSighashType::NonePlusAnyoneCanPay,
        (SigHashMode::Single, true) => EcdsaSighashType::SinglePlusAnyoneCanPay,
    }
}

/// Legacy sighash of input `input` as a secp256k1 message
pub fn legacy_sighash_message(
    tx: &Transaction,
    input: usize,
    script_code: &Script,
    hash_ty: EcdsaSighashType,
) -> WalletResult<Message> {
    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(input, script_code, hash_ty.to_u32())
        .map_err(|e| WalletError::Signing(format!("Sighash for input {} failed: {}", input, e)))?;
    Ok(Message::from_slice(&sighash.to_byte_array())?)
}

/// Check an encoded signature (DER plus sighash byte) against `pubkey`
///
/// Unparseable signatures simply fail to verify.
pub fn verify_signature(
    secp: &Secp256k1<All>,
    tx: &Transaction,
    input: usize,
    script_code: &Script,
    signature: &[u8],
    pubkey: &PublicKey,
) -> bool {
    let sig = match ecdsa::Signature::from_slice(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    match legacy_sighash_message(tx, input, script_code, sig.hash_ty) {
        Ok(msg) => secp.verify_ecdsa(&msg, &sig.sig, &pubkey.inner).is_ok(),
        Err(_) => false,
    }
}

/// Signature computation capability
pub trait SignatureCalculator {
    /// Sign input `input` of `tx` with `key`
    ///
    /// Fails with `MissingKey` when the key has no private material and with
    /// `KeyEncrypted` when it is locked.
    fn calculate_signature(
        &self,
        tx: &Transaction,
        input: usize,
        key: &WalletKey,
        script_code: &Script,
        mode: SigHashMode,
        anyone_can_pay: bool,
    ) -> WalletResult<ecdsa::Signature>;
}

/// Deterministic (RFC 6979) ECDSA signer
pub struct EcdsaSignatureCalculator {
    secp: Secp256k1<All>,
}

impl EcdsaSignatureCalculator {
    pub fn new() -> Self {
        Self { secp: Secp256k1::new() }
    }
}

impl Default for EcdsaSignatureCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureCalculator for EcdsaSignatureCalculator {
    fn calculate_signature(
        &self,
        tx: &Transaction,
        input: usize,
        key: &WalletKey,
        script_code: &Script,
        mode: SigHashMode,
        anyone_can_pay: bool,
    ) -> WalletResult<ecdsa::Signature> {
        if input >= tx.input.len() {
            return Err(WalletError::InvalidArgument(format!(
                "Input {} out of range ({} inputs)",
                input,
                tx.input.len()
            )));
        }
        let secret_key = key.signing_key(input)?;
        let hash_ty = sighash_type(mode, anyone_can_pay);
        let msg = legacy_sighash_message(tx, input, script_code, hash_ty)?;
        Ok(ecdsa::Signature {
            sig: self.secp.sign_ecdsa(&msg, secret_key),
            hash_ty,
        })
    }
}

/// Where a multisig signature goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureSlot {
    /// Insert at this position of the signature region
    Insert(usize),
    /// The key has already signed this input
    AlreadyPresent,
}

/// Resolve the slot for a signature by key `key_index` of `pubkeys`
///
/// The concrete position is the number of present signatures made by keys
/// earlier in the redeem script, so signatures stay in key order whatever
/// order the cosigners sign in. Signatures that verify against no key are
/// ignored.
pub fn signature_slot(
    secp: &Secp256k1<All>,
    tx: &Transaction,
    input: usize,
    script_code: &Script,
    pubkeys: &[PublicKey],
    key_index: usize,
    present: &[Vec<u8>],
) -> SignatureSlot {
    let mut before = 0;
    for sig in present {
        let signer = pubkeys
            .iter()
            .position(|pk| verify_signature(secp, tx, input, script_code, sig, pk));
        match signer {
            Some(idx) if idx == key_index => return SignatureSlot::AlreadyPresent,
            Some(idx) if idx < key_index => before += 1,
            _ => {}
        }
    }
    SignatureSlot::Insert(before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::{OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};

    fn key(n: u8) -> WalletKey {
        WalletKey::from_secret(SecretKey::from_slice(&[n; 32]).unwrap())
    }

    fn tx() -> Transaction {
        Transaction {
            version: 1,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::all_zeros(), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: 10_000,
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[test]
    fn test_sighash_types() {
        assert_eq!(sighash_type(SigHashMode::All, false), EcdsaSighashType::All);
        assert_eq!(
            sighash_type(SigHashMode::Single, true),
            EcdsaSighashType::SinglePlusAnyoneCanPay
        );
    }

    #[test]
    fn test_signature_verifies_and_encodes_hash_type() {
        let k = key(1);
        let spk = ScriptBuf::new_p2pkh(&k.pubkey_hash());
        let tx = tx();
        let sig = EcdsaSignatureCalculator::new()
            .calculate_signature(&tx, 0, &k, &spk, SigHashMode::All, false)
            .unwrap();

        let encoded = sig.to_vec();
        assert_eq!(*encoded.last().unwrap(), 0x01);

        let secp = Secp256k1::new();
        assert!(verify_signature(&secp, &tx, 0, &spk, &encoded, k.public_key()));
        assert!(!verify_signature(&secp, &tx, 0, &spk, &encoded, key(2).public_key()));
    }

    #[test]
    fn test_watch_only_key_cannot_sign() {
        let k = WalletKey::watch_only(*key(1).public_key());
        let result = EcdsaSignatureCalculator::new().calculate_signature(
            &tx(),
            0,
            &k,
            &ScriptBuf::new(),
            SigHashMode::All,
            false,
        );
        assert!(matches!(result, Err(WalletError::MissingKey { input: 0 })));
    }

    #[test]
    fn test_slot_follows_key_order() {
        let keys: Vec<WalletKey> = (1..=3).map(key).collect();
        let pubkeys: Vec<PublicKey> = keys.iter().map(|k| *k.public_key()).collect();
        let script_code = ScriptBuf::new_p2pkh(&keys[0].pubkey_hash());
        let tx = tx();
        let secp = Secp256k1::new();
        let calc = EcdsaSignatureCalculator::new();

        let sig2 = calc
            .calculate_signature(&tx, 0, &keys[2], &script_code, SigHashMode::All, false)
            .unwrap()
            .to_vec();
        let present = vec![sig2];

        assert_eq!(
            signature_slot(&secp, &tx, 0, &script_code, &pubkeys, 0, &present),
            SignatureSlot::Insert(0)
        );
        assert_eq!(
            signature_slot(&secp, &tx, 0, &script_code, &pubkeys, 1, &present),
            SignatureSlot::Insert(0)
        );
        assert_eq!(
            signature_slot(&secp, &tx, 0, &script_code, &pubkeys, 2, &present),
            SignatureSlot::AlreadyPresent
        );
    }
}
