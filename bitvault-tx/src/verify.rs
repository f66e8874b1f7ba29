//! Checking whether an input already spends its output
//!
//! [`ScriptVerifier`] is the seam for full script verification. The
//! [`StandardScriptVerifier`] understands exactly the templates this crate
//! signs (P2PKH, P2PK and P2SH multisig) and evaluates them directly; it is
//! not a script interpreter.

use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{PublicKey, Script, ScriptBuf, Transaction};

use crate::error::{WalletError, WalletResult};
use crate::input_script::{push_elements, ScriptTemplate};
use crate::redeem::parse_multisig;
use crate::signature::verify_signature;

/// Script verification capability
pub trait ScriptVerifier {
    /// Whether input `input` of `tx` satisfies `script_pubkey`
    ///
    /// `Ok(false)` means the input is not (yet) valid; an error means the
    /// script cannot be evaluated at all.
    fn verify(&self, tx: &Transaction, input: usize, script_pubkey: &Script, enforce_p2sh: bool) -> WalletResult<bool>;
}

/// Verifier for the standard single-key and multisig templates
pub struct StandardScriptVerifier {
    secp: Secp256k1<All>,
}

impl StandardScriptVerifier {
    pub fn new() -> Self {
        Self { secp: Secp256k1::new() }
    }

    fn verify_p2pkh(&self, tx: &Transaction, input: usize, spk: &Script, elements: &[Vec<u8>]) -> bool {
        if elements.len() != 2 {
            return false;
        }
        let pubkey = match PublicKey::from_slice(&elements[1]) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        if ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()).as_script() != spk {
            return false;
        }
        verify_signature(&self.secp, tx, input, spk, &elements[0], &pubkey)
    }

    fn verify_p2pk(&self, tx: &Transaction, input: usize, spk: &Script, elements: &[Vec<u8>]) -> bool {
        let bytes = spk.as_bytes();
        let pubkey = match PublicKey::from_slice(&bytes[1..bytes.len() - 1]) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        elements.len() == 1 && verify_signature(&self.secp, tx, input, spk, &elements[0], &pubkey)
    }

    fn verify_p2sh(
        &self,
        tx: &Transaction,
        input: usize,
        spk: &Script,
        elements: &[Vec<u8>],
        enforce_p2sh: bool,
    ) -> WalletResult<bool> {
        let redeem_script = match elements.last() {
            Some(bytes) => ScriptBuf::from(bytes.clone()),
            None => return Ok(false),
        };
        if ScriptBuf::new_p2sh(&redeem_script.script_hash()).as_script() != spk {
            return Ok(false);
        }
        if !enforce_p2sh {
            return Ok(true);
        }

        let (required, pubkeys) = parse_multisig(&redeem_script)?;
        // Dummy element, then exactly `required` signatures, then the redeem script
        if elements.len() != required + 2 || !elements[0].is_empty() {
            return Ok(false);
        }

        // CHECKMULTISIG: signatures must match keys in the same relative order
        let mut key_iter = pubkeys.iter();
        for sig in &elements[1..elements.len() - 1] {
            let matched = key_iter
                .by_ref()
                .any(|pk| verify_signature(&self.secp, tx, input, &redeem_script, sig, pk));
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for StandardScriptVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptVerifier for StandardScriptVerifier {
    fn verify(&self, tx: &Transaction, input: usize, script_pubkey: &Script, enforce_p2sh: bool) -> WalletResult<bool> {
        let tx_in = tx.input.get(input).ok_or_else(|| {
            WalletError::InvalidArgument(format!("Input {} out of range ({} inputs)", input, tx.input.len()))
        })?;

        let template = ScriptTemplate::classify(script_pubkey)
            .ok_or_else(|| WalletError::Script("Unsupported locking script".to_string()))?;

        // Non-push input scripts never satisfy the standard templates
        let elements = match push_elements(&tx_in.script_sig) {
            Ok(elements) => elements,
            Err(_) => return Ok(false),
        };

        match template {
            ScriptTemplate::PayToPubkeyHash => Ok(self.verify_p2pkh(tx, input, script_pubkey, &elements)),
            ScriptTemplate::PayToPubkey => Ok(self.verify_p2pk(tx, input, script_pubkey, &elements)),
            ScriptTemplate::PayToScriptHash => self.verify_p2sh(tx, input, script_pubkey, &elements, enforce_p2sh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::WalletKey;
    use crate::signature::{EcdsaSignatureCalculator, SigHashMode, SignatureCalculator};
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::blockdata::script::{Builder, PushBytesBuf};
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::{OutPoint, Sequence, TxIn, TxOut, Txid, Witness};

    fn key(n: u8) -> WalletKey {
        WalletKey::from_secret(SecretKey::from_slice(&[n; 32]).unwrap())
    }

    fn unsigned_tx() -> Transaction {
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
                value: 5_000,
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[test]
    fn test_p2pkh_verification() {
        let k = key(1);
        let spk = ScriptBuf::new_p2pkh(&k.pubkey_hash());
        let mut tx = unsigned_tx();
        let verifier = StandardScriptVerifier::new();
        assert!(!verifier.verify(&tx, 0, &spk, true).unwrap());

        let sig = EcdsaSignatureCalculator::new()
            .calculate_signature(&tx, 0, &k, &spk, SigHashMode::All, false)
            .unwrap();
        tx.input[0].script_sig = Builder::new()
            .push_slice(PushBytesBuf::try_from(sig.to_vec()).unwrap())
            .push_key(k.public_key())
            .into_script();
        assert!(verifier.verify(&tx, 0, &spk, true).unwrap());

        // A signature from a different key is rejected
        let other = key(2);
        let spk_other = ScriptBuf::new_p2pkh(&other.pubkey_hash());
        assert!(!verifier.verify(&tx, 0, &spk_other, true).unwrap());
    }

    #[test]
    fn test_unsupported_script_is_an_error() {
        let verifier = StandardScriptVerifier::new();
        assert!(verifier.verify(&unsigned_tx(), 0, &ScriptBuf::from(vec![0x51]), true).is_err());
        assert!(verifier.verify(&unsigned_tx(), 3, &ScriptBuf::new(), true).is_err());
    }
}
