//! Input script templates and signature insertion
//!
//! An unsigned input carries a template with one `OP_0` placeholder per
//! missing signature. The layout depends on the locking script:
//!
//! | Template | Input script                          |
//! |----------|---------------------------------------|
//! | P2PKH    | `<sig> <pubkey>`                      |
//! | P2PK     | `<sig>`                               |
//! | P2SH     | `OP_0 <sig>... <redeemScript>`        |
//!
//! The leading `OP_0` of the P2SH form is the dummy element consumed by
//! CHECKMULTISIG and is never a signature slot.
//!
//! Signatures are kept compacted at the front of the signature region, in
//! the order of the keys that made them, with placeholders after them. A new
//! signature is inserted at its position and later signatures shift right;
//! once every slot is taken, inserting at a position overwrites it.
//! Nothing here checks that a signature is valid.

use bitcoin::blockdata::opcodes::all::OP_PUSHBYTES_0;
use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::{PublicKey, Script, ScriptBuf};

use crate::error::{WalletError, WalletResult};
use crate::redeem::parse_multisig;

/// Input script layout for a locking script type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    PayToPubkeyHash,
    PayToPubkey,
    PayToScriptHash,
}

impl ScriptTemplate {
    /// Template for spending `script_pubkey`, if it is a supported type
    pub fn classify(script_pubkey: &Script) -> Option<Self> {
        if script_pubkey.is_p2pkh() {
            Some(ScriptTemplate::PayToPubkeyHash)
        } else if script_pubkey.is_p2pk() {
            Some(ScriptTemplate::PayToPubkey)
        } else if script_pubkey.is_p2sh() {
            Some(ScriptTemplate::PayToScriptHash)
        } else {
            None
        }
    }

    /// Elements before the signature region
    fn prefix_len(&self) -> usize {
        match self {
            ScriptTemplate::PayToScriptHash => 1,
            _ => 0,
        }
    }

    /// Elements after the signature region
    fn suffix_len(&self) -> usize {
        match self {
            ScriptTemplate::PayToPubkey => 0,
            _ => 1,
        }
    }

    /// Input script with every signature slot empty
    ///
    /// `key` is the spending key for P2PKH; `redeem_script` must be a multisig
    /// script for P2SH.
    pub fn empty_input_script(&self, key: &PublicKey, redeem_script: &Script) -> WalletResult<ScriptBuf> {
        let script = match self {
            ScriptTemplate::PayToPubkeyHash => Builder::new()
                .push_opcode(OP_PUSHBYTES_0)
                .push_key(key)
                .into_script(),
            ScriptTemplate::PayToPubkey => Builder::new().push_opcode(OP_PUSHBYTES_0).into_script(),
            ScriptTemplate::PayToScriptHash => {
                let (required, _) = parse_multisig(redeem_script)?;
                let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
                for _ in 0..required {
                    builder = builder.push_opcode(OP_PUSHBYTES_0);
                }
                builder.push_slice(push_bytes(redeem_script.to_bytes())?).into_script()
            }
        };
        Ok(script)
    }

    /// Place `signature` at `position` of the signature region
    ///
    /// Every element outside the signature region is preserved byte for byte.
    pub fn insert_signature(&self, script_sig: &Script, signature: &[u8], position: usize) -> WalletResult<ScriptBuf> {
        if signature.is_empty() {
            return Err(WalletError::InvalidArgument("Signature must not be empty".to_string()));
        }

        let mut elements = push_elements(script_sig)?;
        let (start, end) = self.region(&elements)?;
        let slots = end - start;
        if position >= slots {
            return Err(WalletError::Script(format!(
                "Signature position {} out of range for {} slots",
                position, slots
            )));
        }

        let mut present: Vec<Vec<u8>> = elements[start..end]
            .iter()
            .filter(|e| !e.is_empty())
            .cloned()
            .collect();
        if present.len() < slots {
            present.insert(position.min(present.len()), signature.to_vec());
        } else {
            present[position] = signature.to_vec();
        }
        present.resize(slots, Vec::new());

        elements.splice(start..end, present);
        build_from_elements(&elements)
    }

    /// Signatures currently present, in slot order
    pub fn signatures(&self, script_sig: &Script) -> WalletResult<Vec<Vec<u8>>> {
        let elements = push_elements(script_sig)?;
        let (start, end) = self.region(&elements)?;
        Ok(elements[start..end].iter().filter(|e| !e.is_empty()).cloned().collect())
    }

    /// Number of signature slots in `script_sig`
    pub fn slot_count(&self, script_sig: &Script) -> WalletResult<usize> {
        let elements = push_elements(script_sig)?;
        let (start, end) = self.region(&elements)?;
        Ok(end - start)
    }

    fn region(&self, elements: &[Vec<u8>]) -> WalletResult<(usize, usize)> {
        let fixed = self.prefix_len() + self.suffix_len();
        if elements.len() <= fixed {
            return Err(WalletError::Script(format!(
                "Input script has {} elements, template {:?} needs more than {}",
                elements.len(),
                self,
                fixed
            )));
        }
        Ok((self.prefix_len(), elements.len() - self.suffix_len()))
    }
}

/// Split a push-only script into its data elements (`OP_0` becomes empty)
pub fn push_elements(script: &Script) -> WalletResult<Vec<Vec<u8>>> {
    script
        .instructions()
        .map(|instruction| match instruction {
            Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(op)) => Err(WalletError::Script(format!(
                "Input script is not push-only (opcode {:#04x})",
                op.to_u8()
            ))),
            Err(e) => Err(WalletError::Script(format!("Malformed input script: {}", e))),
        })
        .collect()
}

fn build_from_elements(elements: &[Vec<u8>]) -> WalletResult<ScriptBuf> {
    let mut builder = Builder::new();
    for element in elements {
        builder = if element.is_empty() {
            builder.push_opcode(OP_PUSHBYTES_0)
        } else {
            builder.push_slice(push_bytes(element.clone())?)
        };
    }
    Ok(builder.into_script())
}

fn push_bytes(bytes: Vec<u8>) -> WalletResult<PushBytesBuf> {
    PushBytesBuf::try_from(bytes).map_err(|e| WalletError::Script(format!("Push too large: {}", e)))
}
