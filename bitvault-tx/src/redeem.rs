//! Redeem data resolution
//!
//! Given the output an input spends and a key bag, work out which script the
//! signature commits to and which keys may sign it.
//!
//! | Locking script | Redeem script       | Keys                                  |
//! |----------------|---------------------|---------------------------------------|
//! | P2PKH          | the locking script  | the key for the embedded hash         |
//! | P2PK           | the locking script  | the embedded key                      |
//! | P2SH multisig  | stored in the bag   | every key of the redeem script, in order |
//!
//! For P2SH the redeem script must already be known to the wallet; it is
//! never recovered from the chain.

use bitcoin::blockdata::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, PublicKey, Script, ScriptBuf, ScriptHash};

use crate::error::{WalletError, WalletResult};
use crate::keys::{KeyBag, WalletKey};
use crate::types::SpendableOutput;

/// Largest key count a standard CHECKMULTISIG redeem script may use
pub const MAX_MULTISIG_KEYS: usize = 16;

/// Script and candidate keys needed to spend one output
///
/// Single-key scripts carry exactly one key. Multisig scripts carry every key
/// in redeem-script order; only the ones the wallet controls have private
/// material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemData {
    pub redeem_script: ScriptBuf,
    pub keys: Vec<WalletKey>,
}

impl RedeemData {
    pub fn single(key: WalletKey, redeem_script: ScriptBuf) -> Self {
        Self {
            redeem_script,
            keys: vec![key],
        }
    }

    pub fn multisig(keys: Vec<WalletKey>, redeem_script: ScriptBuf) -> Self {
        Self { redeem_script, keys }
    }

    /// First key with private material, locked or not
    pub fn full_key(&self) -> Option<&WalletKey> {
        self.keys.iter().find(|k| k.has_private_material())
    }

    /// Keys with private material together with their index in `keys`
    pub fn full_keys(&self) -> impl Iterator<Item = (usize, &WalletKey)> {
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.has_private_material())
    }

    /// Position of `pubkey` in the key list
    pub fn key_index(&self, pubkey: &PublicKey) -> Option<usize> {
        self.keys.iter().position(|k| k.public_key() == pubkey)
    }

    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|k| *k.public_key()).collect()
    }

    pub fn is_multisig(&self) -> bool {
        parse_multisig(&self.redeem_script).is_ok()
    }
}

/// Outcome of redeem data resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemLookup {
    /// The output is understood; keys may or may not carry private material
    Resolved(RedeemData),
    /// Recognized script, but the wallet holds no key (or redeem script) for it
    NoLocalKey,
    /// Locking script type this wallet cannot sign for
    Unrecognized,
}

/// Resolve the redeem data for the output an input spends
pub fn resolve_connected_redeem_data(output: &SpendableOutput, key_bag: &dyn KeyBag) -> RedeemLookup {
    let spk = &output.script_pubkey;

    if spk.is_p2pkh() {
        let hash = match PubkeyHash::from_slice(&spk.as_bytes()[3..23]) {
            Ok(hash) => hash,
            Err(_) => return RedeemLookup::Unrecognized,
        };
        return match key_bag.find_key_from_pubkey_hash(&hash) {
            Some(key) => RedeemLookup::Resolved(RedeemData::single(key, spk.clone())),
            None => RedeemLookup::NoLocalKey,
        };
    }

    if spk.is_p2pk() {
        let bytes = spk.as_bytes();
        let pubkey = match PublicKey::from_slice(&bytes[1..bytes.len() - 1]) {
            Ok(pk) => pk,
            Err(_) => return RedeemLookup::Unrecognized,
        };
        return match key_bag.find_key_from_pubkey(&pubkey) {
            Some(key) => RedeemLookup::Resolved(RedeemData::single(key, spk.clone())),
            None => RedeemLookup::NoLocalKey,
        };
    }

    if spk.is_p2sh() {
        let hash = match ScriptHash::from_slice(&spk.as_bytes()[2..22]) {
            Ok(hash) => hash,
            Err(_) => return RedeemLookup::Unrecognized,
        };
        let redeem_script = match key_bag.find_redeem_script(&hash) {
            Some(script) => script,
            None => return RedeemLookup::NoLocalKey,
        };
        let (_, pubkeys) = match parse_multisig(&redeem_script) {
            Ok(parsed) => parsed,
            Err(_) => return RedeemLookup::Unrecognized,
        };
        let keys = pubkeys
            .into_iter()
            .map(|pk| key_bag.find_key_from_pubkey(&pk).unwrap_or_else(|| WalletKey::watch_only(pk)))
            .collect();
        return RedeemLookup::Resolved(RedeemData::multisig(keys, redeem_script));
    }

    RedeemLookup::Unrecognized
}

/// Decode `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`
///
/// Returns the threshold and the keys in script order.
pub fn parse_multisig(script: &Script) -> WalletResult<(usize, Vec<PublicKey>)> {
    let instructions = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| WalletError::Script(format!("Malformed script: {}", e)))?;

    if instructions.len() < 4 {
        return Err(WalletError::Script("Not a multisig script".to_string()));
    }

    let last = instructions.len() - 1;
    let required = small_int(&instructions[0])?;
    let total = small_int(&instructions[last - 1])?;
    match &instructions[last] {
        Instruction::Op(op) if op.to_u8() == OP_CHECKMULTISIG.to_u8() => {}
        _ => return Err(WalletError::Script("Missing OP_CHECKMULTISIG".to_string())),
    }

    let mut keys = Vec::with_capacity(total);
    for instruction in &instructions[1..last - 1] {
        match instruction {
            Instruction::PushBytes(bytes) => {
                let key = PublicKey::from_slice(bytes.as_bytes())
                    .map_err(|e| WalletError::Script(format!("Invalid public key in redeem script: {}", e)))?;
                keys.push(key);
            }
            Instruction::Op(_) => return Err(WalletError::Script("Unexpected opcode in key list".to_string())),
        }
    }

    if keys.len() != total || required == 0 || required > total {
        return Err(WalletError::Script(format!(
            "Inconsistent multisig script: {}-of-{} with {} keys",
            required,
            total,
            keys.len()
        )));
    }

    Ok((required, keys))
}

/// Build a standard `required`-of-`keys.len()` multisig redeem script
pub fn create_multisig_redeem_script(required: usize, keys: &[PublicKey]) -> WalletResult<ScriptBuf> {
    if required == 0 || required > keys.len() || keys.len() > MAX_MULTISIG_KEYS {
        return Err(WalletError::InvalidArgument(format!(
            "Invalid multisig threshold {}-of-{}",
            required,
            keys.len()
        )));
    }

    let mut builder = Builder::new().push_int(required as i64);
    for key in keys {
        builder = builder.push_key(key);
    }
    Ok(builder
        .push_int(keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

fn small_int(instruction: &Instruction<'_>) -> WalletResult<usize> {
    match instruction {
        Instruction::Op(op) => {
            let code = op.to_u8();
            if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&code) {
                Ok((code - OP_PUSHNUM_1.to_u8() + 1) as usize)
            } else {
                Err(WalletError::Script(format!("Expected a small integer, found opcode {:#04x}", code)))
            }
        }
        Instruction::PushBytes(_) => Err(WalletError::Script("Expected a small integer".to_string())),
    }
}
