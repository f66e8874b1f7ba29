//! Key lookup capability and key material handling
//!
//! The signing code never owns a wallet's keys. It asks a [`KeyBag`] for the
//! key matching a public key, a public key hash or a script hash, and gets
//! back a [`WalletKey`] that may or may not carry private material.
//!
//! Private material comes in three forms ([`KeySecret`]):
//! - absent (watch-only key, or a cosigner's key)
//! - plain
//! - encrypted with a password-derived AES-256-GCM key ([`KeyCrypter`])
//!
//! An encrypted key is "present but locked". Signing with it fails with
//! [`WalletError::KeyEncrypted`] and the caller is expected to unlock (wrap
//! the bag in a [`DecryptingKeyBag`]) and retry.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use bitcoin::bip32::{DerivationPath, ExtendedPrivKey};
use bitcoin::secp256k1::{self, Secp256k1, SecretKey};
use bitcoin::{PubkeyHash, PublicKey, ScriptBuf, ScriptHash};
use hmac::Hmac;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{WalletError, WalletResult};
use crate::logging::{log_params, log_security, sanitize_for_logging, LogLevel};

/// Size of the AES-256 key in bytes
pub const AES_KEY_SIZE: usize = 32;
/// Size of the PBKDF2 salt in bytes
pub const SALT_SIZE: usize = 16;
/// Size of the AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Default PBKDF2 iteration count
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// A private key sealed with a [`KeyCrypter`]
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Private material attached to a wallet key
#[derive(Clone, PartialEq, Eq)]
pub enum KeySecret {
    None,
    Plain(SecretKey),
    Encrypted(EncryptedSecret),
}

impl fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySecret::None => f.write_str("None"),
            KeySecret::Plain(_) => f.write_str("Plain(<redacted>)"),
            KeySecret::Encrypted(e) => write!(f, "Encrypted({:?})", e),
        }
    }
}

/// A key known to the wallet
///
/// Every key answers [`WalletKey::derivation_path`]; keys derived from an
/// extended key return their path, imported keys return `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletKey {
    public_key: PublicKey,
    secret: KeySecret,
    path: Option<DerivationPath>,
}

impl WalletKey {
    /// Key with plain private material
    pub fn from_secret(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::new(secp256k1::PublicKey::from_secret_key(&secp, &secret_key));
        Self {
            public_key,
            secret: KeySecret::Plain(secret_key),
            path: None,
        }
    }

    /// Public-only key (a cosigner's key, or a watch-only wallet)
    pub fn watch_only(public_key: PublicKey) -> Self {
        Self {
            public_key,
            secret: KeySecret::None,
            path: None,
        }
    }

    /// Derive the key at `path` below `xpriv` and remember the path
    pub fn from_xpriv(xpriv: &ExtendedPrivKey, path: &DerivationPath) -> WalletResult<Self> {
        let secp = Secp256k1::new();
        let child = xpriv.derive_priv(&secp, path)?;
        Ok(Self::from_secret(child.private_key).with_derivation_path(path.clone()))
    }

    /// Attach a hierarchical derivation path
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.public_key.pubkey_hash()
    }

    /// Derivation path of a hierarchical key, `None` for imported keys
    pub fn derivation_path(&self) -> Option<&DerivationPath> {
        self.path.as_ref()
    }

    pub fn secret(&self) -> &KeySecret {
        &self.secret
    }

    /// Whether the key carries private material, locked or not
    pub fn has_private_material(&self) -> bool {
        !matches!(self.secret, KeySecret::None)
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.secret, KeySecret::Encrypted(_))
    }

    /// The usable secret key for signing input `input`
    ///
    /// Fails with `MissingKey` for public-only keys and `KeyEncrypted` for
    /// locked keys.
    pub fn signing_key(&self, input: usize) -> WalletResult<&SecretKey> {
        match &self.secret {
            KeySecret::Plain(sk) => Ok(sk),
            KeySecret::Encrypted(_) => Err(WalletError::KeyEncrypted { input }),
            KeySecret::None => Err(WalletError::MissingKey { input }),
        }
    }

    /// Seal the private material; keys without plain material are returned as is
    pub fn encrypt(&self, crypter: &KeyCrypter) -> WalletResult<Self> {
        let mut key = self.clone();
        if let KeySecret::Plain(sk) = &self.secret {
            key.secret = KeySecret::Encrypted(crypter.encrypt(&sk.secret_bytes())?);
        }
        Ok(key)
    }

    /// Unseal the private material; keys without encrypted material are returned as is
    pub fn decrypt(&self, crypter: &KeyCrypter) -> WalletResult<Self> {
        let mut key = self.clone();
        if let KeySecret::Encrypted(sealed) = &self.secret {
            let plain = crypter.decrypt(sealed)?;
            let sk = SecretKey::from_slice(&plain)
                .map_err(|e| WalletError::Crypto(format!("Decrypted key is invalid: {}", e)))?;

            let secp = Secp256k1::signing_only();
            if secp256k1::PublicKey::from_secret_key(&secp, &sk) != self.public_key.inner {
                return Err(WalletError::Crypto(
                    "Decrypted key does not match its public key".to_string(),
                ));
            }
            key.secret = KeySecret::Plain(sk);
        }
        Ok(key)
    }
}

/// Password-derived AES-256-GCM key for sealing private keys
pub struct KeyCrypter {
    key: Zeroizing<[u8; AES_KEY_SIZE]>,
    salt: [u8; SALT_SIZE],
}

impl fmt::Debug for KeyCrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCrypter")
            .field("salt", &hex::encode(self.salt))
            .finish_non_exhaustive()
    }
}

impl KeyCrypter {
    /// Derive the encryption key from `password` with PBKDF2-HMAC-SHA256
    pub fn from_password(password: &str, salt: &[u8], iterations: u32) -> WalletResult<Self> {
        if salt.len() != SALT_SIZE {
            return Err(WalletError::InvalidArgument(format!(
                "Salt must be {} bytes, got {}",
                SALT_SIZE,
                salt.len()
            )));
        }
        if iterations == 0 {
            return Err(WalletError::InvalidArgument(
                "PBKDF2 iterations must be greater than 0".to_string(),
            ));
        }

        let mut key = Zeroizing::new([0u8; AES_KEY_SIZE]);
        pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut key[..])
            .map_err(|e| WalletError::Crypto(format!("Key derivation failed: {:?}", e)))?;

        let mut salt_bytes = [0u8; SALT_SIZE];
        salt_bytes.copy_from_slice(salt);

        Ok(Self {
            key,
            salt: salt_bytes,
        })
    }

    /// Seal `plaintext` under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> WalletResult<EncryptedSecret> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]));

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| WalletError::Crypto(format!("Nonce generation failed: {:?}", e)))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| WalletError::Crypto(format!("AES-GCM encryption failed: {:?}", e)))?;

        Ok(EncryptedSecret { nonce, ciphertext })
    }

    /// Open a sealed secret; fails on a wrong password or tampered ciphertext
    pub fn decrypt(&self, sealed: &EncryptedSecret) -> WalletResult<Zeroizing<Vec<u8>>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]));
        cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| WalletError::Crypto("AES-GCM decryption failed".to_string()))
    }
}

/// Key lookup capability
///
/// Read-only from the signing code's point of view. Lookups return owned
/// copies so wrappers can hand out transformed keys.
pub trait KeyBag {
    /// Key whose public key hashes to `hash`
    fn find_key_from_pubkey_hash(&self, hash: &PubkeyHash) -> Option<WalletKey>;

    /// Key with public key `pubkey`
    fn find_key_from_pubkey(&self, pubkey: &PublicKey) -> Option<WalletKey>;

    /// Redeem script hashing to `hash`, if the wallet knows it
    fn find_redeem_script(&self, hash: &ScriptHash) -> Option<ScriptBuf>;
}

/// In-memory key bag
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyBag {
    keys: HashMap<PubkeyHash, WalletKey>,
    redeem_scripts: HashMap<ScriptHash, ScriptBuf>,
}

impl MemoryKeyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, replacing any key with the same public key
    pub fn add_key(&mut self, key: WalletKey) {
        self.keys.insert(key.pubkey_hash(), key);
    }

    /// Register a redeem script and return its hash
    pub fn add_redeem_script(&mut self, script: ScriptBuf) -> ScriptHash {
        let hash = script.script_hash();
        self.redeem_scripts.insert(hash, script);
        hash
    }

    /// Seal every plain key with `crypter`
    pub fn encrypt_all(&mut self, crypter: &KeyCrypter) -> WalletResult<()> {
        for key in self.keys.values_mut() {
            *key = key.encrypt(crypter)?;
        }
        log_security(
            LogLevel::Info,
            "Encrypted key bag",
            Some(log_params(vec![("keys", self.keys.len().to_string())])),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyBag for MemoryKeyBag {
    fn find_key_from_pubkey_hash(&self, hash: &PubkeyHash) -> Option<WalletKey> {
        self.keys.get(hash).cloned()
    }

    fn find_key_from_pubkey(&self, pubkey: &PublicKey) -> Option<WalletKey> {
        self.keys
            .get(&pubkey.pubkey_hash())
            .filter(|k| k.public_key() == pubkey)
            .cloned()
    }

    fn find_redeem_script(&self, hash: &ScriptHash) -> Option<ScriptBuf> {
        self.redeem_scripts.get(hash).cloned()
    }
}

/// Key bag view that unlocks encrypted keys on lookup
///
/// A key that fails to decrypt is handed out still locked, so signing it
/// reports `KeyEncrypted` rather than silently skipping.
pub struct DecryptingKeyBag<'a> {
    inner: &'a dyn KeyBag,
    crypter: &'a KeyCrypter,
}

impl<'a> DecryptingKeyBag<'a> {
    pub fn new(inner: &'a dyn KeyBag, crypter: &'a KeyCrypter) -> Self {
        Self { inner, crypter }
    }

    fn unlock(&self, key: WalletKey) -> WalletKey {
        if !key.is_encrypted() {
            return key;
        }
        match key.decrypt(self.crypter) {
            Ok(plain) => plain,
            Err(e) => {
                log_security(
                    LogLevel::Warn,
                    "Could not unlock key",
                    Some(log_params(vec![
                        ("pubkey", sanitize_for_logging(&key.public_key().to_string())),
                        ("error", e.to_string()),
                    ])),
                );
                key
            }
        }
    }
}

impl KeyBag for DecryptingKeyBag<'_> {
    fn find_key_from_pubkey_hash(&self, hash: &PubkeyHash) -> Option<WalletKey> {
        self.inner.find_key_from_pubkey_hash(hash).map(|k| self.unlock(k))
    }

    fn find_key_from_pubkey(&self, pubkey: &PublicKey) -> Option<WalletKey> {
        self.inner.find_key_from_pubkey(pubkey).map(|k| self.unlock(k))
    }

    fn find_redeem_script(&self, hash: &ScriptHash) -> Option<ScriptBuf> {
        self.inner.find_redeem_script(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const TEST_ITERATIONS: u32 = 10;

    fn secret(n: u8) -> SecretKey {
        SecretKey::from_slice(&[n; 32]).unwrap()
    }

    fn crypter(password: &str) -> KeyCrypter {
        KeyCrypter::from_password(password, &[42u8; SALT_SIZE], TEST_ITERATIONS).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_key() {
        let key = WalletKey::from_secret(secret(1));
        let crypter = crypter("correct horse");

        let locked = key.encrypt(&crypter).unwrap();
        assert!(locked.is_encrypted());
        assert!(locked.has_private_material());
        assert!(matches!(locked.signing_key(4), Err(WalletError::KeyEncrypted { input: 4 })));

        let unlocked = locked.decrypt(&crypter).unwrap();
        assert_eq!(unlocked, key);
    }

    #[test]
    fn test_wrong_password_fails() {
        let locked = WalletKey::from_secret(secret(2)).encrypt(&crypter("right")).unwrap();
        assert!(matches!(locked.decrypt(&crypter("wrong")), Err(WalletError::Crypto(_))));
    }

    #[test]
    fn test_watch_only_key_is_missing() {
        let pk = *WalletKey::from_secret(secret(3)).public_key();
        let key = WalletKey::watch_only(pk);
        assert!(!key.has_private_material());
        assert!(matches!(key.signing_key(0), Err(WalletError::MissingKey { input: 0 })));
    }

    #[test]
    fn test_derivation_path_capability() {
        let imported = WalletKey::from_secret(secret(4));
        assert!(imported.derivation_path().is_none());

        let xpriv = ExtendedPrivKey::new_master(bitcoin::Network::Testnet, &[7u8; 32]).unwrap();
        let path = DerivationPath::from_str("m/45/0/0/3").unwrap();
        let derived = WalletKey::from_xpriv(&xpriv, &path).unwrap();
        assert_eq!(derived.derivation_path(), Some(&path));
    }

    #[test]
    fn test_decrypting_bag_unlocks_on_lookup() {
        let key = WalletKey::from_secret(secret(5));
        let crypter = crypter("pw");
        let mut bag = MemoryKeyBag::new();
        bag.add_key(key.clone());
        bag.encrypt_all(&crypter).unwrap();

        let locked = bag.find_key_from_pubkey(key.public_key()).unwrap();
        assert!(locked.is_encrypted());

        let unlocking = DecryptingKeyBag::new(&bag, &crypter);
        let found = unlocking.find_key_from_pubkey_hash(&key.pubkey_hash()).unwrap();
        assert_eq!(found, key);
    }
}
