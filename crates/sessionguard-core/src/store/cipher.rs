//! Authenticated encryption of the persisted session.
//!
//! Envelope layout: `MAGIC (4) | salt (16) | nonce (24) | ciphertext`.
//! The key is derived with Argon2id from the device secret and the salt.

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;

use super::StorageError;

const MAGIC: &[u8; 4] = b"SGv1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

pub struct SessionCipher {
    secret: String,
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

impl SessionCipher {
    /// Create a cipher with a fresh random salt. Key derivation runs once here.
    pub fn new(secret: impl Into<String>) -> Result<Self, StorageError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(StorageError::Encryption("device secret is empty".to_string()));
        }
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(&secret, &salt)?;
        Ok(Self { secret, salt, key })
    }

    /// Encrypt `plaintext` into a self-describing envelope
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = aead(&self.key)?
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| StorageError::Encryption("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt an envelope produced by `seal`, possibly under another salt
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, StorageError> {
        if envelope.len() < HEADER_LEN || &envelope[..MAGIC.len()] != MAGIC {
            return Err(StorageError::Encryption("unrecognized session envelope".to_string()));
        }
        let salt = &envelope[MAGIC.len()..MAGIC.len() + SALT_LEN];
        let nonce = &envelope[MAGIC.len() + SALT_LEN..HEADER_LEN];
        let ciphertext = &envelope[HEADER_LEN..];

        let key = if salt == self.salt {
            self.key
        } else {
            derive_key(&self.secret, salt)?
        };

        aead(&key)?
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Encryption("session data failed authentication".to_string()))
    }
}

fn derive_key(secret: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], StorageError> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), salt, &mut key)
        .map_err(|e| StorageError::Encryption(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn aead(key: &[u8; KEY_LEN]) -> Result<XChaCha20Poly1305, StorageError> {
    XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| StorageError::Encryption(format!("invalid key: {}", e)))
}
