//! AES-256-GCM sealing of channel credentials at rest.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use thiserror::Error;

const NONCE_SIZE: usize = 12; // AES-GCM standard nonce size

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Invalid hex key: {0}")]
    InvalidKeyHex(String),
    #[error("Encryption key must be 32 bytes (256 bits) long")]
    InvalidKeyLength,
    #[error("Ciphertext is too short to contain a nonce")]
    CiphertextTooShort,
    #[error("Encryption failed")]
    EncryptFailed,
    #[error("Decryption failed")]
    DecryptFailed,
}

/// Holds the cipher built from the configured hex key. Output layout is
/// `nonce || ciphertext`.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionService")
    }
}

impl EncryptionService {
    pub fn new(key_hex: &str) -> Result<Self, EncryptionError> {
        let key_bytes =
            hex::decode(key_hex.trim()).map_err(|e| EncryptionError::InvalidKeyHex(e.to_string()))?;
        if key_bytes.len() != 32 {
            return Err(EncryptionError::InvalidKeyLength);
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain)
            .map_err(|_| EncryptionError::EncryptFailed)?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if sealed.len() < NONCE_SIZE {
            return Err(EncryptionError::CiphertextTooShort);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| EncryptionError::DecryptFailed)
    }
}
