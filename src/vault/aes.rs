//! AES-256-GCM vault.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{Vault, VaultError};

const NONCE_LEN: usize = 12;

pub struct AesGcmVault {
    cipher: Aes256Gcm,
}

impl AesGcmVault {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, VaultError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| VaultError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self::new(key))
    }

    pub fn generate_key() -> [u8; 32] {
        rand::random()
    }
}

impl Vault for AesGcmVault {
    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let combined = STANDARD
            .decode(ciphertext)
            .map_err(|e| VaultError::Malformed(e.to_string()))?;
        if combined.len() <= NONCE_LEN {
            return Err(VaultError::Malformed("ciphertext too short".into()));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| VaultError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|e| VaultError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ciphertext_differs_per_call() {
        let vault = AesGcmVault::new(AesGcmVault::generate_key());
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), "same");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmVault::new(AesGcmVault::generate_key())
            .encrypt("secret")
            .unwrap();
        let other = AesGcmVault::new(AesGcmVault::generate_key());
        assert_eq!(other.decrypt(&sealed), Err(VaultError::Decrypt));
    }

    #[test]
    fn test_rejects_bad_input() {
        let vault = AesGcmVault::new(AesGcmVault::generate_key());
        assert!(matches!(vault.decrypt("not base64!!"), Err(VaultError::Malformed(_))));
        let short = STANDARD.encode(b"short");
        assert!(matches!(vault.decrypt(&short), Err(VaultError::Malformed(_))));
    }

    #[test]
    fn test_key_from_base64() {
        let encoded = STANDARD.encode([7u8; 32]);
        assert!(AesGcmVault::from_base64_key(&encoded).is_ok());
        assert!(matches!(
            AesGcmVault::from_base64_key(&STANDARD.encode([7u8; 16])),
            Err(VaultError::InvalidKey(_))
        ));
    }
}
