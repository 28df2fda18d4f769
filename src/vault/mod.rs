//! Credential vault.
//!
//! # Responsibilities
//! - Decrypt stored connector secrets on demand
//! - Encrypt secrets when they are seeded
//!
//! # Design Decisions
//! - The engine only ever sees plaintext inside `Credentials`, which never
//!   prints its values
//! - Stored format is `base64(nonce || ciphertext)` with a 12-byte nonce

mod aes;

use std::fmt;

use thiserror::Error;

use crate::model::UserSecret;

pub use aes::AesGcmVault;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("decryption failed")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,
}

/// Symmetric secret protection.
pub trait Vault: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError>;
}

/// Decrypted credentials, held only for the duration of one call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    /// Decrypt whichever parts of `secret` are present.
    pub fn unseal(vault: &dyn Vault, secret: &UserSecret) -> Result<Self, VaultError> {
        let api_key = secret
            .encrypted_api_key
            .as_deref()
            .map(|c| vault.decrypt(c))
            .transpose()?;
        let token = secret
            .encrypted_token
            .as_deref()
            .map(|c| vault.decrypt(c))
            .transpose()?;
        Ok(Self { api_key, token })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_credentials_debug_hides_values() {
        let creds = Credentials {
            api_key: Some("sk-live-123".into()),
            token: None,
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("sk-live-123"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn test_unseal_decrypts_present_parts() {
        let vault = AesGcmVault::new(AesGcmVault::generate_key());
        let secret = UserSecret {
            user_id: "u1".into(),
            connector_id: Uuid::new_v4(),
            encrypted_api_key: Some(vault.encrypt("key-1").unwrap()),
            encrypted_token: None,
            expires_at: None,
        };

        let creds = Credentials::unseal(&vault, &secret).unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("key-1"));
        assert!(creds.token.is_none());
    }
}
