use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::errors::CoreError;

/// Domain separation salt for deriving the vault key from the process secret.
/// The key has to be reproducible across restarts, so the salt is fixed.
const VAULT_KEY_SALT: &[u8; 16] = b"portfolio-vault1";

const NONCE_LEN: usize = 12;

/// Argon2id parameters for turning the configured secret into a 256-bit key.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 19456 = 19 MiB)
    pub memory_cost: u32,
    /// Number of iterations (default: 2)
    pub time_cost: u32,
    /// Degree of parallelism (default: 1)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 19_456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Derive a 256-bit key from a secret using Argon2id.
pub fn derive_key(secret: &str, salt: &[u8; 16], params: &KdfParams) -> Result<[u8; 32], CoreError> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| CoreError::Encryption(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(secret.as_bytes(), salt, &mut key)
        .map_err(|e| CoreError::Encryption(format!("Argon2 key derivation failed: {e}")))?;

    Ok(key)
}

/// Generate cryptographically secure random bytes for a nonce.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], CoreError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| CoreError::Encryption(format!("Failed to generate random nonce: {e}")))?;
    Ok(nonce)
}

/// Symmetric encryption of stored source credentials (exchange API keys and secrets).
///
/// Ciphertexts are self-contained strings `hex(nonce):hex(ciphertext+tag)`.
/// Every call to [`CredentialVault::encrypt`] draws a fresh random nonce, so
/// encrypting the same plaintext twice yields different ciphertexts.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Build a vault keyed by the process-wide secret.
    pub fn new(secret: &str) -> Result<Self, CoreError> {
        Self::with_params(secret, &KdfParams::default())
    }

    pub fn with_params(secret: &str, params: &KdfParams) -> Result<Self, CoreError> {
        if secret.is_empty() {
            return Err(CoreError::Encryption("Vault secret must not be empty".into()));
        }
        let key = derive_key(secret, VAULT_KEY_SALT, params)?;
        Self::from_key(&key)
    }

    /// Build a vault from an already-derived 256-bit key.
    pub fn from_key(key: &[u8; 32]) -> Result<Self, CoreError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypt a credential. Failure here must abort saving the integration.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let nonce_bytes = generate_nonce()?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CoreError::Encryption(format!("Encryption failed: {e}")))?;

        Ok(format!("{}:{}", hex::encode(nonce_bytes), hex::encode(ciphertext)))
    }

    /// Decrypt a credential produced by [`CredentialVault::encrypt`].
    ///
    /// Any malformed input or authentication failure surfaces as
    /// `CoreError::Credential`, which the sync engine scopes to one integration.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CoreError> {
        let (nonce_hex, body_hex) = encoded
            .split_once(':')
            .ok_or_else(|| CoreError::Credential("ciphertext is missing the nonce separator".into()))?;

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|e| CoreError::Credential(format!("nonce is not valid hex: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CoreError::Credential(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let body = hex::decode(body_hex)
            .map_err(|e| CoreError::Credential(format!("ciphertext is not valid hex: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), body.as_ref())
            .map_err(|_| CoreError::Credential("authentication failed, wrong key or tampered ciphertext".into()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CoreError::Credential(format!("plaintext is not UTF-8: {e}")))
    }
}
