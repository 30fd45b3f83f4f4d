//! Per-connection key pairs.
//!
//! The public half is handed to the provider when a connection is created;
//! the secret half unwraps the content key of every envelope for it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// An X25519 key pair bound to one connection.
#[derive(Clone)]
pub struct ConnectionKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for ConnectionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl ConnectionKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let secret = StaticSecret::from(arr);
        let public = PublicKey::from(&secret);
        arr.zeroize();
        Ok(Self { secret, public })
    }

    /// Reconstruct from a base64-encoded secret key.
    pub fn from_secret_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = STANDARD.decode(encoded.trim())?;
        let result = Self::from_secret_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Base64 of the secret key. Handle with care.
    pub fn secret_base64(&self) -> String {
        let mut bytes = self.secret.to_bytes();
        let encoded = STANDARD.encode(bytes);
        bytes.zeroize();
        encoded
    }

    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) const fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Colon-separated SHA-256 fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(self.public.as_bytes())
    }
}

/// Compute a colon-separated hex SHA-256 fingerprint of a public key.
pub fn fingerprint_of(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
