//! Envelope encryption for authorization payloads.
//!
//! Each connection owns a long-lived X25519 key pair. The server encrypts a
//! payload with a fresh content key and wraps that key for the connection.
//!
//! ## Crypto primitives
//!
//! - **Key wrap**: ephemeral X25519 ECDH with the connection key → HKDF-SHA256 → ChaCha20-Poly1305
//! - **Payload**: ChaCha20-Poly1305 AEAD under the content key, 12-byte IV
//! - **Encoding**: standard base64 for `data`, `key` and `iv`

pub mod envelope;
pub mod error;
pub mod keypair;

pub use envelope::{IV_SIZE, SealedPayload, open, seal};
pub use error::CryptoError;
pub use keypair::{ConnectionKeyPair, fingerprint_of};
