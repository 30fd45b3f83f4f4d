//! Envelope open/seal.
//!
//! `key` layout: `[32-byte ephemeral public key][12-byte wrap nonce][wrapped content key + tag]`.
//! `data` is the payload ciphertext (with tag) under the content key and `iv`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keypair::ConnectionKeyPair;

/// HKDF info string for key-wrapping key derivation.
const HKDF_INFO: &[u8] = b"sca-envelope-key-wrap-v1";

/// HKDF salt for domain separation.
const HKDF_SALT: &[u8] = b"sca-envelope-hkdf-salt-v1";

/// IV size for ChaCha20-Poly1305.
pub const IV_SIZE: usize = 12;

const CONTENT_KEY_SIZE: usize = 32;
const TAG_SIZE: usize = 16;
const WRAPPED_KEY_SIZE: usize = 32 + IV_SIZE + CONTENT_KEY_SIZE + TAG_SIZE;

/// Base64-encoded envelope fields, matching the wire `data`/`key`/`iv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub data: String,
    pub key: String,
    pub iv: String,
}

/// Derive the key-wrapping key from an X25519 shared secret.
///
/// The caller is responsible for zeroizing the returned bytes.
fn derive_wrap_key(shared_secret: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Encrypt `plaintext` for the holder of `recipient`'s secret key.
pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<SealedPayload, CryptoError> {
    let mut content_key = random_bytes::<CONTENT_KEY_SIZE>();
    let iv = random_bytes::<IV_SIZE>();
    let data = ChaCha20Poly1305::new(Key::from_slice(&content_key))
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let mut wrap_key = derive_wrap_key(ephemeral.diffie_hellman(recipient).as_bytes())?;
    let wrap_nonce = random_bytes::<IV_SIZE>();
    let wrapped = ChaCha20Poly1305::new(Key::from_slice(&wrap_key))
        .encrypt(Nonce::from_slice(&wrap_nonce), content_key.as_slice())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()));
    wrap_key.zeroize();
    content_key.zeroize();
    let wrapped = wrapped?;

    let mut key = Vec::with_capacity(WRAPPED_KEY_SIZE);
    key.extend_from_slice(ephemeral_public.as_bytes());
    key.extend_from_slice(&wrap_nonce);
    key.extend_from_slice(&wrapped);

    Ok(SealedPayload {
        data: STANDARD.encode(data),
        key: STANDARD.encode(key),
        iv: STANDARD.encode(iv),
    })
}

/// Decrypt an envelope addressed to `keypair`.
pub fn open(
    data: &str,
    key: &str,
    iv: &str,
    keypair: &ConnectionKeyPair,
) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = STANDARD.decode(data)?;
    let wrapped = STANDARD.decode(key)?;
    let iv = STANDARD.decode(iv)?;

    if wrapped.len() != WRAPPED_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: WRAPPED_KEY_SIZE,
            actual: wrapped.len(),
        });
    }
    if iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidIvLength {
            expected: IV_SIZE,
            actual: iv.len(),
        });
    }

    let (ephemeral_bytes, rest) = wrapped.split_at(32);
    let (wrap_nonce, wrapped_key) = rest.split_at(IV_SIZE);
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral = PublicKey::from(ephemeral);

    let mut wrap_key = derive_wrap_key(keypair.secret().diffie_hellman(&ephemeral).as_bytes())?;
    let content_key = ChaCha20Poly1305::new(Key::from_slice(&wrap_key))
        .decrypt(Nonce::from_slice(wrap_nonce), wrapped_key)
        .map_err(|e| CryptoError::DecryptionFailed(format!("key unwrap: {e}")));
    wrap_key.zeroize();
    let mut content_key = content_key?;

    let plaintext = ChaCha20Poly1305::new(Key::from_slice(&content_key))
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()));
    content_key.zeroize();
    plaintext
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let kp = ConnectionKeyPair::generate();
        let sealed = seal(b"{\"id\":\"1\"}", kp.public_key()).unwrap();
        let plain = open(&sealed.data, &sealed.key, &sealed.iv, &kp).unwrap();
        assert_eq!(plain, b"{\"id\":\"1\"}");
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let kp = ConnectionKeyPair::generate();
        let other = ConnectionKeyPair::generate();
        let sealed = seal(b"secret", kp.public_key()).unwrap();
        let err = open(&sealed.data, &sealed.key, &sealed.iv, &other).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed(_)));
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let kp = ConnectionKeyPair::generate();
        let sealed = seal(b"secret payload", kp.public_key()).unwrap();
        let mut raw = STANDARD.decode(&sealed.data).unwrap();
        raw[0] ^= 0xff;
        let tampered = STANDARD.encode(raw);
        assert!(open(&tampered, &sealed.key, &sealed.iv, &kp).is_err());
    }

    #[test]
    fn short_iv_rejected() {
        let kp = ConnectionKeyPair::generate();
        let sealed = seal(b"x", kp.public_key()).unwrap();
        let err = open(&sealed.data, &sealed.key, &STANDARD.encode([0u8; 8]), &kp).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidIvLength {
                expected: IV_SIZE,
                actual: 8
            }
        ));
    }

    #[test]
    fn invalid_base64_rejected() {
        let kp = ConnectionKeyPair::generate();
        let sealed = seal(b"x", kp.public_key()).unwrap();
        assert!(matches!(
            open("not base64!!", &sealed.key, &sealed.iv, &kp),
            Err(CryptoError::Encoding(_))
        ));
    }

    #[test]
    fn each_seal_uses_fresh_keys() {
        let kp = ConnectionKeyPair::generate();
        let a = seal(b"same", kp.public_key()).unwrap();
        let b = seal(b"same", kp.public_key()).unwrap();
        assert_ne!(a.key, b.key);
        assert_ne!(a.iv, b.iv);
    }
}
