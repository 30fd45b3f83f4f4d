//! Envelope decryption.
//!
//! Undecryptable or malformed envelopes are dropped one by one; they never
//! abort the batch they arrived in.

use std::collections::HashMap;

use tracing::debug;

use sca_core::{AuthorizationData, ConsentData, EncryptedEnvelope};
use sca_crypto::ConnectionKeyPair;

/// Decrypt capability the engine calls into.
pub trait Decryptor: Send + Sync {
    /// Plaintext of `envelope`, or `None` when it cannot be decrypted.
    fn decrypt(&self, envelope: &EncryptedEnvelope) -> Option<Vec<u8>>;
}

/// Per-connection key pairs, keyed by connection id.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: HashMap<String, ConnectionKeyPair>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection_id: impl Into<String>, keypair: ConnectionKeyPair) {
        self.keys.insert(connection_id.into(), keypair);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Decryptor for Keyring {
    fn decrypt(&self, envelope: &EncryptedEnvelope) -> Option<Vec<u8>> {
        let connection_id = envelope.connection_id.as_deref()?;
        let Some(keypair) = self.keys.get(connection_id) else {
            debug!(connection_id, "No key for connection");
            return None;
        };
        sca_crypto::open(&envelope.data, &envelope.key, &envelope.iv, keypair)
            .map_err(|e| debug!(connection_id, error = %e, "Envelope decryption failed"))
            .ok()
    }
}

/// Decrypt and decode authorization envelopes, dropping failures.
pub fn decrypt_authorizations(
    decryptor: &dyn Decryptor,
    envelopes: &[EncryptedEnvelope],
) -> Vec<AuthorizationData> {
    envelopes
        .iter()
        .filter_map(|envelope| {
            let plaintext = decryptor.decrypt(envelope)?;
            AuthorizationData::decode(envelope, &plaintext)
                .map_err(|e| {
                    debug!(
                        entity_id = ?envelope.entity_id,
                        error = %e,
                        "Dropped undecodable authorization"
                    );
                })
                .ok()
        })
        .collect()
}

/// Decrypt and decode consent envelopes, dropping failures.
pub fn decrypt_consents(
    decryptor: &dyn Decryptor,
    envelopes: &[EncryptedEnvelope],
) -> Vec<ConsentData> {
    envelopes
        .iter()
        .filter_map(|envelope| {
            let plaintext = decryptor.decrypt(envelope)?;
            serde_json::from_slice(&plaintext)
                .map_err(|e| debug!(error = %e, "Dropped undecodable consent"))
                .ok()
        })
        .collect()
}
