//! Seam towards persistent secure storage

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tracing::debug;

use crate::commands::AttestCardKeyResponse;
use crate::types::CardId;
use crate::{Error, Result};

/// Key-value store of opaque blobs
pub trait SecureStorage: Send + Sync + fmt::Debug {
    /// Read a blob
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a blob
    fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Delete a blob
    fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let entries = self.entries.lock().map_err(|_| Error::Storage("lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Error::Storage("lock poisoned"))?;
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Error::Storage("lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Caches verified card attestations, keyed by card id
///
/// Lives outside any session; a session itself keeps nothing once closed.
#[derive(Debug, Clone)]
pub struct AttestationCache {
    storage: Arc<dyn SecureStorage>,
}

impl AttestationCache {
    /// Create a cache over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    fn key(card_id: &CardId) -> String {
        format!("attestation_{card_id}")
    }

    /// Card signature of a previous successful attestation, if cached
    pub fn get(&self, card_id: &CardId) -> Result<Option<Bytes>> {
        self.storage.get(&Self::key(card_id))
    }

    /// Remember a successful attestation
    pub fn store(&self, attestation: &AttestCardKeyResponse) -> Result<()> {
        debug!(card_id = %attestation.card_id, "Caching card attestation");
        self.storage
            .set(&Self::key(&attestation.card_id), attestation.card_signature.clone())
    }

    /// Forget the attestation of `card_id`
    pub fn invalidate(&self, card_id: &CardId) -> Result<()> {
        self.storage.delete(&Self::key(card_id))
    }
}
