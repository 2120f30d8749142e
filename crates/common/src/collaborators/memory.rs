use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::provider::{
    BroadcastError, BroadcastReceipt, Broadcaster, DirectoryError, PublicKeyDirectory,
};
use crate::crypto::PublicKey;
use crate::hash::hash_bytes_and_hex;
use crate::tree::ChangeRecord;

/// In-memory public key directory
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<HashMap<String, PublicKey>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the key for an address
    pub fn register(
        &self,
        address: impl Into<String>,
        key: PublicKey,
    ) -> Result<(), DirectoryError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        inner.insert(address.into(), key);
        Ok(())
    }
}

#[async_trait]
impl PublicKeyDirectory for MemoryDirectory {
    async fn lookup(&self, address: &str) -> Result<Option<PublicKey>, DirectoryError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(inner.get(address).copied())
    }
}

/// In-memory broadcaster that records everything it is handed
///
/// Every accepted record gets the next height and a receipt hash
///  derived from the record's JSON.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroadcaster {
    inner: Arc<RwLock<MemoryBroadcasterInner>>,
}

#[derive(Debug, Default)]
struct MemoryBroadcasterInner {
    records: Vec<ChangeRecord>,
    reject_next: Option<String>,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records broadcast so far, in order
    pub fn records(&self) -> Result<Vec<ChangeRecord>, BroadcastError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(inner.records.clone())
    }

    /// Make the next broadcast fail with [`BroadcastError::Rejected`]
    pub fn reject_next(&self, reason: impl Into<String>) -> Result<(), BroadcastError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        inner.reject_next = Some(reason.into());
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for MemoryBroadcaster {
    async fn broadcast(&self, record: &ChangeRecord) -> Result<BroadcastReceipt, BroadcastError> {
        let encoded = record
            .to_json()
            .map_err(|e| anyhow::anyhow!("failed to encode record: {}", e))?;

        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;

        if let Some(reason) = inner.reject_next.take() {
            return Err(BroadcastError::Rejected(reason));
        }

        inner.records.push(record.clone());
        Ok(BroadcastReceipt {
            tx_hash: hash_bytes_and_hex(&encoded),
            height: inner.records.len() as u64,
        })
    }
}
