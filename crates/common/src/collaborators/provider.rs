use async_trait::async_trait;

use crate::crypto::PublicKey;
use crate::tree::ChangeRecord;

#[derive(thiserror::Error, Debug)]
pub enum BroadcastError {
    /// The transaction layer accepted the record but the chain
    ///  refused it
    #[error("broadcast rejected: {0}")]
    Rejected(String),
    #[error("unhandled broadcaster error: {0}")]
    Default(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    #[error("unhandled directory error: {0}")]
    Default(#[from] anyhow::Error),
}

/// What the transaction layer reports back for one broadcast record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub tx_hash: String,
    pub height: u64,
}

/// Signs and broadcasts change records
///
/// Records are opaque to the implementor's callers; only the transaction
///  layer knows how to turn one into a chain message.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sign and broadcast a single record
    ///
    /// # Returns
    /// * `Ok(BroadcastReceipt)` - The record was included
    /// * `Err(BroadcastError)` - Signing or broadcast failed; nothing is retried
    async fn broadcast(&self, record: &ChangeRecord) -> Result<BroadcastReceipt, BroadcastError>;
}

/// Resolves an account address to its registered public key
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    /// Look up the key registered for `address`
    ///
    /// # Returns
    /// * `Ok(Some(PublicKey))` - The address has registered a key
    /// * `Ok(None)` - The address has never registered a key
    /// * `Err(DirectoryError)` - The lookup itself failed
    async fn lookup(&self, address: &str) -> Result<Option<PublicKey>, DirectoryError>;
}
