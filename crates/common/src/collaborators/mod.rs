//! Contracts for the services the core depends on but does not implement
//!
//! - **[`Broadcaster`]**: signs and broadcasts a [`ChangeRecord`](crate::tree::ChangeRecord)
//! - **[`PublicKeyDirectory`]**: resolves an address to its registered [`PublicKey`](crate::crypto::PublicKey)
//!
//! Errors from either are passed back to callers unchanged. In-memory
//! implementations are provided for tests and local tooling.

mod memory;
mod provider;

pub use memory::{MemoryBroadcaster, MemoryDirectory};
pub use provider::{
    BroadcastError, BroadcastReceipt, Broadcaster, DirectoryError, PublicKeyDirectory,
};
