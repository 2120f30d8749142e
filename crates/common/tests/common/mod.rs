//! Shared test utilities for tree and envelope integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::collaborators::{MemoryBroadcaster, MemoryDirectory};
use common::crypto::{EnvelopeCodec, EnvelopeConfig, Keyring};
use common::tree::{ChildDirInfo, FolderNode, TreeContext};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install a compact subscriber once; `RUST_LOG` overrides the default level
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A codec with a small chunk size so boundary cases stay cheap
pub fn small_codec(chunk_size: usize) -> EnvelopeCodec {
    EnvelopeCodec::new(EnvelopeConfig {
        chunk_size,
        ..Default::default()
    })
    .unwrap()
}

/// A fresh identity acting as `address`
pub fn actor(address: &str) -> TreeContext {
    TreeContext::new(
        address,
        Arc::new(Keyring::generate()),
        EnvelopeCodec::default(),
    )
}

/// Identities for `addresses`, all registered in one directory
pub fn registered(addresses: &[&str]) -> (Vec<TreeContext>, MemoryDirectory) {
    let directory = MemoryDirectory::new();
    let actors = addresses
        .iter()
        .map(|address| {
            let ctx = actor(address);
            directory.register(*address, ctx.public_key()).unwrap();
            ctx
        })
        .collect();
    (actors, directory)
}

/// The `docs` folder under `/home/alice`, owned by alice
pub fn alice_docs() -> FolderNode {
    FolderNode::new(ChildDirInfo {
        name: "docs".to_string(),
        parent: "/home/alice".to_string(),
        owner: "alice".to_string(),
    })
}

/// Set up alice with her docs folder, a directory and a broadcaster
pub fn setup_tree_env() -> (FolderNode, TreeContext, MemoryDirectory, MemoryBroadcaster) {
    init_tracing();
    let (mut actors, directory) = registered(&["alice"]);
    let alice = actors.remove(0);
    (alice_docs(), alice, directory, MemoryBroadcaster::new())
}
