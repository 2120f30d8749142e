//! The folder / file tree
//!
//! - **[`FolderNode`]**: one directory, its child dirs and child files
//! - **[`FileEntry`]**: a file's metadata, network name and grants
//! - **[`AccessGrants`]**: viewer and editor maps of wrapped keys
//! - **[`ChangeRecord`]**: what a mutation hands to the [`Broadcaster`](crate::collaborators::Broadcaster)
//!
//! # Addressing
//!
//! A node lives at `where_am_i/who_am_i`. Its record is stored at the merkle
//! path of that full path, and a child's address is the merkle path of
//! `where_am_i/who_am_i/child`:
//!
//! ```text
//! /home/alice/docs          -> merkle_path("/home/alice/docs")
//!   reports/                -> merkle_path("/home/alice/docs/reports")
//!   plan.md  (FileEntry)    -> stored under its hashed network name
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! new() --> Unsaved --sync--> Synced --mutation--> Dirty --sync--> Synced
//! load() -------------------> Synced
//! ```
//!
//! Mutations never talk to the network. Each returns a [`Staged`] set of
//! records and the node's [`SyncState`]; [`FolderNode::sync`] hands the
//! records to a broadcaster.

mod access;
mod context;
mod file;
mod folder;
mod record;
mod share;

pub use access::{AccessError, AccessGrants, AccessRole, GrantMap};
pub use context::TreeContext;
pub use file::FileEntry;
pub use folder::{AddedDirs, ChildDirInfo, FolderDetails, FolderNode, Staged, SyncState, TreeError};
pub use record::{ChangeRecord, FiletreeEntry};
pub use share::{grant_to, ShareRecord};
