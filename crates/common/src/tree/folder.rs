use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::{BroadcastError, BroadcastReceipt, Broadcaster, PublicKeyDirectory};
use crate::crypto::{
    CipherError, CipherMode, EncodedFile, EnvelopeError, PlainFile, SignatureError, WrapError,
    WrappedKey,
};
use crate::hash::{access_key, hash_and_hex, hash_owner, merkle_path};

use super::access::{AccessError, AccessRole, GrantMap};
use super::context::TreeContext;
use super::file::FileEntry;
use super::record::{ChangeRecord, FiletreeEntry};
use super::share::{grant_to, ShareRecord};

/**
 * Folder nodes
 * ============
 * A folder node is one directory of a user's tree, loaded on its own.
 *  It knows its own name, the path of its parent and its owner, the
 *  names of its child directories and the entries of its child files.
 *  Child directories are separate nodes at their own merkle addresses;
 *  this node only keeps their names.
 * Mutations happen in memory. Each one hands back the change records
 *  that bring the network up to date, along with the node's sync state.
 */

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("unhandled tree error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("{0} holds no grant on this node")]
    NoAccess(String),
    #[error("record signature is invalid: {0}")]
    Signature(#[from] SignatureError),
    #[error("record was signed by {0:?}, not the loading key")]
    UntrustedSigner(crate::crypto::PublicKey),
    #[error("record does not match its contents: {field} expected {expected}, found {found}")]
    RecordMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("wrap error: {0}")]
    Wrap(#[from] WrapError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
}

/// Where a node stands relative to what was last broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Built locally, never broadcast
    Unsaved,
    /// Mutated since it was last broadcast
    Dirty,
    /// Matches the last broadcast record
    Synced,
}

/// What a mutation produced: the records to broadcast, in order, and
///  the node's state until they are
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    pub records: Vec<ChangeRecord>,
    pub state: SyncState,
}

/// The result of [`FolderNode::add_child_dirs`]
#[derive(Debug, Clone)]
pub struct AddedDirs {
    pub staged: Staged,
    /// Requested names that were already children
    pub existing: Vec<String>,
    /// The newly created child nodes, in request order
    pub children: Vec<FolderNode>,
}

/// Identity of a directory node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDirInfo {
    pub name: String,
    pub parent: String,
    pub owner: String,
}

/// The part of a node that travels encrypted in its record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDetails {
    who_am_i: String,
    where_am_i: String,
    who_owns_me: String,
    #[serde(default)]
    dir_children: Vec<String>,
    #[serde(default)]
    file_children: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone)]
pub struct FolderNode {
    details: FolderDetails,
    tracking_number: Uuid,
    state: SyncState,
}

impl FolderNode {
    /// A fresh, empty node that has never been broadcast
    pub fn new(info: ChildDirInfo) -> Self {
        Self {
            details: FolderDetails {
                who_am_i: info.name,
                where_am_i: info.parent,
                who_owns_me: info.owner,
                dir_children: Vec::new(),
                file_children: BTreeMap::new(),
            },
            tracking_number: Uuid::new_v4(),
            state: SyncState::Unsaved,
        }
    }

    /// Rebuild a node from its published record
    ///
    /// The record's signature must verify, the acting address must hold a
    ///  grant on it and it must have been signed by the acting key. The
    ///  decrypted details are checked against the record's hashed identity.
    pub fn load(record: &FiletreeEntry, ctx: &TreeContext) -> Result<Self, TreeError> {
        record.verify().inspect_err(|_| {
            tracing::warn!("rejecting record {} with a bad signature", record.address());
        })?;

        let identity = access_key(&record.tracking_number, ctx.address());
        let wrapped = record
            .editors
            .get(&identity)
            .or_else(|| record.viewers.get(&identity))
            .ok_or_else(|| TreeError::NoAccess(ctx.address().to_string()))?;
        if record.signer != ctx.public_key() {
            return Err(TreeError::UntrustedSigner(record.signer));
        }

        let material = wrapped.unwrap(ctx.cipher())?;
        let json = ctx
            .codec()
            .crypt_text(&record.contents, &material, CipherMode::Decrypt)?;
        let mut details: FolderDetails = serde_json::from_str(&json)?;

        check_field("hash_child", &record.hash_child, hash_and_hex(&details.who_am_i))?;
        check_field(
            "hash_parent",
            &record.hash_parent,
            merkle_path(&details.where_am_i),
        )?;
        check_field(
            "account",
            &record.account,
            hash_and_hex(&details.who_owns_me),
        )?;
        check_field(
            "owner",
            &record.owner,
            hash_owner(&record.address(), &details.who_owns_me),
        )?;

        let mut seen = BTreeSet::new();
        details.dir_children.retain(|name| seen.insert(name.clone()));

        tracing::debug!(
            "loaded {}/{} with {} dirs and {} files",
            details.where_am_i,
            details.who_am_i,
            details.dir_children.len(),
            details.file_children.len()
        );

        Ok(Self {
            details,
            tracking_number: record.tracking_number,
            state: SyncState::Synced,
        })
    }

    pub fn who_am_i(&self) -> &str {
        &self.details.who_am_i
    }

    pub fn where_am_i(&self) -> &str {
        &self.details.where_am_i
    }

    pub fn who_owns_me(&self) -> &str {
        &self.details.who_owns_me
    }

    pub fn dir_children(&self) -> &[String] {
        &self.details.dir_children
    }

    pub fn file_children(&self) -> &BTreeMap<String, FileEntry> {
        &self.details.file_children
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.details.file_children.get(name)
    }

    pub fn tracking_number(&self) -> &Uuid {
        &self.tracking_number
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn details(&self) -> &FolderDetails {
        &self.details
    }

    /// Full path of this node: `where_am_i/who_am_i`
    pub fn my_path(&self) -> String {
        format!("{}/{}", self.details.where_am_i, self.details.who_am_i)
    }

    pub fn my_child_path(&self, child: &str) -> String {
        format!("{}/{}", self.my_path(), child)
    }

    /// The network address of a child of this node
    pub fn child_merkle_path(&self, child: &str) -> String {
        merkle_path(&self.my_child_path(child))
    }

    /// Identity for a child directory of this node
    pub fn child_dir_info(&self, name: impl Into<String>) -> ChildDirInfo {
        ChildDirInfo {
            name: name.into(),
            parent: self.my_path(),
            owner: self.details.who_owns_me.clone(),
        }
    }

    /// Derive this node's chain-ready record
    ///
    /// The details are encrypted under fresh key material, which is wrapped
    ///  for the acting address and granted under this node's tracking
    ///  number. The record is signed by the acting key.
    pub fn to_record(&self, ctx: &TreeContext) -> Result<FiletreeEntry, TreeError> {
        let codec = ctx.codec();
        let material = codec.generate_material()?;
        let json = serde_json::to_string(&self.details)?;
        let contents = codec.crypt_text(&json, &material, CipherMode::Encrypt)?;

        let wrapped = WrappedKey::wrap(&material, &ctx.public_key(), ctx.cipher())?;
        let mut editors = GrantMap::new();
        editors.insert(access_key(&self.tracking_number, ctx.address()), wrapped);

        let mut record = FiletreeEntry {
            account: hash_and_hex(&self.details.who_owns_me),
            owner: hash_owner(&merkle_path(&self.my_path()), &self.details.who_owns_me),
            hash_parent: merkle_path(&self.details.where_am_i),
            hash_child: hash_and_hex(&self.details.who_am_i),
            contents,
            viewers: GrantMap::new(),
            editors,
            tracking_number: self.tracking_number,
            signer: ctx.public_key(),
            signature: String::new(),
        };
        record.sign(ctx.cipher());
        Ok(record)
    }

    fn touch(&mut self) {
        if self.state == SyncState::Synced {
            self.state = SyncState::Dirty;
        }
    }

    fn stage(
        &self,
        mut records: Vec<ChangeRecord>,
        ctx: &TreeContext,
    ) -> Result<Staged, TreeError> {
        records.push(ChangeRecord::PostFile(self.to_record(ctx)?));
        Ok(Staged {
            records,
            state: self.state,
        })
    }

    /// Add child directories by name
    ///
    /// Names that are already children are reported back in `existing`.
    ///  Every new name gets a fresh child node and a record of its own. This
    ///  node's record is appended last, and only if something was new.
    pub fn add_child_dirs<S: AsRef<str>>(
        &mut self,
        names: &[S],
        ctx: &TreeContext,
    ) -> Result<AddedDirs, TreeError> {
        let mut existing = Vec::new();
        let mut fresh: Vec<String> = Vec::new();
        for name in names.iter().map(AsRef::as_ref) {
            if self.details.dir_children.iter().any(|d| d == name) {
                if !existing.iter().any(|e| e == name) {
                    existing.push(name.to_string());
                }
            } else if !fresh.iter().any(|f| f == name) {
                fresh.push(name.to_string());
            }
        }

        let mut records = Vec::with_capacity(fresh.len() + 1);
        let mut children = Vec::with_capacity(fresh.len());
        for name in &fresh {
            let child = FolderNode::new(self.child_dir_info(name.clone()));
            records.push(ChangeRecord::PostFile(child.to_record(ctx)?));
            children.push(child);
        }

        if fresh.is_empty() {
            tracing::debug!("{}: no new dirs, {} existing", self.my_path(), existing.len());
            return Ok(AddedDirs {
                staged: Staged {
                    records,
                    state: self.state,
                },
                existing,
                children,
            });
        }

        tracing::debug!("{}: adding dirs {:?}", self.my_path(), fresh);
        self.details.dir_children.extend(fresh);
        self.touch();

        Ok(AddedDirs {
            staged: self.stage(records, ctx)?,
            existing,
            children,
        })
    }

    /// Merge file entries into this node; an entry replaces any existing
    ///  one with the same name
    pub fn add_child_file_references(
        &mut self,
        files: BTreeMap<String, FileEntry>,
        ctx: &TreeContext,
    ) -> Result<Staged, TreeError> {
        tracing::debug!("{}: adding {} file refs", self.my_path(), files.len());
        self.details.file_children.extend(files);
        self.touch();
        self.stage(Vec::new(), ctx)
    }

    /// Encrypt a file, add its entry to this node and give the acting
    ///  address editor access
    ///
    /// The returned envelope is what the caller uploads under
    ///  [`EncodedFile::name`].
    pub fn add_file(
        &mut self,
        file: &PlainFile,
        ctx: &TreeContext,
    ) -> Result<(Staged, EncodedFile), TreeError> {
        let codec = ctx.codec();
        let material = codec.generate_material()?;
        let encoded = codec.encode_file(file, &material)?;

        let mut meta = file.meta.clone();
        meta.size = file.content.len() as u64;
        let entry = FileEntry::sealed(&encoded, meta, &material, ctx)?;

        let files = BTreeMap::from([(file.meta.name.clone(), entry)]);
        let staged = self.add_child_file_references(files, ctx)?;
        Ok((staged, encoded))
    }

    /// Decrypt the envelope of one of this node's files
    pub fn open_file(
        &self,
        name: &str,
        envelope: &[u8],
        ctx: &TreeContext,
    ) -> Result<PlainFile, TreeError> {
        let entry = self
            .file(name)
            .ok_or_else(|| TreeError::FileNotFound(name.to_string()))?;
        let material = entry.unwrap_for(ctx)?;
        Ok(ctx.codec().decode_file(envelope, &material)?)
    }

    pub fn remove_child_dir_references<S: AsRef<str>>(
        &mut self,
        names: &[S],
        ctx: &TreeContext,
    ) -> Result<Staged, TreeError> {
        if self.remove_dirs(names) {
            self.touch();
        }
        self.stage(Vec::new(), ctx)
    }

    pub fn remove_child_file_references<S: AsRef<str>>(
        &mut self,
        names: &[S],
        ctx: &TreeContext,
    ) -> Result<Staged, TreeError> {
        if self.remove_files(names) {
            self.touch();
        }
        self.stage(Vec::new(), ctx)
    }

    /// Remove the named dirs and files in one change
    pub fn remove_child_dir_and_file_references<S: AsRef<str>, T: AsRef<str>>(
        &mut self,
        dirs: &[S],
        files: &[T],
        ctx: &TreeContext,
    ) -> Result<Staged, TreeError> {
        let dirs_changed = self.remove_dirs(dirs);
        let files_changed = self.remove_files(files);
        if dirs_changed || files_changed {
            self.touch();
        }
        self.stage(Vec::new(), ctx)
    }

    // Returns whether anything was removed. Absent names are ignored.
    fn remove_dirs<S: AsRef<str>>(&mut self, names: &[S]) -> bool {
        let before = self.details.dir_children.len();
        self.details
            .dir_children
            .retain(|child| !names.iter().any(|n| n.as_ref() == child));
        let removed = before - self.details.dir_children.len();
        if removed > 0 {
            tracing::debug!("{}: removed {} dir refs", self.my_path(), removed);
        }
        removed > 0
    }

    fn remove_files<S: AsRef<str>>(&mut self, names: &[S]) -> bool {
        let mut removed = 0;
        for name in names {
            if self.details.file_children.remove(name.as_ref()).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!("{}: removed {} file refs", self.my_path(), removed);
        }
        removed > 0
    }

    /// Share one of this node's files with `recipient`
    ///
    /// The acting address must already hold a grant on the file. Returns
    ///  this node's updated record followed by the share record, and the
    ///  share record itself for delivery to the recipient.
    pub async fn share_file(
        &mut self,
        name: &str,
        recipient: &str,
        role: AccessRole,
        directory: &dyn PublicKeyDirectory,
        ctx: &TreeContext,
    ) -> Result<(Staged, ShareRecord), TreeError> {
        let path = self.my_child_path(name);
        let owner = self.details.who_owns_me.clone();
        let entry = self
            .details
            .file_children
            .get_mut(name)
            .ok_or_else(|| TreeError::FileNotFound(name.to_string()))?;

        let material = entry.unwrap_for(ctx)?;
        let wrapped = grant_to(entry, &material, recipient, role, directory, ctx.cipher()).await?;
        let share = ShareRecord::new(owner, recipient, path, entry, role, wrapped);

        tracing::debug!("shared {} with {} as {}", share.path, recipient, role);
        self.touch();

        let mut staged = self.stage(Vec::new(), ctx)?;
        staged.records.push(ChangeRecord::Share(share.clone()));
        Ok((staged, share))
    }

    /// Drop whatever grant `address` holds on one of this node's files
    ///
    /// The file key is not rotated.
    pub fn revoke_file_access(
        &mut self,
        name: &str,
        address: &str,
        ctx: &TreeContext,
    ) -> Result<Staged, TreeError> {
        let entry = self
            .details
            .file_children
            .get_mut(name)
            .ok_or_else(|| TreeError::FileNotFound(name.to_string()))?;

        if let Some((role, _)) = entry.revoke(address) {
            tracing::debug!("revoked {} access on {} for {}", role, name, address);
            self.touch();
        }
        self.stage(Vec::new(), ctx)
    }

    /// Broadcast records in order
    ///
    /// The node is marked synced only if one of the records is this node's
    ///  own record; broadcasting just its children or a share leaves the
    ///  state alone. Stops at the first failure and returns the
    ///  broadcaster's error, and the node keeps its previous state.
    pub async fn sync(
        &mut self,
        records: &[ChangeRecord],
        broadcaster: &dyn Broadcaster,
    ) -> Result<Vec<BroadcastReceipt>, TreeError> {
        let mut receipts = Vec::with_capacity(records.len());
        for record in records {
            receipts.push(broadcaster.broadcast(record).await?);
        }

        if records.iter().any(|record| self.is_own_record(record)) {
            tracing::debug!("{}: synced {} records", self.my_path(), receipts.len());
            self.mark_synced();
        } else {
            tracing::debug!(
                "{}: broadcast {} records without this node's own, staying {:?}",
                self.my_path(),
                receipts.len(),
                self.state
            );
        }
        Ok(receipts)
    }

    fn is_own_record(&self, record: &ChangeRecord) -> bool {
        record.as_filetree_entry().is_some_and(|entry| {
            entry.tracking_number == self.tracking_number
                && entry.address() == merkle_path(&self.my_path())
        })
    }

    /// Record that this node's latest record was broadcast elsewhere
    pub fn mark_synced(&mut self) {
        self.state = SyncState::Synced;
    }
}

fn check_field(field: &'static str, found: &str, expected: String) -> Result<(), TreeError> {
    if found == expected {
        return Ok(());
    }
    tracing::warn!("record {} does not match decrypted contents", field);
    Err(TreeError::RecordMismatch {
        field,
        expected,
        found: found.to_string(),
    })
}
