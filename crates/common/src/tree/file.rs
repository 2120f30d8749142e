use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{EncodedFile, FileMeta, KeyMaterial, WrappedKey};
use crate::hash::access_key;

use super::access::{AccessError, AccessGrants, AccessRole};
use super::context::TreeContext;

/// A file as its parent folder sees it
///
/// The entry holds the file's metadata, the name its envelope is stored
///  under on the network, and one wrapped copy of the file key per
///  collaborator. Grants are keyed by [`access_key`] under this entry's
///  tracking number, so collaborator addresses never appear in clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    meta: FileMeta,
    network_name: String,
    tracking_number: Uuid,
    #[serde(flatten)]
    grants: AccessGrants,
}

impl FileEntry {
    pub fn new(meta: FileMeta, network_name: impl Into<String>) -> Self {
        Self {
            meta,
            network_name: network_name.into(),
            tracking_number: Uuid::new_v4(),
            grants: AccessGrants::new(),
        }
    }

    /// Build the entry for a freshly encoded file and give the acting
    ///  address editor access to it
    pub fn sealed(
        encoded: &EncodedFile,
        meta: FileMeta,
        material: &KeyMaterial,
        ctx: &TreeContext,
    ) -> Result<Self, AccessError> {
        let mut entry = Self::new(meta, encoded.name.clone());
        let wrapped = WrappedKey::wrap(material, &ctx.public_key(), ctx.cipher())?;
        entry.grant(ctx.address(), wrapped, AccessRole::Editor);
        Ok(entry)
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn tracking_number(&self) -> &Uuid {
        &self.tracking_number
    }

    pub fn grants(&self) -> &AccessGrants {
        &self.grants
    }

    /// The hashed identity `address` is granted under on this file
    pub fn access_key(&self, address: &str) -> String {
        access_key(&self.tracking_number, address)
    }

    pub fn grant(
        &mut self,
        address: &str,
        wrapped: WrappedKey,
        role: AccessRole,
    ) -> Option<AccessRole> {
        let identity = self.access_key(address);
        self.grants.grant(identity, wrapped, role)
    }

    pub fn revoke(&mut self, address: &str) -> Option<(AccessRole, WrappedKey)> {
        let identity = self.access_key(address);
        self.grants.revoke(&identity)
    }

    pub fn role_of(&self, address: &str) -> Option<AccessRole> {
        self.grants.role_of(&self.access_key(address))
    }

    /// Open the acting address's grant and recover the file key
    pub fn unwrap_for(&self, ctx: &TreeContext) -> Result<KeyMaterial, AccessError> {
        let (_, wrapped) = self
            .grants
            .get(&self.access_key(ctx.address()))
            .ok_or_else(|| AccessError::NoGrant(ctx.address().to_string()))?;
        Ok(wrapped.unwrap(ctx.cipher())?)
    }
}
