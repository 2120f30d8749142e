//! Sharing a file with another address
//!
//! Sharing wraps the file's key material for the recipient's registered
//! public key, stores the result in the file's grants and emits a
//! [`ShareRecord`] telling the recipient where to find the file and how to
//! open it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::PublicKeyDirectory;
use crate::crypto::{AsymmetricCipher, KeyMaterial, WrappedKey};

use super::access::{AccessError, AccessRole};
use super::file::FileEntry;

/// One sharing relationship, in the form the transaction layer persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    /// Address that owns the shared file
    pub owner: String,
    /// Address the file is shared with
    pub to: String,
    /// Full path of the file in the owner's tree
    pub path: String,
    pub role: AccessRole,
    /// Network name of the file's envelope
    pub network_name: String,
    /// The file key wrapped for `to`
    pub wrapped_key: WrappedKey,
    pub tracking_number: Uuid,
}

impl ShareRecord {
    pub fn new(
        owner: impl Into<String>,
        to: impl Into<String>,
        path: impl Into<String>,
        entry: &FileEntry,
        role: AccessRole,
        wrapped_key: WrappedKey,
    ) -> Self {
        Self {
            owner: owner.into(),
            to: to.into(),
            path: path.into(),
            role,
            network_name: entry.network_name().to_string(),
            wrapped_key,
            tracking_number: *entry.tracking_number(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, AccessError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a share record and check it is the one we asked for
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::ShareMismatch`] if the record was issued by a
    /// different owner or for a different path.
    pub fn decode(bytes: &[u8], from_owner: &str, path: &str) -> Result<Self, AccessError> {
        let record: Self = serde_json::from_slice(bytes)?;
        if record.owner != from_owner {
            return Err(AccessError::ShareMismatch {
                field: "owner",
                expected: from_owner.to_string(),
                found: record.owner,
            });
        }
        if record.path != path {
            return Err(AccessError::ShareMismatch {
                field: "path",
                expected: path.to_string(),
                found: record.path,
            });
        }
        Ok(record)
    }

    /// Open the wrapped key with the recipient's cipher
    pub fn accept(&self, cipher: &dyn AsymmetricCipher) -> Result<KeyMaterial, AccessError> {
        Ok(self.wrapped_key.unwrap(cipher)?)
    }
}

/// Wrap `material` for `recipient` and grant them `role` on `entry`
///
/// # Errors
///
/// Returns [`AccessError::UnregisteredRecipient`] if the directory has no
/// key for `recipient`. Directory failures are passed through.
pub async fn grant_to(
    entry: &mut FileEntry,
    material: &KeyMaterial,
    recipient: &str,
    role: AccessRole,
    directory: &dyn PublicKeyDirectory,
    cipher: &dyn AsymmetricCipher,
) -> Result<WrappedKey, AccessError> {
    let public_key = directory.lookup(recipient).await?.ok_or_else(|| {
        tracing::warn!("cannot share {} with unregistered {}", entry.name(), recipient);
        AccessError::UnregisteredRecipient(recipient.to_string())
    })?;

    let wrapped = WrappedKey::wrap(material, &public_key, cipher)?;
    if let Some(previous) = entry.grant(recipient, wrapped.clone(), role) {
        tracing::debug!(
            "replacing {} grant on {} for {} with {}",
            previous,
            entry.name(),
            recipient,
            role
        );
    }
    Ok(wrapped)
}
