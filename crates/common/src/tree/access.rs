//! # Access grants
//!
//! Each file carries two maps from a collaborator's hashed identity to their
//! [`WrappedKey`]: one for editors and one for viewers.
//!
//! ## Exclusivity
//!
//! An identity holds at most one role per file. [`AccessGrants::grant`]
//! enforces this by dropping any grant in the other map before inserting.
//!
//! ## Trust Model
//!
//! Roles are not cryptographically enforced: a viewer and an editor hold
//! the same key. Revocation removes the wrapped copy from the metadata but
//! does not rotate the file key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collaborators::DirectoryError;
use crate::crypto::{WrapError, WrappedKey};

/// A collaborator's role on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    /// May read the file
    Viewer,
    /// May read the file and change its metadata
    Editor,
}

impl AccessRole {
    pub fn other(&self) -> Self {
        match self {
            AccessRole::Viewer => AccessRole::Editor,
            AccessRole::Editor => AccessRole::Viewer,
        }
    }
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRole::Viewer => write!(f, "viewer"),
            AccessRole::Editor => write!(f, "editor"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("recipient {0} has not registered a public key")]
    UnregisteredRecipient(String),
    #[error("no grant for {0}")]
    NoGrant(String),
    #[error("share record {field} mismatch: expected {expected}, found {found}")]
    ShareMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("wrap error: {0}")]
    Wrap(#[from] WrapError),
    #[error("share record error: {0}")]
    Record(#[from] serde_json::Error),
}

/// Map of hashed identities to their wrapped copy of a file's key.
pub type GrantMap = BTreeMap<String, WrappedKey>;

/// Viewer and editor grants for one file
///
/// Deserializing goes through [`AccessGrants::from_parts`], so persisted
///  maps that list an identity twice load with only the editor grant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "PersistedGrants")]
pub struct AccessGrants {
    viewers: GrantMap,
    editors: GrantMap,
}

// The grant maps as they appear on the wire, before normalizing
#[derive(Deserialize)]
struct PersistedGrants {
    #[serde(default)]
    viewers: GrantMap,
    #[serde(default)]
    editors: GrantMap,
}

impl From<PersistedGrants> for AccessGrants {
    fn from(persisted: PersistedGrants) -> Self {
        Self::from_parts(persisted.viewers, persisted.editors)
    }
}

impl AccessGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild grants from their persisted maps. An identity present in
    ///  both keeps only its editor grant.
    pub fn from_parts(viewers: GrantMap, editors: GrantMap) -> Self {
        let viewers = viewers
            .into_iter()
            .filter(|(identity, _)| !editors.contains_key(identity))
            .collect();
        Self { viewers, editors }
    }

    fn map_mut(&mut self, role: AccessRole) -> &mut GrantMap {
        match role {
            AccessRole::Viewer => &mut self.viewers,
            AccessRole::Editor => &mut self.editors,
        }
    }

    /// Grant `identity` the given role, replacing any grant it already
    ///  held in either map
    ///
    /// Returns the role the identity held before, if any.
    pub fn grant(
        &mut self,
        identity: impl Into<String>,
        wrapped: WrappedKey,
        role: AccessRole,
    ) -> Option<AccessRole> {
        let identity = identity.into();
        let previous = self.role_of(&identity);
        self.map_mut(role.other()).remove(&identity);
        self.map_mut(role).insert(identity, wrapped);
        previous
    }

    /// Remove whatever grant `identity` holds from both maps. No-op if it
    ///  holds none. Reports the editor grant when both were present.
    pub fn revoke(&mut self, identity: &str) -> Option<(AccessRole, WrappedKey)> {
        let viewer = self.viewers.remove(identity);
        let editor = self.editors.remove(identity);
        match (editor, viewer) {
            (Some(wrapped), _) => Some((AccessRole::Editor, wrapped)),
            (None, Some(wrapped)) => Some((AccessRole::Viewer, wrapped)),
            (None, None) => None,
        }
    }

    pub fn get(&self, identity: &str) -> Option<(AccessRole, &WrappedKey)> {
        self.editors
            .get(identity)
            .map(|w| (AccessRole::Editor, w))
            .or_else(|| self.viewers.get(identity).map(|w| (AccessRole::Viewer, w)))
    }

    pub fn role_of(&self, identity: &str) -> Option<AccessRole> {
        self.get(identity).map(|(role, _)| role)
    }

    pub fn viewers(&self) -> &GrantMap {
        &self.viewers
    }

    pub fn editors(&self) -> &GrantMap {
        &self.editors
    }

    pub fn len(&self) -> usize {
        self.viewers.len() + self.editors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty() && self.editors.is_empty()
    }

    pub fn into_parts(self) -> (GrantMap, GrantMap) {
        (self.viewers, self.editors)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn wrapped(s: &str) -> WrappedKey {
        WrappedKey::from(s.to_string())
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut grants = AccessGrants::new();
        assert_eq!(grants.grant("a", wrapped("1|1"), AccessRole::Viewer), None);
        assert_eq!(grants.role_of("a"), Some(AccessRole::Viewer));

        let revoked = grants.revoke("a");
        assert_eq!(revoked, Some((AccessRole::Viewer, wrapped("1|1"))));
        assert!(grants.is_empty());

        // absent identity is a no-op
        assert_eq!(grants.revoke("a"), None);
    }

    #[test]
    fn test_grant_moves_between_roles() {
        let mut grants = AccessGrants::new();
        grants.grant("a", wrapped("1|1"), AccessRole::Viewer);
        let previous = grants.grant("a", wrapped("2|2"), AccessRole::Editor);

        assert_eq!(previous, Some(AccessRole::Viewer));
        assert!(grants.viewers().is_empty());
        assert_eq!(grants.editors().get("a"), Some(&wrapped("2|2")));
        assert_eq!(grants.len(), 1);
    }

    #[test]
    fn test_from_parts_prefers_editor() {
        let viewers = BTreeMap::from([
            ("a".to_string(), wrapped("v|v")),
            ("b".to_string(), wrapped("v|v")),
        ]);
        let editors = BTreeMap::from([("a".to_string(), wrapped("e|e"))]);
        let grants = AccessGrants::from_parts(viewers, editors);

        assert_eq!(grants.get("a"), Some((AccessRole::Editor, &wrapped("e|e"))));
        assert_eq!(grants.role_of("b"), Some(AccessRole::Viewer));
        assert_eq!(grants.len(), 2);
    }

    #[test]
    fn test_serialized_shape() {
        let mut grants = AccessGrants::new();
        grants.grant("h", wrapped("iv|key"), AccessRole::Editor);
        let json = serde_json::to_value(&grants).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"viewers": {}, "editors": {"h": "iv|key"}})
        );
        let back: AccessGrants = serde_json::from_value(json).unwrap();
        assert_eq!(back, grants);
    }

    #[test]
    fn test_deserialize_normalizes_conflicts() {
        let json = serde_json::json!({
            "viewers": {"bob": "v|v", "carol": "v|v"},
            "editors": {"bob": "e|e"}
        });
        let mut grants: AccessGrants = serde_json::from_value(json).unwrap();

        assert_eq!(grants.viewers().len(), 1);
        assert_eq!(grants.get("bob"), Some((AccessRole::Editor, &wrapped("e|e"))));

        assert!(grants.revoke("bob").is_some());
        assert_eq!(grants.role_of("bob"), None);
        assert_eq!(grants.role_of("carol"), Some(AccessRole::Viewer));
    }

    #[test]
    fn test_deserialize_missing_maps() {
        let grants: AccessGrants = serde_json::from_str("{}").unwrap();
        assert!(grants.is_empty());
    }

    #[test]
    fn test_revoke_clears_both_maps() {
        let mut grants = AccessGrants {
            viewers: BTreeMap::from([("a".to_string(), wrapped("v|v"))]),
            editors: BTreeMap::from([("a".to_string(), wrapped("e|e"))]),
        };
        assert_eq!(grants.revoke("a"), Some((AccessRole::Editor, wrapped("e|e"))));
        assert!(grants.is_empty());
    }
}
