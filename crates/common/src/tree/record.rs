use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{AsymmetricCipher, PublicKey, Signature, SignatureError};
use crate::hash::hash_and_hex;

use super::access::GrantMap;
use super::share::ShareRecord;

/// The chain-ready form of one folder node
///
/// Nothing in here names the node in clear: the owner, the parent path and
///  the node name are all hashed, and the node's details travel encrypted in
///  `contents`. Every record carries the key that wrote it and a signature
///  over everything else, see [`FiletreeEntry::signing_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiletreeEntry {
    /// `H(owner)`
    pub account: String,
    /// `hash_owner(address, owner)`
    pub owner: String,
    /// Merkle path of the node's parent path
    pub hash_parent: String,
    /// `H(name)`
    pub hash_child: String,
    /// Base64 of the node details encrypted under the node's key material
    pub contents: String,
    #[serde(default)]
    pub viewers: GrantMap,
    #[serde(default)]
    pub editors: GrantMap,
    pub tracking_number: Uuid,
    pub signer: PublicKey,
    /// Hex Ed25519 signature by `signer`
    #[serde(default)]
    pub signature: String,
}

impl FiletreeEntry {
    /// The network address of the node: `H(hash_parent || hash_child)`,
    ///  which equals the merkle path of its full path
    pub fn address(&self) -> String {
        hash_and_hex(&format!("{}{}", self.hash_parent, self.hash_child))
    }

    /// The bytes the signature covers: the address, the owner binding,
    ///  the encrypted contents, the tracking number and every grant
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = format!(
            "{}|{}|{}|{}|{}",
            self.address(),
            self.account,
            self.owner,
            self.contents,
            self.tracking_number
        );
        for (role, grants) in [("v", &self.viewers), ("e", &self.editors)] {
            for (identity, wrapped) in grants {
                payload.push_str(&format!("|{role}:{identity}={wrapped}"));
            }
        }
        payload.into_bytes()
    }

    /// Sign the record as `cipher`'s key; must run after the last change
    pub fn sign(&mut self, cipher: &dyn AsymmetricCipher) {
        self.signer = cipher.public_key();
        self.signature = hex::encode(cipher.sign(&self.signing_payload()).to_bytes());
    }

    /// Check the signature against the embedded `signer`
    pub fn verify(&self) -> Result<(), SignatureError> {
        let bytes = hex::decode(&self.signature).map_err(|_| SignatureError::new())?;
        let signature = Signature::from_slice(&bytes)?;
        self.signer.verify(&self.signing_payload(), &signature)
    }
}

/// A change the transaction layer should sign and broadcast
///
/// Records are produced by tree mutations and are otherwise opaque to this
///  crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// Create or replace a folder node
    PostFile(FiletreeEntry),
    /// Tell a collaborator about a file shared with them
    Share(ShareRecord),
}

impl ChangeRecord {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn as_filetree_entry(&self) -> Option<&FiletreeEntry> {
        match self {
            ChangeRecord::PostFile(entry) => Some(entry),
            ChangeRecord::Share(_) => None,
        }
    }

    pub fn as_share(&self) -> Option<&ShareRecord> {
        match self {
            ChangeRecord::Share(share) => Some(share),
            ChangeRecord::PostFile(_) => None,
        }
    }
}
