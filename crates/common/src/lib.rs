/**
 * External collaborator contracts.
 *  The core never signs, broadcasts or queries
 *  the chain itself; it hands change records to a
 *  `Broadcaster` and asks a `PublicKeyDirectory`
 *  for registered keys.
 */
pub mod collaborators;
/**
 * Cryptographic types and operations.
 *  - Symmetric key material and the envelope codec
 *  - Public and Private key implementations
 *  - Key-to-key key wrapping
 */
pub mod crypto;
/**
 * Stable hex digests and merkle path derivation
 *  used to address paths on the network.
 */
pub mod hash;
/**
 * The folder / file tree model: one directory
 *  node at a time, its mutations, the change
 *  records those mutations produce and the
 *  per-file access grants.
 */
pub mod tree;

pub mod prelude {
    pub use crate::collaborators::{Broadcaster, PublicKeyDirectory};
    pub use crate::crypto::{
        AsymmetricCipher, CipherMode, EnvelopeCodec, Iv, KeyMaterial, Keyring, PublicKey, Secret,
        SecretKey, WrappedKey,
    };
    pub use crate::hash::{hash_and_hex, merkle_path};
    pub use crate::tree::{
        AccessGrants, AccessRole, ChangeRecord, FileEntry, FolderNode, Staged, SyncState,
        TreeContext, TreeError,
    };
}
