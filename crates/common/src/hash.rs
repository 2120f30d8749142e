//! Path and identity hashing
//!
//! Everything stored on the network is addressed by hex encoded SHA-256
//! digests rather than by clear names:
//!
//! - **Merkle paths** address folders: each `/` separated segment is hashed
//!   and folded into the running digest, so a path's address commits to
//!   every ancestor.
//! - **Owner hashes** bind an address to the account that owns it.
//! - **User access hashes** key the per-file grant maps so collaborator
//!   addresses never appear in clear.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of a hex encoded SHA-256 digest
pub const HEX_DIGEST_LEN: usize = 64;

/// Hash a string with SHA-256 and return the lowercase hex digest
pub fn hash_and_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Hash raw bytes with SHA-256 and return the lowercase hex digest
pub fn hash_bytes_and_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Derive the merkle address of a `/` separated path.
///
/// Segments are folded left to right:
/// `merkle = H(merkle || H(segment))`, starting from the empty string.
/// Empty segments take part too, so `/home` and `home` have different
/// addresses.
pub fn merkle_path(path: &str) -> String {
    path.split('/').fold(String::new(), |merkle, segment| {
        let part = hash_and_hex(segment);
        hash_and_hex(&format!("{merkle}{part}"))
    })
}

/// Bind a hashed path to the account that owns it
pub fn hash_owner(hashed_path: &str, owner: &str) -> String {
    hash_and_hex(&format!("o{hashed_path}{owner}"))
}

/// Hash a user address under a prefix
pub fn hash_user_access(prefix: &str, user: &str) -> String {
    hash_and_hex(&format!("{prefix}{user}"))
}

/// The hashed identity a user's grant is stored under for a given
///  tracking number. Viewer and editor grants share the same key.
pub fn access_key(tracking_number: &Uuid, user: &str) -> String {
    hash_user_access(&tracking_number.to_string(), user)
}
