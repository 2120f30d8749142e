//! Cryptographic primitives for lockbox
//!
//! This module provides the cryptographic foundation for lockbox's security model:
//!
//! - **Content Encryption**: AES-256-GCM with a 16-byte iv, per-item [`KeyMaterial`]
//! - **Envelopes**: chunked, length-prefixed framing of whole files
//! - **Identity**: Ed25519 keypairs (`SecretKey`/`PublicKey`), which also sign folder records
//! - **Key Wrapping**: ECDH (X25519) + AES-KW sealing of key material per recipient
//!
//! # Security Model
//!
//! ## Content Encryption
//! Every file and every folder node's contents has its own key and iv. Files are
//! split into frames, each encrypted independently; see [`envelope`] for the
//! layout and the nonce handling across frames.
//!
//! ## Key Wrapping
//! To share an item with a collaborator:
//! 1. Look up the collaborator's registered public key
//! 2. Seal the iv and the key separately for that key ([`AsymmetricCipher`])
//! 3. Store `wrapped_iv|wrapped_key` in the item's grant maps
//!
//! The collaborator opens both halves with their private key and decrypts.
//!
//! ## Randomness
//! Keys and ivs come from an injected [`Entropy`] capability, defaulting to
//! the operating system's RNG.

mod asymmetric;
mod entropy;
pub mod envelope;
mod keys;
mod secret;
mod wrap;

pub use asymmetric::{AsymmetricCipher, AsymmetricError, Keyring};
pub use ed25519_dalek::{Signature, SignatureError};
pub use entropy::{Entropy, EntropyError, OsEntropy};
pub use envelope::{
    EncodedFile, EnvelopeCodec, EnvelopeConfig, EnvelopeError, FileMeta, FrameNonces, PlainFile,
};
pub use keys::{KeyError, PublicKey, SecretKey};
pub use secret::{crypt, CipherError, CipherMode, Iv, KeyMaterial, Secret, IV_SIZE, SECRET_SIZE};
pub use wrap::{unwrap_from_self, wrap_for_recipient, KeyHalf, WrapError, WrappedKey};
