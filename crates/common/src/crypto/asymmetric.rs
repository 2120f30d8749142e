//! Asymmetric sealing of small secrets using ECDH + AES Key Wrap
//!
//! [`AsymmetricCipher`] is the seam the key wrapping protocol talks to. The
//! holder of a private key implements it; [`Keyring`] is the implementation
//! this crate ships.
//!
//! # Protocol
//!
//! To seal bytes for a recipient:
//! 1. **Generate ephemeral keypair**: Create a temporary Ed25519 keypair
//! 2. **Perform ECDH**: Convert keys to X25519 and compute shared secret
//! 3. **Wrap**: Use AES-KW with padding (RFC 5649) under the shared secret
//! 4. **Package**: `hex(ephemeral_pubkey || wrapped)`
//!
//! The recipient reverses the steps with their private key. AES-KW
//! authenticates the wrapped bytes, so a wrong key or a corrupted payload is
//! detected on open.

use aes_kw::KekAes256 as Kek;
use ed25519_dalek::Signature;

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};

/// Errors that can occur while sealing or opening
#[derive(Debug, thiserror::Error)]
pub enum AsymmetricError {
    #[error("asymmetric error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Encrypt bytes for a public key, decrypt bytes sealed for our own key,
///  and sign with our own key
///
/// Ciphertexts travel as hex strings.
pub trait AsymmetricCipher: Send + Sync {
    /// The public key that [`AsymmetricCipher::decrypt`] can open for
    fn public_key(&self) -> PublicKey;

    /// Seal `plaintext` so only `recipient` can open it
    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<String, AsymmetricError>;

    /// Open a hex ciphertext sealed for [`AsymmetricCipher::public_key`]
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, AsymmetricError>;

    /// Sign `message` with the key behind [`AsymmetricCipher::public_key`]
    fn sign(&self, message: &[u8]) -> Signature;
}

/// A local private key acting as an [`AsymmetricCipher`]
#[derive(Debug, Clone)]
pub struct Keyring {
    secret: SecretKey,
}

impl From<SecretKey> for Keyring {
    fn from(secret: SecretKey) -> Self {
        Self { secret }
    }
}

impl Keyring {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl AsymmetricCipher for Keyring {
    fn public_key(&self) -> PublicKey {
        self.secret.public()
    }

    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<String, AsymmetricError> {
        let ephemeral_private = SecretKey::generate();
        let ephemeral_public = ephemeral_private.public();

        let shared_secret = ephemeral_private
            .to_x25519()
            .diffie_hellman(&recipient.to_x25519());

        let kek = Kek::from(*shared_secret.as_bytes());
        let wrapped = kek
            .wrap_with_padding_vec(plaintext)
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;

        let mut sealed = Vec::with_capacity(PUBLIC_KEY_SIZE + wrapped.len());
        sealed.extend_from_slice(&ephemeral_public.to_bytes());
        sealed.extend_from_slice(&wrapped);
        Ok(hex::encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, AsymmetricError> {
        let sealed = hex::decode(ciphertext.strip_prefix("0x").unwrap_or(ciphertext))?;
        if sealed.len() <= PUBLIC_KEY_SIZE {
            return Err(anyhow::anyhow!("sealed data too short for ephemeral key").into());
        }

        let (ephemeral_bytes, wrapped) = sealed.split_at(PUBLIC_KEY_SIZE);
        let ephemeral_public = PublicKey::try_from(ephemeral_bytes)?;

        let shared_secret = self
            .secret
            .to_x25519()
            .diffie_hellman(&ephemeral_public.to_x25519());

        let kek = Kek::from(*shared_secret.as_bytes());
        let unwrapped = kek
            .unwrap_with_padding_vec(wrapped)
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;
        Ok(unwrapped)
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }
}
