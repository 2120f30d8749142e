//! Symmetric key material and the AES-256-GCM primitive
//!
//! Every stored file (and every folder node's contents) is encrypted under its
//! own [`KeyMaterial`]: a 256-bit [`Secret`] plus a 16-byte [`Iv`]. The pair is
//! generated once per item, wrapped for every collaborator that should be able
//! to read it, and never persisted in the clear.
//!
//! AES-GCM is instantiated with a 16-byte nonce to match the iv width used by
//! existing envelopes on the network.

use std::fmt;
use std::ops::Deref;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};

use super::entropy::{Entropy, EntropyError};

/// Size of an AES-256 key in bytes
pub const SECRET_SIZE: usize = 32;
/// Size of the initialization vector in bytes
pub const IV_SIZE: usize = 16;
/// Size of the GCM authentication tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Which way a cipher call was running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherMode::Encrypt => write!(f, "encrypt"),
            CipherMode::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("cipher error: {0}")]
    Default(#[from] anyhow::Error),
    /// The cipher rejected the input: wrong key, wrong iv or a failed
    ///  authentication tag on decrypt
    #[error("AES-GCM {mode} failed")]
    Failed { mode: CipherMode },
    #[error("entropy error: {0}")]
    Entropy(#[from] EntropyError),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A 256-bit symmetric key
///
/// `Debug` never prints the key bytes.
#[derive(PartialEq, Eq, Clone)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Deref for Secret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret from the given entropy source
    pub fn generate(entropy: &dyn Entropy) -> Result<Self, CipherError> {
        let mut buff = [0; SECRET_SIZE];
        entropy.fill(&mut buff)?;
        Ok(Self(buff))
    }

    /// Import a secret from its exported byte form
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn import(data: &[u8]) -> Result<Self, CipherError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Export the raw key bytes. The format is stable: `import(export(k)) == k`.
    pub fn export(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn from_hex(hex: &str) -> Result<Self, CipherError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SECRET_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| anyhow::anyhow!("hex decode error"))?;
        Ok(Self(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A 16-byte initialization vector
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Iv([u8; IV_SIZE]);

impl Deref for Iv {
    type Target = [u8; IV_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; IV_SIZE]> for Iv {
    fn from(bytes: [u8; IV_SIZE]) -> Self {
        Iv(bytes)
    }
}

impl Iv {
    /// Generate a new random iv from the given entropy source
    pub fn generate(entropy: &dyn Entropy) -> Result<Self, CipherError> {
        let mut buff = [0; IV_SIZE];
        entropy.fill(&mut buff)?;
        Ok(Self(buff))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, CipherError> {
        if data.len() != IV_SIZE {
            return Err(anyhow::anyhow!(
                "invalid iv size, expected {}, got {}",
                IV_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; IV_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Derive the iv for the `index`th frame of an envelope by xoring the
    ///  big-endian index into the trailing 8 bytes. Index 0 is the iv itself.
    pub fn for_frame(&self, index: u64) -> Self {
        let mut buff = self.0;
        for (slot, byte) in buff[IV_SIZE - 8..].iter_mut().zip(index.to_be_bytes()) {
            *slot ^= byte;
        }
        Self(buff)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A key and the iv it is used with
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct KeyMaterial {
    pub key: Secret,
    pub iv: Iv,
}

impl KeyMaterial {
    pub fn new(key: Secret, iv: Iv) -> Self {
        Self { key, iv }
    }

    /// Generate a fresh key and iv
    pub fn generate(entropy: &dyn Entropy) -> Result<Self, CipherError> {
        Ok(Self {
            key: Secret::generate(entropy)?,
            iv: Iv::generate(entropy)?,
        })
    }
}

/// Encrypt or decrypt `data` with AES-256-GCM under `key` and `iv`
///
/// Ciphertext is `encrypted(plaintext) || tag (16 bytes)`. An empty input
/// returns an empty output without touching the cipher, in both directions.
///
/// # Errors
///
/// Returns [`CipherError::Failed`] naming the direction if the cipher
/// rejects the input, e.g. a tag mismatch on tampered ciphertext.
pub fn crypt(data: &[u8], key: &Secret, iv: &Iv, mode: CipherMode) -> Result<Vec<u8>, CipherError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let cipher = Aes256Gcm16::new_from_slice(key.bytes())
        .map_err(|_| anyhow::anyhow!("invalid AES-256 key length"))?;
    let nonce = Nonce::<U16>::from_slice(iv.bytes());

    let result = match mode {
        CipherMode::Encrypt => cipher.encrypt(nonce, data),
        CipherMode::Decrypt => cipher.decrypt(nonce, data),
    };
    result.map_err(|_| CipherError::Failed { mode })
}
