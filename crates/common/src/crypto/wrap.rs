//! Wrapped key strings
//!
//! A file's [`KeyMaterial`] is shared by sealing each half separately for the
//! recipient and joining the two hex ciphertexts:
//!
//! ```text
//! <hex(seal(iv))>|<hex(seal(key))>
//! ```
//!
//! The halves open independently, so a corrupt grant reports which half is
//! bad. Revoking a grant only removes the string from the tree metadata; the
//! underlying file key is not rotated, so anyone who already unwrapped it can
//! still decrypt the file.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::asymmetric::{AsymmetricCipher, AsymmetricError};
use super::keys::PublicKey;
use super::secret::{Iv, KeyMaterial, Secret};

/// Separates the wrapped iv from the wrapped key
pub const WRAP_DELIMITER: char = '|';

/// The two halves of a wrapped key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHalf {
    Iv,
    Key,
}

impl fmt::Display for KeyHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyHalf::Iv => write!(f, "iv"),
            KeyHalf::Key => write!(f, "key"),
        }
    }
}

/// A wrapped key string is malformed or cannot be opened
#[derive(Debug, thiserror::Error)]
pub enum WrapError {
    #[error("malformed grant: missing '|' delimiter")]
    MissingDelimiter,
    #[error("malformed grant: {half} half is invalid: {reason}")]
    Half { half: KeyHalf, reason: String },
    #[error("asymmetric error: {0}")]
    Asymmetric(#[from] AsymmetricError),
}

/// Key material sealed for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(String);

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WrappedKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl WrappedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Seal `material` for `recipient`. See [`wrap_for_recipient`].
    pub fn wrap(
        material: &KeyMaterial,
        recipient: &PublicKey,
        cipher: &dyn AsymmetricCipher,
    ) -> Result<Self, WrapError> {
        wrap_for_recipient(material, recipient, cipher)
    }

    /// Open with our own key. See [`unwrap_from_self`].
    pub fn unwrap(&self, cipher: &dyn AsymmetricCipher) -> Result<KeyMaterial, WrapError> {
        unwrap_from_self(&self.0, cipher)
    }
}

/// Seal the iv and the exported key independently for `recipient` and join
///  the two hex strings with [`WRAP_DELIMITER`]
pub fn wrap_for_recipient(
    material: &KeyMaterial,
    recipient: &PublicKey,
    cipher: &dyn AsymmetricCipher,
) -> Result<WrappedKey, WrapError> {
    let iv = cipher.encrypt(recipient, material.iv.bytes())?;
    let key = cipher.encrypt(recipient, &material.key.export())?;
    Ok(WrappedKey(format!("{iv}{WRAP_DELIMITER}{key}")))
}

/// Split a wrapped key on its first delimiter and open both halves with
///  the holder's private key
///
/// # Errors
///
/// Returns [`WrapError::MissingDelimiter`] if there is no delimiter, or
/// [`WrapError::Half`] naming the half that fails to open or has the wrong
/// length.
pub fn unwrap_from_self(
    wrapped: &str,
    cipher: &dyn AsymmetricCipher,
) -> Result<KeyMaterial, WrapError> {
    let (iv_hex, key_hex) = wrapped
        .split_once(WRAP_DELIMITER)
        .ok_or(WrapError::MissingDelimiter)?;

    let open = |half: KeyHalf, hex: &str| {
        cipher.decrypt(hex).map_err(|e| {
            tracing::warn!("failed to open {} half of wrapped key: {}", half, e);
            WrapError::Half {
                half,
                reason: e.to_string(),
            }
        })
    };
    let iv_bytes = open(KeyHalf::Iv, iv_hex)?;
    let key_bytes = open(KeyHalf::Key, key_hex)?;

    let iv = Iv::from_slice(&iv_bytes).map_err(|e| WrapError::Half {
        half: KeyHalf::Iv,
        reason: e.to_string(),
    })?;
    let key = Secret::import(&key_bytes).map_err(|e| WrapError::Half {
        half: KeyHalf::Key,
        reason: e.to_string(),
    })?;

    Ok(KeyMaterial::new(key, iv))
}
