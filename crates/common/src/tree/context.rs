use std::fmt;
use std::sync::Arc;

use crate::crypto::{AsymmetricCipher, EnvelopeCodec, PublicKey};

/// Who is acting on the tree, and with which capabilities
///
/// Deriving a change record encrypts the node under fresh key material and
///  wraps that material for the acting address, so every mutation needs the
///  actor's address, its asymmetric cipher and a codec.
#[derive(Clone)]
pub struct TreeContext {
    address: String,
    cipher: Arc<dyn AsymmetricCipher>,
    codec: EnvelopeCodec,
}

impl fmt::Debug for TreeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeContext")
            .field("address", &self.address)
            .field("public_key", &self.cipher.public_key())
            .field("codec", &self.codec)
            .finish()
    }
}

impl TreeContext {
    pub fn new(
        address: impl Into<String>,
        cipher: Arc<dyn AsymmetricCipher>,
        codec: EnvelopeCodec,
    ) -> Self {
        Self {
            address: address.into(),
            cipher,
            codec,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn cipher(&self) -> &dyn AsymmetricCipher {
        self.cipher.as_ref()
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn public_key(&self) -> PublicKey {
        self.cipher.public_key()
    }
}
