//! Randomness capability
//!
//! Key and iv generation goes through an [`Entropy`] implementation handed to
//! the codec rather than a process wide RNG, so callers can swap in a
//! deterministic source for tests or a hardware source in production.

use std::fmt::Debug;

/// Errors raised when a randomness source cannot produce bytes
#[derive(Debug, thiserror::Error)]
pub enum EntropyError {
    #[error("entropy error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A source of cryptographically secure random bytes
pub trait Entropy: Send + Sync + Debug {
    /// Fill `dest` entirely with random bytes
    fn fill(&self, dest: &mut [u8]) -> Result<(), EntropyError>;
}

/// Operating system randomness via `getrandom`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl Entropy for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), EntropyError> {
        getrandom::getrandom(dest)
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_os_entropy_fills_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        OsEntropy.fill(&mut a).unwrap();
        OsEntropy.fill(&mut b).unwrap();
        assert_ne!(a, [0u8; 32]);
        assert_ne!(a, b);
    }
}
