// secret.rs - Shared-secret handling
//
// The shared secret is both the HMAC key and the password-obfuscation input,
// so it is worth its own owned type: construction is bounded, Debug never
// prints the contents, and the backing bytes are overwritten unconditionally
// on drop (success, error, or early return) rather than via hand-written
// cleanup at every exit path.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{RadiusError, Result};

/// Upper bound on a RADIUS shared secret's length, matching the original
/// client library's `MAX_SECRET_LENGTH` bound.
pub const MAX_SECRET_LENGTH: usize = 128;

/// A shared secret, zeroized unconditionally when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBuffer(Vec<u8>);

impl SecretBuffer {
    /// Build a secret buffer from the given bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` exceeds [`MAX_SECRET_LENGTH`].
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        if bytes.len() > MAX_SECRET_LENGTH {
            return Err(RadiusError::Encoding(format!(
                "shared secret exceeds {} octets",
                MAX_SECRET_LENGTH
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Borrow the secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretBuffer").field(&"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_secret() {
        let bytes = vec![b'x'; MAX_SECRET_LENGTH + 1];
        assert!(SecretBuffer::new(bytes).is_err());
    }

    #[test]
    fn debug_never_prints_contents() {
        let secret = SecretBuffer::new("xyzzy5461").unwrap();
        assert!(!format!("{:?}", secret).contains("xyzzy5461"));
    }
}
