// crypto.rs - MD5 / HMAC-MD5 primitives and the request authenticator nonce
//
// No padding options, fixed 16-octet outputs: these are the two primitives
// RFC 2865/3579 actually need, nothing more.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use std::io::Read;
use std::time::Duration;

/// Width of an MD5 digest, a RADIUS authenticator, and an HMAC-MD5 tag.
pub const DIGEST_LEN: usize = 16;

/// Plain MD5 over `data`.
pub fn md5(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-MD5 over `data`, keyed by `key`.
pub fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; DIGEST_LEN] {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = Hmac::<Md5>::new_from_slice(key).expect("HMAC-MD5 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Fill `out` with a 16-octet request authenticator.
///
/// Tries, in order: a cryptographic OS primitive, a blocking read of the
/// platform entropy device (retried across interruption), and finally a
/// non-cryptographic PRNG as a last resort. Always succeeds; the nonce need
/// only be unpredictable enough to strengthen password obfuscation, since the
/// reply digest additionally binds the shared secret.
pub fn fill_request_authenticator(out: &mut [u8; DIGEST_LEN]) {
    if rand::rngs::OsRng.try_fill_bytes(out).is_ok() {
        return;
    }

    if fill_from_urandom(out) {
        return;
    }

    tracing::warn!("falling back to a non-cryptographic RNG for the request authenticator");
    rand::thread_rng().fill_bytes(out);
}

#[cfg(unix)]
fn fill_from_urandom(out: &mut [u8; DIGEST_LEN]) -> bool {
    let mut file = match std::fs::File::open("/dev/urandom") {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut filled = 0;
    while filled < out.len() {
        match file.read(&mut out[filled..]) {
            Ok(0) => return false,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return false,
        }
    }
    true
}

#[cfg(not(unix))]
fn fill_from_urandom(_out: &mut [u8; DIGEST_LEN]) -> bool {
    false
}

/// A monotonic budget for the retry/poll loop: `remaining` shrinks as time
/// elapses, independent of how many times the wait was interrupted.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    remaining: Duration,
}

impl Budget {
    pub fn new(total: Duration) -> Self {
        Self { remaining: total }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Subtract elapsed wall-clock time, saturating at zero.
    pub fn consume(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }
}
