// validate.rs - Reply validation: length sanity, id match, digest check
//
// The original implementation mutates the received buffer in place (swap in
// the request authenticator, append the secret past the packet) to compute
// the response digest. We get the same computation against a dedicated
// scratch buffer instead, so the function is reentrant and the secret's
// lifetime stays local to this call.

use crate::crypto;
use crate::error::{RadiusError, Result};
use crate::packet::{HEADER_LEN, MAX_PACKET_LEN};
use crate::secret::MAX_SECRET_LENGTH;

/// Outcome of checking one candidate reply datagram against the request it
/// is supposed to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCheck {
    /// Id matched and the response-authenticator digest checked out.
    Ok,
    /// Id did not match `expected_id` — the caller should keep listening
    /// within the same budget rather than treat this as a failed attempt.
    BadId,
    /// Id matched but the digest did not.
    BadDigest,
}

/// Validate a candidate reply datagram.
///
/// `datagram` is the raw bytes as received (it may be longer than the
/// header-declared length; only the declared length is examined).
pub fn check_reply(
    datagram: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    expected_id: u8,
) -> Result<ReplyCheck> {
    if datagram.len() < HEADER_LEN {
        return Err(RadiusError::BadResponseLength);
    }

    let total_len = u16::from_be_bytes([datagram[2], datagram[3]]) as usize;
    if !(HEADER_LEN..=MAX_PACKET_LEN).contains(&total_len) {
        return Err(RadiusError::BadResponseLength);
    }
    if total_len > datagram.len() {
        return Err(RadiusError::BadResponseLength);
    }
    if total_len + secret.len() > MAX_PACKET_LEN + MAX_SECRET_LENGTH {
        // Defensive: should not occur given the bounds checked above.
        return Err(RadiusError::BadResponseLength);
    }

    if datagram[1] != expected_id {
        return Ok(ReplyCheck::BadId);
    }

    let reply_digest: [u8; 16] = datagram[4..20]
        .try_into()
        .expect("length checked above");

    let mut scratch = [0u8; MAX_PACKET_LEN + MAX_SECRET_LENGTH];
    scratch[..total_len].copy_from_slice(&datagram[..total_len]);
    scratch[4..20].copy_from_slice(request_authenticator);
    scratch[total_len..total_len + secret.len()].copy_from_slice(secret);

    let calc_digest = crypto::md5(&scratch[..total_len + secret.len()]);

    if calc_digest != reply_digest {
        return Ok(ReplyCheck::BadDigest);
    }

    Ok(ReplyCheck::Ok)
}
