// packet.rs - Wire encoding and decoding of RADIUS packets
//
// Header = {code, id, length, authenticator[16]} followed by a sequence of
// {type, length, value} attributes. This module is the encoder half of the
// data flow (Orchestrator -> Encoder -> Transport) and the decode half used
// once a reply has passed the digest check.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::avp::{attr, Avp, AvpValue};
use crate::crypto;
use crate::error::{RadiusError, Result};

/// Standard RADIUS packet codes this client emits or recognizes in a reply.
pub mod code {
    pub const ACCESS_REQUEST: u8 = 1;
    /// Also the legacy `Password-Ack` code; the two share a wire value.
    pub const ACCESS_ACCEPT: u8 = 2;
    /// Also the legacy `Password-Reject` code.
    pub const ACCESS_REJECT: u8 = 3;
    pub const ACCOUNTING_REQUEST: u8 = 4;
    pub const ACCOUNTING_RESPONSE: u8 = 5;
    pub const ACCESS_CHALLENGE: u8 = 11;
    pub const STATUS_SERVER: u8 = 12;
}

pub const HEADER_LEN: usize = 20;
pub const MAX_PACKET_LEN: usize = 4096;
const MAX_ATTR_VALUE_LEN: usize = 253;
const USER_PASSWORD_MAX: usize = 128;

/// Build the 20-octet header with a zero length placeholder (fixed up by
/// [`set_length`] once the attribute section has been written).
pub fn build_header(request_code: u8, id: u8, authenticator: [u8; 16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.push(request_code);
    buf.push(id);
    buf.extend_from_slice(&[0u8, 0u8]);
    buf.extend_from_slice(&authenticator);
    buf
}

/// Write `buf.len()` into the header's length field, network order.
pub fn set_length(buf: &mut [u8]) {
    let len = buf.len() as u16;
    buf[2..4].copy_from_slice(&len.to_be_bytes());
}

/// Serialize `avps` into `buf`, which must already hold the 20-octet header.
/// Returns the number of body octets written.
pub fn pack_attributes(buf: &mut Vec<u8>, avps: &[Avp], secret: &[u8]) -> Result<usize> {
    let request_authenticator: [u8; 16] = buf[4..20]
        .try_into()
        .expect("header must be written before packing attributes");
    let start_len = buf.len();

    for avp in avps {
        let vsa_length_index = if avp.is_vendor_specific() {
            buf.push(attr::VENDOR_SPECIFIC);
            let idx = buf.len();
            buf.push(6);
            buf.extend_from_slice(&avp.vendor_id.to_be_bytes());
            Some(idx)
        } else {
            None
        };

        let before = buf.len();
        encode_one(buf, avp, secret, &request_authenticator)?;
        let written = buf.len() - before;

        if let Some(idx) = vsa_length_index {
            buf[idx] += written as u8;
        }
    }

    Ok(buf.len() - start_len)
}

fn encode_one(
    buf: &mut Vec<u8>,
    avp: &Avp,
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<()> {
    buf.push(avp.attribute);

    if avp.attribute == attr::USER_PASSWORD {
        let cleartext = avp.value.as_bytes();
        encode_user_password(buf, &cleartext, secret, request_authenticator);
        return Ok(());
    }

    match &avp.value {
        AvpValue::Text(_) | AvpValue::Bytes(_) => {
            let bytes = avp.value.as_bytes();
            if bytes.len() > MAX_ATTR_VALUE_LEN {
                return Err(RadiusError::Encoding(format!(
                    "attribute {} value too long ({} octets)",
                    avp.attribute,
                    bytes.len()
                )));
            }
            buf.push((bytes.len() + 2) as u8);
            buf.extend_from_slice(&bytes);
        }
        AvpValue::Ipv6Addr(addr) => {
            buf.push(18);
            buf.extend_from_slice(&addr.octets());
        }
        AvpValue::Ipv6Prefix { .. } => {
            let bytes = avp.value.as_bytes();
            buf.push((bytes.len() + 2) as u8);
            buf.extend_from_slice(&bytes);
        }
        AvpValue::Integer(v) => {
            buf.push(6);
            buf.extend_from_slice(&v.to_be_bytes());
        }
        AvpValue::IpAddr(addr) => {
            buf.push(6);
            buf.extend_from_slice(&addr.octets());
        }
        AvpValue::Date(d) => {
            buf.push(6);
            buf.extend_from_slice(&d.to_be_bytes());
        }
    }

    Ok(())
}

/// RFC 2865 §5.2 password obfuscation: chained MD5 XOR over 16-octet blocks,
/// each block's salt being the previous ciphertext block (the first block's
/// salt is the request authenticator).
fn encode_user_password(
    buf: &mut Vec<u8>,
    cleartext: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) {
    let l = cleartext.len().min(USER_PASSWORD_MAX);
    let padded_len = ((l + 15) & !15).max(16);

    let mut padded = vec![0u8; padded_len];
    padded[..l].copy_from_slice(&cleartext[..l]);

    buf.push((padded_len + 2) as u8);
    let value_start = buf.len();
    buf.resize(value_start + padded_len, 0);

    let mut block_salt = *request_authenticator;
    let mut md5_input = Vec::with_capacity(secret.len() + 16);
    for i in (0..padded_len).step_by(16) {
        md5_input.clear();
        md5_input.extend_from_slice(secret);
        md5_input.extend_from_slice(&block_salt);
        let digest = crypto::md5(&md5_input);

        let mut cipher_block = [0u8; 16];
        for j in 0..16 {
            cipher_block[j] = digest[j] ^ padded[i + j];
        }
        buf[value_start + i..value_start + i + 16].copy_from_slice(&cipher_block);
        block_salt = cipher_block;
    }
}

/// Append a Message-Authenticator attribute (type 80, length 18) computed as
/// HMAC-MD5 over the whole packet with the 16 value octets zeroed, and fix up
/// the header length first so the digest covers its final value.
pub fn append_message_authenticator(buf: &mut Vec<u8>, secret: &[u8]) {
    buf.push(attr::MESSAGE_AUTHENTICATOR);
    buf.push(18);
    let value_start = buf.len();
    buf.extend_from_slice(&[0u8; 16]);

    set_length(buf);

    let digest = crypto::hmac_md5(secret, buf);
    buf[value_start..value_start + 16].copy_from_slice(&digest);
}

/// Walk the attribute section `[20, data.len())`, rejecting any attribute of
/// type 0, length < 2, or that would extend past the end of `data`. Runs in
/// O(n) and halts on the first violation.
pub fn walk_attributes(data: &[u8]) -> Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        if offset + 2 > data.len() {
            return Err(RadiusError::BadResponseStructure(
                "attribute header truncated".into(),
            ));
        }
        let attr_type = data[offset];
        let attr_len = data[offset + 1] as usize;

        if attr_type == 0 {
            return Err(RadiusError::BadResponseStructure(
                "attribute type 0 is invalid".into(),
            ));
        }
        if attr_len < 2 {
            return Err(RadiusError::BadResponseStructure(format!(
                "attribute length {} is too small",
                attr_len
            )));
        }
        if offset + attr_len > data.len() {
            return Err(RadiusError::BadResponseStructure(
                "attribute overflows the packet".into(),
            ));
        }

        offset += attr_len;
    }
    Ok(())
}

/// Decode the attribute section into an AVP list. Assumes `walk_attributes`
/// has already validated `data`.
pub fn decode_attributes(data: &[u8]) -> Result<Vec<Avp>> {
    walk_attributes(data)?;

    let mut offset = 0;
    let mut out = Vec::new();
    while offset < data.len() {
        let attr_type = data[offset];
        let attr_len = data[offset + 1] as usize;
        let value = &data[offset + 2..offset + attr_len];
        out.push(decode_one(attr_type, value));
        offset += attr_len;
    }
    Ok(out)
}

fn decode_one(attr_type: u8, value: &[u8]) -> Avp {
    match attr_type {
        attr::USER_NAME | attr::REPLY_MESSAGE | attr::NAS_IDENTIFIER => Avp::new(
            attr_type,
            AvpValue::Text(String::from_utf8_lossy(value).into_owned()),
        ),
        attr::NAS_IP_ADDRESS if value.len() == 4 => Avp::new(
            attr_type,
            AvpValue::IpAddr(Ipv4Addr::new(value[0], value[1], value[2], value[3])),
        ),
        attr::NAS_IPV6_ADDRESS if value.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(value);
            Avp::new(attr_type, AvpValue::Ipv6Addr(Ipv6Addr::from(octets)))
        }
        attr::NAS_PORT | attr::SERVICE_TYPE if value.len() == 4 => {
            let bytes: [u8; 4] = value.try_into().expect("length checked above");
            Avp::new(attr_type, AvpValue::Integer(u32::from_be_bytes(bytes)))
        }
        attr::VENDOR_SPECIFIC if value.len() >= 4 => {
            let vendor_id = u32::from_be_bytes(value[0..4].try_into().expect("4 bytes"));
            let inner = &value[4..];
            if inner.len() >= 2 && inner[1] as usize == inner.len() {
                let mut decoded = decode_one(inner[0], &inner[2..]);
                decoded.vendor_id = vendor_id;
                decoded
            } else {
                Avp::vendor(vendor_id, 0, AvpValue::Bytes(inner.to_vec()))
            }
        }
        _ => Avp::new(attr_type, AvpValue::Bytes(value.to_vec())),
    }
}
