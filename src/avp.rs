// avp.rs - Attribute-value pairs
//
// An ordered, owned sequence stands in for the original linked list: the
// link shape was convenient for the C implementation but isn't load-bearing,
// since encoding order (which is observable on the wire) is just iteration
// order over a Vec.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Well-known RADIUS attribute numbers (RFC 2865 / 2866 / 3162 / 3579).
pub mod attr {
    pub const USER_NAME: u8 = 1;
    pub const USER_PASSWORD: u8 = 2;
    pub const CHAP_PASSWORD: u8 = 3;
    pub const NAS_IP_ADDRESS: u8 = 4;
    pub const NAS_PORT: u8 = 5;
    pub const SERVICE_TYPE: u8 = 6;
    pub const FRAMED_PROTOCOL: u8 = 7;
    pub const REPLY_MESSAGE: u8 = 18;
    pub const STATE: u8 = 24;
    pub const CLASS: u8 = 25;
    pub const VENDOR_SPECIFIC: u8 = 26;
    pub const CALLED_STATION_ID: u8 = 30;
    pub const CALLING_STATION_ID: u8 = 31;
    pub const NAS_IDENTIFIER: u8 = 32;
    pub const ACCT_STATUS_TYPE: u8 = 40;
    pub const NAS_IPV6_ADDRESS: u8 = 95;
    pub const MESSAGE_AUTHENTICATOR: u8 = 80;
}

/// `Service-Type` value identifying a management/administrative session.
pub const SERVICE_TYPE_ADMINISTRATIVE: u32 = 6;

/// The type tag an AVP's value is interpreted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Integer,
    IpAddr,
    Ipv6Addr,
    Ipv6Prefix,
    Date,
}

/// An attribute's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AvpValue {
    /// UTF-8 text or opaque bytes (RADIUS does not distinguish the two on
    /// the wire; `Text` is a convenience for attributes known to be text).
    Text(String),
    Bytes(Vec<u8>),
    Integer(u32),
    IpAddr(Ipv4Addr),
    Ipv6Addr(Ipv6Addr),
    Ipv6Prefix { prefix_len: u8, addr: Ipv6Addr },
    /// Seconds since the Unix epoch.
    Date(u32),
}

impl AvpValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AvpValue::Text(_) | AvpValue::Bytes(_) => AttributeType::String,
            AvpValue::Integer(_) => AttributeType::Integer,
            AvpValue::IpAddr(_) => AttributeType::IpAddr,
            AvpValue::Ipv6Addr(_) => AttributeType::Ipv6Addr,
            AvpValue::Ipv6Prefix { .. } => AttributeType::Ipv6Prefix,
            AvpValue::Date(_) => AttributeType::Date,
        }
    }

    /// Raw bytes as they should be copied onto the wire for STRING/opaque
    /// payloads. Integer-shaped values are handled separately by the encoder.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            AvpValue::Text(s) => s.as_bytes().to_vec(),
            AvpValue::Bytes(b) => b.clone(),
            AvpValue::Ipv6Addr(addr) => addr.octets().to_vec(),
            AvpValue::Ipv6Prefix { prefix_len, addr } => {
                let mut v = Vec::with_capacity(2 + 16);
                v.push(0); // reserved
                v.push(*prefix_len);
                v.extend_from_slice(&addr.octets());
                v
            }
            AvpValue::Integer(_) | AvpValue::IpAddr(_) | AvpValue::Date(_) => Vec::new(),
        }
    }
}

/// A single attribute-value pair: a (possibly vendor-scoped) attribute
/// number and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Avp {
    /// IANA vendor id, or 0 if this is a standard (non-vendor) attribute.
    pub vendor_id: u32,
    pub attribute: u8,
    pub value: AvpValue,
}

impl Avp {
    pub fn new(attribute: u8, value: AvpValue) -> Self {
        Self {
            vendor_id: 0,
            attribute,
            value,
        }
    }

    pub fn vendor(vendor_id: u32, attribute: u8, value: AvpValue) -> Self {
        Self {
            vendor_id,
            attribute,
            value,
        }
    }

    pub fn user_name(name: impl Into<String>) -> Self {
        Self::new(attr::USER_NAME, AvpValue::Text(name.into()))
    }

    /// User-Password carried as plaintext; the encoder obfuscates it per
    /// RFC 2865 §5.2 at pack time. Never emitted verbatim onto the wire.
    pub fn user_password(password: impl Into<String>) -> Self {
        Self::new(attr::USER_PASSWORD, AvpValue::Text(password.into()))
    }

    pub fn nas_ip_address(addr: Ipv4Addr) -> Self {
        Self::new(attr::NAS_IP_ADDRESS, AvpValue::IpAddr(addr))
    }

    pub fn nas_ipv6_address(addr: Ipv6Addr) -> Self {
        Self::new(attr::NAS_IPV6_ADDRESS, AvpValue::Ipv6Addr(addr))
    }

    pub fn nas_port(port: u32) -> Self {
        Self::new(attr::NAS_PORT, AvpValue::Integer(port))
    }

    pub fn nas_identifier(id: impl Into<String>) -> Self {
        Self::new(attr::NAS_IDENTIFIER, AvpValue::Text(id.into()))
    }

    pub fn service_type(value: u32) -> Self {
        Self::new(attr::SERVICE_TYPE, AvpValue::Integer(value))
    }

    pub fn state(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(attr::STATE, AvpValue::Bytes(bytes.into()))
    }

    pub fn reply_message(message: impl Into<String>) -> Self {
        Self::new(attr::REPLY_MESSAGE, AvpValue::Text(message.into()))
    }

    pub fn is_vendor_specific(&self) -> bool {
        self.vendor_id != 0
    }
}

/// Find the first AVP with the given (non-vendor) attribute number.
pub fn find(avps: &[Avp], attribute: u8) -> Option<&Avp> {
    avps.iter()
        .find(|a| !a.is_vendor_specific() && a.attribute == attribute)
}

/// Remove every AVP with the given (non-vendor) attribute number.
pub fn remove_all(avps: &mut Vec<Avp>, attribute: u8) {
    avps.retain(|a| a.is_vendor_specific() || a.attribute != attribute);
}

/// Concatenate the text of every `Reply-Message` AVP, each on its own line.
pub fn reply_messages(avps: &[Avp]) -> String {
    let mut out = String::new();
    for avp in avps {
        if avp.is_vendor_specific() || avp.attribute != attr::REPLY_MESSAGE {
            continue;
        }
        if let AvpValue::Text(text) = &avp.value {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_skips_vendor_scoped_attributes_with_same_number() {
        let avps = vec![
            Avp::vendor(9, attr::USER_NAME, AvpValue::Text("vendor".into())),
            Avp::user_name("plain"),
        ];
        let found = find(&avps, attr::USER_NAME).unwrap();
        assert_eq!(found.value, AvpValue::Text("plain".into()));
    }

    #[test]
    fn reply_messages_join_with_newline() {
        let avps = vec![
            Avp::reply_message("first"),
            Avp::reply_message("second"),
        ];
        assert_eq!(reply_messages(&avps), "first\nsecond\n");
    }

    #[test]
    fn remove_all_preserves_vendor_scoped_entries() {
        let mut avps = vec![
            Avp::nas_ip_address(Ipv4Addr::new(10, 0, 0, 1)),
            Avp::vendor(9, attr::NAS_IP_ADDRESS, AvpValue::Integer(1)),
        ];
        remove_all(&mut avps, attr::NAS_IP_ADDRESS);
        assert_eq!(avps.len(), 1);
        assert!(avps[0].is_vendor_specific());
    }
}
