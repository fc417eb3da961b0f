// client.rs - The transaction orchestrator: send_server / send_server_ctx
//
// Assembles the Encoder, Transport, and Validator into the one public
// transaction primitive. Grounded step-by-step on `rc_send_server_ctx`:
// namespace switch, secret selection order, NAS identity population, the
// ACCT-vs-AUTH packet-building branch, and final code classification
// (including the legacy Password-Ack/Password-Reject aliases) all follow
// that function's structure.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::avp::{attr, Avp, AvpValue, SERVICE_TYPE_ADMINISTRATIVE};
use crate::config::ClientConfig;
use crate::error::{RadiusError, Result};
use crate::packet::{self, code};
use crate::secret::SecretBuffer;
use crate::transport::{self, Transport};

/// Which wire variant a transaction builds: Access-Request-shaped (nonce
/// authenticator, Message-Authenticator) or Accounting-Request-shaped
/// (zeroed-then-MD5'd authenticator, no Message-Authenticator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Auth,
    Acct,
}

/// The terminal outcome of a successful transaction (a reply arrived and
/// passed validation). Anything else surfaces through `Err(RadiusError)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadiusStatus {
    Accept,
    Reject,
    Challenge,
}

/// Caller-owned request description, read-mostly by the orchestrator; only
/// `receive_pairs` is written.
pub struct RequestBundle {
    pub server_name: String,
    pub secret_override: Option<SecretBuffer>,
    pub service_port: Option<u16>,
    pub id: u8,
    pub timeout: Duration,
    pub retry_max: u32,
    pub nas_ip_address: Option<IpAddr>,
    pub send_pairs: Vec<Avp>,
    pub receive_pairs: Vec<Avp>,
}

impl RequestBundle {
    pub fn new(server_name: impl Into<String>, id: u8, send_pairs: Vec<Avp>) -> Self {
        Self {
            server_name: server_name.into(),
            secret_override: None,
            service_port: None,
            id,
            timeout: Duration::from_secs(3),
            retry_max: 3,
            nas_ip_address: None,
            send_pairs,
            receive_pairs: Vec::new(),
        }
    }
}

/// Captures the shared secret and request authenticator used for a
/// transaction, so upstream code can verify attributes encrypted against
/// them (e.g. a Tunnel-Password carried in the reply).
pub struct TransactionContext {
    pub secret: SecretBuffer,
    pub request_authenticator: [u8; 16],
}

/// Whether a namespace was entered, so the orchestrator knows to restore it
/// afterwards. Tracked as plain data rather than a borrowing RAII guard,
/// since the borrow would otherwise have to live across the mutable borrow
/// the rest of the transaction needs on the same transport.
struct NamespaceEntry(bool);

fn enter_namespace(transport: &mut dyn Transport, namespace: Option<&str>) -> Result<NamespaceEntry> {
    match namespace {
        Some(name) => {
            transport.enter_namespace(name)?;
            Ok(NamespaceEntry(true))
        }
        None => Ok(NamespaceEntry(false)),
    }
}

fn leave_namespace(transport: &mut dyn Transport, entry: NamespaceEntry) -> Result<()> {
    if entry.0 {
        transport.leave_namespace()?;
    }
    Ok(())
}

fn select_secret(
    bundle: &RequestBundle,
    config: &ClientConfig,
    transport: &dyn Transport,
    kind: RequestKind,
) -> Result<SecretBuffer> {
    if let Some(hook_secret) = transport.static_secret() {
        return Ok(hook_secret);
    }

    let is_administrative = bundle
        .send_pairs
        .iter()
        .any(|a| !a.is_vendor_specific() && a.attribute == attr::SERVICE_TYPE)
        && bundle.send_pairs.iter().any(|a| {
            !a.is_vendor_specific()
                && a.attribute == attr::SERVICE_TYPE
                && a.value == AvpValue::Integer(SERVICE_TYPE_ADMINISTRATIVE)
        });

    if is_administrative {
        return config.management_secret();
    }

    if let Some(secret) = &bundle.secret_override {
        return Ok(secret.clone());
    }

    let server = config.server(&bundle.server_name).map_err(|e| {
        tracing::error!(server = %bundle.server_name, error = %e, "radius transaction failed");
        e
    })?;
    let _ = kind; // both auth and acct share one secret per server entry
    SecretBuffer::new(server.secret.as_bytes())
}

fn destination(bundle: &RequestBundle, config: &ClientConfig, kind: RequestKind) -> Result<SocketAddr> {
    let server = config.server(&bundle.server_name).map_err(|e| {
        tracing::error!(server = %bundle.server_name, error = %e, "radius transaction failed");
        e
    })?;
    let port = bundle.service_port.unwrap_or(match kind {
        RequestKind::Auth => server.auth_port,
        RequestKind::Acct => server.acct_port,
    });
    Ok(SocketAddr::new(server.host, port))
}

fn populate_nas_identity(bundle: &mut RequestBundle, config: &ClientConfig, local_addr: IpAddr) {
    if let Some(explicit) = bundle.nas_ip_address {
        crate::avp::remove_all(&mut bundle.send_pairs, attr::NAS_IP_ADDRESS);
        crate::avp::remove_all(&mut bundle.send_pairs, attr::NAS_IPV6_ADDRESS);
        push_nas_address(&mut bundle.send_pairs, explicit);
    } else {
        let has_nas_address = crate::avp::find(&bundle.send_pairs, attr::NAS_IP_ADDRESS).is_some()
            || crate::avp::find(&bundle.send_pairs, attr::NAS_IPV6_ADDRESS).is_some();
        if !has_nas_address {
            push_nas_address(&mut bundle.send_pairs, local_addr);
        }
    }

    if let Some(nas_identifier) = &config.nas_identifier {
        crate::avp::remove_all(&mut bundle.send_pairs, attr::NAS_IDENTIFIER);
        bundle
            .send_pairs
            .push(Avp::nas_identifier(nas_identifier.clone()));
    }
}

fn push_nas_address(send_pairs: &mut Vec<Avp>, addr: IpAddr) {
    match addr {
        IpAddr::V4(v4) => send_pairs.push(Avp::nas_ip_address(v4)),
        IpAddr::V6(v6) => send_pairs.push(Avp::nas_ipv6_address(v6)),
    }
}

fn wildcard_for(dest: SocketAddr) -> SocketAddr {
    match dest {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

fn build_packet(bundle: &RequestBundle, secret: &[u8], kind: RequestKind) -> Result<(Vec<u8>, [u8; 16])> {
    let request_code = match kind {
        RequestKind::Auth => code::ACCESS_REQUEST,
        RequestKind::Acct => code::ACCOUNTING_REQUEST,
    };

    match kind {
        RequestKind::Auth => {
            let mut authenticator = [0u8; 16];
            crate::crypto::fill_request_authenticator(&mut authenticator);
            let mut buf = packet::build_header(request_code, bundle.id, authenticator);
            packet::pack_attributes(&mut buf, &bundle.send_pairs, secret)?;
            packet::set_length(&mut buf);
            packet::append_message_authenticator(&mut buf, secret);
            Ok((buf, authenticator))
        }
        RequestKind::Acct => {
            let mut buf = packet::build_header(request_code, bundle.id, [0u8; 16]);
            packet::pack_attributes(&mut buf, &bundle.send_pairs, secret)?;
            packet::set_length(&mut buf);

            let mut with_secret = buf.clone();
            with_secret.extend_from_slice(secret);
            let digest = crate::crypto::md5(&with_secret);
            buf[4..20].copy_from_slice(&digest);
            Ok((buf, digest))
        }
    }
}

fn classify(resp_code: u8) -> Result<RadiusStatus> {
    match resp_code {
        code::ACCESS_ACCEPT | code::ACCOUNTING_RESPONSE => Ok(RadiusStatus::Accept),
        code::ACCESS_REJECT => Ok(RadiusStatus::Reject),
        code::ACCESS_CHALLENGE => Ok(RadiusStatus::Challenge),
        other => Err(RadiusError::BadResponseCode(other)),
    }
}

/// Run one RADIUS transaction: select the secret, build the packet, exchange
/// it over `transport`, validate and decode the reply, and classify the
/// result. `ctx_sink`, if provided, receives the secret and request
/// authenticator used. `message_sink`, if provided, receives the
/// concatenation of every `Reply-Message` AVP in the reply.
pub fn send_server(
    bundle: &mut RequestBundle,
    config: &ClientConfig,
    transport: &mut dyn Transport,
    ctx_sink: Option<&mut Option<TransactionContext>>,
    message_sink: Option<&mut String>,
    kind: RequestKind,
) -> Result<RadiusStatus> {
    if bundle.server_name.is_empty() {
        tracing::error!("radius transaction aborted: server name is empty");
        return Err(RadiusError::EmptyServerName);
    }

    let namespace_entry = enter_namespace(transport, config.namespace.as_deref())?;

    let result = run_transaction(bundle, config, transport, kind);

    leave_namespace(transport, namespace_entry)?;

    let (mut reply, secret, request_authenticator) = result?;

    // The datagram as received may be padded past the header-declared
    // length; only that declared span is a valid RADIUS packet.
    let declared_len = u16::from_be_bytes([reply[2], reply[3]]) as usize;
    reply.truncate(declared_len);

    packet::walk_attributes(&reply[packet::HEADER_LEN..])?;
    bundle.receive_pairs = packet::decode_attributes(&reply[packet::HEADER_LEN..])?;

    if let Some(sink) = ctx_sink {
        *sink = Some(TransactionContext {
            secret: secret.clone(),
            request_authenticator,
        });
    }

    if let Some(sink) = message_sink {
        sink.push_str(&crate::avp::reply_messages(&bundle.receive_pairs));
    }

    let status = classify(reply[0]);
    match &status {
        Ok(s) => tracing::info!(server = %bundle.server_name, status = ?s, "radius transaction completed"),
        Err(e) => tracing::error!(server = %bundle.server_name, error = %e, "radius transaction failed"),
    }
    status
}

fn run_locked(
    bundle: &mut RequestBundle,
    config: &ClientConfig,
    transport: &mut dyn Transport,
    secret: &SecretBuffer,
    kind: RequestKind,
) -> Result<(Vec<u8>, [u8; 16])> {
    let dest = destination(bundle, config, kind)?;
    transport.bind(wildcard_for(dest))?;
    transport.discover_route(dest)?;

    if dest.is_ipv6() && config.use_public_addr {
        transport.prefer_public_source(true)?;
    }

    let local_addr = transport.local_addr()?.ip();
    populate_nas_identity(bundle, config, local_addr);

    let (packet_bytes, request_authenticator) = build_packet(bundle, secret.as_bytes(), kind)?;

    let reply = transport::exchange(
        transport,
        &packet_bytes,
        dest,
        bundle.timeout,
        bundle.retry_max,
        bundle.id,
        secret.as_bytes(),
        &request_authenticator,
    )
    .map_err(|e| {
        tracing::error!(
            server = %bundle.server_name,
            port = dest.port(),
            error = %e,
            "radius transaction failed"
        );
        e
    })?;

    Ok((reply, request_authenticator))
}

fn run_transaction(
    bundle: &mut RequestBundle,
    config: &ClientConfig,
    transport: &mut dyn Transport,
    kind: RequestKind,
) -> Result<(Vec<u8>, SecretBuffer, [u8; 16])> {
    let secret = select_secret(bundle, config, transport, kind)?;

    transport.lock()?;
    let lock_result = run_locked(bundle, config, transport, &secret, kind);
    transport.unlock()?;

    let (reply, request_authenticator) = lock_result?;
    Ok((reply, secret, request_authenticator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::Avp;
    use std::collections::HashMap;

    fn config_with_server(secret: &str) -> ClientConfig {
        let mut servers = HashMap::new();
        servers.insert(
            "primary".to_string(),
            crate::config::ServerEntry {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                auth_port: 1812,
                acct_port: 1813,
                secret: secret.to_string(),
            },
        );
        ClientConfig {
            servers,
            namespace: None,
            nas_identifier: Some("test-nas".to_string()),
            use_public_addr: false,
            management_secret: None,
            timeout_secs: 1,
            retry_max: 1,
        }
    }

    #[test]
    fn select_secret_prefers_administrative_service_type() {
        let mut config = config_with_server("user-secret");
        config.management_secret = Some("mgmt-secret".to_string());

        let mut bundle = RequestBundle::new(
            "primary",
            1,
            vec![Avp::service_type(SERVICE_TYPE_ADMINISTRATIVE)],
        );
        bundle.secret_override = Some(SecretBuffer::new("override-secret").unwrap());

        let transport = crate::transport::UdpTransport::new();
        let secret = select_secret(&bundle, &config, &transport, RequestKind::Auth).unwrap();
        assert_eq!(secret.as_bytes(), b"mgmt-secret");
    }

    #[test]
    fn select_secret_falls_back_to_server_table() {
        let config = config_with_server("user-secret");
        let bundle = RequestBundle::new("primary", 1, vec![]);
        let transport = crate::transport::UdpTransport::new();
        let secret = select_secret(&bundle, &config, &transport, RequestKind::Auth).unwrap();
        assert_eq!(secret.as_bytes(), b"user-secret");
    }

    #[test]
    fn classify_maps_known_codes() {
        assert_eq!(classify(code::ACCESS_ACCEPT).unwrap(), RadiusStatus::Accept);
        assert_eq!(classify(code::ACCESS_REJECT).unwrap(), RadiusStatus::Reject);
        assert_eq!(classify(code::ACCESS_CHALLENGE).unwrap(), RadiusStatus::Challenge);
        assert_eq!(classify(code::ACCOUNTING_RESPONSE).unwrap(), RadiusStatus::Accept);
        assert!(classify(code::STATUS_SERVER).is_err());
    }

    #[test]
    fn populate_nas_identity_inserts_local_address_when_absent() {
        let config = config_with_server("secret");
        let mut bundle = RequestBundle::new("primary", 1, vec![]);
        populate_nas_identity(&mut bundle, &config, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        let found = crate::avp::find(&bundle.send_pairs, attr::NAS_IP_ADDRESS).unwrap();
        assert_eq!(found.value, AvpValue::IpAddr(Ipv4Addr::new(10, 0, 0, 5)));
        let nas_id = crate::avp::find(&bundle.send_pairs, attr::NAS_IDENTIFIER).unwrap();
        assert_eq!(nas_id.value, AvpValue::Text("test-nas".to_string()));
    }

    #[test]
    fn populate_nas_identity_respects_caller_supplied_address() {
        let config = config_with_server("secret");
        let mut bundle = RequestBundle::new(
            "primary",
            1,
            vec![Avp::nas_ip_address(Ipv4Addr::new(192, 168, 1, 1))],
        );
        populate_nas_identity(&mut bundle, &config, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        let found = crate::avp::find(&bundle.send_pairs, attr::NAS_IP_ADDRESS).unwrap();
        assert_eq!(found.value, AvpValue::IpAddr(Ipv4Addr::new(192, 168, 1, 1)));
    }
}
