// transport.rs - Transport hook abstraction and the retry/poll engine
//
// One trait models the original's record of function pointers (get_fd,
// sendto, recvfrom, lock/unlock, close_fd, static_secret); UdpTransport is
// the plain-UDP implementation, with room for a DTLS-wrapped hook beside it.
// The retry loop is the explicit state machine the design notes call for:
// SEND, WAIT, VALIDATE, DONE, with WAIT holding its own deadline/budget.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::crypto::Budget;
use crate::error::{RadiusError, Result};
use crate::validate::{self, ReplyCheck};

/// Transport hook capabilities a transaction needs: socket acquisition,
/// datagram send/receive, optional serialization around shared state, and a
/// best-effort IPv6 source address preference.
pub trait Transport: Send {
    /// Acquire a socket bound near `local_hint` (a wildcard address means
    /// "pick any local address").
    fn bind(&mut self, local_hint: SocketAddr) -> Result<()>;

    /// The address the transport ended up bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Let the kernel resolve which local address its routing table would
    /// use to reach `dest`, so `local_addr` reports a real outbound
    /// interface address instead of the wildcard it was bound to. Default:
    /// no-op, for transports where `local_addr` is already meaningful.
    fn discover_route(&self, _dest: SocketAddr) -> Result<()> {
        Ok(())
    }

    /// Send one datagram. Signal interruption is retried internally.
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize>;

    /// Wait up to `timeout` for one datagram. `Ok(None)` means the timeout
    /// elapsed with nothing to read; interruption and spurious wakeups are
    /// folded into the same `Ok(None)` so the caller re-polls with whatever
    /// budget remains.
    fn recv_from(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<(usize, SocketAddr)>>;

    /// Serialize access to shared transport state across one transaction's
    /// full send/receive loop. Default: no locking.
    fn lock(&self) -> Result<()> {
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        Ok(())
    }

    /// Best-effort preference for a non-temporary IPv6 source address.
    /// Platforms without a matching socket option log and continue.
    fn prefer_public_source(&self, _enable: bool) -> Result<()> {
        tracing::info!(
            "preferring a non-temporary IPv6 source address is not supported on this transport"
        );
        Ok(())
    }

    /// Switch into the named network namespace before binding. A no-op
    /// default; only meaningful on Linux, where the original switches via
    /// `setns(2)` around the socket's lifetime.
    fn enter_namespace(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// Restore the namespace entered by [`Transport::enter_namespace`].
    fn leave_namespace(&self) -> Result<()> {
        Ok(())
    }

    /// A hook-provided secret that supersedes every other selection rule.
    fn static_secret(&self) -> Option<crate::secret::SecretBuffer> {
        None
    }
}

/// Plain UDP transport.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    origin_netns: std::sync::Mutex<Option<std::fs::File>>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self {
            socket: None,
            origin_netns: std::sync::Mutex::new(None),
        }
    }

    fn socket(&self) -> &UdpSocket {
        self.socket
            .as_ref()
            .expect("Transport::bind must be called before use")
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, local_hint: SocketAddr) -> Result<()> {
        let socket = UdpSocket::bind(local_hint)?;
        let sock_ref = socket2::Socket::from(socket);
        // Best-effort: a larger buffer reduces drops under bursty retry
        // traffic, but its absence is not fatal.
        let _ = sock_ref.set_recv_buffer_size(256 * 1024);
        let _ = sock_ref.set_send_buffer_size(256 * 1024);
        self.socket = Some(sock_ref.into());
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket().local_addr()?)
    }

    /// `connect()` a UDP socket without exchanging any packets; it just
    /// asks the kernel to pick a route to `dest` and records the source
    /// address that route would use, which `local_addr` then reports.
    /// Matches `rc_get_srcaddr`'s use of a connected probe socket.
    fn discover_route(&self, dest: SocketAddr) -> Result<()> {
        self.socket().connect(dest)?;
        Ok(())
    }

    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        loop {
            match self.socket().send_to(buf, dest) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if is_network_unreachable(&e) => return Err(RadiusError::NetworkUnreachable),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn recv_from(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<(usize, SocketAddr)>> {
        if timeout.is_zero() {
            return Ok(None);
        }
        self.socket().set_read_timeout(Some(timeout))?;
        match self.socket().recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(target_os = "linux")]
    fn enter_namespace(&self, name: &str) -> Result<()> {
        use std::os::unix::io::AsRawFd;

        let origin = std::fs::File::open("/proc/self/ns/net")?;

        let path = format!("/var/run/netns/{}", name);
        let target = std::fs::File::open(&path).map_err(|e| RadiusError::Namespace {
            namespace: name.to_string(),
            reason: e.to_string(),
        })?;
        let ret = unsafe { libc::setns(target.as_raw_fd(), libc::CLONE_NEWNET) };
        if ret != 0 {
            return Err(RadiusError::Namespace {
                namespace: name.to_string(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }

        *self.origin_netns.lock().map_err(|e| RadiusError::Lock(e.to_string()))? = Some(origin);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn leave_namespace(&self) -> Result<()> {
        use std::os::unix::io::AsRawFd;

        let mut guard = self
            .origin_netns
            .lock()
            .map_err(|e| RadiusError::Lock(e.to_string()))?;
        let Some(origin) = guard.take() else {
            return Ok(());
        };
        let ret = unsafe { libc::setns(origin.as_raw_fd(), libc::CLONE_NEWNET) };
        if ret != 0 {
            return Err(RadiusError::Namespace {
                namespace: "<origin>".to_string(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn prefer_public_source(&self, enable: bool) -> Result<()> {
        use std::os::unix::io::AsRawFd;

        if !enable {
            return Ok(());
        }
        let fd = self.socket().as_raw_fd();
        let pref: libc::c_int = libc::IPV6_PREFER_SRC_PUBLIC;
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::IPPROTO_IPV6,
                libc::IPV6_ADDR_PREFERENCES,
                &pref as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}

#[cfg(unix)]
fn is_network_unreachable(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENETUNREACH)
}

#[cfg(not(unix))]
fn is_network_unreachable(_e: &std::io::Error) -> bool {
    false
}

/// The retry/poll state machine. `WAIT` carries its own deadline and budget
/// explicitly, so timeout accounting is a data transformation rather than
/// implicit control flow.
enum State {
    Send,
    Wait(Budget),
    Done(Vec<u8>),
}

/// Send `packet` and wait for a validated reply, retrying up to
/// `retry_max + 1` total send attempts.
///
/// Datagrams whose id does not match `expected_id` are discarded silently
/// and do not consume a retry (shared transports such as DTLS can deliver
/// duplicates or stragglers). A digest mismatch on a matching id is returned
/// immediately without retrying, since the id match means this is almost
/// certainly the real reply, just corrupted or forged.
#[allow(clippy::too_many_arguments)]
pub fn exchange(
    transport: &dyn Transport,
    packet: &[u8],
    dest: SocketAddr,
    timeout: Duration,
    retry_max: u32,
    expected_id: u8,
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<u8>> {
    let mut attempts: u32 = 0;
    let mut recv_buf = vec![0u8; crate::packet::MAX_PACKET_LEN];
    let mut state = State::Send;

    loop {
        state = match state {
            State::Send => {
                transport.send_to(packet, dest)?;
                attempts += 1;
                State::Wait(Budget::new(timeout))
            }
            State::Wait(mut budget) => {
                if budget.is_exhausted() {
                    if attempts > retry_max {
                        return Err(RadiusError::Timeout);
                    }
                    State::Send
                } else {
                    let before = Instant::now();
                    let received = transport.recv_from(&mut recv_buf, budget.remaining())?;
                    budget.consume(before.elapsed());

                    match received {
                        None => State::Wait(budget),
                        Some((n, _peer)) => match validate::check_reply(
                            &recv_buf[..n],
                            secret,
                            request_authenticator,
                            expected_id,
                        ) {
                            Ok(ReplyCheck::BadId) => {
                                tracing::debug!("discarding reply with mismatched id");
                                State::Wait(budget)
                            }
                            Ok(ReplyCheck::Ok) => State::Done(recv_buf[..n].to_vec()),
                            Ok(ReplyCheck::BadDigest) => {
                                return Err(RadiusError::BadResponseDigest)
                            }
                            Err(e) => return Err(e),
                        },
                    }
                }
            }
            State::Done(datagram) => return Ok(datagram),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::packet::{self, code};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// An in-process transport standing in for a real socket: queues
    /// pre-baked datagrams to "arrive" and counts send attempts.
    struct FakeTransport {
        sends: AtomicU32,
        inbox: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeTransport {
        fn new(inbox: Vec<Vec<u8>>) -> Self {
            Self {
                sends: AtomicU32::new(0),
                inbox: Mutex::new(inbox),
            }
        }
    }

    impl Transport for FakeTransport {
        fn bind(&mut self, _local_hint: SocketAddr) -> Result<()> {
            Ok(())
        }
        fn local_addr(&self) -> Result<SocketAddr> {
            Ok("0.0.0.0:0".parse().unwrap())
        }
        fn send_to(&self, _buf: &[u8], _dest: SocketAddr) -> Result<usize> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(_buf.len())
        }
        fn recv_from(
            &self,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> Result<Option<(usize, SocketAddr)>> {
            let mut inbox = self.inbox.lock().unwrap();
            if inbox.is_empty() {
                return Ok(None);
            }
            let datagram = inbox.remove(0);
            buf[..datagram.len()].copy_from_slice(&datagram);
            Ok(Some((datagram.len(), "127.0.0.1:1812".parse().unwrap())))
        }
    }

    fn signed_reply(resp_code: u8, id: u8, secret: &[u8], request_authenticator: [u8; 16]) -> Vec<u8> {
        let mut buf = packet::build_header(resp_code, id, [0u8; 16]);
        packet::set_length(&mut buf);
        let mut with_secret = buf.clone();
        with_secret[4..20].copy_from_slice(&request_authenticator);
        with_secret.extend_from_slice(secret);
        let digest = crypto::md5(&with_secret);
        buf[4..20].copy_from_slice(&digest);
        buf
    }

    #[test]
    fn duplicate_id_mismatch_then_success_costs_one_send() {
        let secret = b"xyzzy5461";
        let request_authenticator = [0x0fu8; 16];
        let stray = signed_reply(code::ACCESS_ACCEPT, 9, secret, request_authenticator);
        let real = signed_reply(code::ACCESS_ACCEPT, 4, secret, request_authenticator);

        let transport = FakeTransport::new(vec![stray, real]);
        let packet = packet::build_header(code::ACCESS_REQUEST, 4, request_authenticator);

        let result = exchange(
            &transport,
            &packet,
            "127.0.0.1:1812".parse().unwrap(),
            Duration::from_secs(1),
            2,
            4,
            secret,
            &request_authenticator,
        )
        .unwrap();

        assert_eq!(result[1], 4);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bad_digest_returns_without_retrying() {
        let secret = b"xyzzy5461";
        let request_authenticator = [0x0fu8; 16];
        let mut corrupted = signed_reply(code::ACCESS_ACCEPT, 4, secret, request_authenticator);
        corrupted[4] ^= 0x01;

        let transport = FakeTransport::new(vec![corrupted]);
        let packet = packet::build_header(code::ACCESS_REQUEST, 4, request_authenticator);

        let result = exchange(
            &transport,
            &packet,
            "127.0.0.1:1812".parse().unwrap(),
            Duration::from_secs(1),
            2,
            4,
            secret,
            &request_authenticator,
        );
        assert!(matches!(result, Err(RadiusError::BadResponseDigest)));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn undersized_datagram_is_a_hard_failure_not_a_retry() {
        let transport = FakeTransport::new(vec![vec![0u8; 10]]);
        let packet = packet::build_header(code::ACCESS_REQUEST, 4, [0u8; 16]);

        let result = exchange(
            &transport,
            &packet,
            "127.0.0.1:1812".parse().unwrap(),
            Duration::from_secs(1),
            2,
            4,
            b"secret",
            &[0u8; 16],
        );
        assert!(matches!(result, Err(RadiusError::BadResponseLength)));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausting_the_budget_retries_then_times_out() {
        let transport = FakeTransport::new(vec![]);
        let packet = packet::build_header(code::ACCESS_REQUEST, 4, [0u8; 16]);

        let result = exchange(
            &transport,
            &packet,
            "127.0.0.1:1812".parse().unwrap(),
            Duration::from_millis(1),
            2,
            4,
            b"secret",
            &[0u8; 16],
        );

        assert!(matches!(result, Err(RadiusError::Timeout)));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);
    }
}
