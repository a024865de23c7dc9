use anyhow::anyhow;
use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use crate::probe::ProbeError;

/// Result of receiving one ICMP datagram
#[derive(Debug)]
pub struct RecvResult {
    pub len: usize,
    pub source: IpAddr,
}

/// Check that raw ICMP sockets can be opened, with a hint on how to fix it
pub fn check_permissions() -> anyhow::Result<()> {
    match create_raw_icmp_socket(Duration::from_secs(1)) {
        Ok(_) => Ok(()),
        Err(e) if e.is_permission_denied() => {
            let binary_path = std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "icmptrace".to_string());

            Err(anyhow!(
                "Insufficient permissions for raw sockets.\n\n\
                 Fix options:\n\
                 \u{2022} Run with sudo: sudo icmptrace <target>\n\
                 \u{2022} Add capability: sudo setcap cap_net_raw+ep {}",
                binary_path
            ))
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a raw ICMPv4 socket with blocking send/receive timeouts
pub fn create_raw_icmp_socket(timeout: Duration) -> Result<Socket, ProbeError> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(|e| ProbeError::transport("create raw ICMP socket", e))?;

    socket
        .set_nonblocking(false)
        .map_err(|e| ProbeError::transport("set blocking mode", e))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::transport("set read timeout", e))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::transport("set write timeout", e))?;

    Ok(socket)
}

/// Bind socket to any local address
pub fn bind_any(socket: &Socket) -> Result<(), ProbeError> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| ProbeError::transport("bind", e))
}

/// Set TTL on a socket
pub fn set_ttl(socket: &Socket, ttl: u8) -> Result<(), ProbeError> {
    socket
        .set_ttl(ttl as u32)
        .map_err(|e| ProbeError::transport("set IP_TTL", e))
}

/// Send ICMP packet to target
pub fn send_icmp(socket: &Socket, packet: &[u8], target: Ipv4Addr) -> Result<usize, ProbeError> {
    let addr = SocketAddr::V4(SocketAddrV4::new(target, 0));
    socket
        .send_to(packet, &SockAddr::from(addr))
        .map_err(|e| ProbeError::transport("send", e))
}

/// Block until the socket is readable or `budget` elapses.
///
/// Returns false on timeout. A poll interrupted by a signal resumes with
/// whatever is left of the budget.
pub fn wait_readable(socket: &Socket, budget: Duration) -> Result<bool, ProbeError> {
    let deadline = Instant::now() + budget;
    let mut pfd = libc::pollfd {
        fd: socket.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let ret = unsafe { libc::poll(&mut pfd, 1, poll_timeout_ms(remaining)) };
        if ret >= 0 {
            return Ok(ret > 0 && (pfd.revents & libc::POLLIN) != 0);
        }

        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(ProbeError::transport("poll", err));
        }
        if remaining.is_zero() {
            return Ok(false);
        }
        debug!("poll interrupted, {:?} left", remaining);
    }
}

/// Milliseconds for poll(2), clamped to c_int
fn poll_timeout_ms(remaining: Duration) -> libc::c_int {
    remaining.as_millis().min(libc::c_int::MAX as u128) as libc::c_int
}

/// Receive one ICMP datagram along with its source address
pub fn recv_icmp(socket: &Socket, buffer: &mut [u8]) -> Result<RecvResult, ProbeError> {
    let mut src_storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut src_len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    let len = unsafe {
        libc::recvfrom(
            socket.as_raw_fd(),
            buffer.as_mut_ptr() as *mut libc::c_void,
            buffer.len(),
            0,
            &mut src_storage as *mut _ as *mut libc::sockaddr,
            &mut src_len,
        )
    };

    if len < 0 {
        return Err(ProbeError::transport("receive", std::io::Error::last_os_error()));
    }

    let source = parse_sockaddr_storage(&src_storage)?;
    Ok(RecvResult {
        len: len as usize,
        source,
    })
}

/// Parse sockaddr_storage to IpAddr
fn parse_sockaddr_storage(storage: &libc::sockaddr_storage) -> Result<IpAddr, ProbeError> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let addr: &libc::sockaddr_in = unsafe { &*(storage as *const _ as *const _) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            Ok(IpAddr::V4(ip))
        }
        family => Err(ProbeError::transport(
            "receive",
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected address family: {}", family),
            ),
        )),
    }
}
