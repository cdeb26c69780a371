//! Datagram ICMP socket plumbing.
//!
//! Everything here is unprivileged: `SOCK_DGRAM` with `IPPROTO_ICMP(V6)`,
//! which most platforms expose without raw-socket capabilities. TTL is a
//! socket option, so it is set per send by the endpoint's writer lock.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::net::types::Family;

/// Maximum frame we ever expect back (standard Ethernet MTU)
pub(crate) const MAX_FRAME_LEN: usize = 1500;

/// Open an unprivileged ICMP endpoint for one family, bound to all local
/// addresses, with a bounded blocking read so reader threads can observe
/// cancellation.
pub(crate) fn bind_icmp_socket(family: Family, read_timeout: Duration) -> io::Result<Socket> {
    let (domain, protocol) = match family {
        Family::V4 => (Domain::IPV4, Protocol::ICMPV4),
        Family::V6 => (Domain::IPV6, Protocol::ICMPV6),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))?;
    socket.set_nonblocking(false)?;
    socket.set_read_timeout(Some(read_timeout))?;

    let bind_addr: SocketAddr = match family {
        Family::V4 => (Ipv4Addr::UNSPECIFIED, 0).into(),
        Family::V6 => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket.bind(&bind_addr.into())?;

    Ok(socket)
}

/// Set the outbound TTL / hop limit.
pub(crate) fn set_hop_limit(socket: &Socket, family: Family, ttl: u8) -> io::Result<()> {
    match family {
        Family::V4 => socket.set_ttl(ttl as u32),
        Family::V6 => socket.set_unicast_hops_v6(ttl as u32),
    }
}

/// Send one ICMP frame to the target.
pub(crate) fn send_frame(socket: &Socket, frame: &[u8], target: IpAddr) -> io::Result<usize> {
    let addr = SockAddr::from(SocketAddr::new(target, 0));
    socket.send_to(frame, &addr)
}

/// Receive one ICMP frame; returns its length and source address.
pub(crate) fn recv_frame(socket: &Socket, buffer: &mut [u8]) -> io::Result<(usize, IpAddr)> {
    // socket2 wants MaybeUninit; the buffer is already initialized
    let uninit: &mut [MaybeUninit<u8>] = unsafe {
        std::slice::from_raw_parts_mut(buffer.as_mut_ptr() as *mut MaybeUninit<u8>, buffer.len())
    };

    let (len, addr) = socket.recv_from(uninit)?;
    let ip = addr
        .as_socket()
        .map(|s| s.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid source address"))?;
    Ok((len, ip))
}
