use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpType, IcmpTypes, checksum};
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::MutablePacket;
use thiserror::Error;

use crate::net::types::Family;

/// ICMP header size (fixed, both families)
pub const ICMP_HEADER_LEN: usize = 8;
/// IPv6 header size (fixed; quoted packets carry no extension headers)
pub const IPV6_HEADER_LEN: usize = 40;

// ICMPv4 type codes
const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV4_TIME_EXCEEDED: u8 = 11;

// ICMPv6 type codes
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;
const ICMPV6_TIME_EXCEEDED: u8 = 3;

/// A frame the dispatcher knows how to act on.
///
/// For Time-Exceeded the identifier and sequence are the ones quoted from
/// the original Echo request that expired in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedIcmp {
    EchoReply { id: u16, seq: u16 },
    TimeExceeded { inner_id: u16, inner_seq: u16 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),
    #[error("unsupported icmp type {0}")]
    UnknownType(u8),
    #[error("quoted packet too short: {0} bytes")]
    InnerTruncated(usize),
}

/// Build an ICMP Echo request frame.
///
/// Identifier and sequence are written big-endian. The IPv4 checksum is
/// computed here; for IPv6 it is left zero because the kernel fills it in
/// when the frame leaves a datagram ICMPv6 socket.
pub fn encode_echo(family: Family, id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_LEN + payload.len()];

    let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
    match family {
        Family::V4 => packet.set_icmp_type(IcmpTypes::EchoRequest),
        Family::V6 => packet.set_icmp_type(IcmpType::new(ICMPV6_ECHO_REQUEST)),
    }
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(id);
    packet.set_sequence_number(seq);
    packet.payload_mut().copy_from_slice(payload);

    if family == Family::V4 {
        let cksum = checksum(&IcmpPacket::new(&buffer).unwrap());
        let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
        packet.set_checksum(cksum);
    }

    buffer
}

/// Parse a received ICMP frame.
///
/// Frames are as delivered by datagram ICMP sockets: they start at the
/// ICMP header for both families, with no outer IP header.
pub fn decode(family: Family, data: &[u8]) -> Result<ParsedIcmp, DecodeError> {
    if data.len() < ICMP_HEADER_LEN {
        return Err(DecodeError::Truncated(data.len()));
    }

    match (family, data[0]) {
        (Family::V4, ICMPV4_ECHO_REPLY) | (Family::V6, ICMPV6_ECHO_REPLY) => Ok(ParsedIcmp::EchoReply {
            id: u16::from_be_bytes([data[4], data[5]]),
            seq: u16::from_be_bytes([data[6], data[7]]),
        }),
        (Family::V4, ICMPV4_TIME_EXCEEDED) => decode_time_exceeded_v4(&data[ICMP_HEADER_LEN..]),
        (Family::V6, ICMPV6_TIME_EXCEEDED) => decode_time_exceeded_v6(&data[ICMP_HEADER_LEN..]),
        (_, other) => Err(DecodeError::UnknownType(other)),
    }
}

/// The quoted payload starts with the original IPv4 header; the 8-byte
/// Echo header we are after sits right behind it, at the IHL offset.
fn decode_time_exceeded_v4(quoted: &[u8]) -> Result<ParsedIcmp, DecodeError> {
    if quoted.is_empty() {
        return Err(DecodeError::InnerTruncated(0));
    }
    let ihl = ((quoted[0] & 0x0f) as usize) * 4;
    if quoted.len() < ihl + ICMP_HEADER_LEN {
        return Err(DecodeError::InnerTruncated(quoted.len()));
    }
    let inner = &quoted[ihl..];
    Ok(ParsedIcmp::TimeExceeded {
        inner_id: u16::from_be_bytes([inner[4], inner[5]]),
        inner_seq: u16::from_be_bytes([inner[6], inner[7]]),
    })
}

/// The quoted payload starts with the original IPv6 header (no extension
/// headers on our own probes). Whatever follows is normally our Echo
/// request; anything else at least 8 bytes long is read at the same
/// offsets as a last resort.
fn decode_time_exceeded_v6(quoted: &[u8]) -> Result<ParsedIcmp, DecodeError> {
    if quoted.len() < IPV6_HEADER_LEN {
        return Err(DecodeError::InnerTruncated(quoted.len()));
    }
    let inner = &quoted[IPV6_HEADER_LEN..];
    if inner.len() < ICMP_HEADER_LEN {
        return Err(DecodeError::InnerTruncated(inner.len()));
    }
    Ok(ParsedIcmp::TimeExceeded {
        inner_id: u16::from_be_bytes([inner[4], inner[5]]),
        inner_seq: u16::from_be_bytes([inner[6], inner[7]]),
    })
}
