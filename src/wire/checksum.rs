//! The Internet checksum (RFC 1071).
//!
//! All functions return the folded one's-complement sum, not its complement;
//! callers verify with `== !0` and fill with the bitwise negation.

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use super::ipv4::Protocol;

fn fold(mut accum: u32) -> u16 {
    while accum >> 16 != 0 {
        accum = (accum >> 16) + (accum & 0xffff);
    }
    accum as u16
}

/// Sum a byte buffer as big-endian 16-bit words; an odd trailing byte is
/// padded with zero on the right.
pub fn data(buffer: &[u8]) -> u16 {
    let mut accum: u32 = 0;
    let mut chunks = buffer.chunks_exact(2);
    for chunk in chunks.by_ref() {
        accum += u32::from(NetworkEndian::read_u16(chunk));
    }
    if let [last] = chunks.remainder() {
        accum += u32::from(*last) << 8;
    }
    fold(accum)
}

/// Combine several partial checksums.
pub fn combine(checksums: &[u16]) -> u16 {
    fold(checksums.iter().map(|&sum| u32::from(sum)).sum())
}

/// The pseudo-header contribution to an upper-layer checksum: source and
/// destination address, zero-padded protocol, and upper-layer length.
pub fn pseudo_header(src_addr: &Ipv4Addr, dst_addr: &Ipv4Addr, protocol: Protocol, length: u32) -> u16 {
    combine(&[
        data(&src_addr.octets()),
        data(&dst_addr.octets()),
        u16::from(u8::from(protocol)),
        (length >> 16) as u16,
        length as u16,
    ])
}
