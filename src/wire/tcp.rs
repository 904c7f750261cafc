//! The TCP segment header, RFC 793.
//!
//! The header codec is plain field access; [`Segment`] maps a whole segment
//! onto the sender/receiver message pair the protocol logic exchanges. The
//! checksum covers the segment and the IPv4 pseudo header, so both parse and
//! serialize need the addresses of the enclosing datagram.

use core::fmt;
use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use super::checksum;
use super::ipv4::Protocol;
use super::{Error, Result};
use crate::tcp::{Message, ReceiverMessage, SenderMessage, Wrap32};

mod field {
    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const FLAGS: Field = 12..14;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;

    pub const FLG_FIN: u16 = 0x001;
    pub const FLG_SYN: u16 = 0x002;
    pub const FLG_RST: u16 = 0x004;
    pub const FLG_PSH: u16 = 0x008;
    pub const FLG_ACK: u16 = 0x010;
}

/// Length of a header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// A read/write wrapper around a TCP segment buffer.
#[derive(Debug, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with segment structure.
    pub fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the data
    /// offset claims, `Err(Error::Malformed)` if the data offset is below the
    /// minimum header length.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let header_len = usize::from(self.header_len());
        if header_len < HEADER_LEN {
            Err(Error::Malformed)
        } else if len < header_len {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the source port field.
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::SRC_PORT])
    }

    /// Return the destination port field.
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::DST_PORT])
    }

    /// Return the sequence number field.
    pub fn seq_number(&self) -> Wrap32 {
        Wrap32::new(NetworkEndian::read_u32(&self.buffer.as_ref()[field::SEQ_NUM]))
    }

    /// Return the acknowledgment number field.
    pub fn ack_number(&self) -> Wrap32 {
        Wrap32::new(NetworkEndian::read_u32(&self.buffer.as_ref()[field::ACK_NUM]))
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> u8 {
        let raw = NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    fn flag(&self, mask: u16) -> bool {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLAGS]) & mask != 0
    }

    /// Return the FIN flag.
    pub fn fin(&self) -> bool {
        self.flag(field::FLG_FIN)
    }

    /// Return the SYN flag.
    pub fn syn(&self) -> bool {
        self.flag(field::FLG_SYN)
    }

    /// Return the RST flag.
    pub fn rst(&self) -> bool {
        self.flag(field::FLG_RST)
    }

    /// Return the PSH flag.
    pub fn psh(&self) -> bool {
        self.flag(field::FLG_PSH)
    }

    /// Return the ACK flag.
    pub fn ack(&self) -> bool {
        self.flag(field::FLG_ACK)
    }

    /// Return the window size field.
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::WIN_SIZE])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::URGENT])
    }

    /// Validate the segment checksum against the IPv4 pseudo header.
    pub fn verify_checksum(&self, src_addr: &Ipv4Addr, dst_addr: &Ipv4Addr) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Tcp, data.len() as u32),
            checksum::data(data),
        ]) == !0
    }

    /// Return the payload as a byte slice, past any options.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[usize::from(self.header_len())..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the source port field.
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    pub fn set_seq_number(&mut self, value: Wrap32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[field::SEQ_NUM], value.raw())
    }

    /// Set the acknowledgment number field.
    pub fn set_ack_number(&mut self, value: Wrap32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[field::ACK_NUM], value.raw())
    }

    /// Set the data offset and all flags in one write.
    pub fn set_offset_and_flags(&mut self, header_len: u8, flags: u16) {
        let raw = (u16::from(header_len / 4) << 12) | (flags & 0x01ff);
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::FLAGS], raw)
    }

    /// Set the window size field.
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::URGENT], value)
    }

    /// Compute and fill in the checksum over the segment and pseudo header.
    pub fn fill_checksum(&mut self, src_addr: &Ipv4Addr, dst_addr: &Ipv4Addr) {
        self.set_checksum(0);
        let value = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(src_addr, dst_addr, Protocol::Tcp, data.len() as u32),
                checksum::data(data),
            ])
        };
        self.set_checksum(value)
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = usize::from(self.header_len());
        &mut self.buffer.as_mut()[header_len..]
    }
}

/// A high-level representation of a TCP header.
///
/// Only the flags this stack acts on are modeled; the rest parse as clear
/// and emit as zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: Wrap32,
    pub ack_number: Option<Wrap32>,
    pub window_len: u16,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload_len: usize,
}

impl Repr {
    /// Parse a segment header and return a high-level representation.
    ///
    /// The checksum is not validated here; that requires the enclosing
    /// datagram's addresses. See [`Packet::verify_checksum`].
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> Result<Repr> {
        packet.check_len()?;
        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            seq_number: packet.seq_number(),
            ack_number: packet.ack().then(|| packet.ack_number()),
            window_len: packet.window_len(),
            syn: packet.syn(),
            fin: packet.fin(),
            rst: packet.rst(),
            payload_len: packet.payload().len(),
        })
    }

    /// Return the length of a segment that will be emitted from this
    /// high-level representation.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Emit a high-level representation into a segment buffer.
    ///
    /// The checksum is left at zero; fill it once the payload is in place.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or(Wrap32::new(0)));
        let mut flags = 0;
        if self.fin {
            flags |= field::FLG_FIN;
        }
        if self.syn {
            flags |= field::FLG_SYN;
        }
        if self.rst {
            flags |= field::FLG_RST;
        }
        if self.ack_number.is_some() {
            flags |= field::FLG_ACK;
        }
        packet.set_offset_and_flags(HEADER_LEN as u8, flags);
        packet.set_window_len(self.window_len);
        packet.set_checksum(0);
        packet.set_urgent_at(0);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} seq={}", self.src_port, self.dst_port, self.seq_number)?;
        if let Some(ack) = self.ack_number {
            write!(f, " ack={}", ack)?;
        }
        if self.syn {
            write!(f, " syn")?;
        }
        if self.fin {
            write!(f, " fin")?;
        }
        if self.rst {
            write!(f, " rst")?;
        }
        write!(f, " win={} len={}", self.window_len, self.payload_len)
    }
}

/// An owned segment carrying the two protocol messages.
///
/// One wire segment speaks in both directions at once: the sequence-space
/// fields and payload belong to the peer's sender, the acknowledgment and
/// window to its receiver. RST mirrors into both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub src_port: u16,
    pub dst_port: u16,
    pub message: Message,
}

impl Segment {
    /// Parse and checksum-verify a segment out of a datagram payload.
    pub fn parse(buffer: &[u8], src_addr: &Ipv4Addr, dst_addr: &Ipv4Addr) -> Result<Segment> {
        let packet = Packet::new_checked(buffer)?;
        if !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::WrongChecksum);
        }
        let repr = Repr::parse(&packet)?;
        Ok(Segment {
            src_port: repr.src_port,
            dst_port: repr.dst_port,
            message: Message {
                sender: SenderMessage {
                    seqno: repr.seq_number,
                    syn: repr.syn,
                    payload: packet.payload().to_vec(),
                    fin: repr.fin,
                    rst: repr.rst,
                },
                receiver: ReceiverMessage {
                    ackno: repr.ack_number,
                    window_size: repr.window_len,
                    rst: repr.rst,
                },
            },
        })
    }

    /// Serialize the segment with a valid checksum.
    pub fn serialize(&self, src_addr: &Ipv4Addr, dst_addr: &Ipv4Addr) -> Vec<u8> {
        let repr = Repr {
            src_port: self.src_port,
            dst_port: self.dst_port,
            seq_number: self.message.sender.seqno,
            ack_number: self.message.receiver.ackno,
            window_len: self.message.receiver.window_size,
            syn: self.message.sender.syn,
            fin: self.message.sender.fin,
            rst: self.message.sender.rst || self.message.receiver.rst,
            payload_len: self.message.sender.payload.len(),
        };
        let mut bytes = vec![0; repr.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        repr.emit(&mut packet);
        packet.payload_mut().copy_from_slice(&self.message.sender.payload);
        packet.fill_checksum(src_addr, dst_addr);
        bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SRC_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[rustfmt::skip]
    static SYN_BYTES: [u8; 20] = [
        0xc1, 0x5c, 0x00, 0x50,
        0x00, 0x00, 0x00, 0x01,
        0x00, 0x00, 0x00, 0x00,
        0x50, 0x02, 0xfa, 0x00,
        0xea, 0x31, 0x00, 0x00,
    ];

    #[test]
    fn deconstruct() {
        let packet = Packet::new_checked(&SYN_BYTES[..]).unwrap();
        assert_eq!(packet.src_port(), 49500);
        assert_eq!(packet.dst_port(), 80);
        assert_eq!(packet.seq_number(), Wrap32::new(1));
        assert_eq!(packet.header_len(), 20);
        assert!(packet.syn());
        assert!(!packet.ack());
        assert!(!packet.fin());
        assert!(!packet.rst());
        assert_eq!(packet.window_len(), 64000);
        assert_eq!(packet.checksum(), 0xea31);
        assert!(packet.verify_checksum(&SRC_ADDR, &DST_ADDR));
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn emit_matches_reference_bytes() {
        let repr = Repr {
            src_port: 49500,
            dst_port: 80,
            seq_number: Wrap32::new(1),
            ack_number: None,
            window_len: 64000,
            syn: true,
            fin: false,
            rst: false,
            payload_len: 0,
        };
        let mut bytes = vec![0; repr.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        repr.emit(&mut packet);
        packet.fill_checksum(&SRC_ADDR, &DST_ADDR);
        assert_eq!(&bytes[..], &SYN_BYTES[..]);
    }

    #[test]
    fn repr_round_trip() {
        let repr = Repr {
            src_port: 4096,
            dst_port: 443,
            seq_number: Wrap32::new(0xdead_beef),
            ack_number: Some(Wrap32::new(77)),
            window_len: 500,
            syn: false,
            fin: true,
            rst: false,
            payload_len: 3,
        };
        let mut bytes = vec![0; repr.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        repr.emit(&mut packet);
        packet.payload_mut().copy_from_slice(b"abc");
        packet.fill_checksum(&SRC_ADDR, &DST_ADDR);

        let parsed = Packet::new_checked(&bytes[..]).unwrap();
        assert!(parsed.verify_checksum(&SRC_ADDR, &DST_ADDR));
        assert_eq!(Repr::parse(&parsed).unwrap(), repr);
    }

    #[test]
    fn segment_round_trip() {
        let segment = Segment {
            src_port: 1234,
            dst_port: 5678,
            message: Message {
                sender: SenderMessage {
                    seqno: Wrap32::new(42),
                    syn: true,
                    payload: b"hello".to_vec(),
                    fin: false,
                    rst: false,
                },
                receiver: ReceiverMessage {
                    ackno: Some(Wrap32::new(99)),
                    window_size: 1000,
                    rst: false,
                },
            },
        };
        let bytes = segment.serialize(&SRC_ADDR, &DST_ADDR);
        let parsed = Segment::parse(&bytes, &SRC_ADDR, &DST_ADDR).unwrap();
        assert_eq!(parsed, segment);
    }

    #[test]
    fn rst_mirrors_into_both_directions() {
        let segment = Segment {
            src_port: 1,
            dst_port: 2,
            message: Message {
                sender: SenderMessage {
                    seqno: Wrap32::new(0),
                    rst: true,
                    ..SenderMessage::default()
                },
                receiver: ReceiverMessage::default(),
            },
        };
        let bytes = segment.serialize(&SRC_ADDR, &DST_ADDR);
        let parsed = Segment::parse(&bytes, &SRC_ADDR, &DST_ADDR).unwrap();
        assert!(parsed.message.sender.rst);
        assert!(parsed.message.receiver.rst);
    }

    #[test]
    fn corrupt_checksum_is_rejected() {
        let mut bytes = SYN_BYTES;
        bytes[19] = 1;
        assert_eq!(
            Segment::parse(&bytes, &SRC_ADDR, &DST_ADDR).err(),
            Some(Error::WrongChecksum)
        );
    }

    #[test]
    fn options_are_skipped() {
        // Data offset six: one options word before two payload bytes.
        let mut bytes = vec![0; 26];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_src_port(10);
        packet.set_dst_port(20);
        packet.set_seq_number(Wrap32::new(5));
        packet.set_offset_and_flags(24, field::FLG_ACK);
        packet.set_window_len(100);
        packet.payload_mut().copy_from_slice(b"ok");
        packet.fill_checksum(&SRC_ADDR, &DST_ADDR);

        let segment = Segment::parse(&bytes, &SRC_ADDR, &DST_ADDR).unwrap();
        assert_eq!(segment.message.sender.payload, b"ok");
    }
}
