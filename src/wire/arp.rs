//! The Address Resolution Protocol, RFC 826.
//!
//! Only the Ethernet/IPv4 combination is spoken; anything else parses as
//! unrecognized and gets dropped by the interface.

use core::fmt;
use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use super::ethernet::Address as EthernetAddress;
use super::{Error, Result};

enum_with_unknown! {
    /// ARP hardware type.
    pub enum Hardware(u16) {
        Ethernet = 1,
    }
}

enum_with_unknown! {
    /// ARP operation type.
    pub enum Operation(u16) {
        Request = 1,
        Reply = 2,
    }
}

mod field {
    use crate::wire::field::*;

    pub const HTYPE: Field = 0..2;
    pub const PTYPE: Field = 2..4;
    pub const HLEN: usize = 4;
    pub const PLEN: usize = 5;
    pub const OPER: Field = 6..8;
    // Offsets below assume the Ethernet/IPv4 address sizes; parse validates
    // the length fields before the address accessors run.
    pub const SHA: Field = 8..14;
    pub const SPA: Field = 14..18;
    pub const THA: Field = 18..24;
    pub const TPA: Field = 24..28;
}

/// Length of an Ethernet/IPv4 ARP packet.
pub const PACKET_LEN: usize = field::TPA.end;

/// A read/write wrapper around an ARP packet buffer.
#[derive(Debug, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with packet structure.
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
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < PACKET_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the hardware type field.
    pub fn hardware_type(&self) -> Hardware {
        Hardware::from(NetworkEndian::read_u16(&self.buffer.as_ref()[field::HTYPE]))
    }

    /// Return the protocol type field.
    pub fn protocol_type(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::PTYPE])
    }

    /// Return the hardware length field.
    pub fn hardware_len(&self) -> u8 {
        self.buffer.as_ref()[field::HLEN]
    }

    /// Return the protocol length field.
    pub fn protocol_len(&self) -> u8 {
        self.buffer.as_ref()[field::PLEN]
    }

    /// Return the operation field.
    pub fn operation(&self) -> Operation {
        Operation::from(NetworkEndian::read_u16(&self.buffer.as_ref()[field::OPER]))
    }

    /// Return the source hardware address field.
    pub fn source_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.buffer.as_ref()[field::SHA])
    }

    /// Return the source protocol address field.
    pub fn source_protocol_addr(&self) -> Ipv4Addr {
        let spa: [u8; 4] = self.buffer.as_ref()[field::SPA].try_into().unwrap();
        Ipv4Addr::from(spa)
    }

    /// Return the target hardware address field.
    pub fn target_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.buffer.as_ref()[field::THA])
    }

    /// Return the target protocol address field.
    pub fn target_protocol_addr(&self) -> Ipv4Addr {
        let tpa: [u8; 4] = self.buffer.as_ref()[field::TPA].try_into().unwrap();
        Ipv4Addr::from(tpa)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the hardware type field.
    pub fn set_hardware_type(&mut self, value: Hardware) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::HTYPE], value.into())
    }

    /// Set the protocol type field.
    pub fn set_protocol_type(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::PTYPE], value)
    }

    /// Set the hardware length field.
    pub fn set_hardware_len(&mut self, value: u8) {
        self.buffer.as_mut()[field::HLEN] = value
    }

    /// Set the protocol length field.
    pub fn set_protocol_len(&mut self, value: u8) {
        self.buffer.as_mut()[field::PLEN] = value
    }

    /// Set the operation field.
    pub fn set_operation(&mut self, value: Operation) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::OPER], value.into())
    }

    /// Set the source hardware address field.
    pub fn set_source_hardware_addr(&mut self, value: EthernetAddress) {
        self.buffer.as_mut()[field::SHA].copy_from_slice(value.as_bytes())
    }

    /// Set the source protocol address field.
    pub fn set_source_protocol_addr(&mut self, value: Ipv4Addr) {
        self.buffer.as_mut()[field::SPA].copy_from_slice(&value.octets())
    }

    /// Set the target hardware address field.
    pub fn set_target_hardware_addr(&mut self, value: EthernetAddress) {
        self.buffer.as_mut()[field::THA].copy_from_slice(value.as_bytes())
    }

    /// Set the target protocol address field.
    pub fn set_target_protocol_addr(&mut self, value: Ipv4Addr) {
        self.buffer.as_mut()[field::TPA].copy_from_slice(&value.octets())
    }
}

/// A high-level representation of an Ethernet/IPv4 ARP packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub operation: Operation,
    pub source_hardware_addr: EthernetAddress,
    pub source_protocol_addr: Ipv4Addr,
    pub target_hardware_addr: EthernetAddress,
    pub target_protocol_addr: Ipv4Addr,
}

impl Repr {
    /// Parse an ARP packet and return a high-level representation, or
    /// `Err(Error::Unrecognized)` for any field combination this stack does
    /// not speak.
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> Result<Repr> {
        packet.check_len()?;
        match (
            packet.hardware_type(),
            packet.protocol_type(),
            packet.hardware_len(),
            packet.protocol_len(),
            packet.operation(),
        ) {
            (
                Hardware::Ethernet,
                0x0800,
                6,
                4,
                operation @ (Operation::Request | Operation::Reply),
            ) => Ok(Repr {
                operation,
                source_hardware_addr: packet.source_hardware_addr(),
                source_protocol_addr: packet.source_protocol_addr(),
                target_hardware_addr: packet.target_hardware_addr(),
                target_protocol_addr: packet.target_protocol_addr(),
            }),
            _ => Err(Error::Unrecognized),
        }
    }

    /// Return the length of a packet that will be emitted from this
    /// high-level representation.
    pub fn buffer_len(&self) -> usize {
        PACKET_LEN
    }

    /// Emit a high-level representation into an ARP packet buffer.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        packet.set_hardware_type(Hardware::Ethernet);
        packet.set_protocol_type(0x0800);
        packet.set_hardware_len(6);
        packet.set_protocol_len(4);
        packet.set_operation(self.operation);
        packet.set_source_hardware_addr(self.source_hardware_addr);
        packet.set_source_protocol_addr(self.source_protocol_addr);
        packet.set_target_hardware_addr(self.target_hardware_addr);
        packet.set_target_protocol_addr(self.target_protocol_addr);
    }

    /// Serialize into a fresh byte buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0; PACKET_LEN];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        self.emit(&mut packet);
        bytes
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ARP op={:?} src={}/{} tgt={}/{}",
            self.operation,
            self.source_hardware_addr,
            self.source_protocol_addr,
            self.target_hardware_addr,
            self.target_protocol_addr,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    static PACKET_BYTES: [u8; 28] = [
        0x00, 0x01,
        0x08, 0x00,
        0x06,
        0x04,
        0x00, 0x02,
        0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
        0xc0, 0xa8, 0x00, 0x01,
        0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
        0xc0, 0xa8, 0x00, 0x02,
    ];

    fn packet_repr() -> Repr {
        Repr {
            operation: Operation::Reply,
            source_hardware_addr: EthernetAddress([0x02, 0x03, 0x04, 0x05, 0x06, 0x07]),
            source_protocol_addr: Ipv4Addr::new(192, 168, 0, 1),
            target_hardware_addr: EthernetAddress([0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f]),
            target_protocol_addr: Ipv4Addr::new(192, 168, 0, 2),
        }
    }

    #[test]
    fn deconstruct() {
        let packet = Packet::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.hardware_type(), Hardware::Ethernet);
        assert_eq!(packet.protocol_type(), 0x0800);
        assert_eq!(packet.hardware_len(), 6);
        assert_eq!(packet.protocol_len(), 4);
        assert_eq!(packet.operation(), Operation::Reply);
        assert_eq!(packet.source_protocol_addr(), Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(packet.target_protocol_addr(), Ipv4Addr::new(192, 168, 0, 2));
    }

    #[test]
    fn parse_and_emit() {
        let packet = Packet::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(Repr::parse(&packet).unwrap(), packet_repr());
        assert_eq!(packet_repr().serialize(), &PACKET_BYTES[..]);
    }

    #[test]
    fn unrecognized_combinations_are_rejected() {
        let mut bytes = PACKET_BYTES;
        bytes[4] = 8; // hardware length
        let packet = Packet::new_unchecked(&bytes[..]);
        assert_eq!(Repr::parse(&packet).err(), Some(Error::Unrecognized));

        let mut bytes = PACKET_BYTES;
        bytes[7] = 3; // opcode
        let packet = Packet::new_unchecked(&bytes[..]);
        assert_eq!(Repr::parse(&packet).err(), Some(Error::Unrecognized));

        let mut bytes = PACKET_BYTES;
        bytes[3] = 0x06; // protocol type
        let packet = Packet::new_unchecked(&bytes[..]);
        assert_eq!(Repr::parse(&packet).err(), Some(Error::Unrecognized));
    }

    #[test]
    fn truncated() {
        assert_eq!(Packet::new_checked(&PACKET_BYTES[..27]).err(), Some(Error::Truncated));
    }
}
