//! Bit-exact codecs for the wire formats the stack speaks.
//!
//! Each protocol module follows the same shape: a `field` table of byte
//! ranges, a `Packet` wrapper giving checked field access over any byte
//! buffer, and a `Repr` holding the parsed header with `parse`/`emit`
//! converting between the two. The owned composites ([`EthernetFrame`],
//! [`Ipv4Datagram`]) carry a header repr plus payload bytes for queueing.

use core::fmt;

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;

pub use ethernet::{Address as EthernetAddress, EtherType, Frame as EthernetFrame};
pub use ipv4::{Datagram as Ipv4Datagram, Protocol as IpProtocol};

pub(crate) mod field {
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

/// A parsing error. Malformed input is dropped at the nearest boundary; the
/// error only says why.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The buffer is too short to contain the claimed structure.
    Truncated,
    /// A length or version field contradicts the buffer.
    Malformed,
    /// A field combination this stack does not speak.
    Unrecognized,
    /// The checksum does not cover the contents.
    WrongChecksum,
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated packet"),
            Error::Malformed => write!(f, "malformed packet"),
            Error::Unrecognized => write!(f, "unrecognized packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
        }
    }
}
