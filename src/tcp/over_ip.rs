//! Carrying TCP messages in IPv4 datagrams.
//!
//! A pure in-memory adapter: one side turns a [`Message`] into a serialized,
//! checksummed datagram, the other filters and verifies incoming datagrams
//! down to the messages that belong to this connection. Where the datagrams
//! come from and go to is the embedder's business.

use std::net::Ipv4Addr;

use crate::tcp::Message;
use crate::wire::ipv4::{Datagram, Protocol, Repr};
use crate::wire::tcp::Segment;

/// An IPv4 address and port pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: Ipv4Addr, port: u16) -> Endpoint {
        Endpoint { addr, port }
    }
}

/// Maps one connection's messages onto IPv4 datagrams.
#[derive(Debug)]
pub struct TcpOverIp {
    source: Endpoint,
    destination: Endpoint,
    listening: bool,
}

impl TcpOverIp {
    /// An adapter for an outgoing connection with both ends known.
    pub fn new(source: Endpoint, destination: Endpoint) -> TcpOverIp {
        TcpOverIp {
            source,
            destination,
            listening: false,
        }
    }

    /// An adapter that waits for the first clean SYN and adopts its sender
    /// as the peer.
    pub fn listen(source: Endpoint) -> TcpOverIp {
        TcpOverIp {
            source,
            destination: Endpoint::new(Ipv4Addr::UNSPECIFIED, 0),
            listening: true,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn source(&self) -> Endpoint {
        self.source
    }

    pub fn destination(&self) -> Endpoint {
        self.destination
    }

    /// Extract this connection's message from a datagram, if it carries one.
    ///
    /// Datagrams for other addresses, ports or protocols, and segments with
    /// bad checksums, yield `None`.
    pub fn unwrap_tcp_in_ip(&mut self, dgram: &Datagram) -> Option<Message> {
        if !self.listening && dgram.header.dst_addr != self.source.addr {
            return None;
        }
        if !self.listening && dgram.header.src_addr != self.destination.addr {
            return None;
        }
        if dgram.header.protocol != Protocol::Tcp {
            return None;
        }

        let segment =
            Segment::parse(&dgram.payload, &dgram.header.src_addr, &dgram.header.dst_addr).ok()?;
        if segment.dst_port != self.source.port {
            return None;
        }

        if self.listening {
            if segment.message.sender.syn && !segment.message.sender.rst {
                self.source.addr = dgram.header.dst_addr;
                self.destination = Endpoint::new(dgram.header.src_addr, segment.src_port);
                self.listening = false;
                net_debug!(
                    "tcp-over-ip: adopted peer {}:{}",
                    self.destination.addr,
                    self.destination.port
                );
            } else {
                return None;
            }
        }

        if segment.src_port != self.destination.port {
            return None;
        }

        Some(segment.message)
    }

    /// Wrap a message into a serialized, checksummed datagram.
    pub fn wrap_tcp_in_ip(&self, message: Message) -> Datagram {
        let segment = Segment {
            src_port: self.source.port,
            dst_port: self.destination.port,
            message,
        };
        let payload = segment.serialize(&self.source.addr, &self.destination.addr);
        Datagram {
            header: Repr::new(
                self.source.addr,
                self.destination.addr,
                Protocol::Tcp,
                payload.len(),
            ),
            payload,
        }
    }
}
