//! A userspace TCP/IP stack.
//!
//! The crate provides the protocol logic of a TCP/IPv4 stack without any of
//! the I/O it runs on: reliable byte-stream transport (segmentation,
//! reassembly, sliding-window flow control, retransmission with exponential
//! backoff), ARP resolution at the Ethernet boundary, and longest-prefix-match
//! IPv4 forwarding.
//!
//! Everything is single-threaded and driven from the outside. Frames, ACKs
//! and application bytes come in through plain method calls, outgoing frames
//! and segments leave through caller-supplied transmit callbacks, and time
//! advances only when the embedder calls `tick(ms)`. No component blocks,
//! spawns, or reads a clock of its own.
//!
//! - [`stream`]: bounded producer/consumer byte buffer with EOF and error
//!   signalling.
//! - [`reassembler`]: merges out-of-order substrings into a stream.
//! - [`tcp`]: sequence-number arithmetic, sender, receiver, and the peer
//!   glue binding one of each into a full-duplex connection.
//! - [`wire`]: bit-exact Ethernet, ARP, IPv4 and TCP codecs.
//! - [`iface`]: the IP-to-Ethernet bridge with ARP resolution.
//! - [`router`]: a multi-interface longest-prefix-match forwarder.

#[macro_use]
mod macros;

pub mod iface;
pub mod reassembler;
pub mod router;
pub mod stream;
pub mod tcp;
pub mod wire;
