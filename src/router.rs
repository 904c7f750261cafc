//! Longest-prefix-match IPv4 forwarding.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::iface::NetworkInterface;

// Where a matched datagram goes next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Hop {
    interface: usize,
    next_hop: Option<Ipv4Addr>,
}

/// Forwards datagrams between [`NetworkInterface`]s.
///
/// The router owns its interfaces; routes name them by the index
/// [`add_interface`] returned. The routing table is one map per prefix
/// length, keyed by the prefix's significant bits, and lookup walks the
/// lengths from most to least specific. A default route is a zero-length
/// prefix.
///
/// [`add_interface`]: Router::add_interface
#[derive(Debug)]
pub struct Router {
    interfaces: Vec<NetworkInterface>,
    tables: Vec<HashMap<u32, Hop>>,
}

impl Default for Router {
    fn default() -> Router {
        Router::new()
    }
}

fn prefix_key(addr: u32, prefix_length: u8) -> u32 {
    if prefix_length == 0 {
        0
    } else {
        addr >> (32 - u32::from(prefix_length))
    }
}

impl Router {
    pub fn new() -> Router {
        Router {
            interfaces: Vec::new(),
            tables: (0..=32).map(|_| HashMap::new()).collect(),
        }
    }

    /// Take ownership of an interface; returns its index for `add_route`.
    pub fn add_interface(&mut self, interface: NetworkInterface) -> usize {
        self.interfaces.push(interface);
        self.interfaces.len() - 1
    }

    pub fn interface(&self, index: usize) -> &NetworkInterface {
        &self.interfaces[index]
    }

    pub fn interface_mut(&mut self, index: usize) -> &mut NetworkInterface {
        &mut self.interfaces[index]
    }

    /// Install a route: datagrams whose destination matches the top
    /// `prefix_length` bits of `route_prefix` leave through
    /// `interface_index`, toward `next_hop` or, on a directly attached
    /// network, toward the destination itself.
    ///
    /// # Panics
    /// Panics if `prefix_length` exceeds 32 or the interface index is
    /// unknown.
    pub fn add_route(
        &mut self,
        route_prefix: Ipv4Addr,
        prefix_length: u8,
        next_hop: Option<Ipv4Addr>,
        interface_index: usize,
    ) {
        assert!(prefix_length <= 32, "prefix length out of range");
        assert!(interface_index < self.interfaces.len(), "no such interface");
        net_debug!(
            "route {}/{} => {} on {}",
            route_prefix,
            prefix_length,
            next_hop.map_or("(direct)".into(), |hop| hop.to_string()),
            self.interfaces[interface_index].name(),
        );
        self.tables[usize::from(prefix_length)].insert(
            prefix_key(u32::from(route_prefix), prefix_length),
            Hop {
                interface: interface_index,
                next_hop,
            },
        );
    }

    /// Drain every interface's inbound queue and forward what can be
    /// forwarded.
    ///
    /// Expired datagrams (TTL at or below one) and destinations without a
    /// matching route are dropped silently.
    pub fn route(&mut self) {
        for index in 0..self.interfaces.len() {
            while let Some(mut dgram) = self.interfaces[index].datagrams_received().pop_front() {
                if dgram.header.ttl <= 1 {
                    net_trace!("router: ttl expired toward {}", dgram.header.dst_addr);
                    continue;
                }
                dgram.header.ttl -= 1;

                let Some(hop) = self.lookup(u32::from(dgram.header.dst_addr)) else {
                    net_trace!("router: no route toward {}", dgram.header.dst_addr);
                    continue;
                };
                let next_hop = hop.next_hop.unwrap_or(dgram.header.dst_addr);
                self.interfaces[hop.interface].send_datagram(dgram, next_hop);
            }
        }
    }

    // Longest prefix match over the per-length tables.
    fn lookup(&self, addr: u32) -> Option<Hop> {
        (0..=32u8)
            .rev()
            .find_map(|length| self.tables[usize::from(length)].get(&prefix_key(addr, length)))
            .copied()
    }
}
