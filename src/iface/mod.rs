//! The bridge between the IP layer and the Ethernet layer.
//!
//! A [`NetworkInterface`] accepts IP datagrams headed for a next hop,
//! resolves the next hop's hardware address over ARP, and emits Ethernet
//! frames through its output port. Inbound frames are filtered, parsed, and
//! either queued for the owner (IPv4) or answered in place (ARP).

pub mod neighbor;

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use crate::wire::arp::{Operation, Packet as ArpPacket, Repr as ArpRepr};
use crate::wire::ethernet::{Address, Frame, Repr as EthernetRepr};
use crate::wire::{EtherType, Ipv4Datagram};

use self::neighbor::{NeighborCache, REQUEST_TTL_MS};

/// Where outgoing frames go: one link's write end.
pub trait OutputPort {
    fn transmit(&mut self, frame: Frame);
}

impl<F: FnMut(Frame)> OutputPort for F {
    fn transmit(&mut self, frame: Frame) {
        self(frame)
    }
}

/// An Ethernet interface with one hardware and one protocol address.
pub struct NetworkInterface {
    name: String,
    port: Box<dyn OutputPort>,
    ethernet_address: Address,
    ip_address: Ipv4Addr,

    neighbors: NeighborCache,
    // IPs with an ARP request on the wire, aged alongside the neighbor
    // table; absence means a new request is due.
    requests_in_flight: HashMap<Ipv4Addr, u64>,
    // Datagrams parked until their next hop resolves, in insertion order.
    pending: HashMap<Ipv4Addr, Vec<Ipv4Datagram>>,
    received: VecDeque<Ipv4Datagram>,
}

impl NetworkInterface {
    pub fn new(
        name: impl Into<String>,
        port: impl OutputPort + 'static,
        ethernet_address: Address,
        ip_address: Ipv4Addr,
    ) -> NetworkInterface {
        let name = name.into();
        net_debug!(
            "{}: interface up, hardware {}, ip {}",
            name,
            ethernet_address,
            ip_address
        );
        NetworkInterface {
            name,
            port: Box::new(port),
            ethernet_address,
            ip_address,
            neighbors: NeighborCache::new(),
            requests_in_flight: HashMap::new(),
            pending: HashMap::new(),
            received: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ethernet_address(&self) -> Address {
        self.ethernet_address
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }

    /// Send `dgram` toward `next_hop`, resolving its hardware address first
    /// if necessary.
    ///
    /// With the mapping unknown the datagram is parked and at most one ARP
    /// request per five seconds goes out for that address.
    pub fn send_datagram(&mut self, dgram: Ipv4Datagram, next_hop: Ipv4Addr) {
        if let Some(hardware_addr) = self.neighbors.lookup(&next_hop) {
            let frame = self.frame_to(hardware_addr, EtherType::Ipv4, dgram.serialize());
            self.port.transmit(frame);
            return;
        }

        self.pending.entry(next_hop).or_default().push(dgram);

        if !self.requests_in_flight.contains_key(&next_hop) {
            net_trace!("{}: arp who-has {}", self.name, next_hop);
            let request = self.arp_message(Operation::Request, next_hop, Address::default());
            let frame = self.frame_to(Address::BROADCAST, EtherType::Arp, request.serialize());
            self.port.transmit(frame);
            self.requests_in_flight.insert(next_hop, 0);
        }
    }

    /// Process one frame off the wire.
    pub fn recv_frame(&mut self, frame: &Frame) {
        if frame.header.dst_addr != self.ethernet_address && !frame.header.dst_addr.is_broadcast()
        {
            return;
        }

        match frame.header.ethertype {
            EtherType::Ipv4 => match Ipv4Datagram::parse(&frame.payload) {
                Ok(dgram) => self.received.push_back(dgram),
                Err(err) => net_trace!("{}: dropping ipv4 payload: {}", self.name, err),
            },
            EtherType::Arp => {
                match ArpPacket::new_checked(&frame.payload[..]).and_then(|p| ArpRepr::parse(&p)) {
                    Ok(message) => self.handle_arp(message),
                    Err(err) => net_trace!("{}: dropping arp payload: {}", self.name, err),
                }
            }
            EtherType::Unknown(ethertype) => {
                net_trace!("{}: ignoring ethertype 0x{:04x}", self.name, ethertype)
            }
        }
    }

    /// Age the ARP tables, evicting expired mappings and request markers.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.neighbors.tick(ms_since_last_tick);
        self.requests_in_flight.retain(|_, age_ms| {
            *age_ms += ms_since_last_tick;
            *age_ms <= REQUEST_TTL_MS
        });
    }

    /// Datagrams parsed off the wire, waiting for the owner.
    pub fn datagrams_received(&mut self) -> &mut VecDeque<Ipv4Datagram> {
        &mut self.received
    }

    fn handle_arp(&mut self, message: ArpRepr) {
        // Every valid ARP payload teaches us the sender's mapping.
        net_trace!(
            "{}: arp learned {} is-at {}",
            self.name,
            message.source_protocol_addr,
            message.source_hardware_addr
        );
        self.neighbors
            .fill(message.source_protocol_addr, message.source_hardware_addr);

        if message.operation == Operation::Request
            && message.target_protocol_addr == self.ip_address
        {
            let reply = self.arp_message(
                Operation::Reply,
                message.source_protocol_addr,
                message.source_hardware_addr,
            );
            let frame = self.frame_to(
                message.source_hardware_addr,
                EtherType::Arp,
                reply.serialize(),
            );
            self.port.transmit(frame);
        } else if message.operation == Operation::Reply {
            if let Some(waiting) = self.pending.remove(&message.source_protocol_addr) {
                for dgram in waiting {
                    let frame = self.frame_to(
                        message.source_hardware_addr,
                        EtherType::Ipv4,
                        dgram.serialize(),
                    );
                    self.port.transmit(frame);
                }
            }
        }
    }

    fn arp_message(
        &self,
        operation: Operation,
        target_protocol_addr: Ipv4Addr,
        target_hardware_addr: Address,
    ) -> ArpRepr {
        ArpRepr {
            operation,
            source_hardware_addr: self.ethernet_address,
            source_protocol_addr: self.ip_address,
            target_hardware_addr,
            target_protocol_addr,
        }
    }

    fn frame_to(&self, dst_addr: Address, ethertype: EtherType, payload: Vec<u8>) -> Frame {
        Frame {
            header: EthernetRepr {
                src_addr: self.ethernet_address,
                dst_addr,
                ethertype,
            },
            payload,
        }
    }
}

impl core::fmt::Debug for NetworkInterface {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("NetworkInterface")
            .field("name", &self.name)
            .field("ethernet_address", &self.ethernet_address)
            .field("ip_address", &self.ip_address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv4::{Protocol, Repr as Ipv4Repr};
    use std::cell::RefCell;
    use std::rc::Rc;

    const LOCAL_MAC: Address = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const REMOTE_MAC: Address = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(4, 3, 2, 1);
    const NEXT_HOP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

    type FrameLog = Rc<RefCell<Vec<Frame>>>;

    fn interface() -> (NetworkInterface, FrameLog) {
        let log: FrameLog = Rc::new(RefCell::new(Vec::new()));
        let port = {
            let log = log.clone();
            move |frame: Frame| log.borrow_mut().push(frame)
        };
        (
            NetworkInterface::new("eth0", port, LOCAL_MAC, LOCAL_IP),
            log,
        )
    }

    fn datagram(dst: Ipv4Addr) -> Ipv4Datagram {
        Ipv4Datagram {
            header: Ipv4Repr::new(LOCAL_IP, dst, Protocol::Udp, 4),
            payload: vec![1, 2, 3, 4],
        }
    }

    fn arp_frame_from(remote_ip: Ipv4Addr, operation: Operation, dst_addr: Address) -> Frame {
        let message = ArpRepr {
            operation,
            source_hardware_addr: REMOTE_MAC,
            source_protocol_addr: remote_ip,
            target_hardware_addr: if operation == Operation::Reply {
                LOCAL_MAC
            } else {
                Address::default()
            },
            target_protocol_addr: LOCAL_IP,
        };
        Frame {
            header: EthernetRepr {
                src_addr: REMOTE_MAC,
                dst_addr,
                ethertype: EtherType::Arp,
            },
            payload: message.serialize(),
        }
    }

    #[test]
    fn unresolved_next_hop_requests_arp() {
        let (mut iface, log) = interface();
        let dgram = datagram(Ipv4Addr::new(5, 6, 7, 8));
        iface.send_datagram(dgram, NEXT_HOP);

        let frames = log.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.dst_addr, Address::BROADCAST);
        assert_eq!(frames[0].header.ethertype, EtherType::Arp);

        let request =
            ArpRepr::parse(&ArpPacket::new_checked(&frames[0].payload[..]).unwrap()).unwrap();
        assert_eq!(request.operation, Operation::Request);
        assert_eq!(request.source_hardware_addr, LOCAL_MAC);
        assert_eq!(request.source_protocol_addr, LOCAL_IP);
        assert_eq!(request.target_protocol_addr, NEXT_HOP);
    }

    #[test]
    fn duplicate_requests_are_suppressed() {
        let (mut iface, log) = interface();
        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 8)), NEXT_HOP);
        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 9)), NEXT_HOP);
        assert_eq!(log.borrow().len(), 1, "one ARP request per window");

        // Past the suppression window a new request goes out.
        iface.tick(REQUEST_TTL_MS + 1);
        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 10)), NEXT_HOP);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn reply_flushes_pending_in_order() {
        let (mut iface, log) = interface();
        let first = datagram(Ipv4Addr::new(5, 6, 7, 8));
        let second = datagram(Ipv4Addr::new(5, 6, 7, 9));
        iface.send_datagram(first.clone(), NEXT_HOP);
        iface.send_datagram(second.clone(), NEXT_HOP);
        log.borrow_mut().clear();

        iface.recv_frame(&arp_frame_from(NEXT_HOP, Operation::Reply, LOCAL_MAC));

        let frames = log.borrow();
        assert_eq!(frames.len(), 2);
        for (frame, dgram) in frames.iter().zip([&first, &second]) {
            assert_eq!(frame.header.dst_addr, REMOTE_MAC);
            assert_eq!(frame.header.src_addr, LOCAL_MAC);
            assert_eq!(frame.header.ethertype, EtherType::Ipv4);
            assert_eq!(frame.payload, dgram.serialize());
        }
    }

    #[test]
    fn cached_mapping_sends_immediately() {
        let (mut iface, log) = interface();
        iface.recv_frame(&arp_frame_from(NEXT_HOP, Operation::Reply, LOCAL_MAC));
        log.borrow_mut().clear();

        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 8)), NEXT_HOP);
        let frames = log.borrow();
        assert_eq!(frames.len(), 1, "no ARP needed");
        assert_eq!(frames[0].header.ethertype, EtherType::Ipv4);
        assert_eq!(frames[0].header.dst_addr, REMOTE_MAC);
    }

    #[test]
    fn mapping_expires_after_thirty_seconds() {
        let (mut iface, log) = interface();
        iface.recv_frame(&arp_frame_from(NEXT_HOP, Operation::Reply, LOCAL_MAC));
        iface.tick(neighbor::ENTRY_TTL_MS + 1);
        log.borrow_mut().clear();

        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 8)), NEXT_HOP);
        let frames = log.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.ethertype, EtherType::Arp, "must re-resolve");
    }

    #[test]
    fn request_for_our_ip_is_answered() {
        let (mut iface, log) = interface();
        iface.recv_frame(&arp_frame_from(NEXT_HOP, Operation::Request, Address::BROADCAST));

        let frames = log.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.dst_addr, REMOTE_MAC, "unicast reply");
        let reply =
            ArpRepr::parse(&ArpPacket::new_checked(&frames[0].payload[..]).unwrap()).unwrap();
        assert_eq!(reply.operation, Operation::Reply);
        assert_eq!(reply.source_protocol_addr, LOCAL_IP);
        assert_eq!(reply.target_hardware_addr, REMOTE_MAC);
        assert_eq!(reply.target_protocol_addr, NEXT_HOP);
    }

    #[test]
    fn request_teaches_the_mapping_but_flushes_nothing() {
        let (mut iface, log) = interface();
        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 8)), NEXT_HOP);
        log.borrow_mut().clear();

        // The peer's own request carries its mapping, but only a reply
        // releases parked datagrams.
        iface.recv_frame(&arp_frame_from(NEXT_HOP, Operation::Request, Address::BROADCAST));
        {
            let frames = log.borrow();
            assert_eq!(frames.len(), 1, "the ARP reply and nothing else");
            assert_eq!(frames[0].header.ethertype, EtherType::Arp);
        }
        log.borrow_mut().clear();

        // The mapping was learned: new traffic needs no resolution.
        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 9)), NEXT_HOP);
        let frames = log.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.ethertype, EtherType::Ipv4);
        assert_eq!(frames[0].header.dst_addr, REMOTE_MAC);
    }

    #[test]
    fn frames_for_other_hosts_are_ignored() {
        let (mut iface, log) = interface();
        let mut frame = arp_frame_from(NEXT_HOP, Operation::Reply, REMOTE_MAC);
        frame.header.dst_addr = REMOTE_MAC;
        iface.recv_frame(&frame);
        assert!(log.borrow().is_empty());
        assert!(iface.datagrams_received().is_empty());

        // The mapping was not learned either.
        iface.send_datagram(datagram(Ipv4Addr::new(5, 6, 7, 8)), NEXT_HOP);
        assert_eq!(log.borrow()[0].header.ethertype, EtherType::Arp);
    }

    #[test]
    fn ipv4_frames_are_queued_for_the_owner() {
        let (mut iface, _log) = interface();
        let dgram = datagram(LOCAL_IP);
        let frame = Frame {
            header: EthernetRepr {
                src_addr: REMOTE_MAC,
                dst_addr: LOCAL_MAC,
                ethertype: EtherType::Ipv4,
            },
            payload: dgram.serialize(),
        };
        iface.recv_frame(&frame);
        assert_eq!(iface.datagrams_received().pop_front(), Some(dgram));
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let (mut iface, log) = interface();
        let frame = Frame {
            header: EthernetRepr {
                src_addr: REMOTE_MAC,
                dst_addr: LOCAL_MAC,
                ethertype: EtherType::Ipv4,
            },
            payload: vec![0xff; 7],
        };
        iface.recv_frame(&frame);
        assert!(iface.datagrams_received().is_empty());
        assert!(log.borrow().is_empty());
    }
}
