//! Forwards IPv4 datagrams between attached interfaces using longest-prefix-match
//! routing, decrementing TTL and dropping anything that has expired.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::address::Address;
use crate::network_interface::{NetworkInterface, OutputPort};

struct RouteEntry {
    route_prefix: u32,
    prefix_length: u8,
    next_hop: Option<Address>,
    interface_num: usize,
}

/// A router owns its attached interfaces and is the only thing that calls
/// into them, so plain `Rc<RefCell<_>>` sharing (rather than `Arc<Mutex<_>>`)
/// matches the single-threaded, tick-driven core.
pub struct Router {
    interfaces: Vec<Rc<RefCell<NetworkInterface>>>,
    routing_table: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            interfaces: Vec::new(),
            routing_table: Vec::new(),
        }
    }

    pub fn add_interface(&mut self, interface: NetworkInterface) -> usize {
        self.interfaces.push(Rc::new(RefCell::new(interface)));
        self.interfaces.len() - 1
    }

    pub fn interface(&self, num: usize) -> Rc<RefCell<NetworkInterface>> {
        Rc::clone(&self.interfaces[num])
    }

    /// `next_hop` is `None` when the destination network is directly
    /// attached, in which case the datagram's own destination is the next hop.
    pub fn add_route(&mut self, route_prefix: u32, prefix_length: u8, next_hop: Option<Address>, interface_num: usize) {
        trace!(
            "router: add_route {}/{} via {:?} on interface {}",
            Address::from_ipv4_numeric(route_prefix),
            prefix_length,
            next_hop,
            interface_num
        );
        self.routing_table.push(RouteEntry {
            route_prefix,
            prefix_length,
            next_hop,
            interface_num,
        });
    }

    /// Drains every interface's received-datagram queue, forwarding each one
    /// out the interface selected by longest-prefix-match. Ties between
    /// equally long prefixes are broken by first insertion into the table.
    pub fn route(&mut self, port: &mut dyn OutputPort) {
        for iface_rc in &self.interfaces {
            let mut iface = iface_rc.borrow_mut();
            let queue = iface.datagrams_received();
            let mut pending = Vec::new();
            while let Some(dgram) = queue.pop_front() {
                pending.push(dgram);
            }
            drop(iface);

            for mut dgram in pending {
                if dgram.ttl() <= 1 {
                    continue;
                }
                dgram.decrement_ttl_and_recompute_checksum();

                let dst_ip = dgram.destination();
                let best_match = self.longest_prefix_match(dst_ip);

                if let Some(entry_idx) = best_match {
                    let entry = &self.routing_table[entry_idx];
                    let next_hop = entry.next_hop.unwrap_or_else(|| Address::from_ipv4_numeric(dst_ip));
                    let out_iface = &self.interfaces[entry.interface_num];
                    out_iface.borrow_mut().send_datagram(dgram, next_hop, port);
                }
            }
        }
    }

    fn longest_prefix_match(&self, dst_ip: u32) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, entry) in self.routing_table.iter().enumerate() {
            let mask = if entry.prefix_length == 0 {
                0
            } else {
                0xFFFF_FFFFu32 << (32 - entry.prefix_length)
            };
            if dst_ip & mask != entry.route_prefix & mask {
                continue;
            }
            match best {
                Some(b) if self.routing_table[b].prefix_length >= entry.prefix_length => {}
                _ => best = Some(idx),
            }
        }
        best
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ethernet::EthernetFrame;

    #[derive(Default)]
    struct RecordingPort {
        frames: Vec<EthernetFrame>,
    }

    impl OutputPort for RecordingPort {
        fn transmit(&mut self, frame: &EthernetFrame) {
            self.frames.push(frame.clone());
        }
    }

    fn sample_datagram(dst: [u8; 4], ttl: u8) -> crate::wire::ipv4::InternetDatagram {
        let header = etherparse::Ipv4Header::new(
            0,
            ttl,
            etherparse::IpNumber::TCP,
            [192, 168, 0, 1],
            dst,
        )
        .unwrap();
        crate::wire::ipv4::InternetDatagram::new(header, vec![])
    }

    #[test]
    fn longest_prefix_wins_over_default_route() {
        let mut router = Router::new();
        let eth0 = router.add_interface(NetworkInterface::new("eth0", [1; 6], Address::new(192, 168, 0, 1)));
        let eth1 = router.add_interface(NetworkInterface::new("eth1", [2; 6], Address::new(10, 0, 0, 1)));

        router.add_route(0, 0, Some(Address::new(192, 168, 0, 254)), eth0); // default
        router.add_route(
            u32::from(Ipv4AddrHelper([10, 0, 0, 0])),
            24,
            None,
            eth1,
        );

        let best = router.longest_prefix_match(u32::from(Ipv4AddrHelper([10, 0, 0, 5])));
        assert_eq!(best, Some(1));
        let default_pick = router.longest_prefix_match(u32::from(Ipv4AddrHelper([8, 8, 8, 8])));
        assert_eq!(default_pick, Some(0));
    }

    #[test]
    fn ties_broken_by_first_insertion() {
        let mut router = Router::new();
        let eth0 = router.add_interface(NetworkInterface::new("eth0", [1; 6], Address::new(192, 168, 0, 1)));
        router.add_route(u32::from(Ipv4AddrHelper([10, 0, 0, 0])), 24, None, eth0);
        router.add_route(u32::from(Ipv4AddrHelper([10, 0, 0, 0])), 24, None, eth0);
        let best = router.longest_prefix_match(u32::from(Ipv4AddrHelper([10, 0, 0, 5])));
        assert_eq!(best, Some(0));
    }

    #[test]
    fn expired_ttl_datagram_is_dropped() {
        let mut router = Router::new();
        let eth0 = router.add_interface(NetworkInterface::new("eth0", [1; 6], Address::new(192, 168, 0, 1)));
        router.add_route(0, 0, None, eth0);

        router.interface(eth0).borrow_mut().datagrams_received().push_back(sample_datagram([192, 168, 0, 9], 1));

        let mut port = RecordingPort::default();
        router.route(&mut port);
        assert!(port.frames.is_empty());
    }

    #[test]
    fn forwards_and_decrements_ttl() {
        let mut router = Router::new();
        let eth0 = router.add_interface(NetworkInterface::new("eth0", [1; 6], Address::new(192, 168, 0, 1)));
        let eth1 = router.add_interface(NetworkInterface::new("eth1", [2; 6], Address::new(10, 0, 0, 1)));
        router.add_route(u32::from(Ipv4AddrHelper([10, 0, 0, 0])), 24, None, eth1);

        // Pre-seed the ARP cache on eth1 so send_datagram doesn't have to queue.
        router.interface(eth1).borrow_mut().datagrams_received();

        router.interface(eth0).borrow_mut().datagrams_received().push_back(sample_datagram([10, 0, 0, 5], 5));
        let mut port = RecordingPort::default();
        router.route(&mut port);
        // No ARP entry yet, so this should have produced an ARP request, not an IPv4 frame.
        assert_eq!(port.frames.len(), 1);
        assert_eq!(port.frames[0].header.ethertype, crate::wire::ethernet::TYPE_ARP);
    }

    struct Ipv4AddrHelper(pub [u8; 4]);
    impl From<Ipv4AddrHelper> for u32 {
        fn from(v: Ipv4AddrHelper) -> u32 {
            u32::from_be_bytes(v.0)
        }
    }
}
