//! Bridges IPv4 datagrams and Ethernet frames: resolves next-hop addresses
//! via ARP, caches the results, throttles repeat requests, and queues
//! datagrams awaiting resolution.

use std::collections::{HashMap, VecDeque};

use log::{debug, trace};

use crate::address::Address;
use crate::config::{ARP_CACHE_TTL_MS, ARP_REQUEST_COOLDOWN_MS};
use crate::wire::arp::{self, ArpMessage, OPCODE_REPLY, OPCODE_REQUEST};
use crate::wire::ethernet::{self, EthernetAddress, EthernetFrame, EthernetHeader, ETHERNET_BROADCAST, TYPE_ARP, TYPE_IPV4};
use crate::wire::ipv4::{self, InternetDatagram};

/// Anything the interface can hand a frame to for transmission. A trait
/// object rather than a concrete TUN handle so tests can record frames
/// instead of touching a real device.
pub trait OutputPort {
    fn transmit(&mut self, frame: &EthernetFrame);
}

struct ArpCacheEntry {
    mac: EthernetAddress,
    remaining_ttl_ms: u32,
}

pub struct NetworkInterface {
    name: String,
    ethernet_address: EthernetAddress,
    ip_address: Address,
    arp_cache: HashMap<u32, ArpCacheEntry>,
    arp_pending: HashMap<u32, u32>,
    arp_waiting: HashMap<u32, VecDeque<InternetDatagram>>,
    datagrams_received: VecDeque<InternetDatagram>,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, ethernet_address: EthernetAddress, ip_address: Address) -> Self {
        let name = name.into();
        debug!(
            "network_interface {}: ethernet={} ip={}",
            name,
            ethernet::to_string(ethernet_address),
            ip_address
        );
        NetworkInterface {
            name,
            ethernet_address,
            ip_address,
            arp_cache: HashMap::new(),
            arp_pending: HashMap::new(),
            arp_waiting: HashMap::new(),
            datagrams_received: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datagrams_received(&mut self) -> &mut VecDeque<InternetDatagram> {
        &mut self.datagrams_received
    }

    /// Sends `dgram` to `next_hop`, resolving its MAC address via ARP first
    /// if necessary. Queues the datagram and emits at most one ARP request
    /// per `ARP_REQUEST_COOLDOWN_MS` while resolution is pending.
    pub fn send_datagram(&mut self, dgram: InternetDatagram, next_hop: Address, port: &mut dyn OutputPort) {
        let next_ip = next_hop.ipv4_numeric();

        if let Some(entry) = self.arp_cache.get(&next_ip) {
            let frame = EthernetFrame {
                header: EthernetHeader {
                    dst: entry.mac,
                    src: self.ethernet_address,
                    ethertype: TYPE_IPV4,
                },
                payload: ipv4::serialize(&dgram),
            };
            port.transmit(&frame);
            return;
        }

        self.arp_waiting.entry(next_ip).or_default().push_back(dgram);

        if self.arp_pending.contains_key(&next_ip) {
            return;
        }

        let request = ArpMessage {
            opcode: OPCODE_REQUEST,
            sender_ethernet_address: self.ethernet_address,
            sender_ip_address: self.ip_address.ipv4_numeric(),
            target_ethernet_address: [0; 6],
            target_ip_address: next_ip,
        };
        let frame = EthernetFrame {
            header: EthernetHeader {
                dst: ETHERNET_BROADCAST,
                src: self.ethernet_address,
                ethertype: TYPE_ARP,
            },
            payload: arp::serialize(&request),
        };
        trace!("network_interface {}: ARP request for {}", self.name, next_hop);
        port.transmit(&frame);
        self.arp_pending.insert(next_ip, ARP_REQUEST_COOLDOWN_MS);
    }

    pub fn recv_frame(&mut self, frame: EthernetFrame, port: &mut dyn OutputPort) {
        if frame.header.dst != self.ethernet_address && frame.header.dst != ETHERNET_BROADCAST {
            return;
        }

        match frame.header.ethertype {
            TYPE_ARP => self.recv_arp(&frame.payload, port),
            TYPE_IPV4 => {
                if let Some(dgram) = ipv4::parse(&frame.payload) {
                    self.datagrams_received.push_back(dgram);
                }
            }
            _ => {}
        }
    }

    fn recv_arp(&mut self, payload: &[u8], port: &mut dyn OutputPort) {
        let Some(msg) = arp::parse(payload) else {
            return;
        };

        let ip = msg.sender_ip_address;
        self.arp_cache.insert(
            ip,
            ArpCacheEntry {
                mac: msg.sender_ethernet_address,
                remaining_ttl_ms: ARP_CACHE_TTL_MS,
            },
        );
        debug!(
            "network_interface {}: learned {} -> {}",
            self.name,
            Address::from_ipv4_numeric(ip),
            ethernet::to_string(msg.sender_ethernet_address)
        );

        if let Some(mut waiting) = self.arp_waiting.remove(&ip) {
            self.arp_pending.remove(&ip);
            while let Some(dgram) = waiting.pop_front() {
                self.send_datagram(dgram, Address::from_ipv4_numeric(ip), port);
            }
        }

        if msg.opcode == OPCODE_REQUEST && msg.target_ip_address == self.ip_address.ipv4_numeric() {
            let reply = ArpMessage {
                opcode: OPCODE_REPLY,
                sender_ethernet_address: self.ethernet_address,
                sender_ip_address: self.ip_address.ipv4_numeric(),
                target_ethernet_address: msg.sender_ethernet_address,
                target_ip_address: ip,
            };
            let frame = EthernetFrame {
                header: EthernetHeader {
                    dst: msg.sender_ethernet_address,
                    src: self.ethernet_address,
                    ethertype: TYPE_ARP,
                },
                payload: arp::serialize(&reply),
            };
            port.transmit(&frame);
        }
    }

    pub fn tick(&mut self, ms_since_last_tick: u32) {
        self.arp_cache.retain(|_, entry| {
            if ms_since_last_tick >= entry.remaining_ttl_ms {
                false
            } else {
                entry.remaining_ttl_ms -= ms_since_last_tick;
                true
            }
        });

        let expired: Vec<u32> = self
            .arp_pending
            .iter()
            .filter(|(_, &remaining)| ms_since_last_tick >= remaining)
            .map(|(&ip, _)| ip)
            .collect();
        for ip in &expired {
            self.arp_pending.remove(ip);
            self.arp_waiting.remove(ip);
        }
        self.arp_pending.retain(|_, remaining| {
            *remaining -= ms_since_last_tick;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingPort {
        frames: Vec<EthernetFrame>,
    }

    impl OutputPort for RecordingPort {
        fn transmit(&mut self, frame: &EthernetFrame) {
            self.frames.push(frame.clone());
        }
    }

    fn sample_datagram() -> InternetDatagram {
        let header = etherparse::Ipv4Header::new(
            0,
            64,
            etherparse::IpNumber::TCP,
            [192, 168, 0, 1],
            [192, 168, 0, 2],
        )
        .unwrap();
        InternetDatagram::new(header, vec![])
    }

    #[test]
    fn arp_request_throttled_until_reply() {
        let mut iface = NetworkInterface::new("eth0", [1; 6], Address::new(192, 168, 0, 1));
        let mut port = RecordingPort::default();
        let dest = Address::new(192, 168, 0, 2);

        iface.send_datagram(sample_datagram(), dest, &mut port);
        iface.send_datagram(sample_datagram(), dest, &mut port);
        // Only one ARP request despite two datagrams queued.
        let arp_requests = port.frames.iter().filter(|f| f.header.ethertype == TYPE_ARP).count();
        assert_eq!(arp_requests, 1);
        assert_eq!(iface.arp_waiting.get(&dest.ipv4_numeric()).unwrap().len(), 2);

        port.frames.clear();
        let reply = ArpMessage {
            opcode: OPCODE_REPLY,
            sender_ethernet_address: [2; 6],
            sender_ip_address: dest.ipv4_numeric(),
            target_ethernet_address: [1; 6],
            target_ip_address: Address::new(192, 168, 0, 1).ipv4_numeric(),
        };
        let reply_frame = EthernetFrame {
            header: EthernetHeader {
                dst: [1; 6],
                src: [2; 6],
                ethertype: TYPE_ARP,
            },
            payload: arp::serialize(&reply),
        };
        iface.recv_frame(reply_frame, &mut port);

        // Both queued datagrams flushed, in order, as IPv4 frames.
        let ipv4_frames: Vec<_> = port.frames.iter().filter(|f| f.header.ethertype == TYPE_IPV4).collect();
        assert_eq!(ipv4_frames.len(), 2);
        assert!(iface.arp_waiting.get(&dest.ipv4_numeric()).is_none());
    }

    #[test]
    fn pending_arp_expires_and_drops_queued_datagrams() {
        let mut iface = NetworkInterface::new("eth0", [1; 6], Address::new(10, 0, 0, 1));
        let mut port = RecordingPort::default();
        let dest = Address::new(10, 0, 0, 2);
        iface.send_datagram(sample_datagram(), dest, &mut port);
        assert!(iface.arp_pending.contains_key(&dest.ipv4_numeric()));

        iface.tick(ARP_REQUEST_COOLDOWN_MS);
        assert!(!iface.arp_pending.contains_key(&dest.ipv4_numeric()));
        assert!(!iface.arp_waiting.contains_key(&dest.ipv4_numeric()));
    }

    #[test]
    fn arp_cache_entry_expires() {
        let mut iface = NetworkInterface::new("eth0", [1; 6], Address::new(10, 0, 0, 1));
        iface.arp_cache.insert(
            42,
            ArpCacheEntry {
                mac: [9; 6],
                remaining_ttl_ms: 100,
            },
        );
        iface.tick(50);
        assert!(iface.arp_cache.contains_key(&42));
        iface.tick(100);
        assert!(!iface.arp_cache.contains_key(&42));
    }

    #[test]
    fn frame_not_addressed_to_us_is_dropped() {
        let mut iface = NetworkInterface::new("eth0", [1; 6], Address::new(10, 0, 0, 1));
        let mut port = RecordingPort::default();
        let frame = EthernetFrame {
            header: EthernetHeader {
                dst: [9; 6], // neither us nor broadcast
                src: [2; 6],
                ethertype: TYPE_IPV4,
            },
            payload: ipv4::serialize(&sample_datagram()),
        };
        iface.recv_frame(frame, &mut port);
        assert!(iface.datagrams_received.is_empty());
    }
}
