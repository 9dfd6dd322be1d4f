//! ARP messages (RFC 826), specialized to Ethernet/IPv4. No `etherparse`
//! support exists for ARP, so this is a hand-rolled fixed-layout codec
//! mirroring the 28-byte Ethernet/IPv4 ARP packet.

use crate::wire::ethernet::EthernetAddress;

pub const OPCODE_REQUEST: u16 = 1;
pub const OPCODE_REPLY: u16 = 2;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const HLEN_ETHERNET: u8 = 6;
const PLEN_IPV4: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: u16,
    pub sender_ethernet_address: EthernetAddress,
    pub sender_ip_address: u32,
    pub target_ethernet_address: EthernetAddress,
    pub target_ip_address: u32,
}

pub fn serialize(msg: &ArpMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(28);
    out.extend_from_slice(&HTYPE_ETHERNET.to_be_bytes());
    out.extend_from_slice(&PTYPE_IPV4.to_be_bytes());
    out.push(HLEN_ETHERNET);
    out.push(PLEN_IPV4);
    out.extend_from_slice(&msg.opcode.to_be_bytes());
    out.extend_from_slice(&msg.sender_ethernet_address);
    out.extend_from_slice(&msg.sender_ip_address.to_be_bytes());
    out.extend_from_slice(&msg.target_ethernet_address);
    out.extend_from_slice(&msg.target_ip_address.to_be_bytes());
    out
}

pub fn parse(bytes: &[u8]) -> Option<ArpMessage> {
    if bytes.len() < 28 {
        return None;
    }
    let htype = u16::from_be_bytes([bytes[0], bytes[1]]);
    let ptype = u16::from_be_bytes([bytes[2], bytes[3]]);
    let hlen = bytes[4];
    let plen = bytes[5];
    if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 || hlen != HLEN_ETHERNET || plen != PLEN_IPV4 {
        return None;
    }
    let opcode = u16::from_be_bytes([bytes[6], bytes[7]]);
    let mut sender_ethernet_address = [0u8; 6];
    sender_ethernet_address.copy_from_slice(&bytes[8..14]);
    let sender_ip_address = u32::from_be_bytes(bytes[14..18].try_into().unwrap());
    let mut target_ethernet_address = [0u8; 6];
    target_ethernet_address.copy_from_slice(&bytes[18..24]);
    let target_ip_address = u32::from_be_bytes(bytes[24..28].try_into().unwrap());

    Some(ArpMessage {
        opcode,
        sender_ethernet_address,
        sender_ip_address,
        target_ethernet_address,
        target_ip_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let msg = ArpMessage {
            opcode: OPCODE_REQUEST,
            sender_ethernet_address: [1, 2, 3, 4, 5, 6],
            sender_ip_address: 0x0A000001,
            target_ethernet_address: [0; 6],
            target_ip_address: 0x0A000002,
        };
        let bytes = serialize(&msg);
        assert_eq!(bytes.len(), 28);
        assert_eq!(parse(&bytes), Some(msg));
    }

    #[test]
    fn rejects_wrong_hardware_type() {
        let mut bytes = serialize(&ArpMessage {
            opcode: OPCODE_REPLY,
            sender_ethernet_address: [0; 6],
            sender_ip_address: 0,
            target_ethernet_address: [0; 6],
            target_ip_address: 0,
        });
        bytes[1] = 0xFF; // corrupt htype low byte
        assert_eq!(parse(&bytes), None);
    }

    #[test]
    fn truncated_message_fails_to_parse() {
        assert_eq!(parse(&[0u8; 10]), None);
    }
}
