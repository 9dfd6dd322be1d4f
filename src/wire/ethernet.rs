//! Ethernet framing. `etherparse` has no standalone Ethernet-II codec (it
//! only exposes header parsing bundled with higher layers), so this is a
//! hand-rolled fixed-layout codec against the 14-byte Ethernet-II header.

pub type EthernetAddress = [u8; 6];

pub const ETHERNET_BROADCAST: EthernetAddress = [0xFF; 6];
pub const TYPE_IPV4: u16 = 0x0800;
pub const TYPE_ARP: u16 = 0x0806;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: EthernetAddress,
    pub src: EthernetAddress,
    pub ethertype: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub header: EthernetHeader,
    pub payload: Vec<u8>,
}

pub fn to_string(addr: EthernetAddress) -> String {
    addr.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn serialize(frame: &EthernetFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(14 + frame.payload.len());
    out.extend_from_slice(&frame.header.dst);
    out.extend_from_slice(&frame.header.src);
    out.extend_from_slice(&frame.header.ethertype.to_be_bytes());
    out.extend_from_slice(&frame.payload);
    out
}

pub fn parse(bytes: &[u8]) -> Option<EthernetFrame> {
    if bytes.len() < 14 {
        return None;
    }
    let mut dst = [0u8; 6];
    let mut src = [0u8; 6];
    dst.copy_from_slice(&bytes[0..6]);
    src.copy_from_slice(&bytes[6..12]);
    let ethertype = u16::from_be_bytes([bytes[12], bytes[13]]);
    Some(EthernetFrame {
        header: EthernetHeader { dst, src, ethertype },
        payload: bytes[14..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let frame = EthernetFrame {
            header: EthernetHeader {
                dst: ETHERNET_BROADCAST,
                src: [1, 2, 3, 4, 5, 6],
                ethertype: TYPE_ARP,
            },
            payload: vec![1, 2, 3],
        };
        let bytes = serialize(&frame);
        assert_eq!(parse(&bytes), Some(frame));
    }

    #[test]
    fn truncated_frame_fails_to_parse() {
        assert_eq!(parse(&[0u8; 10]), None);
    }
}
