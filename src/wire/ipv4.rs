//! IPv4 datagrams. Header parsing, serialization, and checksum computation
//! are delegated to `etherparse` — the one wire format this crate doesn't
//! hand-roll, per the checksum/parsing collaborators assumed available.

use etherparse::{IpNumber, Ipv4Header, Ipv4HeaderSlice};

#[derive(Debug, Clone, PartialEq)]
pub struct InternetDatagram {
    pub header: Ipv4Header,
    pub payload: Vec<u8>,
}

impl InternetDatagram {
    pub fn new(header: Ipv4Header, payload: Vec<u8>) -> Self {
        InternetDatagram { header, payload }
    }

    pub fn ttl(&self) -> u8 {
        self.header.time_to_live
    }

    pub fn destination(&self) -> u32 {
        u32::from_be_bytes(self.header.destination)
    }

    /// Decrements TTL by one and recomputes the header checksum. Caller is
    /// responsible for having checked `ttl() > 1` first.
    pub fn decrement_ttl_and_recompute_checksum(&mut self) {
        self.header.time_to_live -= 1;
        self.header.header_checksum = self
            .header
            .calc_header_checksum()
            .expect("failed to compute IPv4 header checksum");
    }
}

pub fn serialize(dgram: &InternetDatagram) -> Vec<u8> {
    let mut out = Vec::with_capacity(dgram.header.header_len() + dgram.payload.len());
    dgram
        .header
        .write(&mut out)
        .expect("failed to serialize IPv4 header");
    out.extend_from_slice(&dgram.payload);
    out
}

pub fn parse(bytes: &[u8]) -> Option<InternetDatagram> {
    let header_slice = Ipv4HeaderSlice::from_slice(bytes).ok()?;
    let header = header_slice.to_header();
    let header_len = header_slice.slice().len();
    if bytes.len() < header_len {
        return None;
    }
    Some(InternetDatagram {
        header,
        payload: bytes[header_len..].to_vec(),
    })
}
