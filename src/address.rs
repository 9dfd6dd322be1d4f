//! A thin numeric-friendly wrapper over an IPv4 address, the way the core
//! components want to talk about "next hop" and interface addresses.

use std::fmt;
use std::net::Ipv4Addr;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(Ipv4Addr);

impl Address {
    pub fn from_ipv4_numeric(raw: u32) -> Self {
        Address(Ipv4Addr::from(raw))
    }

    pub fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Address(Ipv4Addr::new(a, b, c, d))
    }

    pub fn ipv4_numeric(self) -> u32 {
        u32::from(self.0)
    }

    pub fn ip(self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Self {
        Address(addr)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
