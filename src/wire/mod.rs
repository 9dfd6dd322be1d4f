//! Wire encode/decode collaborators assumed available by the core: frame
//! and packet formats the core treats as opaque `serialize`/`parse` pairs.

pub mod arp;
pub mod ethernet;
pub mod ipv4;
