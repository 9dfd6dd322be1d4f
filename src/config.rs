//! Tunables shared across the core and the host glue.
//!
//! Everything here is a compile-time default. The couple of knobs a
//! deployer would plausibly want to change at runtime (MTU, initial RTO)
//! are also read from the environment by [`initial_rto_ms`] and
//! [`tun_mtu`], falling back to the constant when unset or unparsable.

use std::env;

/// Largest payload a single `TCPSenderMessage` will carry.
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Time-to-live of a learned ARP cache entry.
pub const ARP_CACHE_TTL_MS: u32 = 30_000;

/// Minimum gap between two ARP requests for the same unresolved address.
pub const ARP_REQUEST_COOLDOWN_MS: u32 = 5_000;

/// TCP receive window is advertised in 16 bits; never claim more than this.
pub const MAX_WINDOW_SIZE: u16 = u16::MAX;

/// Window probed for when the peer advertises a zero window.
pub const ZERO_WINDOW_PROBE_SIZE: u64 = 1;

/// Default retransmission timeout, used unless [`initial_rto_ms`] finds an override.
pub const DEFAULT_INITIAL_RTO_MS: u64 = 1000;

/// Default link MTU for the host-glue TUN device, used unless [`tun_mtu`] finds an override.
pub const DEFAULT_TUN_MTU: usize = 1500;

/// Backlog of not-yet-`accept`ed connections a listening port will hold.
pub const LISTEN_BACKLOG: usize = 16;

/// Initial RTO in milliseconds, overridable via `MINITCP_INITIAL_RTO_MS`.
pub fn initial_rto_ms() -> u64 {
    env_override("MINITCP_INITIAL_RTO_MS", DEFAULT_INITIAL_RTO_MS)
}

/// TUN device MTU, overridable via `MINITCP_TUN_MTU`.
pub fn tun_mtu() -> usize {
    env_override("MINITCP_TUN_MTU", DEFAULT_TUN_MTU)
}

fn env_override<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
