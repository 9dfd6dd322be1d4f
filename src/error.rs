//! Crate-wide error type for the host/IO boundary.
//!
//! The core state machines (`byte_stream`, `reassembler`, `wrap`,
//! `tcp_sender`, `tcp_receiver`, `network_interface`, `router`) never
//! construct this type: they signal failure through sticky flags, RST
//! segments, or silent drops per the error handling design. `Error` only
//! covers the handful of operations that touch the OS.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bring up TUN device: {0}")]
    Tun(#[from] std::io::Error),

    #[error("port {0} is already bound")]
    PortInUse(u16),

    #[error("no listener bound on port {0}")]
    NoListener(u16),

    #[error("interface index {0} out of range")]
    NoSuchInterface(usize),

    #[error("connection reset or closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
