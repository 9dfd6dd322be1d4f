//! A from-scratch TCP/IP stack: wrapping sequence numbers, a reassembling
//! byte stream, a windowed sender/receiver pair, ARP-backed Ethernet/IPv4
//! bridging, and longest-prefix-match routing, with TUN-backed host glue
//! on top for exercising the stack against a real device.

pub mod address;
pub mod byte_stream;
pub mod config;
pub mod error;
pub mod host;
pub mod message;
pub mod network_interface;
pub mod reassembler;
pub mod router;
pub mod tcp_receiver;
pub mod tcp_sender;
pub mod wire;
pub mod wrap;

pub use address::Address;
pub use byte_stream::ByteStream;
pub use error::{Error, Result};
pub use host::{Interface, TcpListener, TcpStream};
pub use message::{TCPReceiverMessage, TCPSenderMessage};
pub use network_interface::NetworkInterface;
pub use reassembler::Reassembler;
pub use router::Router;
pub use tcp_receiver::TCPReceiver;
pub use tcp_sender::TCPSender;
pub use wrap::Wrap32;
