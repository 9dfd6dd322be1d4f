//! TUN-backed socket glue: a background thread drains the device and feeds
//! frames into the split [`TCPSender`]/[`TCPReceiver`] core, exposing a
//! blocking `TcpListener`/`TcpStream` pair behind a `Mutex` + `Condvar`, the
//! way the core's caller-driven `tick` model gets adapted to a wall-clock
//! world.

use std::collections::{hash_map, HashMap, VecDeque};
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

use std::os::unix::io::AsRawFd;

use bitflags::bitflags;
use etherparse::{IpNumber, Ipv4Header, Ipv4HeaderSlice, TcpHeader, TcpHeaderSlice};
use log::{debug, trace, warn};
use nix::poll::{poll, PollFd, PollFlags};
use rand::random;

use crate::byte_stream::ByteStream;
use crate::config::{self, LISTEN_BACKLOG, MAX_WINDOW_SIZE};
use crate::error::{Error, Result};
use crate::message::{TCPReceiverMessage, TCPSenderMessage};
use crate::tcp_receiver::TCPReceiver;
use crate::tcp_sender::TCPSender;
use crate::wrap::Wrap32;

const BUFFER_SIZE: usize = 2048;
const TTL: u8 = 64;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Available: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct Tcp4Tuple {
    pub src: (Ipv4Addr, u16),
    pub dst: (Ipv4Addr, u16),
}

/// Pairs a [`TCPSender`] and [`TCPReceiver`] for one quad, owning the
/// read/write `ByteStream`s the application-facing `TcpStream` drains and fills.
struct Connection {
    sender: TCPSender,
    receiver: TCPReceiver,
    last_tick: Instant,
}

impl Connection {
    fn listen_capacity() -> usize {
        64 * 1024
    }

    fn accept(quad: Tcp4Tuple, tcp: &TcpHeaderSlice, data: &[u8], nic: &tun_tap::Iface) -> Result<Self> {
        if !tcp.syn() {
            return Err(Error::ConnectionClosed);
        }
        let mut receiver = TCPReceiver::new(Self::listen_capacity());
        receiver.receive(TCPSenderMessage {
            seqno: Wrap32::new(tcp.sequence_number()),
            syn: true,
            payload: data.to_vec(),
            fin: tcp.fin(),
            rst: tcp.rst(),
        });

        let isn = Wrap32::new(random());
        let mut sender = TCPSender::new(ByteStream::new(Self::listen_capacity()), isn, config::initial_rto_ms());
        sender.receive(&TCPReceiverMessage {
            ackno: None,
            window_size: tcp.window_size(),
            rst: false,
        });

        let mut conn = Connection {
            sender,
            receiver,
            last_tick: Instant::now(),
        };
        conn.flush(quad, nic)?;
        Ok(conn)
    }

    fn on_segment(&mut self, tcp: &TcpHeaderSlice, data: &[u8]) {
        self.receiver.receive(TCPSenderMessage {
            seqno: Wrap32::new(tcp.sequence_number()),
            syn: tcp.syn(),
            payload: data.to_vec(),
            fin: tcp.fin(),
            rst: tcp.rst(),
        });

        if tcp.ack() {
            self.sender.receive(&TCPReceiverMessage {
                ackno: Some(Wrap32::new(tcp.acknowledgment_number())),
                window_size: tcp.window_size(),
                rst: tcp.rst(),
            });
        }
    }

    fn availability(&self) -> Available {
        let mut avail = Available::empty();
        let reader = self.receiver.reader();
        if !reader.is_closed() && reader.bytes_buffered() > 0 {
            avail |= Available::READ;
        }
        if reader.is_finished() || reader.has_error() {
            avail |= Available::READ;
        }
        let writer_has_room = self.sender.reader().available_capacity() > 0;
        if writer_has_room {
            avail |= Available::WRITE;
        }
        avail
    }

    fn is_done(&self) -> bool {
        let sender_done = self.sender.reader().is_finished() && self.sender.consecutive_retransmissions() == 0;
        sender_done && self.receiver.reader().is_finished()
    }

    /// Drains any segments the sender has queued up and writes them to the
    /// device, piggybacking our receiver's ackno/window on each one.
    fn flush(&mut self, quad: Tcp4Tuple, nic: &tun_tap::Iface) -> Result<()> {
        let mut outgoing = Vec::new();
        self.sender.push(|m| outgoing.push(m.clone()));
        if outgoing.is_empty() {
            // Still send a bare ack if the peer needs window updates.
            outgoing.push(self.sender.make_empty_message());
        }
        for msg in &outgoing {
            let recv_msg = self.receiver.send();
            let bytes = marshal_segment(quad, msg, &recv_msg)?;
            nic.send(&bytes).map_err(Error::Tun)?;
        }
        Ok(())
    }

    fn tick(&mut self, quad: Tcp4Tuple, nic: &tun_tap::Iface) -> Result<()> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_millis() as u64;
        self.last_tick = now;
        if elapsed == 0 {
            return Ok(());
        }
        let mut retransmits = Vec::new();
        self.sender.tick(elapsed, |m| retransmits.push(m.clone()));
        for msg in &retransmits {
            let recv_msg = self.receiver.send();
            let bytes = marshal_segment(quad, msg, &recv_msg)?;
            nic.send(&bytes).map_err(Error::Tun)?;
        }
        Ok(())
    }
}

fn marshal_segment(quad: Tcp4Tuple, msg: &TCPSenderMessage, recv: &TCPReceiverMessage) -> Result<Vec<u8>> {
    let (src_ip, src_port) = quad.dst; // we respond from what was the destination
    let (dst_ip, dst_port) = quad.src;

    let mut tcp = TcpHeader::new(
        src_port,
        dst_port,
        msg.seqno.raw_value(),
        recv.window_size.min(MAX_WINDOW_SIZE),
    );
    tcp.syn = msg.syn;
    tcp.fin = msg.fin;
    tcp.rst = msg.rst || recv.rst;
    if let Some(ackno) = recv.ackno {
        tcp.ack = true;
        tcp.acknowledgment_number = ackno.raw_value();
    }

    let ip = Ipv4Header::new(
        tcp.header_len() as u16 + msg.payload.len() as u16,
        TTL,
        IpNumber::TCP,
        src_ip.octets(),
        dst_ip.octets(),
    )
    .map_err(|_| Error::ConnectionClosed)?;

    tcp.checksum = tcp
        .calc_checksum_ipv4(&ip, &msg.payload)
        .expect("failed to compute TCP checksum");

    let mut out = Vec::with_capacity(ip.header_len() + tcp.header_len() as usize + msg.payload.len());
    ip.write(&mut out).expect("failed to write IPv4 header");
    tcp.write(&mut out).expect("failed to write TCP header");
    out.extend_from_slice(&msg.payload);
    Ok(out)
}

type InterfaceHandle = Arc<InterfaceManager>;

#[derive(Default)]
struct InterfaceManager {
    manager: Mutex<ConnectionManager>,
    pending_var: Condvar,
    receive_var: Condvar,
}

#[derive(Default)]
struct ConnectionManager {
    pending: HashMap<u16, VecDeque<Tcp4Tuple>>,
    connections: HashMap<Tcp4Tuple, Connection>,
    terminate: bool,
}

/// Owns the background thread that drains a TUN device into the core.
pub struct Interface {
    ih: Option<InterfaceHandle>,
    jh: Option<thread::JoinHandle<Result<()>>>,
}

/// How long a single poll waits for the TUN device to become readable
/// before looping back to re-check the termination flag.
const POLL_TIMEOUT_MS: i32 = 200;

fn packet_loop(nic: tun_tap::Iface, ih: InterfaceHandle) -> Result<()> {
    let mut buf = [0u8; BUFFER_SIZE];
    let raw_fd = nic.as_raw_fd();

    loop {
        {
            let cm = ih.manager.lock().unwrap();
            if cm.terminate {
                return Ok(());
            }
        }

        let mut fds = [PollFd::new(raw_fd, PollFlags::POLLIN)];
        match poll(&mut fds, POLL_TIMEOUT_MS) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(e) => return Err(Error::Tun(io::Error::from(e))),
        }

        let nbytes = nic.recv(&mut buf[..]).map_err(Error::Tun)?;
        let version = buf[0] >> 4;
        if version != 4 {
            continue;
        }
        let Ok(ip) = Ipv4HeaderSlice::from_slice(&buf[..nbytes]) else {
            trace!("host: dropping frame with unparsable IPv4 header");
            continue;
        };
        if ip.protocol() != IpNumber::TCP {
            continue;
        }
        let src = ip.source_addr();
        let dst = ip.destination_addr();
        let ip_len = ip.slice().len();
        let Ok(tcp) = TcpHeaderSlice::from_slice(&buf[ip_len..nbytes]) else {
            trace!("host: dropping frame with unparsable TCP header");
            continue;
        };
        let tcp_len = tcp.slice().len();
        let data = &buf[ip_len + tcp_len..nbytes];

        let quad = Tcp4Tuple {
            src: (src, tcp.source_port()),
            dst: (dst, tcp.destination_port()),
        };

        let mut cm_guard = ih.manager.lock().unwrap();
        let cm = &mut *cm_guard;

        match cm.connections.entry(quad) {
            hash_map::Entry::Occupied(mut entry) => {
                let conn = entry.get_mut();
                conn.on_segment(&tcp, data);
                if let Err(e) = conn.flush(quad, &nic) {
                    warn!("host: error flushing segment for {:?}: {}", quad, e);
                }
                let avail = conn.availability();
                let done = conn.is_done();
                if done {
                    entry.remove();
                }
                drop(cm_guard);
                if avail.contains(Available::READ) {
                    ih.receive_var.notify_all();
                }
            }
            hash_map::Entry::Vacant(entry) => {
                if let Some(pending) = cm.pending.get_mut(&quad.dst.1) {
                    if pending.len() >= LISTEN_BACKLOG {
                        warn!("host: backlog full on port {}, dropping SYN", quad.dst.1);
                        continue;
                    }
                    match Connection::accept(quad, &tcp, data, &nic) {
                        Ok(conn) => {
                            debug!("host: accepted connection {:?}", quad);
                            entry.insert(conn);
                            pending.push_back(quad);
                            drop(cm_guard);
                            ih.pending_var.notify_all();
                        }
                        Err(e) => warn!("host: failed to accept {:?}: {}", quad, e),
                    }
                }
            }
        }
    }
}

impl Interface {
    pub fn new(tun_name: &str) -> Result<Self> {
        let nic = tun_tap::Iface::without_packet_info(tun_name, tun_tap::Mode::Tun).map_err(Error::Tun)?;
        let ih: InterfaceHandle = Arc::default();
        let jh = {
            let ih = ih.clone();
            Some(thread::spawn(move || packet_loop(nic, ih)))
        };
        Ok(Interface { ih: Some(ih), jh })
    }

    pub fn bind(&mut self, port: u16) -> Result<TcpListener> {
        let mut cm = self.ih.as_mut().unwrap().manager.lock().unwrap();
        match cm.pending.entry(port) {
            hash_map::Entry::Vacant(v) => {
                v.insert(VecDeque::new());
            }
            hash_map::Entry::Occupied(_) => return Err(Error::PortInUse(port)),
        }
        drop(cm);
        Ok(TcpListener {
            ih: self.ih.as_mut().unwrap().clone(),
            port,
        })
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        if let Some(ih) = self.ih.as_ref() {
            ih.manager.lock().unwrap().terminate = true;
        }
        drop(self.ih.take());
        if let Some(jh) = self.jh.take() {
            let _ = jh.join();
        }
    }
}

pub struct TcpListener {
    ih: InterfaceHandle,
    port: u16,
}

impl TcpListener {
    pub fn accept(&mut self) -> Result<TcpStream> {
        let mut cm = self.ih.manager.lock().unwrap();
        loop {
            if let Some(quad) = cm
                .pending
                .get_mut(&self.port)
                .ok_or(Error::NoListener(self.port))?
                .pop_front()
            {
                return Ok(TcpStream {
                    ih: self.ih.clone(),
                    quad,
                });
            }
            cm = self.ih.pending_var.wait(cm).unwrap();
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        let mut cm = self.ih.manager.lock().unwrap();
        if let Some(pending) = cm.pending.remove(&self.port) {
            for quad in pending {
                trace!("host: dropping un-accepted connection {:?}", quad);
            }
        }
    }
}

pub struct TcpStream {
    ih: InterfaceHandle,
    quad: Tcp4Tuple,
}

impl io::Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cm = self.ih.manager.lock().unwrap();
        loop {
            let conn = cm
                .connections
                .get_mut(&self.quad)
                .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;

            let reader = conn.receiver.reader();
            if reader.bytes_buffered() == 0 {
                if reader.is_finished() || reader.has_error() {
                    return Ok(0);
                }
                cm = self.ih.receive_var.wait(cm).unwrap();
                continue;
            }

            let conn = cm.connections.get_mut(&self.quad).unwrap();
            let writer_stream = conn.receiver.writer();
            let chunk = writer_stream.peek().to_vec();
            let take = buf.len().min(chunk.len());
            buf[..take].copy_from_slice(&chunk[..take]);
            writer_stream.pop(take);
            return Ok(take);
        }
    }
}

impl io::Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut cm = self.ih.manager.lock().unwrap();
        let conn = cm
            .connections
            .get_mut(&self.quad)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;

        let stream = conn.sender.writer();
        let before = stream.bytes_pushed();
        stream.push(buf);
        let written = (stream.bytes_pushed() - before) as usize;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let cm = self.ih.manager.lock().unwrap();
        let conn = cm
            .connections
            .get(&self.quad)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;
        if conn.sender.reader().bytes_buffered() == 0 {
            return Ok(());
        }
        Err(io::Error::new(io::ErrorKind::WouldBlock, "unflushed bytes remain queued"))
    }
}

impl TcpStream {
    pub fn shutdown(&self, _how: std::net::Shutdown) -> io::Result<()> {
        let mut cm = self.ih.manager.lock().unwrap();
        if let Some(conn) = cm.connections.get_mut(&self.quad) {
            conn.sender.writer().close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_reports_writable_before_any_reads() {
        let quad = Tcp4Tuple {
            src: (Ipv4Addr::new(10, 0, 0, 2), 5000),
            dst: (Ipv4Addr::new(10, 0, 0, 1), 80),
        };
        let mut sender = TCPSender::new(ByteStream::new(100), Wrap32::new(0), config::initial_rto_ms());
        sender.receive(&TCPReceiverMessage {
            ackno: None,
            window_size: 10,
            rst: false,
        });
        let conn = Connection {
            sender,
            receiver: TCPReceiver::new(100),
            last_tick: Instant::now(),
        };
        assert!(conn.availability().contains(Available::WRITE));
        assert!(!conn.availability().contains(Available::READ));
        let _ = quad;
    }

    #[test]
    fn marshal_segment_sets_flags_and_checksum() {
        let quad = Tcp4Tuple {
            src: (Ipv4Addr::new(10, 0, 0, 2), 5000),
            dst: (Ipv4Addr::new(10, 0, 0, 1), 80),
        };
        let msg = TCPSenderMessage {
            seqno: Wrap32::new(42),
            syn: true,
            payload: vec![],
            fin: false,
            rst: false,
        };
        let recv = TCPReceiverMessage {
            ackno: Some(Wrap32::new(1)),
            window_size: 10,
            rst: false,
        };
        let bytes = marshal_segment(quad, &msg, &recv).expect("marshals");
        let ip = Ipv4HeaderSlice::from_slice(&bytes).expect("valid ip header");
        let ip_len = ip.slice().len();
        let tcp = TcpHeaderSlice::from_slice(&bytes[ip_len..]).expect("valid tcp header");
        assert!(tcp.syn());
        assert!(tcp.ack());
        assert_eq!(tcp.sequence_number(), 42);
        assert_eq!(tcp.acknowledgment_number(), 1);
    }
}
