//! Consumes segments from the peer's sender, drives a [`Reassembler`], and
//! reports back an ackno/window/RST for the peer's sender to act on.

use log::trace;

use crate::byte_stream::ByteStream;
use crate::config::MAX_WINDOW_SIZE;
use crate::message::{TCPReceiverMessage, TCPSenderMessage};
use crate::reassembler::Reassembler;
use crate::wrap::Wrap32;

/// Mirrors [`crate::tcp_sender::TCPSenderState`]: a diagnostic view derived
/// from `isn` and the underlying stream, not a separately tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TCPReceiverState {
    Listen,
    SynReceived,
    FinReceived,
}

#[derive(Debug)]
pub struct TCPReceiver {
    reassembler: Reassembler,
    isn: Option<Wrap32>,
}

impl TCPReceiver {
    pub fn new(capacity: usize) -> Self {
        TCPReceiver {
            reassembler: Reassembler::new(ByteStream::new(capacity)),
            isn: None,
        }
    }

    pub fn writer(&mut self) -> &mut ByteStream {
        self.reassembler.output_mut()
    }

    pub fn reader(&self) -> &ByteStream {
        self.reassembler.output()
    }

    pub fn state(&self) -> TCPReceiverState {
        match self.isn {
            None => TCPReceiverState::Listen,
            Some(_) if self.reader().is_closed() => TCPReceiverState::FinReceived,
            Some(_) => TCPReceiverState::SynReceived,
        }
    }

    pub fn receive(&mut self, msg: TCPSenderMessage) {
        if msg.rst {
            self.reassembler.output_mut().set_error();
            return;
        }
        if msg.syn && self.isn.is_none() {
            self.isn = Some(msg.seqno);
        }
        let Some(isn) = self.isn else {
            trace!("tcp_receiver: dropping segment received before SYN");
            return;
        };

        let checkpoint = self.reassembler.output().bytes_pushed();
        let abs_seqno = msg.seqno.unwrap(isn, checkpoint);
        let stream_index = abs_seqno + msg.syn as u64 - 1;

        self.reassembler.insert(stream_index, msg.payload, msg.fin);
    }

    pub fn send(&self) -> TCPReceiverMessage {
        let writer = self.reassembler.output();
        let window_size = writer.available_capacity().min(MAX_WINDOW_SIZE as usize) as u16;

        let ackno = self.isn.map(|isn| {
            let mut abs_ackno = writer.bytes_pushed() + 1;
            if writer.is_closed() {
                abs_ackno += 1;
            }
            Wrap32::wrap(abs_ackno, isn)
        });

        TCPReceiverMessage {
            ackno,
            window_size,
            rst: writer.has_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_syn_segment_yields_ackno_one() {
        let mut r = TCPReceiver::new(10);
        r.receive(TCPSenderMessage {
            seqno: Wrap32::new(5),
            syn: true,
            payload: vec![],
            fin: false,
            rst: false,
        });
        let msg = r.send();
        assert_eq!(msg.ackno, Some(Wrap32::new(6)));
        assert!(!msg.rst);
    }

    #[test]
    fn data_before_syn_is_dropped() {
        let mut r = TCPReceiver::new(10);
        r.receive(TCPSenderMessage {
            seqno: Wrap32::new(5),
            syn: false,
            payload: b"hi".to_vec(),
            fin: false,
            rst: false,
        });
        assert_eq!(r.send().ackno, None);
        assert_eq!(r.reader().bytes_buffered(), 0);
    }

    #[test]
    fn fin_advances_ackno_past_close() {
        let mut r = TCPReceiver::new(10);
        r.receive(TCPSenderMessage {
            seqno: Wrap32::new(0),
            syn: true,
            payload: b"ab".to_vec(),
            fin: true,
            rst: false,
        });
        assert!(r.reader().is_closed());
        // SYN(1) + "ab"(2) + FIN(1) = 4 bytes of sequence space consumed.
        assert_eq!(r.send().ackno, Some(Wrap32::new(4)));
    }

    #[test]
    fn rst_sets_sticky_error_reported_on_send() {
        let mut r = TCPReceiver::new(10);
        r.receive(TCPSenderMessage {
            seqno: Wrap32::new(0),
            syn: true,
            payload: vec![],
            fin: false,
            rst: false,
        });
        r.receive(TCPSenderMessage {
            seqno: Wrap32::new(1),
            syn: false,
            payload: vec![],
            fin: false,
            rst: true,
        });
        assert!(r.send().rst);
    }

    #[test]
    fn window_size_reflects_available_capacity() {
        let mut r = TCPReceiver::new(5);
        r.receive(TCPSenderMessage {
            seqno: Wrap32::new(0),
            syn: true,
            payload: b"ab".to_vec(),
            fin: false,
            rst: false,
        });
        assert_eq!(r.send().window_size, 3);
    }
}
