//! Fills the peer's advertised window from an outbound [`ByteStream`],
//! tracks which segments are outstanding, and runs the retransmission
//! timer with exponential backoff.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::byte_stream::ByteStream;
use crate::config::{MAX_PAYLOAD_SIZE, ZERO_WINDOW_PROBE_SIZE};
use crate::message::TCPSenderMessage;
use crate::wrap::Wrap32;

/// The sender's lifecycle, derived from its flags/counters for diagnostics.
/// The flags (`syn_sent`, `fin_sent`) remain the source of truth; this is a
/// read-only view over them, not a separate state to keep in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TCPSenderState {
    Closed,
    SynSent,
    Established,
    FinSent,
    Done,
}

#[derive(Debug)]
pub struct TCPSender {
    input: ByteStream,
    isn: Wrap32,
    initial_rto_ms: u64,

    syn_sent: bool,
    fin_sent: bool,

    next_seqno: u64,
    ack_seqno: u64,
    window_size: u16,

    consecutive_retransmissions: u64,
    current_rto_ms: u64,
    timer_ms: u64,
    timer_running: bool,

    outstanding: VecDeque<TCPSenderMessage>,
}

impl TCPSender {
    pub fn new(input: ByteStream, isn: Wrap32, initial_rto_ms: u64) -> Self {
        TCPSender {
            input,
            isn,
            initial_rto_ms,
            syn_sent: false,
            fin_sent: false,
            next_seqno: 0,
            ack_seqno: 0,
            window_size: 1,
            consecutive_retransmissions: 0,
            current_rto_ms: initial_rto_ms,
            timer_ms: 0,
            timer_running: false,
            outstanding: VecDeque::new(),
        }
    }

    pub fn writer(&mut self) -> &mut ByteStream {
        &mut self.input
    }

    pub fn reader(&self) -> &ByteStream {
        &self.input
    }

    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.next_seqno - self.ack_seqno
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }

    pub fn state(&self) -> TCPSenderState {
        if !self.syn_sent {
            TCPSenderState::Closed
        } else if self.ack_seqno == 0 {
            TCPSenderState::SynSent
        } else if !self.fin_sent {
            TCPSenderState::Established
        } else if self.ack_seqno == self.next_seqno {
            TCPSenderState::Done
        } else {
            TCPSenderState::FinSent
        }
    }

    /// Fills the window by calling `transmit` once per outbound segment.
    pub fn push(&mut self, mut transmit: impl FnMut(&TCPSenderMessage)) {
        let effective_window = self.window_size.max(ZERO_WINDOW_PROBE_SIZE as u16) as u64;

        loop {
            if self.fin_sent || effective_window <= self.sequence_numbers_in_flight() {
                break;
            }

            let mut msg = TCPSenderMessage {
                seqno: Wrap32::wrap(self.next_seqno, self.isn),
                rst: self.input.has_error(),
                ..Default::default()
            };

            if !self.syn_sent {
                msg.syn = true;
                self.syn_sent = true;
                self.current_rto_ms = self.initial_rto_ms;
            }

            let in_flight = self.sequence_numbers_in_flight();
            let remaining = effective_window
                .saturating_sub(in_flight)
                .saturating_sub(msg.sequence_length() as u64);
            let payload_budget = remaining.min(MAX_PAYLOAD_SIZE as u64) as usize;

            while msg.payload.len() < payload_budget {
                let view = self.input.peek();
                if view.is_empty() {
                    break;
                }
                let take = view.len().min(payload_budget - msg.payload.len());
                msg.payload.extend_from_slice(&view[..take]);
                self.input.pop(take);
            }

            if !msg.fin
                && self.input.is_finished()
                && effective_window > in_flight + msg.sequence_length() as u64
            {
                msg.fin = true;
                self.fin_sent = true;
            }

            if msg.sequence_length() == 0 && !msg.rst {
                break;
            }

            if !self.timer_running {
                self.timer_running = true;
                self.timer_ms = 0;
            }

            trace!(
                "tcp_sender: transmit seqno={:?} syn={} len={} fin={} rst={}",
                msg.seqno,
                msg.syn,
                msg.payload.len(),
                msg.fin,
                msg.rst
            );
            transmit(&msg);
            self.next_seqno += msg.sequence_length() as u64;
            let done = msg.fin || msg.rst;
            self.outstanding.push_back(msg);

            if done {
                break;
            }
        }
    }

    pub fn make_empty_message(&self) -> TCPSenderMessage {
        TCPSenderMessage {
            seqno: Wrap32::wrap(self.next_seqno, self.isn),
            rst: self.input.has_error(),
            ..Default::default()
        }
    }

    pub fn receive(&mut self, msg: &crate::message::TCPReceiverMessage) {
        if msg.rst {
            self.input.set_error();
            return;
        }
        self.window_size = msg.window_size;

        let Some(ackno) = msg.ackno else {
            return;
        };
        let recv_ack = ackno.unwrap(self.isn, self.next_seqno);
        if recv_ack > self.next_seqno {
            return; // acks something we never sent
        }

        let mut new_data_acked = false;
        if recv_ack > self.ack_seqno {
            let mut seg_start = self.ack_seqno;
            self.ack_seqno = recv_ack;
            new_data_acked = true;

            while let Some(seg) = self.outstanding.front() {
                let seg_end = seg_start + seg.sequence_length() as u64;
                if seg_end <= recv_ack {
                    seg_start = seg_end;
                    self.outstanding.pop_front();
                } else {
                    break;
                }
            }
        }

        if new_data_acked {
            debug!("tcp_sender: new data acked through {}", recv_ack);
            self.current_rto_ms = self.initial_rto_ms;
            self.timer_ms = 0;
            self.consecutive_retransmissions = 0;
        }
        if self.outstanding.is_empty() {
            self.timer_running = false;
        }
    }

    pub fn tick(&mut self, ms_since_last_tick: u64, mut transmit: impl FnMut(&TCPSenderMessage)) {
        if !self.timer_running {
            return;
        }
        self.timer_ms += ms_since_last_tick;
        if self.timer_ms >= self.current_rto_ms {
            if let Some(front) = self.outstanding.front() {
                transmit(front);
            }
            if self.window_size > 0 {
                self.consecutive_retransmissions += 1;
                self.current_rto_ms *= 2;
            }
            self.timer_ms = 0;
        }
    }
}
