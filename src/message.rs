//! Logical (not wire-format) shapes exchanged between a `TCPSender` and the
//! peer's `TCPReceiver`, and vice versa. Marshaling these into real TCP
//! headers is the host glue's job (see [`crate::host`]).

use crate::wrap::Wrap32;

#[derive(Debug, Clone, Default)]
pub struct TCPSenderMessage {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
    pub rst: bool,
}

impl TCPSenderMessage {
    pub fn sequence_length(&self) -> usize {
        self.syn as usize + self.payload.len() + self.fin as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct TCPReceiverMessage {
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
    pub rst: bool,
}
