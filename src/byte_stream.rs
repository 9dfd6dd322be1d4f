//! A bounded, in-order byte FIFO shared by a writer half and a reader half.
//!
//! Both halves live on the same [`ByteStream`] value rather than as split
//! types: the core is single-threaded and every owner of a stream needs
//! both halves (the sender reads what the application wrote; the receiver
//! writes what arrived for the application to read), so splitting into
//! `Arc`-shared `Writer`/`Reader` objects would just add indirection for
//! no benefit here.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct ByteStream {
    capacity: usize,
    buffer: VecDeque<u8>,
    bytes_pushed: u64,
    bytes_popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        ByteStream {
            capacity,
            buffer: VecDeque::new(),
            bytes_pushed: 0,
            bytes_popped: 0,
            closed: false,
            error: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // --- writer half ---

    /// Appends as much of `data` as fits; the rest is silently dropped.
    pub fn push(&mut self, data: &[u8]) {
        if self.closed || data.is_empty() {
            return;
        }
        let room = self.available_capacity();
        let take = data.len().min(room);
        self.buffer.extend(&data[..take]);
        self.bytes_pushed += take as u64;
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn available_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    // --- reader half ---

    /// Returns a contiguous view of the next buffered bytes, as long a run
    /// as is available without wrapping around the ring buffer, or `&[]`
    /// if nothing is buffered.
    pub fn peek(&self) -> &[u8] {
        self.buffer.as_slices().0
    }

    pub fn pop(&mut self, len: usize) {
        let take = len.min(self.buffer.len());
        self.buffer.drain(..take);
        self.bytes_popped += take as u64;
    }

    pub fn is_finished(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }

    pub fn bytes_buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes_popped(&self) -> u64 {
        self.bytes_popped
    }

    // --- shared ---

    pub fn has_error(&self) -> bool {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_clip() {
        let mut s = ByteStream::new(2);
        s.push(b"cat");
        assert_eq!(s.bytes_pushed(), 2);
        let mut out = Vec::new();
        while s.bytes_buffered() > 0 {
            let chunk = s.peek().to_vec();
            out.extend_from_slice(&chunk);
            s.pop(chunk.len());
        }
        assert_eq!(out, b"ca");
    }

    #[test]
    fn closed_stream_rejects_further_pushes() {
        let mut s = ByteStream::new(10);
        s.push(b"ab");
        s.close();
        s.push(b"cd");
        assert_eq!(s.bytes_pushed(), 2);
    }

    #[test]
    fn is_finished_requires_close_and_drain() {
        let mut s = ByteStream::new(10);
        s.push(b"ab");
        s.close();
        assert!(!s.is_finished());
        s.pop(2);
        assert!(s.is_finished());
    }

    #[test]
    fn error_is_sticky() {
        let mut s = ByteStream::new(10);
        s.set_error();
        s.push(b"x");
        assert!(s.has_error());
    }

    #[test]
    fn empty_push_is_a_no_op() {
        let mut s = ByteStream::new(10);
        s.push(b"");
        assert_eq!(s.bytes_pushed(), 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn pushed_minus_popped_equals_buffered(
            capacity in 1usize..64,
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..16),
            pop_amounts in prop::collection::vec(0usize..20, 0..16),
        ) {
            let mut s = ByteStream::new(capacity);
            for (chunk, pop_amount) in chunks.iter().zip(pop_amounts.iter()) {
                s.push(chunk);
                prop_assert!(s.bytes_buffered() <= s.capacity());
                prop_assert_eq!(s.bytes_pushed() - s.bytes_popped(), s.bytes_buffered() as u64);
                let take = s.peek().len().min(*pop_amount);
                s.pop(take);
                prop_assert_eq!(s.bytes_pushed() - s.bytes_popped(), s.bytes_buffered() as u64);
            }
        }
    }
}
