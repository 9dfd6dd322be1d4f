//! Merges possibly-overlapping, possibly-out-of-order byte ranges into a
//! [`ByteStream`] in order, under the stream's own capacity limit.

use crate::byte_stream::ByteStream;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct Reassembler {
    output: ByteStream,
    pending: BTreeMap<u64, Vec<u8>>,
    next_index: u64,
    eof_seen: bool,
    eof_index: u64,
}

impl Reassembler {
    pub fn new(output: ByteStream) -> Self {
        Reassembler {
            output,
            pending: BTreeMap::new(),
            next_index: 0,
            eof_seen: false,
            eof_index: 0,
        }
    }

    pub fn output(&self) -> &ByteStream {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    pub fn count_bytes_pending(&self) -> u64 {
        self.pending.values().map(|v| v.len() as u64).sum()
    }

    pub fn insert(&mut self, first_index: u64, mut data: Vec<u8>, is_last_substring: bool) {
        if is_last_substring {
            self.eof_seen = true;
            self.eof_index = first_index + data.len() as u64;
        }

        let first_unacceptable = self.output.bytes_popped() + self.output.capacity() as u64;

        let end_index = first_index + data.len() as u64;
        if first_index >= first_unacceptable || end_index <= self.next_index {
            self.close_if_done();
            return;
        }

        // Clip the right edge to the capacity ceiling.
        if end_index > first_unacceptable {
            data.truncate((first_unacceptable - first_index) as usize);
        }

        // Clip the left edge to what has already been delivered.
        let mut first_index = first_index;
        if first_index < self.next_index {
            let drop = (self.next_index - first_index) as usize;
            data.drain(..drop);
            first_index = self.next_index;
        }

        // Absorb a preceding interval that overlaps or touches `first_index`.
        if let Some((&prev_start, prev_data)) = self.pending.range(..=first_index).next_back() {
            let prev_end = prev_start + prev_data.len() as u64;
            if prev_end >= first_index {
                if prev_end >= first_index + data.len() as u64 {
                    // Fully contained in the previous interval: nothing new.
                    data.clear();
                } else {
                    let mut merged = prev_data.clone();
                    merged.truncate((first_index - prev_start) as usize);
                    merged.extend_from_slice(&data);
                    data = merged;
                    first_index = prev_start;
                    self.pending.remove(&prev_start);
                }
            }
        }

        // Absorb any following intervals that `data` now reaches into.
        let end_index = first_index + data.len() as u64;
        let overlapping: Vec<u64> = self
            .pending
            .range(first_index..)
            .take_while(|(&start, _)| start <= end_index)
            .map(|(&start, _)| start)
            .collect();
        for start in overlapping {
            let seg = self.pending.remove(&start).unwrap();
            let seg_end = start + seg.len() as u64;
            if seg_end > end_index {
                data.extend_from_slice(&seg[(end_index - start) as usize..]);
            }
        }

        if !data.is_empty() {
            self.pending.insert(first_index, data);
        }

        // Drain whatever now forms a contiguous prefix.
        while let Some(entry) = self.pending.first_key_value() {
            if *entry.0 != self.next_index {
                break;
            }
            let (&start, _) = entry;
            let segment = self.pending.remove(&start).unwrap();
            self.next_index += segment.len() as u64;
            self.output.push(&segment);
        }

        self.close_if_done();
    }

    fn close_if_done(&mut self) {
        if self.eof_seen && self.next_index == self.eof_index {
            self.output.close();
        }
    }
}
