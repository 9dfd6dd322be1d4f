//! Modular 32-bit sequence numbers and their relationship to absolute,
//! monotonic 64-bit stream indices.
//!
//! TCP sequence numbers live in a 32-bit space that wraps around; the rest
//! of this crate works in absolute 64-bit indices so arithmetic never has
//! to think about wraparound. `Wrap32` is the bridge between the two.

use std::fmt;

/// A point in 32-bit modular sequence space, relative to some connection's ISN.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Wrap32(u32);

impl Wrap32 {
    pub const fn new(raw: u32) -> Self {
        Wrap32(raw)
    }

    pub const fn raw_value(self) -> u32 {
        self.0
    }

    /// `wrap(n, zero_point)` is the sequence number `n mod 2^32` past `zero_point`.
    pub fn wrap(n: u64, zero_point: Wrap32) -> Wrap32 {
        Wrap32(zero_point.0.wrapping_add(n as u32))
    }

    /// Recovers the absolute 64-bit index nearest `checkpoint` that wraps to `self`.
    ///
    /// There is exactly one such index within `2^31` of any given
    /// checkpoint (ties, exactly `2^31` away, resolve to the smaller one),
    /// so the result is well defined and never negative.
    pub fn unwrap(self, zero_point: Wrap32, checkpoint: u64) -> u64 {
        const WRAP_SIZE: u64 = 1u64 << 32;

        let offset = self.0.wrapping_sub(zero_point.0) as u64;
        // Candidate in the same 2^32 "era" as the checkpoint.
        let mut candidate = (checkpoint & !(WRAP_SIZE - 1)) | offset;

        if candidate < checkpoint && checkpoint - candidate > WRAP_SIZE / 2 {
            candidate += WRAP_SIZE;
        } else if candidate > checkpoint && candidate - checkpoint >= WRAP_SIZE / 2 {
            // An exact 2^31 tie falls in this branch (not the one above, since
            // `candidate` is already the larger of the two representatives
            // here) and must still round down to the smaller absolute index.
            if candidate >= WRAP_SIZE {
                candidate -= WRAP_SIZE;
            }
        }
        candidate
    }
}

impl std::ops::Add<u32> for Wrap32 {
    type Output = Wrap32;
    fn add(self, rhs: u32) -> Wrap32 {
        Wrap32(self.0.wrapping_add(rhs))
    }
}

impl fmt::Debug for Wrap32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wrap32(0x{:08x})", self.0)
    }
}
