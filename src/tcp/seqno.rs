//! Wrapping 32-bit sequence numbers.

use core::fmt;
use core::ops;

/// A 32-bit sequence number, relative to a per-connection zero point.
///
/// Sequence numbers start at an arbitrary initial value (the ISN) and wrap
/// modulo 2^32. [`Wrap32::wrap`] maps a 64-bit absolute index into sequence
/// space; [`Wrap32::unwrap`] recovers the absolute index closest to a caller
/// supplied checkpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Wrap32(u32);

impl Wrap32 {
    pub const fn new(raw: u32) -> Wrap32 {
        Wrap32(raw)
    }

    /// The raw 32-bit value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The sequence number for absolute index `n` under `zero_point`.
    pub fn wrap(n: u64, zero_point: Wrap32) -> Wrap32 {
        Wrap32(zero_point.0.wrapping_add(n as u32))
    }

    /// The absolute index that wraps to `self` and lies nearest `checkpoint`.
    ///
    /// Ties between the two candidates 2^32 apart break toward the larger
    /// one; a candidate below zero has 2^32 added instead.
    pub fn unwrap(self, zero_point: Wrap32, checkpoint: u64) -> u64 {
        let offset = self.0.wrapping_sub(Wrap32::wrap(checkpoint, zero_point).0) as i32;
        let absseq = checkpoint as i64 + i64::from(offset);
        if absseq < 0 {
            (absseq + (1i64 << 32)) as u64
        } else {
            absseq as u64
        }
    }
}

impl ops::Add<u32> for Wrap32 {
    type Output = Wrap32;

    fn add(self, rhs: u32) -> Wrap32 {
        Wrap32(self.0.wrapping_add(rhs))
    }
}

impl fmt::Display for Wrap32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wrap_wraps() {
        assert_eq!(Wrap32::wrap(3 * (1 << 32) + 17, Wrap32::new(15)).raw(), 32);
        assert_eq!(Wrap32::wrap(7 * (1 << 32) - 2, Wrap32::new(15)).raw(), 13);
        assert_eq!(Wrap32::wrap(0, Wrap32::new(0xffff_ffff)).raw(), 0xffff_ffff);
        assert_eq!(Wrap32::wrap(1, Wrap32::new(0xffff_ffff)).raw(), 0);
    }

    #[test]
    fn unwrap_near_checkpoint() {
        let zero = Wrap32::new(1 << 31);
        assert_eq!(Wrap32::wrap(10, zero).unwrap(zero, 0), 10);
        assert_eq!(Wrap32::wrap(10, zero).unwrap(zero, 1 << 33), (1 << 33) + 10);

        // A raw value just below the checkpoint's image resolves backward.
        let checkpoint = (1u64 << 32) + 5;
        assert_eq!(Wrap32::wrap(1 << 32, zero).unwrap(zero, checkpoint), 1 << 32);
    }

    #[test]
    fn unwrap_negative_candidate_gains_a_period() {
        // Raw 0 under zero point 19 can only be absolute 2^32 - 19 (mod 2^32).
        assert_eq!(Wrap32::new(0).unwrap(Wrap32::new(19), 0), (1u64 << 32) - 19);
    }

    #[test]
    fn round_trip() {
        let cases: &[(u64, u32, u64)] = &[
            (0, 0, 0),
            (17, 5, 3),
            (1 << 31, 0xdead_beef, 1 << 31),
            ((1 << 34) + 77, 99, 1 << 34),
            (u32::MAX as u64 + 1, 1, u32::MAX as u64),
        ];
        for &(n, zero_raw, checkpoint) in cases {
            let zero = Wrap32::new(zero_raw);
            assert_eq!(Wrap32::wrap(n, zero).unwrap(zero, checkpoint), n, "n={}", n);
        }
    }

    #[test]
    fn add_wraps() {
        assert_eq!(Wrap32::new(0xffff_ffff) + 2, Wrap32::new(1));
        assert_eq!(Wrap32::new(10) + 5, Wrap32::new(15));
    }
}
