//! Sequence number arithmetic.
//!
//! TCP sequence numbers live in a circular 32-bit space and are never compared with plain `<` or
//! `>`. From RFC1323:
//!
//! > TCP determines if a data segment is "old" or "new" by testing whether its sequence number is
//! > within 2**31 bytes of the left edge of the window, and if it is not, discarding the data as
//! > "old".
//!
//! Two numbers exactly 2^31 apart are ambiguous on the circle. They are ordered by their raw value
//! so that the comparator stays antisymmetric.

use std::cmp::Ordering;

const HALF_SPACE: u32 = 1 << 31;

/// Compares two sequence numbers modulo 2^32.
#[inline]
pub fn seq_cmp(lhs: u32, rhs: u32) -> Ordering {
    let diff = lhs.wrapping_sub(rhs);
    if diff == 0 {
        Ordering::Equal
    } else if diff < HALF_SPACE {
        Ordering::Greater
    } else if diff > HALF_SPACE {
        Ordering::Less
    } else {
        lhs.cmp(&rhs)
    }
}

#[inline]
pub fn seq_lt(lhs: u32, rhs: u32) -> bool {
    seq_cmp(lhs, rhs) == Ordering::Less
}

#[inline]
pub fn seq_leq(lhs: u32, rhs: u32) -> bool {
    seq_cmp(lhs, rhs) != Ordering::Greater
}

#[inline]
pub fn seq_gt(lhs: u32, rhs: u32) -> bool {
    seq_cmp(lhs, rhs) == Ordering::Greater
}

#[inline]
pub fn seq_geq(lhs: u32, rhs: u32) -> bool {
    seq_cmp(lhs, rhs) != Ordering::Less
}

/// Returns the later of two sequence numbers.
#[inline]
pub fn seq_max(lhs: u32, rhs: u32) -> u32 {
    if seq_geq(lhs, rhs) {
        lhs
    } else {
        rhs
    }
}

/// Returns the earlier of two sequence numbers.
#[inline]
pub fn seq_min(lhs: u32, rhs: u32) -> u32 {
    if seq_leq(lhs, rhs) {
        lhs
    } else {
        rhs
    }
}

/// Returns `true` if `seq` lies in the half-open interval `[start, end)`.
#[inline]
pub fn seq_in_range(seq: u32, start: u32, end: u32) -> bool {
    seq_geq(seq, start) && seq_lt(seq, end)
}

/// Distance from `from` forward to `to`, assuming `to` is not before `from`.
#[inline]
pub fn seq_distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}
