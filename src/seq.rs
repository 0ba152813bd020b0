//! Modulo-256 sequence-number arithmetic.
//!
//! Sequence numbers occupy a single header byte, so the sequence space is
//! `u8` and every operation wraps.  All window membership tests in
//! [`crate::sender`] and [`crate::receiver`] go through [`in_window`] /
//! [`in_prior_window`]; plain `<` comparisons are wrong once the space wraps.
//!
//! ```text
//!        base-W          base           base+W
//!  ───────┼───────────────┼───────────────┼──────▶ (mod 256)
//!         │  prior window │  live window  │
//! ```

/// Number of distinct sequence numbers (N).
pub const SEQ_SPACE: usize = 256;

/// Largest window width that keeps the live and prior windows disjoint.
///
/// Selective Repeat needs `N >= 2W`; wider windows make an old retransmission
/// indistinguishable from a new packet.
pub const MAX_WINDOW: usize = SEQ_SPACE / 2;

/// A sequence number in `[0, N)`.
pub type Seq = u8;

/// `(a + b) mod N`.
#[inline]
pub fn add(a: Seq, b: usize) -> Seq {
    a.wrapping_add((b % SEQ_SPACE) as u8)
}

/// `(a - b) mod N`.
#[inline]
pub fn sub(a: Seq, b: usize) -> Seq {
    a.wrapping_sub((b % SEQ_SPACE) as u8)
}

/// Number of steps from `from` forward to `to`, in `[0, N)`.
#[inline]
pub fn distance(from: Seq, to: Seq) -> usize {
    to.wrapping_sub(from) as usize
}

/// `true` iff `x` lies in the cyclic half-open interval `[base, base + width)`.
#[inline]
pub fn in_window(x: Seq, base: Seq, width: usize) -> bool {
    distance(base, x) < width
}

/// `true` iff `x` lies in `[base - width, base)`, the window that slid out
/// most recently.
#[inline]
pub fn in_prior_window(x: Seq, base: Seq, width: usize) -> bool {
    in_window(x, sub(base, width), width)
}
