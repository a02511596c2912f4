//! Sequence-number arithmetic over the finite ring `[0, 2 × window)`.
//!
//! Both entities share one [`SequenceSpace`].  Every comparison between
//! sequence numbers goes through [`SequenceSpace::distance`]; raw integer
//! comparison is wrong as soon as the ring wraps.
//!
//! ```text
//!            base                base + W
//!              │                    │
//!  ─ ─ ─ ─ ────┼────────────────────┼──────────── ─ ─ ─  (mod 2W)
//!              │ <──── window ────▶ │
//! ```
//!
//! A ring of `2W` numbers is the smallest that lets a receiver tell a
//! retransmission of an already-delivered packet apart from a new one.

use crate::config::MAX_WINDOW;

/// A modular sequence space sized for a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSpace {
    window: u32,
}

impl SequenceSpace {
    /// Create the sequence space for a window of `window` packets.
    ///
    /// # Panics
    ///
    /// Panics unless `window` is in `1..=MAX_WINDOW`.  Use
    /// [`ProtocolConfig::validate`](crate::config::ProtocolConfig::validate)
    /// to reject bad windows without panicking.
    pub fn new(window: usize) -> Self {
        assert!(
            (1..=MAX_WINDOW).contains(&window),
            "window size {window} is outside 1..={MAX_WINDOW}"
        );
        let window = u32::try_from(window).unwrap_or(u32::MAX);
        Self { window }
    }

    /// Number of packets that may be in flight (W).
    pub fn window(&self) -> usize {
        self.window as usize
    }

    /// Size of the ring (M = 2W).
    pub fn modulus(&self) -> u32 {
        self.window * 2
    }

    /// Check a raw wire value and convert it into a sequence number.
    ///
    /// Returns `None` for anything outside `[0, M)`, including the `-1`
    /// "no ack" sentinel and garbage injected by the channel.
    pub fn validate(&self, raw: i32) -> Option<u32> {
        u32::try_from(raw).ok().filter(|&seq| seq < self.modulus())
    }

    /// Forward distance from `from` to `to`, walking the ring upwards.
    #[inline]
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        (to + self.modulus() - from) % self.modulus()
    }

    /// `true` when `seq` lies in `[base, base + W)`.
    #[inline]
    pub fn in_window(&self, base: u32, seq: u32) -> bool {
        self.distance(base, seq) < self.window
    }

    /// Successor of `seq` on the ring.
    #[inline]
    pub fn next(&self, seq: u32) -> u32 {
        (seq + 1) % self.modulus()
    }

    /// Slot index backing `seq` in a window array.
    #[inline]
    pub fn slot(&self, seq: u32) -> usize {
        (seq % self.window) as usize
    }
}
