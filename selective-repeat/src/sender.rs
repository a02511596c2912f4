//! Selective-Repeat send-side state machine (entity A).
//!
//! [`SrSender`] keeps a sliding window of up to `W` in-flight packets in a
//! fixed ring of slots indexed by `seq mod W`.
//!
//! # Protocol contract
//!
//! - At most `W` packets are in flight; further messages are refused with
//!   [`SendError::WindowFull`] and are neither sent nor queued.
//! - ACKs are **selective**: `acknum = K` acknowledges packet `K` only.  The
//!   window base slides over acknowledged slots and stops at the first gap.
//! - Every in-flight packet has its own timer.  When one fires, only that
//!   packet is resent, with its original sequence number.
//!
//! # Sequence-number layout
//!
//! ```text
//!   base               next_seq
//!     │                    │
//! ────┼────────────────────┼─────────────────▶ seq space (mod 2W)
//!     │ <── in flight ───▶ │ <── sendable ──▶ (until base + W)
//! ```
//!
//! This module only manages state; transmission and timer scheduling go
//! through the [`Channel`] and [`TimerService`] passed to each handler.

use std::time::Duration;

use thiserror::Error;

use crate::channel::Channel;
use crate::config::{IntegrityPolicy, ProtocolConfig};
use crate::packet::{Message, Packet};
use crate::seq::SequenceSpace;
use crate::timer::TimerService;

// ---------------------------------------------------------------------------
// Errors and statistics
// ---------------------------------------------------------------------------

/// Back-pressure signal returned by [`SrSender::output`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The window is full; retry after an acknowledgment slides it.
    #[error("send window full ({in_flight} of {window} packets in flight)")]
    WindowFull { in_flight: usize, window: usize },
}

/// Counters kept by the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Messages framed and sent for the first time.
    pub accepted: u64,
    /// Messages refused because the window was full.
    pub refused: u64,
    /// Packets handed to the channel, retransmissions included.
    pub transmissions: u64,
    pub retransmissions: u64,
    /// ACKs that acknowledged an in-flight packet for the first time.
    pub acks_received: u64,
    /// ACKs that were malformed, stale, or duplicated.
    pub acks_ignored: u64,
    /// ACKs dropped on checksum mismatch.
    pub corrupt_dropped: u64,
}

// ---------------------------------------------------------------------------
// SendSlot
// ---------------------------------------------------------------------------

/// One position of the retransmit ring.
#[derive(Debug, Clone, Default)]
struct SendSlot {
    /// Buffered packet, kept until the base slides past it.
    packet: Option<Packet>,
    acked: bool,
    timer_armed: bool,
    /// Total number of times the packet has been transmitted.
    tx_count: u32,
}

// ---------------------------------------------------------------------------
// SrSender
// ---------------------------------------------------------------------------

/// Selective-Repeat send-side state.
#[derive(Debug)]
pub struct SrSender {
    space: SequenceSpace,
    timeout: Duration,
    integrity: IntegrityPolicy,

    /// Oldest unacknowledged sequence number (left window edge).
    base: u32,

    /// Sequence number for the next new packet.
    next_seq: u32,

    slots: Vec<SendSlot>,
    stats: SenderStats,
}

impl SrSender {
    /// Create a sender in its initial state: `base = next_seq = 0`, all slots
    /// clear, no timers.
    pub fn new(config: &ProtocolConfig) -> Self {
        let space = SequenceSpace::new(config.window_size);
        Self {
            space,
            timeout: config.timeout,
            integrity: config.integrity,
            base: 0,
            next_seq: 0,
            slots: vec![SendSlot::default(); space.window()],
            stats: SenderStats::default(),
        }
    }

    /// Return to the initial state, cancelling every timer still armed.
    pub fn reset<T: TimerService>(&mut self, timers: &mut T) {
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if entry.timer_armed {
                timers.cancel(slot);
            }
            *entry = SendSlot::default();
        }
        self.base = 0;
        self.next_seq = 0;
        self.stats = SenderStats::default();
        log::debug!("[sr:A] reset");
    }

    pub fn space(&self) -> SequenceSpace {
        self.space
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Number of packets sent but not yet slid past.
    pub fn in_flight(&self) -> usize {
        self.space.distance(self.base, self.next_seq) as usize
    }

    /// `true` when [`output`](Self::output) would accept a message.
    pub fn can_send(&self) -> bool {
        self.in_flight() < self.space.window()
    }

    /// `true` when nothing awaits acknowledgment.
    pub fn is_idle(&self) -> bool {
        self.base == self.next_seq
    }

    /// `true` when `seq` is in flight and its ACK has already arrived.
    pub fn is_acked(&self, seq: u32) -> bool {
        self.is_in_flight(seq) && self.slots[self.space.slot(seq)].acked
    }

    /// How many times in-flight packet `seq` has been transmitted.
    pub fn tx_count(&self, seq: u32) -> Option<u32> {
        self.is_in_flight(seq)
            .then(|| self.slots[self.space.slot(seq)].tx_count)
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Frame `message`, transmit it, and arm its slot's timer.
    ///
    /// Returns the assigned sequence number, or [`SendError::WindowFull`]
    /// when `W` packets are already in flight.
    pub fn output<E>(&mut self, env: &mut E, message: &Message) -> Result<u32, SendError>
    where
        E: Channel + TimerService,
    {
        if !self.can_send() {
            self.stats.refused += 1;
            log::debug!(
                "[sr:A] window full ({}/{}); message refused",
                self.in_flight(),
                self.space.window()
            );
            return Err(SendError::WindowFull {
                in_flight: self.in_flight(),
                window: self.space.window(),
            });
        }

        let seq = self.next_seq;
        let slot = self.space.slot(seq);
        let packet = Packet::data(seq as i32, &message.data);
        self.slots[slot] = SendSlot {
            packet: Some(packet),
            acked: false,
            timer_armed: true,
            tx_count: 1,
        };

        env.transmit(packet);
        env.arm(slot, self.timeout);
        self.next_seq = self.space.next(seq);
        self.stats.accepted += 1;
        self.stats.transmissions += 1;

        log::debug!("[sr:A] → DATA seq={seq} in_flight={}", self.in_flight());
        Ok(seq)
    }

    /// Process an inbound acknowledgment.
    ///
    /// Marks the acknowledged slot, disarms exactly its timer, then slides
    /// the base over every contiguous acknowledged slot.  Malformed, corrupt
    /// (under [`IntegrityPolicy::RejectCorrupt`]), stale, and duplicate ACKs
    /// are ignored.  Returns how far the base moved.
    pub fn input<T: TimerService>(&mut self, timers: &mut T, packet: &Packet) -> usize {
        if self.integrity == IntegrityPolicy::RejectCorrupt && !packet.verify() {
            self.stats.corrupt_dropped += 1;
            log::debug!("[sr:A] ← corrupt ACK dropped");
            return 0;
        }

        let Some(ack) = self.space.validate(packet.acknum) else {
            self.stats.acks_ignored += 1;
            log::debug!("[sr:A] ← ACK {} out of range; ignored", packet.acknum);
            return 0;
        };

        // An ACK for a number that is not in flight refers to a packet that
        // was slid past already; its slot may now hold a newer packet.
        if !self.is_in_flight(ack) {
            self.stats.acks_ignored += 1;
            log::debug!("[sr:A] ← stale ACK {ack} (base={})", self.base);
            return 0;
        }

        let slot = self.space.slot(ack);
        let entry = &mut self.slots[slot];
        if entry.acked {
            self.stats.acks_ignored += 1;
            log::debug!("[sr:A] ← duplicate ACK {ack}");
            return 0;
        }

        entry.acked = true;
        if entry.timer_armed {
            entry.timer_armed = false;
            timers.cancel(slot);
        }
        self.stats.acks_received += 1;

        let slid = self.slide();
        log::debug!("[sr:A] ← ACK {ack} (slid {slid}, base={})", self.base);
        slid
    }

    /// Handle the expiry of one slot's timer.
    ///
    /// Resends the buffered packet unchanged and re-arms the slot.  Returns
    /// `false` for a stale fire (slot empty, acknowledged, or disarmed).
    pub fn on_timer<E>(&mut self, env: &mut E, slot: usize) -> bool
    where
        E: Channel + TimerService,
    {
        let Some(entry) = self.slots.get_mut(slot) else {
            return false;
        };
        let packet = match entry.packet {
            Some(p) if !entry.acked && entry.timer_armed => p,
            _ => return false,
        };

        entry.tx_count += 1;
        env.transmit(packet);
        env.arm(slot, self.timeout);
        self.stats.transmissions += 1;
        self.stats.retransmissions += 1;

        log::debug!(
            "[sr:A] timeout, retransmitting seq={} (tx #{})",
            packet.seqnum,
            entry.tx_count
        );
        true
    }

    /// Resend every unacknowledged in-flight packet whose timer is armed,
    /// oldest first.  For harnesses that only offer one timer per entity.
    pub fn retransmit_all_due<E>(&mut self, env: &mut E) -> usize
    where
        E: Channel + TimerService,
    {
        let mut seq = self.base;
        let mut resent = 0;
        while seq != self.next_seq {
            if self.on_timer(env, self.space.slot(seq)) {
                resent += 1;
            }
            seq = self.space.next(seq);
        }
        resent
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_in_flight(&self, seq: u32) -> bool {
        self.space.distance(self.base, seq) < self.space.distance(self.base, self.next_seq)
    }

    /// Advance `base` over acknowledged slots, clearing each one.
    fn slide(&mut self) -> usize {
        let mut slid = 0;
        while self.base != self.next_seq {
            let slot = self.space.slot(self.base);
            if !self.slots[slot].acked {
                break;
            }
            self.slots[slot] = SendSlot::default();
            self.base = self.space.next(self.base);
            slid += 1;
        }
        slid
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
