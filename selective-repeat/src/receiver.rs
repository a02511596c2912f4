//! Selective-Repeat receive-side state machine (entity B).
//!
//! [`SrReceiver`] implements the receiver side of Selective Repeat:
//!
//! - Packets inside the receive window `[base, base + W)` are buffered in
//!   their slot, even when earlier sequence numbers are still missing.
//! - **Every** validly addressed packet is acknowledged individually with
//!   `acknum = seqnum`, including duplicates and packets outside the window,
//!   so a sender whose earlier ACK was lost still learns the packet arrived.
//! - The window base slides over each contiguous run of received slots.
//! - Payloads reach the application once per sequence number, either on
//!   first receipt or as the base slides past them (see [`DeliveryMode`]).
//!
//! This module only manages state; ACKs and deliveries go through the
//! [`Channel`] and [`Application`] passed to [`SrReceiver::input`].

use crate::channel::{Application, Channel};
use crate::config::{DeliveryMode, IntegrityPolicy, ProtocolConfig};
use crate::packet::Packet;
use crate::seq::SequenceSpace;

/// What the receiver did with one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// First copy of an in-window packet: buffered and acknowledged.
    Accepted,
    /// In-window packet already received: acknowledged again, nothing else.
    Duplicate,
    /// Outside the receive window: acknowledged, not buffered.
    OutOfWindow,
    /// Checksum mismatch under [`IntegrityPolicy::RejectCorrupt`]: dropped
    /// without acknowledgment.
    Corrupt,
    /// Sequence number outside the sequence space: dropped silently.
    Malformed,
}

/// Counters kept by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Packets that passed validation, duplicates and out-of-window included.
    pub packets_received: u64,
    pub delivered: u64,
    pub duplicates: u64,
    pub out_of_window: u64,
    pub corrupt_dropped: u64,
    pub malformed: u64,
    pub acks_sent: u64,
}

#[derive(Debug, Clone, Default)]
struct RecvSlot {
    packet: Option<Packet>,
    received: bool,
}

/// Selective-Repeat receive-side state.
#[derive(Debug)]
pub struct SrReceiver {
    space: SequenceSpace,
    integrity: IntegrityPolicy,
    delivery: DeliveryMode,

    /// Oldest sequence number not yet slid past.
    base: u32,

    slots: Vec<RecvSlot>,
    stats: ReceiverStats,
}

impl SrReceiver {
    /// Create a receiver in its initial state: `base = 0`, all slots clear.
    pub fn new(config: &ProtocolConfig) -> Self {
        let space = SequenceSpace::new(config.window_size);
        Self {
            space,
            integrity: config.integrity,
            delivery: config.delivery,
            base: 0,
            slots: vec![RecvSlot::default(); space.window()],
            stats: ReceiverStats::default(),
        }
    }

    /// Return to the initial state.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = RecvSlot::default());
        self.base = 0;
        self.stats = ReceiverStats::default();
        log::debug!("[sr:B] reset");
    }

    pub fn space(&self) -> SequenceSpace {
        self.space
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// `true` when `seq` is in the window and buffered but not yet slid past.
    pub fn is_received(&self, seq: u32) -> bool {
        seq < self.space.modulus()
            && self.space.in_window(self.base, seq)
            && self.slots[self.space.slot(seq)].received
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Process one inbound data packet.
    pub fn input<E>(&mut self, env: &mut E, packet: &Packet) -> Disposition
    where
        E: Channel + Application,
    {
        if self.integrity == IntegrityPolicy::RejectCorrupt && !packet.verify() {
            self.stats.corrupt_dropped += 1;
            log::debug!("[sr:B] ← corrupt packet dropped (seq field {})", packet.seqnum);
            return Disposition::Corrupt;
        }

        let Some(seq) = self.space.validate(packet.seqnum) else {
            self.stats.malformed += 1;
            log::debug!("[sr:B] ← seq {} out of range; ignored", packet.seqnum);
            return Disposition::Malformed;
        };
        self.stats.packets_received += 1;

        if !self.space.in_window(self.base, seq) {
            self.stats.out_of_window += 1;
            self.acknowledge(env, seq);
            log::debug!("[sr:B] ← DATA seq={seq} outside window (base={}); → ACK", self.base);
            return Disposition::OutOfWindow;
        }

        let slot = self.space.slot(seq);
        let disposition = if self.slots[slot].received {
            self.stats.duplicates += 1;
            Disposition::Duplicate
        } else {
            self.slots[slot] = RecvSlot {
                packet: Some(*packet),
                received: true,
            };
            if self.delivery == DeliveryMode::OnArrival {
                self.deliver(env, *packet);
            }
            Disposition::Accepted
        };

        self.acknowledge(env, seq);
        let slid = self.slide(env);
        log::debug!(
            "[sr:B] ← DATA seq={seq} {disposition:?}; → ACK {seq} (slid {slid}, base={})",
            self.base
        );
        disposition
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn acknowledge<C: Channel>(&mut self, channel: &mut C, seq: u32) {
        channel.transmit(Packet::ack(seq as i32));
        self.stats.acks_sent += 1;
    }

    fn deliver<A: Application>(&mut self, app: &mut A, packet: Packet) {
        app.deliver(packet.payload);
        self.stats.delivered += 1;
    }

    /// Advance `base` over received slots, clearing each one.  In
    /// [`DeliveryMode::InOrder`] this is where payloads are delivered.
    fn slide<A: Application>(&mut self, app: &mut A) -> usize {
        let mut slid = 0;
        while slid < self.space.window() {
            let slot = self.space.slot(self.base);
            if !self.slots[slot].received {
                break;
            }
            let entry = std::mem::take(&mut self.slots[slot]);
            if self.delivery == DeliveryMode::InOrder {
                if let Some(packet) = entry.packet {
                    self.deliver(app, packet);
                }
            }
            self.base = self.space.next(self.base);
            slid += 1;
        }
        slid
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
