//! Deterministic network emulator for exercising the protocol.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] runs one [`SrSender`] (entity A) and one [`SrReceiver`]
//! (entity B) against a discrete-event channel on a virtual clock, applying
//! a configurable fault model:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Packet loss      | Drop a packet with probability `loss_rate`.          |
//! | Corruption       | Flip a payload byte, or overwrite seqnum/acknum with |
//! |                  | garbage, with probability `corruption_rate`.         |
//! | Reordering       | Delay a packet by up to `reorder_delay` extra, so    |
//! |                  | later packets can overtake it.                       |
//! | Duplication      | Deliver a packet twice.                              |
//!
//! Without reordering the channel is FIFO in each direction.  All
//! randomness comes from a [`StdRng`] seeded from [`SimulatorConfig::seed`],
//! so a run is fully reproducible.
//!
//! Timers are single-shot events tagged with a per-slot generation number:
//! arming or cancelling a slot bumps its generation, which turns any fire
//! still queued for the old generation into a no-op.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::channel::{Application, Channel};
use crate::config::{ConfigError, ProtocolConfig};
use crate::packet::{Message, Packet, Payload, PAYLOAD_LEN};
use crate::receiver::{ReceiverStats, SrReceiver};
use crate::sender::{SenderStats, SrSender};
use crate::timer::TimerService;

/// Value written over a header field by the corruption fault.
const GARBAGE: i32 = 999_999;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the workload and the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Number of application messages submitted at A.
    pub messages: usize,
    /// Mean time between application messages.  Gaps are drawn uniformly
    /// from `[0, 2 × message_interval)`.
    pub message_interval: Duration,
    /// One-way channel delay.
    pub latency: Duration,
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that a packet is corrupted in transit.
    pub corruption_rate: f64,
    /// Probability that a packet is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a packet is delayed beyond `latency`.
    pub reorder_rate: f64,
    /// Upper bound of the extra delay applied to reordered packets.
    pub reorder_delay: Duration,
    /// RNG seed.
    pub seed: u64,
    /// Virtual time after which the run is abandoned.
    pub max_time: Duration,
    /// Keep messages refused by a full window and resubmit them when ACKs
    /// open the window, instead of dropping them.
    pub requeue_refused: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the emulator is a transparent pass-through.
        Self {
            messages: 20,
            message_interval: Duration::from_secs(10),
            latency: Duration::from_secs(5),
            loss_rate: 0.0,
            corruption_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: Duration::from_secs(5),
            seed: 1,
            max_time: Duration::from_secs(100_000),
            requeue_refused: false,
        }
    }
}

impl SimulatorConfig {
    /// Reject probabilities outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("loss_rate", self.loss_rate),
            ("corruption_rate", self.corruption_rate),
            ("duplicate_rate", self.duplicate_rate),
            ("reorder_rate", self.reorder_rate),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The two protocol entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// The sender.
    A,
    /// The receiver.
    B,
}

impl Entity {
    fn peer(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

#[derive(Debug)]
enum EventKind {
    AppMessage,
    Arrival { to: Entity, packet: Packet },
    TimerFired { slot: usize, generation: u64 },
}

/// A scheduled event.  Ordered by time, then by scheduling order so that
/// simultaneous events run first-in first-out.
#[derive(Debug)]
struct Event {
    at: Duration,
    order: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.order).cmp(&(other.at, other.order))
    }
}

// ---------------------------------------------------------------------------
// Network: clock, event queue, fault model, timers
// ---------------------------------------------------------------------------

/// Channel counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Packets handed to the channel by either entity.
    pub sent: u64,
    pub lost: u64,
    pub corrupted: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

struct Network {
    config: SimulatorConfig,
    rng: StdRng,
    now: Duration,
    queue: BinaryHeap<Reverse<Event>>,
    next_order: u64,
    /// Current timer generation per sender slot.
    generations: Vec<u64>,
    delivered: Vec<Payload>,
    stats: ChannelStats,
}

impl Network {
    fn schedule(&mut self, after: Duration, kind: EventKind) {
        let event = Event {
            at: self.now + after,
            order: self.next_order,
            kind,
        };
        self.next_order += 1;
        self.queue.push(Reverse(event));
    }

    /// Push `packet` from `from` through the fault model.
    fn send(&mut self, from: Entity, mut packet: Packet) {
        self.stats.sent += 1;

        if self.rng.random_bool(self.config.loss_rate) {
            self.stats.lost += 1;
            log::debug!("[sim] {from:?} packet lost (seq={} ack={})", packet.seqnum, packet.acknum);
            return;
        }

        if self.rng.random_bool(self.config.corruption_rate) {
            self.corrupt(&mut packet);
            self.stats.corrupted += 1;
            log::debug!("[sim] {from:?} packet corrupted");
        }

        let mut delay = self.config.latency;
        if self.rng.random_bool(self.config.reorder_rate) {
            delay += self.config.reorder_delay.mul_f64(self.rng.random::<f64>());
            self.stats.reordered += 1;
        }

        let to = from.peer();
        self.schedule(delay, EventKind::Arrival { to, packet });

        if self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            self.schedule(delay, EventKind::Arrival { to, packet });
        }
    }

    fn corrupt(&mut self, packet: &mut Packet) {
        let roll = self.rng.random::<f64>();
        if roll < 0.75 {
            let index = self.rng.random_range(0..PAYLOAD_LEN);
            packet.payload[index] ^= self.rng.random_range(1..=u8::MAX);
        } else if roll < 0.875 {
            packet.seqnum = GARBAGE;
        } else {
            packet.acknum = GARBAGE;
        }
    }
}

impl TimerService for Network {
    fn arm(&mut self, slot: usize, after: Duration) {
        if let Some(generation) = self.generations.get_mut(slot) {
            *generation += 1;
            let generation = *generation;
            self.schedule(after, EventKind::TimerFired { slot, generation });
        }
    }

    fn cancel(&mut self, slot: usize) {
        if let Some(generation) = self.generations.get_mut(slot) {
            *generation += 1;
        }
    }
}

impl Application for Network {
    fn deliver(&mut self, payload: Payload) {
        log::debug!("[sim] B delivered {:?}", String::from_utf8_lossy(&payload));
        self.delivered.push(payload);
    }
}

/// One entity's view of the network: packets it transmits go to its peer.
struct Port<'a> {
    net: &'a mut Network,
    from: Entity,
}

impl Channel for Port<'_> {
    fn transmit(&mut self, packet: Packet) {
        self.net.send(self.from, packet);
    }
}

impl TimerService for Port<'_> {
    fn arm(&mut self, slot: usize, after: Duration) {
        self.net.arm(slot, after);
    }

    fn cancel(&mut self, slot: usize) {
        self.net.cancel(slot);
    }
}

impl Application for Port<'_> {
    fn deliver(&mut self, payload: Payload) {
        self.net.deliver(payload);
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Outcome of a [`Simulator::run`].
#[derive(Debug, Clone)]
pub struct SimReport {
    /// Messages the application generated at A.
    pub generated: usize,
    /// Messages dropped because the window was full.
    pub refused_dropped: usize,
    /// Payloads in the order B delivered them.
    pub delivered: Vec<Payload>,
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    pub channel: ChannelStats,
    /// Virtual time at which the run ended.
    pub elapsed: Duration,
    /// `false` when `max_time` cut the run short.
    pub completed: bool,
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "elapsed          {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "completed        {}", self.completed)?;
        writeln!(f, "generated        {}", self.generated)?;
        writeln!(f, "refused/dropped  {}", self.refused_dropped)?;
        writeln!(f, "delivered        {}", self.delivered.len())?;
        writeln!(
            f,
            "sender           tx={} retx={} acks={} ignored={} corrupt={}",
            self.sender.transmissions,
            self.sender.retransmissions,
            self.sender.acks_received,
            self.sender.acks_ignored,
            self.sender.corrupt_dropped
        )?;
        writeln!(
            f,
            "receiver         rx={} dup={} out-of-window={} corrupt={} malformed={} acks={}",
            self.receiver.packets_received,
            self.receiver.duplicates,
            self.receiver.out_of_window,
            self.receiver.corrupt_dropped,
            self.receiver.malformed,
            self.receiver.acks_sent
        )?;
        write!(
            f,
            "channel          sent={} lost={} corrupted={} duplicated={} reordered={}",
            self.channel.sent,
            self.channel.lost,
            self.channel.corrupted,
            self.channel.duplicated,
            self.channel.reordered
        )
    }
}

/// Discrete-event harness driving entity A and entity B.
pub struct Simulator {
    sender: SrSender,
    receiver: SrReceiver,
    net: Network,
    generated: usize,
    refused_dropped: usize,
    backlog: VecDeque<Message>,
}

impl Simulator {
    /// Build a simulator with both entities in their initial state and the
    /// first application message scheduled.
    pub fn new(protocol: &ProtocolConfig, config: SimulatorConfig) -> Result<Self, ConfigError> {
        protocol.validate()?;
        config.validate()?;

        let rng = StdRng::seed_from_u64(config.seed);
        let mut sim = Self {
            sender: SrSender::new(protocol),
            receiver: SrReceiver::new(protocol),
            net: Network {
                config,
                rng,
                now: Duration::ZERO,
                queue: BinaryHeap::new(),
                next_order: 0,
                generations: vec![0; protocol.window_size],
                delivered: Vec::new(),
                stats: ChannelStats::default(),
            },
            generated: 0,
            refused_dropped: 0,
            backlog: VecDeque::new(),
        };
        if sim.net.config.messages > 0 {
            sim.schedule_next_message();
        }
        Ok(sim)
    }

    pub fn sender(&self) -> &SrSender {
        &self.sender
    }

    pub fn receiver(&self) -> &SrReceiver {
        &self.receiver
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.net.now
    }

    /// Run until every message is generated and acknowledged, the event
    /// queue drains, or `max_time` passes.
    pub fn run(mut self) -> SimReport {
        log::info!(
            "[sim] start: {} messages, W={}, seed={}",
            self.net.config.messages,
            self.sender.space().window(),
            self.net.config.seed
        );
        let mut completed = true;
        while !self.is_finished() {
            match self.step() {
                Some(true) => {}
                Some(false) => {
                    completed = false;
                    log::warn!("[sim] max_time reached at {:?}", self.net.now);
                    break;
                }
                None => break,
            }
        }
        completed &= self.is_finished();

        log::info!(
            "[sim] done at {:.3}s: delivered {}/{}",
            self.net.now.as_secs_f64(),
            self.net.delivered.len(),
            self.generated
        );
        SimReport {
            generated: self.generated,
            refused_dropped: self.refused_dropped,
            delivered: self.net.delivered,
            sender: self.sender.stats().clone(),
            receiver: self.receiver.stats().clone(),
            channel: self.net.stats,
            elapsed: self.net.now,
            completed,
        }
    }

    /// Process the next event.
    ///
    /// Returns `None` when the queue is empty and `Some(false)` when the next
    /// event lies beyond `max_time` (it is left unprocessed).
    pub fn step(&mut self) -> Option<bool> {
        let Reverse(next) = self.net.queue.peek()?;
        if next.at > self.net.config.max_time {
            return Some(false);
        }
        let Reverse(event) = self.net.queue.pop()?;
        self.net.now = event.at;

        match event.kind {
            EventKind::AppMessage => {
                let message = message_for(self.generated);
                self.generated += 1;
                self.submit(message);
                if self.generated < self.net.config.messages {
                    self.schedule_next_message();
                }
            }
            EventKind::Arrival { to: Entity::B, packet } => {
                let mut port = Port { net: &mut self.net, from: Entity::B };
                self.receiver.input(&mut port, &packet);
            }
            EventKind::Arrival { to: Entity::A, packet } => {
                let mut port = Port { net: &mut self.net, from: Entity::A };
                self.sender.input(&mut port, &packet);
                self.drain_backlog();
            }
            EventKind::TimerFired { slot, generation } => {
                if self.net.generations.get(slot) == Some(&generation) {
                    let mut port = Port { net: &mut self.net, from: Entity::A };
                    self.sender.on_timer(&mut port, slot);
                }
            }
        }
        Some(true)
    }

    /// Every message has been generated and, unless it was dropped as
    /// refused, acknowledged.
    pub fn is_finished(&self) -> bool {
        self.generated == self.net.config.messages
            && self.backlog.is_empty()
            && self.sender.is_idle()
    }

    fn schedule_next_message(&mut self) {
        let gap = self
            .net
            .config
            .message_interval
            .mul_f64(self.net.rng.random_range(0.0..2.0));
        self.net.schedule(gap, EventKind::AppMessage);
    }

    fn submit(&mut self, message: Message) {
        if self.net.config.requeue_refused {
            self.backlog.push_back(message);
            self.drain_backlog();
            return;
        }

        let mut port = Port { net: &mut self.net, from: Entity::A };
        if self.sender.output(&mut port, &message).is_err() {
            self.refused_dropped += 1;
            log::info!("[sim] window full, message {} dropped", self.generated - 1);
        }
    }

    fn drain_backlog(&mut self) {
        while self.sender.can_send() {
            let Some(message) = self.backlog.pop_front() else {
                break;
            };
            let mut port = Port { net: &mut self.net, from: Entity::A };
            if self.sender.output(&mut port, &message).is_err() {
                self.backlog.push_front(message);
                break;
            }
        }
    }
}

/// The `i`-th application message: twenty copies of one letter.
pub fn message_for(i: usize) -> Message {
    Message::from([b'a' + (i % 26) as u8; PAYLOAD_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryMode;

    fn protocol() -> ProtocolConfig {
        ProtocolConfig::default()
    }

    #[test]
    fn pass_through_delivers_everything_in_order() {
        let report = Simulator::new(&protocol(), SimulatorConfig::default())
            .unwrap()
            .run();

        assert!(report.completed);
        assert_eq!(report.generated, 20);
        assert_eq!(report.refused_dropped, 0);
        let expected: Vec<Payload> = (0..20).map(|i| message_for(i).data).collect();
        assert_eq!(report.delivered, expected);
        assert_eq!(report.sender.retransmissions, 0);
        assert_eq!(report.channel.lost, 0);
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimulatorConfig {
            loss_rate: 0.2,
            corruption_rate: 0.2,
            requeue_refused: true,
            seed: 42,
            ..Default::default()
        };
        let a = Simulator::new(&protocol(), config.clone()).unwrap().run();
        let b = Simulator::new(&protocol(), config).unwrap().run();
        assert_eq!(a.delivered, b.delivered);
        assert_eq!(a.channel, b.channel);
        assert_eq!(a.elapsed, b.elapsed);
    }

    #[test]
    fn burst_without_requeue_drops_refused_messages() {
        let config = SimulatorConfig {
            messages: 10,
            message_interval: Duration::ZERO,
            ..Default::default()
        };
        let proto = ProtocolConfig {
            window_size: 4,
            ..protocol()
        };
        let report = Simulator::new(&proto, config).unwrap().run();

        assert_eq!(report.refused_dropped, 6);
        assert_eq!(report.delivered.len(), 4);
        assert_eq!(report.sender.refused, 6);
    }

    #[test]
    fn burst_with_requeue_delivers_all() {
        let config = SimulatorConfig {
            messages: 10,
            message_interval: Duration::ZERO,
            requeue_refused: true,
            ..Default::default()
        };
        let proto = ProtocolConfig {
            window_size: 4,
            delivery: DeliveryMode::InOrder,
            ..protocol()
        };
        let report = Simulator::new(&proto, config).unwrap().run();

        assert!(report.completed);
        assert_eq!(report.refused_dropped, 0);
        let expected: Vec<Payload> = (0..10).map(|i| message_for(i).data).collect();
        assert_eq!(report.delivered, expected);
    }

    #[test]
    fn total_loss_hits_max_time() {
        let config = SimulatorConfig {
            messages: 1,
            loss_rate: 1.0,
            max_time: Duration::from_secs(200),
            ..Default::default()
        };
        let report = Simulator::new(&protocol(), config).unwrap().run();

        assert!(!report.completed);
        assert!(report.delivered.is_empty());
        assert!(report.sender.retransmissions >= 5);
        assert_eq!(report.channel.lost, report.channel.sent);
    }

    #[test]
    fn rates_outside_unit_interval_are_rejected() {
        let config = SimulatorConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            Simulator::new(&protocol(), config),
            Err(ConfigError::Probability { name: "loss_rate", .. })
        ));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let config = SimulatorConfig {
            messages: 0,
            ..Default::default()
        };
        let mut sim = Simulator::new(&protocol(), config).unwrap();
        let generation_before = sim.net.generations[0];
        sim.net.arm(0, Duration::from_secs(1));
        sim.net.cancel(0);
        assert_eq!(sim.net.generations[0], generation_before + 2);

        // The queued fire carries the stale generation, so stepping it is a no-op.
        assert_eq!(sim.step(), Some(true));
        assert_eq!(sim.sender().stats().retransmissions, 0);
    }

    #[test]
    fn events_past_max_time_stay_queued() {
        let config = SimulatorConfig {
            messages: 1,
            loss_rate: 1.0,
            max_time: Duration::from_secs(30),
            ..Default::default()
        };
        let mut sim = Simulator::new(&protocol(), config).unwrap();

        // Run up to the limit; a retransmission timer is always left pending.
        let mut steps = 0;
        while sim.step() == Some(true) {
            steps += 1;
            assert!(steps < 10, "step never hit max_time");
        }
        let pending = sim.net.queue.len();
        let now = sim.now();
        assert!(pending > 0);

        // Repeated calls past the limit neither consume nor advance anything.
        assert_eq!(sim.step(), Some(false));
        assert_eq!(sim.step(), Some(false));
        assert_eq!(sim.net.queue.len(), pending);
        assert_eq!(sim.now(), now);
    }
}
