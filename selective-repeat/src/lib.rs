//! `selective-repeat`: the Selective-Repeat ARQ protocol core.
//!
//! # Architecture
//!
//! ```text
//!  Application (A)                               Application (B)
//!      │ output(message)                              ▲ deliver(payload)
//!  ┌───▼──────┐        DATA packets           ┌───────┴──┐
//!  │ SrSender │──────────────────────────────▶│SrReceiver│
//!  │ (slots,  │                               │ (slots,  │
//!  │  timers) │◀──────────────────────────────│  buffer) │
//!  └───┬──────┘        selective ACKs         └──────────┘
//!      │ arm / cancel(slot)
//!  ┌───▼──────────┐
//!  │ TimerService │   virtual clock (simulator) or SlotDeadlines (link)
//!  └──────────────┘
//! ```
//!
//! Both entities are synchronous state machines.  Every handler receives an
//! environment implementing [`channel::Channel`], [`channel::Application`],
//! and [`timer::TimerService`]; the [`simulator`] and the UDP [`link`]
//! provide those environments.
//!
//! Each module has a single responsibility:
//! - [`packet`]    packet layout, checksum, 32-byte wire image
//! - [`seq`]       modular sequence space and window arithmetic
//! - [`config`]    protocol parameters and policies
//! - [`channel`]   channel and application boundaries
//! - [`timer`]     per-slot timer interface and a tokio deadline table
//! - [`sender`]    entity A: sending window, selective ACK handling
//! - [`receiver`]  entity B: receive window, buffering, delivery
//! - [`simulator`] deterministic lossy/reordering network emulator
//! - [`socket`]    async UDP socket abstraction
//! - [`link`]      tokio event loops running A and B over UDP

pub mod channel;
pub mod config;
pub mod link;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod socket;
pub mod timer;
