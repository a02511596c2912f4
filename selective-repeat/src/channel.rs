//! Boundaries the state machines talk through.
//!
//! The entities never own a socket or an application; they are handed an
//! environment implementing these traits on every call.  That keeps every
//! handler synchronous and run-to-completion, and lets tests record exactly
//! what an entity emitted.

use crate::packet::{Packet, Payload};

/// Unreliable packet channel towards the peer entity.
///
/// May drop, duplicate, reorder, or corrupt what it is given.
pub trait Channel {
    fn transmit(&mut self, packet: Packet);
}

/// Upper layer consuming delivered payloads at the receiver.
pub trait Application {
    fn deliver(&mut self, payload: Payload);
}
