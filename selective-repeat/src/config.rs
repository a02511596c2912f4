//! Protocol configuration shared by both entities.

use std::time::Duration;

use thiserror::Error;

/// Largest window whose sequence space (2W) still fits the `i32` wire fields
/// comfortably.
pub const MAX_WINDOW: usize = 1 << 15;

/// What an entity does with a packet whose checksum does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityPolicy {
    /// Process every packet as if intact (the classic textbook behaviour).
    TrustAll,
    /// Drop corrupt packets: no buffering, no acknowledgment.
    #[default]
    RejectCorrupt,
}

/// When the receiver hands payloads to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Deliver on first receipt, even ahead of a gap.
    #[default]
    OnArrival,
    /// Deliver only as the window base slides past a payload, so the
    /// application sees strict sequence order.
    InOrder,
}

/// Tunables for a sender/receiver pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Maximum number of unacknowledged packets (W).  The sequence space is 2W.
    pub window_size: usize,
    /// Fixed retransmission timeout armed per outstanding packet.
    pub timeout: Duration,
    pub integrity: IntegrityPolicy,
    pub delivery: DeliveryMode,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            timeout: Duration::from_secs(20),
            integrity: IntegrityPolicy::default(),
            delivery: DeliveryMode::default(),
        }
    }
}

impl ProtocolConfig {
    /// Reject configurations the state machines cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW {
            return Err(ConfigError::WindowSize(self.window_size));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("window size {0} is outside 1..=32768")]
    WindowSize(usize),
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("{name} = {value} is not a probability in [0, 1]")]
    Probability { name: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_setup() {
        let c = ProtocolConfig::default();
        assert_eq!(c.window_size, 8);
        assert_eq!(c.timeout, Duration::from_secs(20));
        assert_eq!(c.integrity, IntegrityPolicy::RejectCorrupt);
        assert_eq!(c.delivery, DeliveryMode::OnArrival);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let c = ProtocolConfig {
            window_size: 0,
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::WindowSize(0)));
    }

    #[test]
    fn oversized_window_rejected() {
        let c = ProtocolConfig {
            window_size: MAX_WINDOW + 1,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let c = ProtocolConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroTimeout));
    }
}
