//! Selective-Repeat endpoints over a real UDP socket.
//!
//! # Architecture
//!
//! ```text
//!  messages (mpsc)                                   delivered (mpsc)
//!      │                                                   ▲
//!      ▼                                                   │
//!  run_sender ─────────────────────────────────────▶ run_receiver
//!    ├── SrSender                DATA                  ├── SrReceiver
//!    ├── SlotDeadlines (timers)                        │
//!    └── Socket  ◀──────────────────────────────────── └── Socket
//!                                 ACK
//! ```
//!
//! Each side is one `tokio::select!` loop.  The state machines stay
//! synchronous: a handler runs against a small environment that buffers
//! outgoing packets, and the loop flushes that buffer to the socket once the
//! handler returns.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::channel::{Application, Channel};
use crate::config::{ConfigError, ProtocolConfig};
use crate::packet::{Message, Packet, Payload};
use crate::receiver::{ReceiverStats, SrReceiver};
use crate::sender::{SendError, SenderStats, SrSender};
use crate::socket::{Socket, SocketError};
use crate::timer::{SlotDeadlines, TimerService};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Send(#[from] SendError),
}

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

struct SenderEnv {
    outbox: Vec<Packet>,
    timers: SlotDeadlines,
}

impl Channel for SenderEnv {
    fn transmit(&mut self, packet: Packet) {
        self.outbox.push(packet);
    }
}

impl TimerService for SenderEnv {
    fn arm(&mut self, slot: usize, after: std::time::Duration) {
        self.timers.arm(slot, after);
    }

    fn cancel(&mut self, slot: usize) {
        self.timers.cancel(slot);
    }
}

#[derive(Default)]
struct ReceiverEnv {
    acks: Vec<Packet>,
    delivered: Vec<Payload>,
}

impl Channel for ReceiverEnv {
    fn transmit(&mut self, packet: Packet) {
        self.acks.push(packet);
    }
}

impl Application for ReceiverEnv {
    fn deliver(&mut self, payload: Payload) {
        self.delivered.push(payload);
    }
}

async fn flush(socket: &Socket, outbox: &mut Vec<Packet>, dest: SocketAddr) -> Result<(), SocketError> {
    for packet in outbox.drain(..) {
        socket.send_to(&packet, dest).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sender loop
// ---------------------------------------------------------------------------

/// Drive entity A until `messages` is closed and every submitted message has
/// been acknowledged.
///
/// Messages are only pulled from the channel while the window has room, so a
/// full window back-pressures the producer instead of dropping its data.
pub async fn run_sender(
    socket: &Socket,
    peer: SocketAddr,
    config: &ProtocolConfig,
    mut messages: mpsc::Receiver<Message>,
) -> Result<SenderStats, LinkError> {
    config.validate()?;
    let mut sender = SrSender::new(config);
    let mut env = SenderEnv {
        outbox: Vec::new(),
        timers: SlotDeadlines::new(config.window_size),
    };
    let mut input_open = true;

    log::info!("[link] sender {} → {peer} (W={})", socket.local_addr, config.window_size);

    while input_open || !sender.is_idle() {
        let deadline = env.timers.next_deadline();

        tokio::select! {
            message = messages.recv(), if input_open && sender.can_send() => match message {
                Some(message) => {
                    sender.output(&mut env, &message)?;
                }
                None => {
                    log::debug!("[link] message source closed; draining {} in flight", sender.in_flight());
                    input_open = false;
                }
            },

            received = socket.recv_from() => match received {
                Ok((packet, _)) => {
                    sender.input(&mut env, &packet);
                }
                Err(SocketError::Packet(e)) => {
                    log::debug!("[link] undecodable datagram dropped: {e}");
                }
                Err(e) => return Err(e.into()),
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for slot in env.timers.take_due(Instant::now()) {
                    sender.on_timer(&mut env, slot);
                }
            }
        }

        flush(socket, &mut env.outbox, peer).await?;
    }

    log::info!("[link] sender done: {:?}", sender.stats());
    Ok(sender.stats().clone())
}

// ---------------------------------------------------------------------------
// Receiver loop
// ---------------------------------------------------------------------------

/// Drive entity B, forwarding every delivered payload to `delivered`.
///
/// ACKs go back to whichever address the data packet came from.  The loop
/// ends when the consumer drops its end of `delivered`.
pub async fn run_receiver(
    socket: &Socket,
    config: &ProtocolConfig,
    delivered: mpsc::Sender<Payload>,
) -> Result<ReceiverStats, LinkError> {
    config.validate()?;
    let mut receiver = SrReceiver::new(config);
    let mut env = ReceiverEnv::default();

    log::info!("[link] receiver listening on {} (W={})", socket.local_addr, config.window_size);

    loop {
        tokio::select! {
            _ = delivered.closed() => break,

            received = socket.recv_from() => {
                let (packet, from) = match received {
                    Ok(ok) => ok,
                    Err(SocketError::Packet(e)) => {
                        log::debug!("[link] undecodable datagram dropped: {e}");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                receiver.input(&mut env, &packet);
                flush(socket, &mut env.acks, from).await?;

                for payload in env.delivered.drain(..) {
                    if delivered.send(payload).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    log::info!("[link] receiver done: {:?}", receiver.stats());
    Ok(receiver.stats().clone())
}
