//! Entry point for `selective-repeat`.
//!
//! Parses CLI arguments and dispatches into **simulate**, **send**, or
//! **receive** mode.  All actual protocol work is delegated to library
//! modules; `main.rs` owns only process setup (logging, argument parsing,
//! stdin/stdout plumbing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use selective_repeat::config::{DeliveryMode, IntegrityPolicy, ProtocolConfig};
use selective_repeat::link;
use selective_repeat::packet::{Message, Payload};
use selective_repeat::simulator::{Simulator, SimulatorConfig};
use selective_repeat::socket::Socket;

/// Selective-Repeat ARQ over a simulated or real UDP channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run sender and receiver against the in-process network emulator.
    Simulate {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Number of messages to send.
        #[arg(short = 'n', long, default_value_t = 20)]
        messages: usize,
        /// Mean seconds between messages.
        #[arg(long, default_value = "10", value_parser = parse_secs)]
        interval: Duration,
        /// One-way channel delay in seconds.
        #[arg(long, default_value = "5", value_parser = parse_secs)]
        latency: Duration,
        /// Packet loss probability.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Packet corruption probability.
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
        /// Packet duplication probability.
        #[arg(long, default_value_t = 0.0)]
        duplicate: f64,
        /// Probability of delaying a packet past later ones.
        #[arg(long, default_value_t = 0.0)]
        reorder: f64,
        /// RNG seed.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Keep messages refused by a full window and retry them later.
        #[arg(long)]
        requeue: bool,
    },
    /// Receive messages over UDP and print them to stdout.
    Receive {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Send stdin, one message per line, to a receiver over UDP.
    Send {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Receiver address.
        #[arg(short, long)]
        peer: SocketAddr,
    },
}

#[derive(Args)]
struct ProtocolArgs {
    /// Window size W (sequence numbers run modulo 2W).
    #[arg(short, long, default_value_t = 8)]
    window: usize,
    /// Retransmission timeout in seconds.
    #[arg(short, long, default_value = "20", value_parser = parse_secs)]
    timeout: Duration,
    /// Deliver strictly in sequence order instead of on arrival.
    #[arg(long)]
    in_order: bool,
    /// Skip checksum verification.
    #[arg(long)]
    trust_all: bool,
}

impl From<ProtocolArgs> for ProtocolConfig {
    fn from(args: ProtocolArgs) -> Self {
        Self {
            window_size: args.window,
            timeout: args.timeout,
            integrity: if args.trust_all {
                IntegrityPolicy::TrustAll
            } else {
                IntegrityPolicy::RejectCorrupt
            },
            delivery: if args.in_order {
                DeliveryMode::InOrder
            } else {
                DeliveryMode::OnArrival
            },
        }
    }
}

fn parse_secs(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

/// One output line per payload, without the zero padding of short messages.
fn display_line(payload: &Payload) -> String {
    let text = String::from_utf8_lossy(payload);
    format!("{}\n", text.trim_end_matches('\0'))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            protocol,
            messages,
            interval,
            latency,
            loss,
            corrupt,
            duplicate,
            reorder,
            seed,
            requeue,
        } => {
            let config = SimulatorConfig {
                messages,
                message_interval: interval,
                latency,
                loss_rate: loss,
                corruption_rate: corrupt,
                duplicate_rate: duplicate,
                reorder_rate: reorder,
                reorder_delay: latency,
                seed,
                requeue_refused: requeue,
                ..Default::default()
            };
            let protocol: ProtocolConfig = protocol.into();
            let report = Simulator::new(&protocol, config)
                .context("invalid simulation parameters")?
                .run();
            for payload in &report.delivered {
                println!("{}", String::from_utf8_lossy(payload));
            }
            eprintln!("{report}");
        }
        Mode::Receive { protocol, bind } => {
            let socket = Socket::bind(bind).await.context("bind failed")?;
            let (tx, mut rx) = mpsc::channel::<Payload>(64);
            let config: ProtocolConfig = protocol.into();

            let printer = tokio::spawn(async move {
                let mut stdout = tokio::io::stdout();
                while let Some(payload) = rx.recv().await {
                    if stdout.write_all(display_line(&payload).as_bytes()).await.is_err() {
                        break;
                    }
                }
            });

            tokio::select! {
                result = link::run_receiver(&socket, &config, tx) => {
                    let stats = result?;
                    log::info!("receiver stats: {stats:?}");
                }
                _ = tokio::signal::ctrl_c() => log::info!("interrupted"),
            }
            printer.abort();
        }
        Mode::Send {
            protocol,
            bind,
            peer,
        } => {
            let socket = Socket::bind(bind).await.context("bind failed")?;
            let config: ProtocolConfig = protocol.into();
            config.validate()?;
            let (tx, rx) = mpsc::channel::<Message>(config.window_size);

            tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(Message::from_bytes(line.as_bytes())).await.is_err() {
                        break;
                    }
                }
            });

            let stats = link::run_sender(&socket, peer, &config, rx).await?;
            eprintln!(
                "sent {} messages ({} transmissions, {} retransmissions)",
                stats.accepted, stats.transmissions, stats.retransmissions
            );
        }
    }

    Ok(())
}
