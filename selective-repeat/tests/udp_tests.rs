//! Integration tests for the UDP link layer.
//!
//! Each test spins up a sender and a receiver talking over the loopback
//! interface.  Both sides are spawned as separate tokio tasks so they can make
//! progress concurrently without blocking each other.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use selective_repeat::{
    config::{ConfigError, DeliveryMode, ProtocolConfig},
    link::{self, LinkError},
    packet::{Message, Payload},
    socket::Socket,
};

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn msg(i: usize) -> Message {
    Message::from_bytes(format!("msg-{i:02}").as_bytes())
}

/// Feed `count` messages into a fresh channel, then close it.
fn produce(count: usize) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        for i in 0..count {
            tx.send(msg(i)).await.expect("sender loop gone");
        }
    });
    rx
}

/// UDP relay between a sender and `receiver` that silently drops every
/// `drop_every`-th datagram, in either direction.
async fn lossy_proxy(receiver: SocketAddr, drop_every: usize) -> SocketAddr {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();

    tokio::spawn(async move {
        let mut client = None;
        let mut count = 0usize;
        let mut buf = [0u8; 128];
        loop {
            let Ok((n, from)) = sock.recv_from(&mut buf).await else {
                break;
            };
            let dest = if from == receiver {
                match client {
                    Some(c) => c,
                    None => continue,
                }
            } else {
                client = Some(from);
                receiver
            };
            count += 1;
            if count % drop_every == 0 {
                continue;
            }
            let _ = sock.send_to(&buf[..n], dest).await;
        }
    });

    addr
}

/// Run one transfer of `count` messages through a lossy relay (or straight to the
/// receiver) and return what the receiver delivered plus the sender stats.
async fn transfer(
    config: ProtocolConfig,
    count: usize,
    drop_every: Option<usize>,
) -> (Vec<Payload>, selective_repeat::sender::SenderStats) {
    let rx_sock = ephemeral().await;
    let rx_addr = rx_sock.local_addr;
    let peer = match drop_every {
        Some(n) => lossy_proxy(rx_addr, n).await,
        None => rx_addr,
    };

    // Room for every delivery, so the receiver never blocks on the test.
    let (delivered_tx, mut delivered_rx) = mpsc::channel(count.max(1));
    let rx_config = config.clone();
    let receiver = tokio::spawn(async move {
        link::run_receiver(&rx_sock, &rx_config, delivered_tx).await
    });

    let tx_sock = ephemeral().await;
    let stats = tokio::time::timeout(
        Duration::from_secs(20),
        link::run_sender(&tx_sock, peer, &config, produce(count)),
    )
    .await
    .expect("sender timed out")
    .expect("sender failed");

    let mut delivered = Vec::with_capacity(count);
    for _ in 0..count {
        delivered.push(delivered_rx.recv().await.expect("receiver closed early"));
    }
    // The sender is done, so nothing further may be in flight: any extra
    // payload here would be a second delivery.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(delivered_rx.try_recv().is_err(), "payload delivered more than once");
    drop(delivered_rx);

    receiver
        .await
        .unwrap()
        .expect("receiver failed");

    (delivered, stats)
}

// ---------------------------------------------------------------------------
// Test 1: pipelined transfer, in-order delivery, window smaller than stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pipeline_window4_in_order() {
    const MSG_COUNT: usize = 20;

    let config = ProtocolConfig {
        window_size: 4,
        timeout: Duration::from_millis(200),
        delivery: DeliveryMode::InOrder,
        ..Default::default()
    };
    let (delivered, stats) = transfer(config, MSG_COUNT, None).await;

    assert_eq!(stats.accepted, MSG_COUNT as u64);
    for (i, payload) in delivered.iter().enumerate() {
        assert_eq!(payload, &msg(i).data, "message {i} corrupted");
    }
}

// ---------------------------------------------------------------------------
// Test 2: losses in both directions are repaired by per-packet retransmission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lossy_link_delivers_every_message_once() {
    const MSG_COUNT: usize = 16;

    let config = ProtocolConfig {
        window_size: 4,
        timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let (mut delivered, stats) = transfer(config, MSG_COUNT, Some(3)).await;

    assert!(stats.retransmissions > 0);
    delivered.sort();
    let mut expected: Vec<Payload> = (0..MSG_COUNT).map(|i| msg(i).data).collect();
    expected.sort();
    assert_eq!(delivered, expected);
}

// ---------------------------------------------------------------------------
// Test 3: in-order delivery survives loss too
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lossy_link_in_order() {
    const MSG_COUNT: usize = 12;

    let config = ProtocolConfig {
        window_size: 3,
        timeout: Duration::from_millis(50),
        delivery: DeliveryMode::InOrder,
        ..Default::default()
    };
    let (delivered, _) = transfer(config, MSG_COUNT, Some(4)).await;

    let expected: Vec<Payload> = (0..MSG_COUNT).map(|i| msg(i).data).collect();
    assert_eq!(delivered, expected);
}

// ---------------------------------------------------------------------------
// Test 4: invalid configuration is rejected before any I/O
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zero_window_rejected() {
    let sock = ephemeral().await;
    let config = ProtocolConfig {
        window_size: 0,
        ..Default::default()
    };
    let (_tx, rx) = mpsc::channel(1);

    let err = link::run_sender(&sock, sock.local_addr, &config, rx)
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::Config(ConfigError::WindowSize(0))));
}
