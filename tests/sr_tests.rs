//! Integration tests for the Selective-Repeat sender and receiver.
//!
//! Most tests drive one real role over an in-memory [`ChannelTransport`] and
//! play the opposite role by hand, so every datagram on the link can be
//! inspected, withheld or forged.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sr_arq::packet::{Header, Packet};
use sr_arq::receiver::{Consumer, Listen, Receiver};
use sr_arq::sender::Sender;
use sr_arq::simulator::LossyTransport;
use sr_arq::{
    shutdown, ArqError, ChannelTransport, LossConfig, ReceiverConfig, Recv, SenderConfig,
    Transport,
};

const WAIT: Duration = Duration::from_secs(2);
const TEST_DEADLINE: Duration = Duration::from_secs(10);

/// Records every delivery and end-of-stream notification.
#[derive(Debug, Default)]
struct Collector {
    payloads: Vec<Vec<u8>>,
    ends: usize,
}

impl Consumer for Collector {
    fn deliver(&mut self, payload: &[u8]) {
        self.payloads.push(payload.to_vec());
    }

    fn end_of_stream(&mut self) {
        self.ends += 1;
    }
}

fn sender_config(window: usize, timeout_ms: u64, max_timeouts: u32) -> SenderConfig {
    SenderConfig {
        window,
        timeout: Duration::from_millis(timeout_ms),
        max_consecutive_timeouts: max_timeouts,
    }
}

fn receiver_config() -> ReceiverConfig {
    ReceiverConfig {
        window: 16,
        timeout: Duration::from_millis(50),
    }
}

/// Wait for the next datagram on `t` and decode it.
async fn next_packet(t: &impl Transport) -> (Header, Vec<u8>) {
    match t.recv_from(WAIT).await.expect("recv") {
        Recv::Datagram { bytes, .. } => {
            let pkt = Packet::decode(&bytes).expect("decode");
            (pkt.header, pkt.payload.to_vec())
        }
        Recv::Timeout => panic!("expected a packet, got silence"),
    }
}

/// Listen on `transport` until `streams` FINs have been processed.
async fn collect_streams(transport: ChannelTransport, streams: usize) -> Collector {
    collect_streams_with(transport, receiver_config(), streams).await
}

async fn collect_streams_with<T: Transport>(
    transport: T,
    config: ReceiverConfig,
    streams: usize,
) -> Collector {
    let mut receiver = Receiver::new(transport, Collector::default(), config);
    let mut finished = 0;
    while finished < streams {
        match receiver.listen().await.expect("listen") {
            Listen::Finished => finished += 1,
            Listen::Idle => {}
            Listen::Cancelled => unreachable!("no shutdown handle"),
        }
    }
    receiver.into_consumer()
}

fn chunks(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("chunk-{i:03}").into_bytes()).collect()
}

// ---------------------------------------------------------------------------
// Test 1: one byte, window = 1, no loss
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_packet_window_one() {
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();

    let receiver = tokio::spawn(collect_streams(b, 1));

    let mut sender = Sender::new(a, peer, sender_config(1, 100, 10)).expect("sender");
    let report = sender.run(vec![vec![0x5A]]).await.expect("send");
    assert_eq!(report.packets_sent, 1);
    assert_eq!(report.retransmissions, 0);
    assert!(sender.window().is_empty());
    assert_eq!(sender.window().send_base(), 1);

    let collected = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(collected.payloads, vec![vec![0x5A]]);
    assert_eq!(collected.ends, 1);
}

// ---------------------------------------------------------------------------
// Test 2: many packets through a narrow window, crossing the wrap at 256
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_crosses_sequence_wrap() {
    const COUNT: usize = 300;
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();

    let receiver = tokio::spawn(collect_streams(b, 1));

    let mut sender = Sender::new(a, peer, sender_config(4, 100, 10)).expect("sender");
    let report = sender.run(chunks(COUNT)).await.expect("send");
    assert_eq!(report.packets_sent, COUNT as u64);
    assert_eq!(sender.window().next_seq(), (COUNT % 256) as u8);

    let collected = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(collected.payloads, chunks(COUNT));
}

// ---------------------------------------------------------------------------
// Test 3: out-of-order arrivals are held until the gap fills
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reordered_packets_delivered_in_order() {
    let (a, b) = ChannelTransport::pair();
    let receiver = tokio::spawn(collect_streams(b, 1));
    let to = a.peer_addr();

    for (seq, body) in [(2u8, &b"two"[..]), (1, b"one")] {
        a.send_to(&Packet::data(seq, 4, body).encode(), to).await.unwrap();
        let (h, _) = next_packet(&a).await;
        assert!(h.is_ack());
        assert_eq!(h.ack, seq);
    }

    a.send_to(&Packet::data(0, 4, b"zero").encode(), to).await.unwrap();
    let (h, _) = next_packet(&a).await;
    assert_eq!(h.ack, 0);
    assert_eq!(h.window, 4, "receiver adopts the advertised width");

    a.send_to(&Packet::fin(3, 4).encode(), to).await.unwrap();
    let collected = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(
        collected.payloads,
        vec![b"zero".to_vec(), b"one".to_vec(), b"two".to_vec()]
    );
}

// ---------------------------------------------------------------------------
// Test 4: a lost ACK triggers retransmission of exactly that packet
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeout_resends_only_unacked_packets() {
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();

    let sender = tokio::spawn(async move {
        let mut s = Sender::new(a, peer, sender_config(4, 100, 10)).expect("sender");
        s.run(chunks(4)).await
    });

    let to = b.peer_addr();
    for expected in 0..4u8 {
        let (h, payload) = next_packet(&b).await;
        assert!(h.is_data());
        assert_eq!(h.seq, expected);
        assert_eq!(payload, chunks(4)[expected as usize]);
    }

    // Acknowledge everything except packet 1.
    for ack in [0u8, 2, 3] {
        b.send_to(&Packet::ack(ack, 16).encode(), to).await.unwrap();
    }

    let (h, payload) = next_packet(&b).await;
    assert!(h.is_data());
    assert_eq!(h.seq, 1, "only the unacknowledged packet is resent");
    assert_eq!(payload, b"chunk-001");

    b.send_to(&Packet::ack(1, 16).encode(), to).await.unwrap();

    // Window drained and source empty: the next thing on the wire is FIN.
    let (h, _) = next_packet(&b).await;
    assert!(h.is_fin(), "expected FIN, got {h:?}");
    assert_eq!(h.seq, 4);

    let report = sender.await.unwrap().expect("send");
    assert_eq!(report.packets_sent, 4);
    assert_eq!(report.retransmissions, 1);
    assert_eq!(report.timeouts, 1);
}

// ---------------------------------------------------------------------------
// Test 5: stale, premature and malformed inputs do not disturb the sender
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sender_ignores_noise() {
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();

    let sender = tokio::spawn(async move {
        let mut s = Sender::new(a, peer, sender_config(2, 2_000, 10)).expect("sender");
        s.run(chunks(2)).await
    });

    let to = b.peer_addr();
    next_packet(&b).await;
    next_packet(&b).await;

    b.send_to(&[0xFF, 0x00], to).await.unwrap(); // shorter than a header
    b.send_to(&Packet::ack(9, 16).encode(), to).await.unwrap(); // never sent
    b.send_to(&Packet::data(0, 16, b"?").encode(), to).await.unwrap(); // not an ACK
    b.send_to(&Packet::ack(1, 16).encode(), to).await.unwrap();
    b.send_to(&Packet::ack(0, 16).encode(), to).await.unwrap();

    let (h, _) = next_packet(&b).await;
    assert!(h.is_fin());
    let report = sender.await.unwrap().expect("send");
    assert_eq!(report.retransmissions, 0);
}

// ---------------------------------------------------------------------------
// Test 6: a silent peer ends the transfer with PeerUnreachable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_peer_is_unreachable() {
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();

    let mut sender = Sender::new(a, peer, sender_config(2, 20, 3)).expect("sender");
    let result = tokio::time::timeout(TEST_DEADLINE, sender.run(chunks(5)))
        .await
        .expect("sender looped forever");
    match result {
        Err(ArqError::PeerUnreachable { timeouts }) => assert_eq!(timeouts, 3),
        other => panic!("expected PeerUnreachable, got {other:?}"),
    }

    // Two first transmissions plus two retransmission rounds of two packets.
    let mut seen = 0;
    while let Recv::Datagram { .. } = b.recv_from(Duration::from_millis(20)).await.unwrap() {
        seen += 1;
    }
    assert_eq!(seen, 6);
}

// ---------------------------------------------------------------------------
// Test 7: shutdown stops a sender that would otherwise keep retrying
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_cancels_sender() {
    let (a, _b) = ChannelTransport::pair();
    let peer = a.peer_addr();
    let (handle, stop) = shutdown::channel();

    let sender = tokio::spawn(async move {
        let mut s = Sender::new(a, peer, sender_config(4, 50, 1_000))
            .expect("sender")
            .with_shutdown(stop);
        s.run(chunks(4)).await
    });

    tokio::time::sleep(Duration::from_millis(120)).await;
    handle.trigger();
    let result = tokio::time::timeout(TEST_DEADLINE, sender)
        .await
        .expect("sender ignored shutdown")
        .unwrap();
    assert!(matches!(result, Err(ArqError::Cancelled)));
}

#[tokio::test]
async fn shutdown_before_run_sends_nothing() {
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();
    let (handle, stop) = shutdown::channel();
    handle.trigger();

    let mut sender = Sender::new(a, peer, sender_config(4, 50, 10))
        .expect("sender")
        .with_shutdown(stop);
    assert!(matches!(sender.run(chunks(4)).await, Err(ArqError::Cancelled)));
    assert_eq!(sender.window().in_flight(), 0);
    assert_eq!(
        b.recv_from(Duration::from_millis(50)).await.unwrap(),
        Recv::Timeout
    );
}

// ---------------------------------------------------------------------------
// Test 8: duplicates of delivered packets are re-acknowledged, not redelivered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_is_reacked_without_redelivery() {
    let (a, b) = ChannelTransport::pair();
    let receiver = tokio::spawn(collect_streams(b, 1));
    let to = a.peer_addr();

    a.send_to(&[0x01], to).await.unwrap(); // malformed; dropped
    for _ in 0..3 {
        a.send_to(&Packet::data(0, 4, b"once").encode(), to).await.unwrap();
        let (h, _) = next_packet(&a).await;
        assert!(h.is_ack());
        assert_eq!(h.ack, 0);
    }

    // Far outside both windows: no ACK at all.
    a.send_to(&Packet::data(100, 4, b"lost").encode(), to).await.unwrap();
    assert_eq!(
        a.recv_from(Duration::from_millis(100)).await.unwrap(),
        Recv::Timeout
    );

    a.send_to(&Packet::fin(1, 4).encode(), to).await.unwrap();
    let collected = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(collected.payloads, vec![b"once".to_vec()]);
}

// ---------------------------------------------------------------------------
// Test 9: FIN discards buffered data and restarts at sequence 0
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fin_resets_receiver() {
    let (a, b) = ChannelTransport::pair();
    let receiver = tokio::spawn(collect_streams(b, 2));
    let to = a.peer_addr();

    a.send_to(&Packet::data(0, 4, b"a").encode(), to).await.unwrap();
    next_packet(&a).await;
    a.send_to(&Packet::data(2, 4, b"c").encode(), to).await.unwrap();
    next_packet(&a).await;
    a.send_to(&Packet::fin(3, 4).encode(), to).await.unwrap();

    // Without the reset, seq 0 would fall in the prior window and be ignored.
    a.send_to(&Packet::data(0, 4, b"x").encode(), to).await.unwrap();
    next_packet(&a).await;
    a.send_to(&Packet::fin(1, 4).encode(), to).await.unwrap();

    let collected = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(collected.payloads, vec![b"a".to_vec(), b"x".to_vec()]);
    assert_eq!(collected.ends, 2);
}

// ---------------------------------------------------------------------------
// Test 10: idle receive cycles are reported, not treated as errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receiver_reports_idle_and_cancel() {
    let (_a, b) = ChannelTransport::pair();
    let (handle, stop) = shutdown::channel();
    let mut receiver =
        Receiver::new(b, Collector::default(), receiver_config()).with_shutdown(stop);

    assert_eq!(receiver.listen().await.unwrap(), Listen::Idle);
    handle.trigger();
    assert_eq!(receiver.listen().await.unwrap(), Listen::Cancelled);
    receiver.run().await.expect("run returns on shutdown");
}

// ---------------------------------------------------------------------------
// Test 11: end-to-end over a lossy link in both directions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lossy_link_delivers_everything_in_order() {
    const COUNT: usize = 120;
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();

    let a = LossyTransport::new(
        a,
        &LossConfig {
            rate: 0.2,
            seed: Some(0x5EED),
        },
    );
    let b = LossyTransport::new(
        b,
        &LossConfig {
            rate: 0.2,
            seed: Some(0xACED),
        },
    );

    let (handle, stop) = shutdown::channel();
    let receiver = tokio::spawn(async move {
        let mut r = Receiver::new(b, Collector::default(), receiver_config()).with_shutdown(stop);
        r.run().await.expect("receiver");
        r.into_consumer()
    });

    let mut sender = Sender::new(a, peer, sender_config(8, 30, 50)).expect("sender");
    let report = tokio::time::timeout(Duration::from_secs(30), sender.run(chunks(COUNT)))
        .await
        .expect("transfer stalled")
        .expect("send");
    assert_eq!(report.packets_sent, COUNT as u64);
    assert!(report.retransmissions > 0);

    handle.trigger();
    let collected = receiver.await.unwrap();
    assert_eq!(collected.payloads, chunks(COUNT));
}

// ---------------------------------------------------------------------------
// Test 12: the sender's width wins over a narrower receiver configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receiver_adopts_wider_sender_window() {
    let (a, b) = ChannelTransport::pair();
    let config = ReceiverConfig {
        window: 4,
        timeout: Duration::from_millis(50),
    };
    let receiver = tokio::spawn(collect_streams_with(b, config, 1));
    let to = a.peer_addr();

    for seq in 0..8u8 {
        a.send_to(&Packet::data(seq, 8, &[seq]).encode(), to).await.unwrap();
        let (h, _) = next_packet(&a).await;
        assert_eq!(h.ack, seq);
        assert_eq!(h.window, 8);
    }

    // Every ACK above is treated as lost: the oldest packet comes back and
    // must be acknowledged again from the prior window.
    a.send_to(&Packet::data(0, 8, &[0]).encode(), to).await.unwrap();
    let (h, _) = next_packet(&a).await;
    assert!(h.is_ack());
    assert_eq!(h.ack, 0);

    a.send_to(&Packet::fin(8, 8).encode(), to).await.unwrap();
    let collected = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(collected.payloads, (0..8u8).map(|s| vec![s]).collect::<Vec<_>>());
}

#[tokio::test]
async fn lost_acks_with_narrow_receiver_config_still_complete() {
    const COUNT: usize = 64;
    let (a, b) = ChannelTransport::pair();
    let peer = a.peer_addr();
    let b = LossyTransport::new(
        b,
        &LossConfig {
            rate: 0.3,
            seed: Some(0xB0B),
        },
    );

    let (handle, stop) = shutdown::channel();
    let receiver = tokio::spawn(async move {
        let config = ReceiverConfig {
            window: 2,
            timeout: Duration::from_millis(50),
        };
        let mut r = Receiver::new(b, Collector::default(), config).with_shutdown(stop);
        r.run().await.expect("receiver");
        r.into_consumer()
    });

    let mut sender = Sender::new(a, peer, sender_config(8, 30, 50)).expect("sender");
    let report = tokio::time::timeout(Duration::from_secs(30), sender.run(chunks(COUNT)))
        .await
        .expect("transfer stalled")
        .expect("send");
    assert_eq!(report.packets_sent, COUNT as u64);

    handle.trigger();
    let collected = receiver.await.unwrap();
    assert_eq!(collected.payloads, chunks(COUNT));
}

// ---------------------------------------------------------------------------
// Test 13: only DATA and FIN carry a width the receiver adopts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ack_only_datagram_does_not_change_receiver_width() {
    let (a, b) = ChannelTransport::pair();
    let to = a.peer_addr();
    let mut receiver = Receiver::new(b, Collector::default(), receiver_config());

    a.send_to(&Packet::ack(0, 2).encode(), to).await.unwrap();
    a.send_to(&[0, 0, 0, 3], to).await.unwrap(); // no flags at all
    assert_eq!(receiver.listen().await.unwrap(), Listen::Idle);
    assert_eq!(receiver.window().width(), 16);
    assert_eq!(receiver.peer(), None);
    assert_eq!(
        a.recv_from(Duration::from_millis(50)).await.unwrap(),
        Recv::Timeout,
        "nothing is acknowledged"
    );

    a.send_to(&Packet::data(0, 8, b"x").encode(), to).await.unwrap();
    assert_eq!(receiver.listen().await.unwrap(), Listen::Idle);
    assert_eq!(receiver.window().width(), 8);
    assert_eq!(receiver.peer(), Some(a.local_addr().unwrap()));
}

// ---------------------------------------------------------------------------
// Test 14: transport failures are fatal and never retried
// ---------------------------------------------------------------------------

const FAULTY_PEER: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 9, 9, 9)),
    4000,
);

/// Serves queued inbound datagrams, then fails every receive; optionally
/// fails every send.  Counts both.
#[derive(Default)]
struct FaultyTransport {
    fail_send: bool,
    inbound: Mutex<Vec<Vec<u8>>>,
    sends: AtomicUsize,
    recvs: AtomicUsize,
}

impl FaultyTransport {
    fn failing_sends() -> Self {
        Self {
            fail_send: true,
            ..Self::default()
        }
    }

    fn with_inbound(datagrams: Vec<Vec<u8>>, fail_send: bool) -> Self {
        Self {
            fail_send,
            inbound: Mutex::new(datagrams),
            ..Self::default()
        }
    }
}

impl Transport for FaultyTransport {
    async fn send_to(&self, _bytes: &[u8], _dest: SocketAddr) -> io::Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "send failed"));
        }
        Ok(())
    }

    async fn recv_from(&self, _timeout: Duration) -> io::Result<Recv> {
        self.recvs.fetch_add(1, Ordering::SeqCst);
        let next = self.inbound.lock().unwrap().pop();
        match next {
            Some(bytes) => Ok(Recv::Datagram {
                bytes,
                from: FAULTY_PEER,
            }),
            None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "recv failed")),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([10, 9, 9, 1], 4000)))
    }
}

fn assert_transport_error<T: std::fmt::Debug>(result: Result<T, ArqError>, kind: io::ErrorKind) {
    match result {
        Err(ArqError::Transport(e)) => assert_eq!(e.kind(), kind),
        other => panic!("expected a transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn sender_send_failure_is_fatal() {
    let mut sender = Sender::new(
        FaultyTransport::failing_sends(),
        FAULTY_PEER,
        sender_config(4, 10_000, 10),
    )
    .expect("sender");
    let result = tokio::time::timeout(Duration::from_millis(500), sender.run(chunks(4)))
        .await
        .expect("sender retried a failing send");
    assert_transport_error(result, io::ErrorKind::BrokenPipe);
    assert_eq!(sender.transport().sends.load(Ordering::SeqCst), 1);
    assert_eq!(sender.transport().recvs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sender_recv_failure_is_fatal() {
    let mut sender = Sender::new(
        FaultyTransport::default(),
        FAULTY_PEER,
        sender_config(4, 10_000, 10),
    )
    .expect("sender");
    let result = tokio::time::timeout(Duration::from_millis(500), sender.run(chunks(4)))
        .await
        .expect("sender retried a failing receive");
    assert_transport_error(result, io::ErrorKind::ConnectionReset);
    // The first window went out once; nothing was retransmitted.
    assert_eq!(sender.transport().sends.load(Ordering::SeqCst), 4);
    assert_eq!(sender.transport().recvs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn receiver_recv_failure_is_fatal() {
    let mut receiver = Receiver::new(
        FaultyTransport::default(),
        Collector::default(),
        receiver_config(),
    );
    assert_transport_error(receiver.listen().await, io::ErrorKind::ConnectionReset);
    assert_eq!(receiver.consumer().payloads.len(), 0);
}

#[tokio::test]
async fn receiver_ack_failure_is_fatal() {
    let data = Packet::data(0, 4, b"x").encode();
    let mut receiver = Receiver::new(
        FaultyTransport::with_inbound(vec![data], true),
        Collector::default(),
        receiver_config(),
    );
    assert_transport_error(receiver.listen().await, io::ErrorKind::BrokenPipe);
    // Delivery happened before the ACK could not be sent.
    assert_eq!(receiver.consumer().payloads, vec![b"x".to_vec()]);
}
