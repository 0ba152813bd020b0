//! Selective-Repeat send side.
//!
//! Split in two layers:
//! - [`SendWindow`] — pure window bookkeeping over a ring of [`SEQ_SPACE`]
//!   slots.  No I/O, no clocks; every transition is unit-testable.
//! - [`Sender`] — the driver that pulls chunks from a data source, pushes
//!   them through the window, and runs the fill / wait / retransmit loop
//!   against a [`Transport`].
//!
//! # Protocol contract
//!
//! - At most `width` packets are outstanding (`next_seq - send_base < W`).
//! - ACKs are **individual**: `ack = K` acknowledges packet `K` only.
//! - An ACK for `send_base` slides the window past every contiguous
//!   acknowledged slot.
//! - On timeout only the still-unacknowledged packets are resent.
//! - ACKs outside `[send_base, next_seq)` are stale or premature and ignored.

use std::net::SocketAddr;

use crate::config::SenderConfig;
use crate::error::ArqError;
use crate::packet::Packet;
use crate::seq::{self, Seq, MAX_WINDOW, SEQ_SPACE};
use crate::shutdown::Shutdown;
use crate::state::SenderState;
use crate::timer::RetransmitTimer;
use crate::transport::{Recv, Transport};

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SendSlot {
    /// Encoded packet, kept for retransmission.
    packet: Option<Vec<u8>>,
    acked: bool,
}

/// What an incoming acknowledgement did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Outside `[send_base, next_seq)`; ignored.
    Stale,
    /// Already acknowledged.
    Duplicate,
    /// Marked acknowledged; the base is still waiting on an earlier packet.
    Marked,
    /// The base advanced by `by` slots.
    Slid { by: usize },
}

impl AckOutcome {
    /// `true` when the ACK acknowledged something new.
    pub fn is_progress(&self) -> bool {
        matches!(self, AckOutcome::Marked | AckOutcome::Slid { .. })
    }
}

/// Send-side sliding window.
///
/// # Sequence-number layout
///
/// ```text
///  send_base          next_seq        send_base + W
///      │                  │                 │
///  ────┼──────────────────┼─────────────────┼───▶ seq space (mod 256)
///      │ <── in flight ──▶│ <── sendable ──▶│
/// ```
#[derive(Debug)]
pub struct SendWindow {
    slots: Vec<SendSlot>,
    send_base: Seq,
    next_seq: Seq,
    width: usize,
}

impl SendWindow {
    /// Create an empty window of `width` slots, starting at sequence 0.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not in `1..=MAX_WINDOW`; [`SenderConfig::validate`]
    /// rejects such widths before a driver is built.
    pub fn new(width: usize) -> Self {
        assert!(
            (1..=MAX_WINDOW).contains(&width),
            "window width {width} outside 1..={MAX_WINDOW}"
        );
        Self {
            slots: vec![SendSlot::default(); SEQ_SPACE],
            send_base: 0,
            next_seq: 0,
            width,
        }
    }

    pub fn send_base(&self) -> Seq {
        self.send_base
    }

    pub fn next_seq(&self) -> Seq {
        self.next_seq
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Packets sent but not yet slid past.
    pub fn in_flight(&self) -> usize {
        seq::distance(self.send_base, self.next_seq)
    }

    pub fn can_send(&self) -> bool {
        self.in_flight() < self.width
    }

    pub fn is_empty(&self) -> bool {
        self.send_base == self.next_seq
    }

    /// Frame `payload` under `next_seq`, store it and advance `next_seq`.
    ///
    /// Returns the sequence number used.  Call [`can_send`](Self::can_send)
    /// first; pushing into a full window is a logic error.
    pub fn push(&mut self, payload: &[u8]) -> Seq {
        debug_assert!(
            self.can_send(),
            "push on a full window ({} / {})",
            self.in_flight(),
            self.width
        );
        let seq = self.next_seq;
        let bytes = Packet::data(seq, self.width as u8, payload).encode();
        self.slots[seq as usize] = SendSlot {
            packet: Some(bytes),
            acked: false,
        };
        self.next_seq = seq::add(seq, 1);
        seq
    }

    /// Encoded bytes of an in-flight packet.
    pub fn packet(&self, seq: Seq) -> Option<&[u8]> {
        if !seq::in_window(seq, self.send_base, self.in_flight()) {
            return None;
        }
        self.slots[seq as usize].packet.as_deref()
    }

    pub fn is_acked(&self, seq: Seq) -> bool {
        seq::in_window(seq, self.send_base, self.in_flight()) && self.slots[seq as usize].acked
    }

    /// Apply an individual acknowledgement.
    pub fn on_ack(&mut self, ack: Seq) -> AckOutcome {
        if !seq::in_window(ack, self.send_base, self.in_flight()) {
            return AckOutcome::Stale;
        }
        let slot = &mut self.slots[ack as usize];
        if slot.acked {
            return AckOutcome::Duplicate;
        }
        slot.acked = true;
        if ack != self.send_base {
            return AckOutcome::Marked;
        }

        let mut by = 0;
        while self.send_base != self.next_seq && self.slots[self.send_base as usize].acked {
            self.slots[self.send_base as usize] = SendSlot::default();
            self.send_base = seq::add(self.send_base, 1);
            by += 1;
        }
        AckOutcome::Slid { by }
    }

    /// Every unacknowledged in-flight packet, oldest first.
    pub fn unacked(&self) -> impl Iterator<Item = (Seq, &[u8])> + '_ {
        (0..self.in_flight())
            .map(move |k| seq::add(self.send_base, k))
            .filter(move |&seq| !self.is_acked(seq))
            .filter_map(move |seq| self.packet(seq).map(|bytes| (seq, bytes)))
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Counters returned by a completed [`Sender::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// New data packets transmitted (first transmissions only).
    pub packets_sent: u64,
    /// Packets resent after a timeout.
    pub retransmissions: u64,
    /// Retransmission timer expiries.
    pub timeouts: u64,
}

/// Drives a [`SendWindow`] over a transport towards one peer.
pub struct Sender<T> {
    transport: T,
    peer: SocketAddr,
    config: SenderConfig,
    window: SendWindow,
    state: SenderState,
    shutdown: Shutdown,
    report: SendReport,
}

impl<T: Transport> Sender<T> {
    /// Build a sender for `peer`.  Fails if the configured window is invalid.
    pub fn new(transport: T, peer: SocketAddr, config: SenderConfig) -> Result<Self, ArqError> {
        config.validate()?;
        Ok(Self {
            transport,
            peer,
            window: SendWindow::new(config.window),
            config,
            state: SenderState::default(),
            shutdown: Shutdown::never(),
            report: SendReport::default(),
        })
    }

    /// Stop the run with [`ArqError::Cancelled`] when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Stream every chunk of `source` to the peer.
    ///
    /// Returns once the source is exhausted, every packet is acknowledged and
    /// a FIN has been sent.  An endless source keeps the loop running until
    /// the peer goes quiet or the shutdown signal fires.
    pub async fn run<I>(&mut self, source: I) -> Result<SendReport, ArqError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut source = source.into_iter();
        let mut exhausted = false;
        let mut timer = RetransmitTimer::new(self.config.timeout);
        let mut timeouts = 0u32;

        loop {
            match self.state {
                SenderState::FillWindow => {
                    if self.shutdown.is_triggered() {
                        return Err(ArqError::Cancelled);
                    }
                    while !exhausted && self.window.can_send() {
                        let Some(chunk) = source.next() else {
                            exhausted = true;
                            break;
                        };
                        let seq = self.window.push(&chunk);
                        if let Some(bytes) = self.window.packet(seq) {
                            self.transport.send_to(bytes, self.peer).await?;
                        }
                        self.report.packets_sent += 1;
                        log::trace!(
                            "[sr:send] → DATA seq={seq} len={} in_flight={}",
                            chunk.len(),
                            self.window.in_flight()
                        );
                    }

                    if self.window.is_empty() {
                        let fin = Packet::fin(self.window.next_seq(), self.window.width() as u8);
                        self.transport.send_to(&fin.encode(), self.peer).await?;
                        log::debug!("[sr:send] → FIN seq={}", self.window.next_seq());
                        self.transition(SenderState::Finished);
                    } else {
                        timer.arm();
                        self.transition(SenderState::WaitForAck);
                    }
                }

                SenderState::WaitForAck => {
                    let recv = if timer.expired() {
                        Recv::Timeout
                    } else {
                        tokio::select! {
                            biased;
                            _ = self.shutdown.triggered() => return Err(ArqError::Cancelled),
                            r = self.transport.recv_from(timer.remaining()) => r?,
                        }
                    };

                    match recv {
                        Recv::Timeout => {
                            timeouts += 1;
                            self.report.timeouts += 1;
                            log::debug!(
                                "[sr:send] no progress in {:?} ({timeouts} in a row)",
                                timer.timeout()
                            );
                            if timeouts >= self.config.max_consecutive_timeouts {
                                log::warn!(
                                    "[sr:send] no progress after {timeouts} timeouts; giving up on {}",
                                    self.peer
                                );
                                return Err(ArqError::PeerUnreachable { timeouts });
                            }
                            let resent = self.retransmit().await?;
                            self.report.retransmissions += resent;
                            timer.arm();
                        }
                        Recv::Datagram { bytes, from } => {
                            if from != self.peer {
                                log::trace!("[sr:send] ignoring datagram from {from}");
                                continue;
                            }
                            let pkt = match Packet::decode(&bytes) {
                                Ok(pkt) => pkt,
                                Err(e) => {
                                    log::warn!("[sr:send] dropping datagram: {e}");
                                    continue;
                                }
                            };
                            if !pkt.header.is_ack() {
                                continue;
                            }

                            let ack = pkt.header.ack;
                            let outcome = self.window.on_ack(ack);
                            log::trace!("[sr:send] ← ACK ack={ack} {outcome:?}");
                            if outcome.is_progress() {
                                timeouts = 0;
                                timer.arm();
                            }
                            if let AckOutcome::Slid { by } = outcome {
                                log::debug!(
                                    "[sr:send] window slid by {by} to base={}",
                                    self.window.send_base()
                                );
                                if self.window.is_empty() {
                                    self.transition(SenderState::FillWindow);
                                }
                            }
                        }
                    }
                }

                SenderState::Finished => return Ok(self.report.clone()),
            }
        }
    }

    /// Resend every unacknowledged packet; returns how many were sent.
    async fn retransmit(&self) -> Result<u64, ArqError> {
        let mut resent = 0;
        for (seq, bytes) in self.window.unacked() {
            log::debug!("[sr:send] timeout — resending seq={seq}");
            self.transport.send_to(bytes, self.peer).await?;
            resent += 1;
        }
        Ok(resent)
    }

    fn transition(&mut self, next: SenderState) {
        if self.state != next {
            log::trace!("[sr:send] {} → {next}", self.state);
            self.state = next;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
