//! Selective-Repeat receive side.
//!
//! Like the send side, this is split into:
//! - [`RecvWindow`] — pure buffering and in-order delivery over a ring of
//!   [`SEQ_SPACE`] slots.
//! - [`Receiver`] — the driver that reads datagrams, acknowledges them and
//!   feeds a [`Consumer`].
//!
//! For a data packet with sequence number `s`:
//!
//! | `s` lies in                    | action                                |
//! |--------------------------------|---------------------------------------|
//! | `[recv_base, recv_base + W)`   | buffer (idempotent), ACK `s`          |
//! | `[recv_base - W, recv_base)`   | ACK `s` again, nothing stored         |
//! | anywhere else                  | drop silently                         |
//!
//! When `s == recv_base` the longest contiguous run of buffered payloads is
//! delivered in order and the window slides past it.

use std::net::SocketAddr;

use crate::config::ReceiverConfig;
use crate::error::ArqError;
use crate::packet::Packet;
use crate::seq::{self, Seq, SEQ_SPACE};
use crate::shutdown::Shutdown;
use crate::state::ReceiverState;
use crate::transport::{Recv, Transport};

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Application side of the receiver.
pub trait Consumer {
    /// Called once per payload, strictly in sequence order.
    fn deliver(&mut self, payload: &[u8]);

    /// Called when the peer signals end of stream.
    fn end_of_stream(&mut self) {}
}

impl<F: FnMut(&[u8])> Consumer for F {
    fn deliver(&mut self, payload: &[u8]) {
        self(payload)
    }
}

// ---------------------------------------------------------------------------
// RecvWindow
// ---------------------------------------------------------------------------

/// What a data packet did to the receive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    /// Stored behind a gap.
    Buffered { ack: Seq },
    /// Filled the base slot; `count` payloads were delivered.
    Delivered { ack: Seq, count: usize },
    /// Already delivered; acknowledged again without storing.
    Reacked { ack: Seq },
    /// Outside both windows.
    Dropped,
}

impl DataOutcome {
    /// The sequence number to acknowledge, if any.
    pub fn ack(&self) -> Option<Seq> {
        match *self {
            DataOutcome::Buffered { ack }
            | DataOutcome::Delivered { ack, .. }
            | DataOutcome::Reacked { ack } => Some(ack),
            DataOutcome::Dropped => None,
        }
    }
}

/// Receive-side sliding window.
#[derive(Debug)]
pub struct RecvWindow {
    slots: Vec<Option<Vec<u8>>>,
    recv_base: Seq,
    width: usize,
}

impl RecvWindow {
    /// Create an empty window `initial_width` slots wide.
    ///
    /// The width only holds until the peer advertises its own.
    pub fn new(initial_width: usize) -> Self {
        Self {
            slots: vec![None; SEQ_SPACE],
            recv_base: 0,
            width: initial_width.clamp(1, seq::MAX_WINDOW),
        }
    }

    pub fn recv_base(&self) -> Seq {
        self.recv_base
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Payloads held behind a gap.
    pub fn buffered(&self) -> usize {
        (0..self.width)
            .filter(|&k| self.slots[seq::add(self.recv_base, k) as usize].is_some())
            .count()
    }

    /// Adopt a width advertised by the peer, so both ends share one `W`.
    ///
    /// Zero is ignored and anything above [`seq::MAX_WINDOW`] is capped.
    /// Slots that fall outside a narrowed window are cleared.
    pub fn set_width(&mut self, advertised: usize) {
        if advertised == 0 {
            return;
        }
        let width = advertised.min(seq::MAX_WINDOW);
        if width < self.width {
            for k in width..self.width {
                self.slots[seq::add(self.recv_base, k) as usize] = None;
            }
        }
        if width != self.width {
            log::debug!("[sr:recv] window width {} → {width}", self.width);
            self.width = width;
        }
    }

    /// Handle a data packet, handing any deliverable run to `deliver`.
    pub fn on_data(
        &mut self,
        seq: Seq,
        payload: &[u8],
        mut deliver: impl FnMut(&[u8]),
    ) -> DataOutcome {
        if seq::in_window(seq, self.recv_base, self.width) {
            let slot = &mut self.slots[seq as usize];
            if slot.is_none() {
                *slot = Some(payload.to_vec());
            }
            if seq != self.recv_base {
                return DataOutcome::Buffered { ack: seq };
            }

            let mut count = 0;
            while count < self.width {
                let Some(data) = self.slots[self.recv_base as usize].take() else {
                    break;
                };
                deliver(&data);
                self.recv_base = seq::add(self.recv_base, 1);
                count += 1;
            }
            DataOutcome::Delivered { ack: seq, count }
        } else if seq::in_prior_window(seq, self.recv_base, self.width) {
            DataOutcome::Reacked { ack: seq }
        } else {
            DataOutcome::Dropped
        }
    }

    /// Forget everything buffered and start over at sequence 0.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.recv_base = 0;
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Result of one [`Receiver::listen`] cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listen {
    /// A receive timed out; the caller decides whether to keep listening.
    Idle,
    /// A FIN was processed and the window reset.
    Finished,
    /// The shutdown signal fired.
    Cancelled,
}

/// Drives a [`RecvWindow`] over a transport, delivering to a [`Consumer`].
pub struct Receiver<T, C> {
    transport: T,
    consumer: C,
    config: ReceiverConfig,
    window: RecvWindow,
    state: ReceiverState,
    shutdown: Shutdown,
    peer: Option<SocketAddr>,
}

impl<T: Transport, C: Consumer> Receiver<T, C> {
    pub fn new(transport: T, consumer: C, config: ReceiverConfig) -> Self {
        Self {
            transport,
            consumer,
            window: RecvWindow::new(config.initial_window()),
            config,
            state: ReceiverState::default(),
            shutdown: Shutdown::never(),
            peer: None,
        }
    }

    /// End [`run`](Self::run) / [`listen`](Self::listen) when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn window(&self) -> &RecvWindow {
        &self.window
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }

    /// Address of the most recent sender, where ACKs go.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Listen until a receive times out, a FIN arrives, or shutdown fires.
    pub async fn listen(&mut self) -> Result<Listen, ArqError> {
        loop {
            let recv = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return Ok(Listen::Cancelled),
                r = self.transport.recv_from(self.config.timeout) => r?,
            };
            let (bytes, from) = match recv {
                Recv::Timeout => return Ok(Listen::Idle),
                Recv::Datagram { bytes, from } => (bytes, from),
            };
            let pkt = match Packet::decode(&bytes) {
                Ok(pkt) => pkt,
                Err(e) => {
                    log::warn!("[sr:recv] dropping datagram from {from}: {e}");
                    continue;
                }
            };

            if !pkt.header.is_fin() && !pkt.header.is_data() {
                log::trace!("[sr:recv] ignoring non-data datagram from {from}");
                continue;
            }
            self.peer = Some(from);
            self.window.set_width(pkt.header.window as usize);

            if pkt.header.is_fin() {
                log::debug!("[sr:recv] ← FIN from {from}");
                self.reset();
                return Ok(Listen::Finished);
            }

            let seq = pkt.header.seq;
            let consumer = &mut self.consumer;
            let outcome = self.window.on_data(seq, pkt.payload, |p| consumer.deliver(p));
            log::trace!(
                "[sr:recv] ← DATA seq={seq} len={} {outcome:?}",
                pkt.payload.len()
            );

            if let DataOutcome::Delivered { count, .. } = outcome {
                self.transition(ReceiverState::Delivering);
                log::debug!(
                    "[sr:recv] delivered {count}; base={}",
                    self.window.recv_base()
                );
            }
            if self.window.buffered() > 0 {
                self.transition(ReceiverState::Buffering);
            } else {
                self.transition(ReceiverState::Listening);
            }

            if let Some(ack) = outcome.ack() {
                let reply = Packet::ack(ack, self.window.width() as u8);
                self.transport.send_to(&reply.encode(), from).await?;
                log::trace!("[sr:recv] → ACK ack={ack}");
            }
        }
    }

    /// Listen forever, resetting on every FIN, until shutdown fires.
    pub async fn run(&mut self) -> Result<(), ArqError> {
        loop {
            match self.listen().await? {
                Listen::Idle => log::trace!("[sr:recv] idle"),
                Listen::Finished => log::debug!("[sr:recv] stream finished; listening again"),
                Listen::Cancelled => return Ok(()),
            }
        }
    }

    fn reset(&mut self) {
        self.transition(ReceiverState::Reset);
        self.window.reset();
        self.consumer.end_of_stream();
        self.transition(ReceiverState::Listening);
    }

    fn transition(&mut self, next: ReceiverState) {
        if self.state != next {
            log::trace!("[sr:recv] {} → {next}", self.state);
            self.state = next;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
