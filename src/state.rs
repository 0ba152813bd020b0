//! Protocol state-machine types.
//!
//! The drivers in [`crate::sender`] and [`crate::receiver`] hold one of these
//! and log every transition, so a `RUST_LOG=debug` trace reads as a walk
//! through the diagrams below.

/// Sender states.
///
/// ```text
///  FillWindow ──window full──▶ WaitForAck ◀──┐
///      ▲   │                      │   │      │ timeout: resend unacked
///      │   │                      │   └──────┘
///      └───┼──── window drained ──┘
///          │
///          └── source dry & window empty ──▶ Finished (FIN sent)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Generating and transmitting new packets while the window has room.
    #[default]
    FillWindow,
    /// Blocked on the transport until an ACK or the retransmit deadline.
    WaitForAck,
    /// Source exhausted, everything acknowledged, FIN sent.
    Finished,
}

/// Receiver states.
///
/// ```text
///  Listening ──in-window DATA──▶ Buffering ──▶ Listening
///      │                             │
///      │                   base filled ▼
///      │                         Delivering ──▶ Listening
///      └──FIN──▶ Reset ──▶ Listening
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Listening,
    /// Holding out-of-order payloads behind a gap at `recv_base`.
    Buffering,
    /// Handing a contiguous run to the consumer.
    Delivering,
    /// FIN seen: buffer cleared, `recv_base` back to zero.
    Reset,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
