//! Error taxonomy shared by both protocol roles.
//!
//! Timeouts are deliberately absent: a receive timeout is an ordinary return
//! value ([`crate::transport::Recv::Timeout`]) and never travels through `?`.

use thiserror::Error;

use crate::packet::PacketError;

/// Everything that can end a sender or receiver run.
#[derive(Debug, Error)]
pub enum ArqError {
    /// A datagram could not be parsed.  The drivers drop these and carry on;
    /// only direct codec callers ever see this variant.
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// The sender hit its consecutive-timeout budget without progress.
    #[error("peer unreachable after {timeouts} consecutive timeouts")]
    PeerUnreachable { timeouts: u32 },

    /// Any lower-layer failure other than a timeout.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Window width outside `1..=MAX_WINDOW`.
    #[error("window width {width} is outside 1..=128")]
    InvalidWindow { width: usize },

    /// The run was stopped through its [`crate::shutdown::Shutdown`] signal.
    #[error("stopped by shutdown signal")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_to_transport() {
        let err: ArqError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, ArqError::Transport(_)));
    }

    #[test]
    fn packet_error_is_transparent() {
        let err: ArqError = PacketError::PacketTooShort { len: 1 }.into();
        assert_eq!(
            err.to_string(),
            PacketError::PacketTooShort { len: 1 }.to_string()
        );
    }
}
