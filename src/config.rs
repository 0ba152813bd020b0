//! Tunable parameters for each role.
//!
//! Defaults match the reference deployment: a narrow sender window with a
//! one-second retransmit timer, and a receiver that adopts whatever width the
//! sender advertises.

use std::time::Duration;

use crate::error::ArqError;
use crate::seq::MAX_WINDOW;

/// Sender-side parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum number of unacknowledged packets (W).
    pub window: usize,
    /// Retransmission timeout (T).
    pub timeout: Duration,
    /// Give up after this many timeouts in a row with no new acknowledgement.
    pub max_consecutive_timeouts: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window: 4,
            timeout: Duration::from_secs(1),
            max_consecutive_timeouts: 10,
        }
    }
}

impl SenderConfig {
    /// Reject widths the sequence space cannot disambiguate.
    pub fn validate(&self) -> Result<(), ArqError> {
        if self.window == 0 || self.window > MAX_WINDOW {
            return Err(ArqError::InvalidWindow { width: self.window });
        }
        Ok(())
    }
}

/// Receiver-side parameters.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Width used until the first DATA or FIN advertises the sender's.
    pub window: usize,
    /// How long one receive may block before the cycle reports idle.
    pub timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            window: 200,
            timeout: Duration::from_millis(500),
        }
    }
}

impl ReceiverConfig {
    /// The starting width: `window` clamped into `1..=MAX_WINDOW`.
    pub fn initial_window(&self) -> usize {
        if self.window > MAX_WINDOW {
            log::warn!(
                "[sr] receiver window {} exceeds {MAX_WINDOW}; clamping",
                self.window
            );
        }
        self.window.clamp(1, MAX_WINDOW)
    }
}

/// Packet-loss injection for [`crate::simulator::LossyTransport`].
#[derive(Debug, Clone, Default)]
pub struct LossConfig {
    /// Probability in `[0.0, 1.0]` that an outbound datagram is dropped.
    pub rate: f64,
    /// Fixed RNG seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl LossConfig {
    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }
}
