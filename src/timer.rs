//! Retransmission deadline.
//!
//! Selective Repeat here uses one timer for the whole window: it is armed when
//! the window starts waiting, re-armed after every retransmission round and
//! after every acknowledgement that makes progress.  Datagrams that make no
//! progress (stale ACKs, garbage) do **not** push the deadline out, so a noisy
//! peer cannot starve retransmission.

use std::time::Duration;

use tokio::time::Instant;

/// A single re-armable deadline.
#[derive(Debug)]
pub struct RetransmitTimer {
    timeout: Duration,
    deadline: Instant,
}

impl RetransmitTimer {
    /// Create a timer armed `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Push the deadline to `timeout` from now.
    pub fn arm(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
