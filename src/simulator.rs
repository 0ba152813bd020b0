//! Fault injection for exercising the reliability machinery.
//!
//! [`LossyTransport`] wraps any [`Transport`] and silently drops outbound
//! datagrams with probability `rate`.  The protocol state machines never know
//! it is there; loss is purely a property of the channel they are handed.
//!
//! The RNG is a [`StdRng`] that can be seeded, so a lossy run that exposes a
//! bug can be replayed exactly.

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LossConfig;
use crate::transport::{Recv, Transport};

/// A transport that loses a fraction of what it sends.
#[derive(Debug)]
pub struct LossyTransport<T> {
    inner: T,
    rate: f64,
    rng: Mutex<StdRng>,
}

impl<T: Transport> LossyTransport<T> {
    /// Wrap `inner` with the loss model in `config`.
    ///
    /// `rate` is clamped into `[0.0, 1.0]`; NaN disables loss.
    pub fn new(inner: T, config: &LossConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let rate = if config.rate.is_nan() {
            0.0
        } else {
            config.rate.clamp(0.0, 1.0)
        };
        if config.is_enabled() {
            log::info!(
                "[sr:sim] dropping outbound datagrams with p={} (seed {:?})",
                config.rate,
                config.seed
            );
        }
        Self {
            inner,
            rate,
            rng: Mutex::new(rng),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn should_drop(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.random_bool(self.rate),
            // A poisoned RNG still holds a usable state.
            Err(poisoned) => poisoned.into_inner().random_bool(self.rate),
        }
    }
}

impl<T: Transport> Transport for LossyTransport<T> {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        if self.should_drop() {
            log::debug!("[sr:sim] dropped {} byte datagram to {dest}", bytes.len());
            return Ok(());
        }
        self.inner.send_to(bytes, dest).await
    }

    async fn recv_from(&self, timeout: Duration) -> io::Result<Recv> {
        self.inner.recv_from(timeout).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
