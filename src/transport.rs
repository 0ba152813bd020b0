//! Datagram transport boundary.
//!
//! The protocol core never opens sockets.  It talks to a [`Transport`]: send
//! one datagram to an address, or wait up to a timeout for the next datagram.
//! A timeout is an ordinary [`Recv::Timeout`] value rather than an error, so
//! the drivers handle it in an explicit branch.
//!
//! Two implementations ship with the crate:
//! - [`UdpTransport`] — a thin wrapper around `tokio::net::UdpSocket`.
//! - [`ChannelTransport`] — an in-memory point-to-point link for tests and
//!   for running both roles in one process.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

/// Largest datagram either role will read.
pub const MAX_DATAGRAM: usize = 65_535;

/// Outcome of one bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    /// A datagram and the address it came from.
    Datagram { bytes: Vec<u8>, from: SocketAddr },
    /// Nothing arrived before the timeout.
    Timeout,
}

/// An unreliable, unordered datagram channel.
pub trait Transport: Send + Sync {
    /// Send `bytes` as one datagram to `dest`.
    fn send_to(&self, bytes: &[u8], dest: SocketAddr)
        -> impl Future<Output = io::Result<()>> + Send;

    /// Wait at most `timeout` for the next datagram.
    fn recv_from(&self, timeout: Duration) -> impl Future<Output = io::Result<Recv>> + Send;

    /// Address datagrams from this transport appear to come from.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// A UDP socket speaking raw datagrams.
#[derive(Debug)]
pub struct UdpTransport {
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        log::debug!("[sr] udp bound to {}", inner.local_addr()?);
        Ok(Self { inner })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    async fn recv_from(&self, timeout: Duration) -> io::Result<Recv> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        match tokio::time::timeout(timeout, self.inner.recv_from(&mut buf)).await {
            Err(_elapsed) => Ok(Recv::Timeout),
            Ok(result) => {
                let (n, from) = result?;
                buf.truncate(n);
                Ok(Recv::Datagram { bytes: buf, from })
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

// ---------------------------------------------------------------------------
// ChannelTransport
// ---------------------------------------------------------------------------

type Datagram = (Vec<u8>, SocketAddr);

/// One end of an in-memory datagram link built by [`ChannelTransport::pair`].
///
/// Datagrams addressed anywhere other than the opposite end vanish, as they
/// would on a real network.  Once the opposite end is dropped the link goes
/// silent: sends are discarded and receives time out.
#[derive(Debug)]
pub struct ChannelTransport {
    local: SocketAddr,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl ChannelTransport {
    /// Two connected ends with distinct synthetic addresses.
    pub fn pair() -> (Self, Self) {
        let a_addr = SocketAddr::from(([10, 0, 0, 1], 4000));
        let b_addr = SocketAddr::from(([10, 0, 0, 2], 4000));
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Self {
            local: a_addr,
            peer: b_addr,
            tx: a_tx,
            rx: Mutex::new(a_rx),
        };
        let b = Self {
            local: b_addr,
            peer: a_addr,
            tx: b_tx,
            rx: Mutex::new(b_rx),
        };
        (a, b)
    }

    /// Address of the opposite end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for ChannelTransport {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        if dest != self.peer {
            log::trace!("[sr] channel: no route to {dest}; datagram discarded");
            return Ok(());
        }
        if self.tx.send((bytes.to_vec(), self.local)).is_err() {
            log::trace!("[sr] channel: peer gone; datagram discarded");
        }
        Ok(())
    }

    async fn recv_from(&self, timeout: Duration) -> io::Result<Recv> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_elapsed) => Ok(Recv::Timeout),
            Ok(Some((bytes, from))) => Ok(Recv::Datagram { bytes, from }),
            Ok(None) => {
                tokio::time::sleep(timeout).await;
                Ok(Recv::Timeout)
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}
