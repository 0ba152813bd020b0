//! `sr-arq` — Selective-Repeat ARQ over an unreliable datagram transport.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   DATA / FIN   ┌──────────┐   deliver()   ┌──────────┐
//!  │  Sender  │───────────────▶│ Receiver │──────────────▶│ Consumer │
//!  └────┬─────┘                └─────┬────┘               └──────────┘
//!       │◀──────── ACK(seq) ─────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │   Transport (UDP / in-memory)     │ ◀── optional LossyTransport
//!  └───────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`seq`]        — modulo-256 arithmetic and cyclic window membership
//! - [`packet`]     — wire format (serialise / parse)
//! - [`sender`]     — send window and the fill / wait / retransmit loop
//! - [`receiver`]   — receive buffer and in-order delivery loop
//! - [`transport`]  — datagram boundary, UDP and in-memory implementations
//! - [`simulator`]  — seedable packet-loss wrapper for testing
//! - [`timer`]      — retransmission deadline
//! - [`state`]      — state-machine types for both roles
//! - [`shutdown`]   — external stop signal
//! - [`config`]     — per-role parameters and defaults
//! - [`error`]      — error taxonomy

pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod shutdown;
pub mod simulator;
pub mod state;
pub mod timer;
pub mod transport;

pub use config::{LossConfig, ReceiverConfig, SenderConfig};
pub use error::ArqError;
pub use receiver::{Consumer, Listen, Receiver};
pub use sender::{SendReport, Sender};
pub use transport::{ChannelTransport, Recv, Transport, UdpTransport};
