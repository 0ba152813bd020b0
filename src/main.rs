//! Entry point for `sr-arq`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, signal handling, argument parsing, stdin/stdout).

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sr_arq::receiver::Consumer;
use sr_arq::simulator::LossyTransport;
use sr_arq::{
    shutdown, LossConfig, Listen, Receiver, ReceiverConfig, Sender, SenderConfig, UdpTransport,
};

/// Reliable, in-order delivery over UDP with Selective-Repeat ARQ.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file (or stdin) to a receiver, then signal end of stream.
    Send {
        /// Receiver address (e.g. 127.0.0.1:8088).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// File to send; stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Payload bytes per packet.
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,
        /// Send window width.
        #[arg(short, long, default_value_t = 4)]
        window: usize,
        /// Retransmission timeout in milliseconds.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
        /// Consecutive timeouts before giving up.
        #[arg(long, default_value_t = 10)]
        max_timeouts: u32,
        #[command(flatten)]
        loss: LossArgs,
    },
    /// Receive data and write it to stdout.
    Recv {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:8088")]
        bind: SocketAddr,
        /// Window width used until the sender advertises its own.
        #[arg(short, long, default_value_t = 200)]
        window: usize,
        /// Receive timeout in milliseconds.
        #[arg(long, default_value_t = 500)]
        timeout_ms: u64,
        /// Exit after the first end-of-stream instead of waiting for more.
        #[arg(long)]
        once: bool,
        #[command(flatten)]
        loss: LossArgs,
    },
}

/// Test-only packet-loss injection.
#[derive(clap::Args)]
struct LossArgs {
    /// Probability of dropping each outbound datagram (0 disables).
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,
    /// RNG seed for reproducible loss.
    #[arg(long)]
    seed: Option<u64>,
}

impl From<LossArgs> for LossConfig {
    fn from(args: LossArgs) -> Self {
        LossConfig {
            rate: args.loss_rate,
            seed: args.seed,
        }
    }
}

/// Writes every delivered payload straight to stdout.
struct StdoutConsumer {
    out: std::io::Stdout,
    finished: bool,
}

impl Consumer for StdoutConsumer {
    fn deliver(&mut self, payload: &[u8]) {
        if let Err(e) = self.out.write_all(payload) {
            log::error!("stdout write failed: {e}");
        }
    }

    fn end_of_stream(&mut self) {
        let _ = self.out.flush();
        self.finished = true;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            peer,
            bind,
            file,
            chunk_size,
            window,
            timeout_ms,
            max_timeouts,
            loss,
        } => {
            let data = read_input(file.as_ref())?;
            let chunks: Vec<Vec<u8>> = data
                .chunks(chunk_size.max(1))
                .map(<[u8]>::to_vec)
                .collect();
            log::info!("Sending {} bytes in {} packets to {peer}", data.len(), chunks.len());

            let transport = LossyTransport::new(UdpTransport::bind(bind).await?, &loss.into());
            let config = SenderConfig {
                window,
                timeout: Duration::from_millis(timeout_ms),
                max_consecutive_timeouts: max_timeouts,
            };
            let (handle, stop) = shutdown::channel();
            spawn_ctrl_c(handle);

            let mut sender = Sender::new(transport, peer, config)?.with_shutdown(stop);
            let report = sender.run(chunks).await?;
            log::info!(
                "Done: {} packets, {} retransmissions, {} timeouts",
                report.packets_sent,
                report.retransmissions,
                report.timeouts
            );
        }
        Mode::Recv {
            bind,
            window,
            timeout_ms,
            once,
            loss,
        } => {
            let transport = LossyTransport::new(UdpTransport::bind(bind).await?, &loss.into());
            log::info!("Listening on {bind}");
            let config = ReceiverConfig {
                window,
                timeout: Duration::from_millis(timeout_ms),
            };
            let consumer = StdoutConsumer {
                out: std::io::stdout(),
                finished: false,
            };
            let (handle, stop) = shutdown::channel();
            spawn_ctrl_c(handle);

            let mut receiver = Receiver::new(transport, consumer, config).with_shutdown(stop);
            if once {
                while !receiver.consumer().finished {
                    if receiver.listen().await? == Listen::Cancelled {
                        break;
                    }
                }
            } else {
                receiver.run().await?;
            }
        }
    }
    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match file {
        Some(path) => {
            data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        }
        None => {
            std::io::stdin()
                .read_to_end(&mut data)
                .context("reading stdin")?;
        }
    }
    Ok(data)
}

fn spawn_ctrl_c(handle: shutdown::ShutdownHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted; shutting down");
            handle.trigger();
        }
    });
}
