//! ReadyPipe client - posts a message to the server on a fixed interval.
//!
//! Waits for the server to announce readiness, reconnects after a cooldown
//! whenever it goes away, and drops messages posted while disconnected.

use anyhow::Result;
use clap::Parser;
use readypipe_core::config::AppConfig;
use readypipe_core::{ChannelOptions, LocalSocketTransport, ReadinessCoordinator, ReconnectingChannel};
use readypipe_cli::{init_logging, resolve_paths};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info};

/// How long shutdown waits for the reactor before exiting without it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "readypipe-client")]
#[command(about = "Reconnecting client that streams messages to a readypipe server")]
struct Args {
    /// Instance name shared with the server
    #[arg(short, long, default_value = AppConfig::DEFAULT_INSTANCE)]
    instance: String,

    /// Directory for the lock and socket files (defaults to the runtime dir)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Seconds between messages (minimum 1)
    #[arg(long, default_value = "2")]
    interval_secs: u64,

    /// Message text; a sequence number is appended
    #[arg(short, long, default_value = "hello")]
    message: String,

    /// Seconds to wait before reconnecting after a disconnect
    #[arg(long, default_value = "5")]
    cooldown_secs: u64,

    /// Stop after this many messages
    #[arg(short, long)]
    count: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    info!("Starting ReadyPipe client (instance {})", args.instance);

    let paths = resolve_paths(&args.instance, args.base_dir)?;
    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    let channel = ReconnectingChannel::start(
        LocalSocketTransport,
        ReadinessCoordinator::open(&paths)?,
        paths.socket_endpoint(false)?,
        ChannelOptions::default().with_cooldown(Duration::from_secs(args.cooldown_secs)),
    )?;

    let interval = Duration::from_secs(args.interval_secs.max(1));
    let mut sent = 0u64;
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("Shutdown signal received");
                break;
            }
        }

        sent += 1;
        let text = format!("{} #{}", args.message, sent);
        debug!("Posting {:?} while {}", text, channel.state());
        channel.send(text);

        if args.count.is_some_and(|count| sent >= count) {
            info!("Posted {} message(s), exiting", sent);
            break;
        }
    }

    // A reactor still blocked in the readiness wait would only see the Stop
    // once a server shows up; exit without it instead of hanging on Ctrl-C.
    if channel.shutdown_timeout(SHUTDOWN_GRACE)? {
        info!("Client stopped");
    } else {
        info!("No server became ready, exiting");
    }

    Ok(())
}
