//! ReadyPipe server - single-instance listener that logs every message it receives.
//!
//! Announces readiness once the endpoint is bound and runs until Enter is
//! pressed or Ctrl-C arrives.

use anyhow::Result;
use clap::Parser;
use readypipe_core::config::AppConfig;
use readypipe_core::{
    ClaimPolicy, ListenerOptions, ListenerService, LoggingSink, ReadinessCoordinator,
};
use readypipe_cli::{init_logging, resolve_paths};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "readypipe-server")]
#[command(about = "Single-instance local listener for readypipe clients")]
struct Args {
    /// Instance name shared with the clients
    #[arg(short, long, default_value = AppConfig::DEFAULT_INSTANCE)]
    instance: String,

    /// Directory for the lock and socket files (defaults to the runtime dir)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Wait for a running instance to exit instead of failing
    #[arg(long)]
    wait: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    info!("Starting ReadyPipe server (instance {})", args.instance);

    let paths = resolve_paths(&args.instance, args.base_dir)?;
    let coordinator = ReadinessCoordinator::open(&paths)?;
    let options = ListenerOptions {
        claim: if args.wait {
            ClaimPolicy::Block
        } else {
            ClaimPolicy::default()
        },
        ..ListenerOptions::default()
    };

    let handle = ListenerService::start(paths, coordinator, Arc::new(LoggingSink), options)?;

    let stopper = handle.stop_handle();
    ctrlc::set_handler(move || stopper.stop())?;

    let stopper = handle.stop_handle();
    std::thread::spawn(move || {
        let mut line = String::new();
        // EOF means there is no terminal to press Enter in; keep running.
        if let Ok(n) = std::io::stdin().read_line(&mut line) {
            if n > 0 {
                stopper.stop();
            }
        }
    });

    info!("Server ready on {}, press Enter or Ctrl-C to stop", handle.endpoint());
    handle.join()?;
    info!("Server stopped");

    Ok(())
}
