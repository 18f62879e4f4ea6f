//! Shared start-up code for the readypipe binaries.

use readypipe_core::InstancePaths;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the compact stdout subscriber used by both binaries.
pub fn init_logging(debug: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

/// Resolve instance resources, under `base_dir` if given.
pub fn resolve_paths(instance: &str, base_dir: Option<PathBuf>) -> readypipe_core::Result<InstancePaths> {
    match base_dir {
        Some(dir) => InstancePaths::with_base_dir(instance, dir),
        None => InstancePaths::new(instance),
    }
}
