//! Platform abstraction layer for the host-wide primitives.
//!
//! Naming, the instance lock and the readiness semaphore live here, so the
//! readiness protocol stays free of `#[cfg]`. The stream endpoints have their
//! own platform split in `transport` (socket vs. named pipe), and the
//! listener removes the socket file on Unix only.
//!
//! # Architecture
//!
//! - `paths` - Instance resource names (lock file, semaphore, socket endpoint)
//! - `lock` - Exclusive host-wide lock on a file
//! - `semaphore` - Host-wide named counting semaphore
//!
//! # Supported Platforms
//!
//! - **Linux**: Full support
//! - **macOS**: Full support (bounded semaphore waits are polled)
//! - **Windows**: Full support (named pipes instead of socket files)

pub mod lock;
pub mod paths;
pub mod semaphore;

// Re-export commonly used items
pub use lock::NamedLock;
pub use paths::{default_base_dir, remove_socket_file, Endpoint, InstancePaths};
pub use semaphore::NamedSemaphore;
