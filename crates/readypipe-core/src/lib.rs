//! ReadyPipe Core - readiness handshake and reconnecting local-socket channel.
//!
//! A single server process per instance name listens on an OS-local endpoint
//! (Unix domain socket or Windows named pipe) and announces readiness through
//! a host-wide counting semaphore guarded by an exclusive lock file. Clients
//! block on that announcement instead of polling, connect, stream messages
//! one way, and reconnect after a cooldown whenever the connection ends.
//!
//! # Example
//!
//! ```rust,ignore
//! use readypipe_core::{
//!     ChannelOptions, InstancePaths, ListenerOptions, ListenerService, LocalSocketTransport,
//!     LoggingSink, ReadinessCoordinator, ReconnectingChannel,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> readypipe_core::Result<()> {
//!     let paths = InstancePaths::new("demo")?;
//!
//!     // Server process
//!     let server = ListenerService::start(
//!         paths.clone(),
//!         ReadinessCoordinator::open(&paths)?,
//!         Arc::new(LoggingSink),
//!         ListenerOptions::default(),
//!     )?;
//!
//!     // Client process
//!     let channel = ReconnectingChannel::start(
//!         LocalSocketTransport,
//!         ReadinessCoordinator::open(&paths)?,
//!         paths.socket_endpoint(false)?,
//!         ChannelOptions::default(),
//!     )?;
//!     channel.send("hello");
//!
//!     channel.shutdown()?;
//!     server.shutdown()
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod listener;
pub mod platform;
pub mod queue;
pub mod readiness;
pub mod transport;

// Re-export commonly used types
pub use channel::{ChannelState, ReconnectingChannel};
pub use config::{ChannelOptions, ClaimPolicy, ListenerOptions};
pub use error::{ReadyPipeError, Result};
pub use listener::{
    ListenerHandle, ListenerService, ListenerState, LoggingSink, MessageSink, PeerId, StopHandle,
};
pub use platform::{Endpoint, InstancePaths, NamedLock, NamedSemaphore};
pub use queue::{Command, CommandQueue};
pub use readiness::{
    InstanceClaim, InterprocessLock, InterprocessSignal, LocalLock, LocalSignal, LockGuard,
    ReadinessCoordinator, ReadinessWait,
};
pub use transport::{LocalListener, LocalSocketTransport, Transport};
