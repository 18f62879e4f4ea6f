//! Centralized configuration for readypipe.
//!
//! Constants for naming, timing and buffer sizes, plus the runtime option
//! structs that let embedders override the few values that make sense to tune.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const DEFAULT_INSTANCE: &'static str = "readypipe";
    /// Directory created under the runtime dir for lock and socket files.
    pub const RUNTIME_DIR_NAME: &'static str = "readypipe";
    pub const LOCK_FILE_SUFFIX: &'static str = ".lock";
    pub const SOCKET_FILE_SUFFIX: &'static str = ".sock";
    /// Prefix of the POSIX semaphore name (`/rp-<instance>`).
    pub const UNIX_SEMAPHORE_PREFIX: &'static str = "/rp-";
    pub const WINDOWS_SEMAPHORE_PREFIX: &'static str = "Local\\readypipe-";
    pub const WINDOWS_PIPE_PREFIX: &'static str = r"\\.\pipe\readypipe-";
}

/// Client channel configuration.
pub struct ChannelConfig;

impl ChannelConfig {
    pub const COOLDOWN: Duration = Duration::from_secs(5);
    pub const READ_BUFFER_SIZE: usize = 4096;
    /// A peer that stops reading for this long is treated as gone.
    pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);
}

/// Server listener configuration.
pub struct ListenerConfig;

impl ListenerConfig {
    pub const READ_BUFFER_SIZE: usize = 4096;
    /// Clients hold the lock only while draining, so a few retries are enough
    /// to tell a running server apart from a draining client.
    pub const CLAIM_ATTEMPTS: u32 = 20;
    pub const CLAIM_RETRY_INTERVAL: Duration = Duration::from_millis(50);
}

/// Readiness primitive configuration.
pub struct ReadinessConfig;

impl ReadinessConfig {
    /// Poll interval for bounded waits on primitives without a native timed wait.
    pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
    /// macOS limits semaphore names to 31 bytes including the prefix.
    pub const MAX_INSTANCE_NAME_LEN: usize = 24;
}

/// Runtime options for a [`crate::ReconnectingChannel`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Delay between a disconnection and the next readiness wait.
    pub cooldown: Duration,
    pub read_buffer_size: usize,
    /// Upper bound on a single message write.
    pub write_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            cooldown: ChannelConfig::COOLDOWN,
            read_buffer_size: ChannelConfig::READ_BUFFER_SIZE,
            write_timeout: ChannelConfig::WRITE_TIMEOUT,
        }
    }
}

impl ChannelOptions {
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

/// How a listener claims the single-instance lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Retry `try_lock` a bounded number of times, then fail.
    Retry {
        attempts: u32,
        interval: Duration,
    },
    /// Block until the previous holder goes away.
    Block,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        ClaimPolicy::Retry {
            attempts: ListenerConfig::CLAIM_ATTEMPTS,
            interval: ListenerConfig::CLAIM_RETRY_INTERVAL,
        }
    }
}

/// Runtime options for a [`crate::ListenerService`].
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    pub claim: ClaimPolicy,
    pub read_buffer_size: Option<usize>,
}

impl ListenerOptions {
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
            .unwrap_or(ListenerConfig::READ_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel_options() {
        let options = ChannelOptions::default();
        assert_eq!(options.cooldown, Duration::from_secs(5));
        assert!(options.read_buffer_size > 0);
    }

    #[test]
    fn test_semaphore_name_fits_platform_limit() {
        let longest = AppConfig::UNIX_SEMAPHORE_PREFIX.len() + ReadinessConfig::MAX_INSTANCE_NAME_LEN;
        assert!(longest <= 31);
    }

    #[test]
    fn test_default_claim_policy_retries() {
        match ListenerOptions::default().claim {
            ClaimPolicy::Retry { attempts, .. } => assert!(attempts > 1),
            ClaimPolicy::Block => panic!("default claim should not block"),
        }
    }
}
