//! Cross-process readiness handshake.
//!
//! Two host-wide primitives keyed by the instance name cooperate here:
//!
//! - an exclusive **lock**, held by the server for its whole lifetime as the
//!   single-instance marker, and briefly by clients while they drain stale
//!   signal units
//! - a counting **signal**, holding one unit while a server is accepting
//!   connections
//!
//! # Protocol
//!
//! ```text
//! server: claim lock -> bind -> drain signal -> post 1 -> ... -> drain signal -> release lock
//! client: try lock? (drain signal, release) -> wait signal -> post back -> connect
//! ```
//!
//! A client that consumes the unit posts it straight back, so any number of
//! waiters observe a single announcement. Stale units left by a crashed server
//! are only drained by whoever holds the lock, which a live server never
//! gives up.
//!
//! The signal count is not a linearizable proof that exactly one server is
//! alive: two servers racing through start-up can briefly leave a count that
//! does not match reality. Clients recover from that by failing to connect
//! and cooling down.

pub mod local;

pub use local::{LocalLock, LocalSignal};

use crate::config::ClaimPolicy;
use crate::error::{ReadyPipeError, Result};
use crate::platform::{InstancePaths, NamedLock, NamedSemaphore};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exclusive lock shared between processes.
pub trait InterprocessLock: Send + Sync {
    /// Take the lock without blocking.
    ///
    /// Returns `true` if the lock was acquired; the caller must release it.
    fn try_lock(&self) -> Result<bool>;

    /// Block until the lock is acquired. There is no timeout.
    fn lock(&self) -> Result<()>;

    /// Release the lock. Releasing a lock that is not held is a no-op.
    fn unlock(&self) -> Result<()>;
}

/// Counting signal shared between processes.
pub trait InterprocessSignal: Send + Sync {
    /// Consume one unit if available, without blocking.
    fn try_wait(&self) -> Result<bool>;

    /// Block until a unit is available and consume it.
    ///
    /// `None` waits forever. A bounded timeout is best-effort: returns
    /// `false` if it elapsed without a unit.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Add one unit.
    fn post(&self) -> Result<()>;
}

/// Scoped ownership of an [`InterprocessLock`].
///
/// The lock is released on drop, on every exit path.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard<'a, L: InterprocessLock + ?Sized> {
    lock: &'a L,
}

impl<'a, L: InterprocessLock + ?Sized> LockGuard<'a, L> {
    /// Try to take the lock; `None` means someone else holds it.
    pub fn try_acquire(lock: &'a L) -> Result<Option<Self>> {
        if lock.try_lock()? {
            Ok(Some(Self { lock }))
        } else {
            Ok(None)
        }
    }

    /// Block until the lock is taken.
    pub fn acquire(lock: &'a L) -> Result<Self> {
        lock.lock()?;
        Ok(Self { lock })
    }

    /// Release explicitly, surfacing the unlock error instead of logging it.
    pub fn release(self) -> Result<()> {
        let lock = self.lock;
        std::mem::forget(self);
        lock.unlock()
    }
}

impl<L: InterprocessLock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!("Failed to release readiness lock: {}", e);
        }
    }
}

/// Consume every available unit of `signal`, returning how many there were.
pub fn drain_signal<S: InterprocessSignal + ?Sized>(signal: &S) -> Result<u32> {
    let mut drained = 0;
    while signal.try_wait()? {
        drained += 1;
    }
    Ok(drained)
}

/// Blocking "wait until a server is ready" step of the client state machine.
pub trait ReadinessWait: Send + Sync + 'static {
    fn wait_ready(&self) -> Result<()>;
}

/// Lock + signal pair implementing the readiness handshake.
#[derive(Debug)]
pub struct ReadinessCoordinator<L, S> {
    instance: String,
    lock: L,
    signal: S,
}

impl ReadinessCoordinator<NamedLock, NamedSemaphore> {
    /// Open the host-wide primitives of an instance.
    pub fn open(paths: &InstancePaths) -> Result<Self> {
        let lock = NamedLock::open(paths.lock_file()?)?;
        let signal = NamedSemaphore::open(&paths.semaphore_name())?;
        Ok(Self::new(paths.instance(), lock, signal))
    }
}

impl<L: InterprocessLock, S: InterprocessSignal> ReadinessCoordinator<L, S> {
    pub fn new(instance: impl Into<String>, lock: L, signal: S) -> Self {
        Self {
            instance: instance.into(),
            lock,
            signal,
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn lock(&self) -> &L {
        &self.lock
    }

    pub fn signal(&self) -> &S {
        &self.signal
    }

    /// Client side: block until a server has announced readiness.
    ///
    /// Returns `false` only if a bounded `timeout` elapsed.
    pub fn wait_until_ready(&self, timeout: Option<Duration>) -> Result<bool> {
        match LockGuard::try_acquire(&self.lock)? {
            Some(guard) => {
                // Nobody holds the lock, so any unit left over belongs to a
                // server that is gone.
                let stale = drain_signal(&self.signal)?;
                if stale > 0 {
                    debug!("Drained {} stale readiness unit(s) for {}", stale, self.instance);
                }
                guard.release()?;
            }
            None => debug!("Readiness lock for {} is held, skipping drain", self.instance),
        }

        if !self.signal.wait(timeout)? {
            return Ok(false);
        }
        // Put the unit back so other waiters see the same announcement.
        self.signal.post()?;
        Ok(true)
    }

    /// Non-blocking check whether readiness is currently announced.
    ///
    /// Does not drain stale units, so a crashed server can still read as ready.
    pub fn is_announced(&self) -> Result<bool> {
        if self.signal.try_wait()? {
            self.signal.post()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Server side: take the single-instance lock.
    pub fn claim_instance(&self, policy: ClaimPolicy) -> Result<InstanceClaim<'_, L, S>> {
        let guard = match policy {
            ClaimPolicy::Block => {
                debug!("Waiting for single-instance lock of {}", self.instance);
                LockGuard::acquire(&self.lock)?
            }
            ClaimPolicy::Retry { attempts, interval } => {
                let mut attempt = 0;
                loop {
                    if let Some(guard) = LockGuard::try_acquire(&self.lock)? {
                        break guard;
                    }
                    attempt += 1;
                    if attempt >= attempts.max(1) {
                        return Err(ReadyPipeError::AlreadyRunning {
                            instance: self.instance.clone(),
                        });
                    }
                    std::thread::sleep(interval);
                }
            }
        };

        debug!("Claimed single-instance lock of {}", self.instance);
        Ok(InstanceClaim {
            coordinator: self,
            announced: false,
            _guard: guard,
        })
    }
}

impl<L, S> ReadinessWait for ReadinessCoordinator<L, S>
where
    L: InterprocessLock + 'static,
    S: InterprocessSignal + 'static,
{
    fn wait_ready(&self) -> Result<()> {
        self.wait_until_ready(None).map(|_| ())
    }
}

/// Proof that this process is the single running server of an instance.
///
/// Dropping the claim withdraws any announcement and then releases the lock.
#[derive(Debug)]
pub struct InstanceClaim<'a, L: InterprocessLock, S: InterprocessSignal> {
    coordinator: &'a ReadinessCoordinator<L, S>,
    announced: bool,
    _guard: LockGuard<'a, L>,
}

impl<L: InterprocessLock, S: InterprocessSignal> InstanceClaim<'_, L, S> {
    /// Announce readiness: normalize the signal to exactly one unit.
    pub fn announce(&mut self) -> Result<()> {
        let stale = drain_signal(&self.coordinator.signal)?;
        if stale > 0 {
            debug!("Discarded {} readiness unit(s) from a previous server", stale);
        }
        self.coordinator.signal.post()?;
        self.announced = true;
        info!("Announced readiness for {}", self.coordinator.instance);
        Ok(())
    }

    /// Withdraw the announcement so new waiters block again.
    pub fn withdraw(&mut self) -> Result<()> {
        drain_signal(&self.coordinator.signal)?;
        self.announced = false;
        info!("Withdrew readiness for {}", self.coordinator.instance);
        Ok(())
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }
}

impl<L: InterprocessLock, S: InterprocessSignal> Drop for InstanceClaim<'_, L, S> {
    fn drop(&mut self) {
        if self.announced {
            if let Err(e) = self.withdraw() {
                warn!("Failed to withdraw readiness: {}", e);
            }
        }
    }
}
