//! In-process lock and signal.
//!
//! Same semantics as the named primitives, scoped to one process. Clones share
//! state, so several coordinators built from clones behave like several
//! processes opening the same instance.

use super::{InterprocessLock, InterprocessSignal};
use crate::error::Result;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive lock backed by a mutex and condvar.
#[derive(Debug, Clone, Default)]
pub struct LocalLock {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        *lock_state(&self.state.0)
    }
}

impl InterprocessLock for LocalLock {
    fn try_lock(&self) -> Result<bool> {
        let mut locked = lock_state(&self.state.0);
        if *locked {
            return Ok(false);
        }
        *locked = true;
        Ok(true)
    }

    fn lock(&self) -> Result<()> {
        let (mutex, condvar) = &*self.state;
        let mut locked = condvar
            .wait_while(lock_state(mutex), |locked| *locked)
            .unwrap_or_else(PoisonError::into_inner);
        *locked = true;
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        *lock_state(&self.state.0) = false;
        self.state.1.notify_one();
        Ok(())
    }
}

/// Counting signal backed by a mutex and condvar.
#[derive(Debug, Clone, Default)]
pub struct LocalSignal {
    state: Arc<(Mutex<u32>, Condvar)>,
}

impl LocalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of units.
    pub fn count(&self) -> u32 {
        *lock_state(&self.state.0)
    }
}

impl InterprocessSignal for LocalSignal {
    fn try_wait(&self) -> Result<bool> {
        let mut count = lock_state(&self.state.0);
        if *count == 0 {
            return Ok(false);
        }
        *count -= 1;
        Ok(true)
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let (mutex, condvar) = &*self.state;
        let mut count = match timeout {
            None => condvar
                .wait_while(lock_state(mutex), |count| *count == 0)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (count, result) = condvar
                    .wait_timeout_while(lock_state(mutex), timeout, |count| *count == 0)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && *count == 0 {
                    return Ok(false);
                }
                count
            }
        };
        *count -= 1;
        Ok(true)
    }

    fn post(&self) -> Result<()> {
        *lock_state(&self.state.0) += 1;
        self.state.1.notify_one();
        Ok(())
    }
}
