//! Thread-safe hand-off of commands into the client reactor.
//!
//! Producers push under a mutex and then wake the reactor through a
//! [`Notify`]. `Notify` stores at most one permit, so any number of posts
//! before the reactor wakes coalesce into a single wake-up; this is safe
//! because the reactor always takes the whole queue at once.

use bytes::Bytes;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Work item for the client reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close any live connection and terminate the reactor.
    Stop,
    /// Write the payload to the live connection, if there is one.
    Message(Bytes),
}

impl Command {
    pub fn message(payload: impl Into<Bytes>) -> Self {
        Command::Message(payload.into())
    }
}

/// FIFO of pending commands plus the reactor's wake signal.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<Vec<Command>>,
    wake: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<Command>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a command and wake the reactor. Callable from any thread.
    pub fn post(&self, command: Command) {
        self.pending().push(command);
        self.wake.notify_one();
    }

    /// Take every pending command, in post order.
    pub fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.pending())
    }

    /// Future that completes once at least one post happened since the last
    /// wake was observed.
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }
}
