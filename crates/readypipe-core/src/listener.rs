//! Single-instance local listener.
//!
//! Runs on its own thread with a single-threaded tokio runtime. Start-up
//! claims the instance lock, binds the endpoint and only then announces
//! readiness, so a client never sees "ready" without a listener behind it.
//! Each accepted connection gets its own task that forwards inbound chunks to
//! a [`MessageSink`] until the peer hangs up.
//!
//! # Lifecycle
//!
//! ```text
//! Bound -> Listening -> (Accepted -> Reading -> Closed)* -> Stopping -> Stopped
//! ```
//!
//! A stop request, deliverable from any thread through [`StopHandle`], closes
//! the listener and every open connection. Readiness is withdrawn and the
//! lock released on the way out, also when the thread unwinds.

use crate::config::ListenerOptions;
use crate::error::{ReadyPipeError, Result};
use crate::platform::{Endpoint, InstancePaths};
use crate::readiness::{InterprocessLock, InterprocessSignal, ReadinessCoordinator};
use crate::transport::{LocalListener, ServerStream};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Identifies one accepted connection within a listener's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Receives inbound data. There is no response path.
pub trait MessageSink: Send + Sync + 'static {
    fn on_message(&self, peer: PeerId, data: &[u8]);

    fn on_connect(&self, _peer: PeerId) {}

    fn on_disconnect(&self, _peer: PeerId) {}
}

/// Sink that logs every chunk as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl MessageSink for LoggingSink {
    fn on_message(&self, peer: PeerId, data: &[u8]) {
        info!("MESSAGE from {}: {}", peer, String::from_utf8_lossy(data));
    }
}

/// Lifecycle state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Bound,
    Listening,
    Stopping,
    Stopped,
}

/// Cloneable trigger that stops a running listener from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Handle to a running listener. Dropping it stops the listener and waits.
#[derive(Debug)]
pub struct ListenerHandle {
    endpoint: Endpoint,
    stop: StopHandle,
    state: watch::Receiver<ListenerState>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ListenerHandle {
    /// Endpoint the listener is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    /// Wait for the listener to finish, returning how it ended.
    ///
    /// Blocks until someone calls [`StopHandle::stop`].
    pub fn join(mut self) -> Result<()> {
        self.join_thread()
    }

    /// Stop the listener and wait for it.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join()
    }

    fn join_thread(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ReadyPipeError::ThreadPanicked {
                component: "listener",
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.join_thread() {
            warn!("Listener ended with error: {}", e);
        }
    }
}

/// Server side of the readiness handshake.
pub struct ListenerService;

impl ListenerService {
    /// Claim the instance, bind its endpoint and announce readiness.
    ///
    /// Returns once the listener is accepting connections, or with the
    /// start-up error. Readiness is never announced if binding fails.
    pub fn start<L, S, K>(
        paths: InstancePaths,
        coordinator: ReadinessCoordinator<L, S>,
        sink: Arc<K>,
        options: ListenerOptions,
    ) -> Result<ListenerHandle>
    where
        L: InterprocessLock + 'static,
        S: InterprocessSignal + 'static,
        K: MessageSink,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<Endpoint>>();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ListenerState::Bound);

        let instance = Instance {
            runtime,
            paths,
            coordinator,
            sink,
            options,
            stop: stop_rx,
            state: state_tx,
        };
        let thread = std::thread::Builder::new()
            .name("readypipe-listener".to_string())
            .spawn(move || instance.run(init_tx))?;

        match init_rx.recv() {
            Ok(Ok(endpoint)) => Ok(ListenerHandle {
                endpoint,
                stop: StopHandle {
                    tx: Arc::new(stop_tx),
                },
                state: state_rx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            // The thread died before reporting start-up.
            Err(_) => Err(match thread.join() {
                Ok(Err(e)) => e,
                _ => ReadyPipeError::ThreadPanicked {
                    component: "listener",
                },
            }),
        }
    }
}

struct Instance<L, S, K> {
    runtime: tokio::runtime::Runtime,
    paths: InstancePaths,
    coordinator: ReadinessCoordinator<L, S>,
    sink: Arc<K>,
    options: ListenerOptions,
    stop: watch::Receiver<bool>,
    state: watch::Sender<ListenerState>,
}

impl<L, S, K> Instance<L, S, K>
where
    L: InterprocessLock + 'static,
    S: InterprocessSignal + 'static,
    K: MessageSink,
{
    fn run(self, init: std::sync::mpsc::Sender<Result<Endpoint>>) -> Result<()> {
        let mut claim = match self.coordinator.claim_instance(self.options.claim) {
            Ok(claim) => claim,
            Err(e) => {
                let _ = init.send(Err(e));
                return Ok(());
            }
        };

        // The lock is ours, so a leftover socket file cannot belong to a live server.
        let started = self.paths.socket_endpoint(true).and_then(|endpoint| {
            let listener = {
                let _guard = self.runtime.enter();
                LocalListener::bind(&endpoint)?
            };
            self.state.send_replace(ListenerState::Bound);
            info!("Listening on {}", endpoint);
            claim.announce()?;
            Ok(listener)
        });

        let listener = match started {
            Ok(listener) => listener,
            Err(e) => {
                drop(claim);
                let _ = init.send(Err(e));
                return Ok(());
            }
        };

        let endpoint = listener.endpoint().clone();
        self.state.send_replace(ListenerState::Listening);
        let _ = init.send(Ok(endpoint.clone()));

        info!("Server loop running");
        let served = self.runtime.block_on(accept_loop(
            listener,
            self.sink.clone(),
            self.stop.clone(),
            self.options.read_buffer_size(),
        ));
        self.state.send_replace(ListenerState::Stopping);
        info!("Server loop done");

        #[cfg(unix)]
        if let Err(e) = crate::platform::remove_socket_file(endpoint.as_path()) {
            warn!("Failed to remove socket file: {}", e);
        }

        let withdrawn = claim.withdraw();
        drop(claim);
        self.state.send_replace(ListenerState::Stopped);
        info!("Listener stopped");

        served.and(withdrawn)
    }
}

async fn accept_loop<K: MessageSink>(
    mut listener: LocalListener,
    sink: Arc<K>,
    mut stop: watch::Receiver<bool>,
    buffer_size: usize,
) -> Result<()> {
    let conn_stop = stop.clone();
    let mut connections = JoinSet::new();
    let mut next_peer = 0u64;

    let result = loop {
        tokio::select! {
            _ = stop.wait_for(|stop| *stop) => {
                info!("Listener shutting down");
                break Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    next_peer += 1;
                    let peer = PeerId(next_peer);
                    info!("Incoming connection ({})", peer);
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        sink.clone(),
                        conn_stop.clone(),
                        buffer_size,
                    ));
                }
                Err(e) => {
                    error!("Listener error: {}", e);
                    break Err(ReadyPipeError::transport(listener.endpoint().as_str(), e));
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!("Connection task failed: {}", e);
                }
            }
        }
    };

    // Close the listening handle first, then every open connection. On a
    // stop request the connections see the same signal and finish on their own.
    drop(listener);
    if result.is_err() {
        connections.abort_all();
    }
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                warn!("Connection task failed: {}", e);
            }
        }
    }
    result
}

async fn handle_connection<K: MessageSink>(
    mut stream: ServerStream,
    peer: PeerId,
    sink: Arc<K>,
    mut stop: watch::Receiver<bool>,
    buffer_size: usize,
) {
    sink.on_connect(peer);
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Client disconnected ({})", peer);
                    break;
                }
                Ok(n) => {
                    debug!("Received {} byte(s) from {}", n, peer);
                    sink.on_message(peer, &buf[..n]);
                }
                Err(e) => {
                    warn!("Client connection error ({}): {}", peer, e);
                    break;
                }
            },
            _ = stop.wait_for(|stop| *stop) => {
                debug!("Closing connection {}", peer);
                break;
            }
        }
    }

    sink.on_disconnect(peer);
}
