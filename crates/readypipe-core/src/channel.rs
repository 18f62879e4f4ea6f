//! Reconnecting client channel.
//!
//! A dedicated reactor thread drives a single-threaded tokio runtime through
//! this cycle until a [`Command::Stop`] arrives:
//!
//! ```text
//! Disconnected --ready--> Connecting --ok--> Connected --end/error--> CoolingDown
//!      ^                      |                                          |
//!      |                      +--error---------------------------------->|
//!      +-------------------------- after cooldown -----------------------+
//! ```
//!
//! Producers hand commands over through a [`CommandQueue`]. The queue is
//! drained on every wake in every state. Messages only reach the wire while
//! Connected; anything posted in another state is dropped, not carried over to
//! the next connection.
//!
//! # Limitations
//!
//! The readiness wait blocks the reactor thread without a timeout. A Stop
//! posted during that wait is only honored once a server announces itself,
//! so [`ReconnectingChannel::shutdown`] can block until then. Use
//! [`ReconnectingChannel::shutdown_timeout`] to give up waiting and detach the
//! reactor instead.
//!
//! Writes are awaited inside the reactor, so a peer that stops reading holds
//! up reads and later commands, including Stop, for up to
//! [`ChannelOptions::write_timeout`] per message. A write that times out ends
//! the connection like any other write error.

use crate::config::{ChannelConfig, ChannelOptions};
use crate::error::{ReadyPipeError, Result};
use crate::platform::Endpoint;
use crate::queue::{Command, CommandQueue};
use crate::readiness::ReadinessWait;
use crate::transport::Transport;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`ReconnectingChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    CoolingDown,
    Stopped,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::CoolingDown => "cooling down",
            ChannelState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client end of the local channel. Dropping it stops the reactor.
#[derive(Debug)]
pub struct ReconnectingChannel {
    queue: Arc<CommandQueue>,
    state: watch::Receiver<ChannelState>,
    reactor: Option<JoinHandle<Result<()>>>,
}

impl ReconnectingChannel {
    /// Spawn the reactor thread and start the connect cycle.
    pub fn start<T, R>(
        transport: T,
        readiness: R,
        endpoint: Endpoint,
        options: ChannelOptions,
    ) -> Result<Self>
    where
        T: Transport,
        R: ReadinessWait,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let queue = Arc::new(CommandQueue::new());
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);

        let reactor = Reactor {
            transport,
            readiness,
            endpoint,
            options,
            queue: queue.clone(),
            state: state_tx,
        };

        let handle = std::thread::Builder::new()
            .name("readypipe-client".to_string())
            .spawn(move || runtime.block_on(reactor.run()))?;

        Ok(Self {
            queue,
            state: state_rx,
            reactor: Some(handle),
        })
    }

    /// Hand a command to the reactor. Never blocks beyond the queue lock.
    pub fn post_command(&self, command: Command) {
        self.queue.post(command);
    }

    /// Queue a message for the live connection, if any.
    pub fn send(&self, payload: impl Into<Bytes>) {
        self.post_command(Command::Message(payload.into()));
    }

    /// Current state, for diagnostics. Not a delivery guarantee.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Stop the reactor and wait for it, returning how it ended.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    /// Stop the reactor, waiting at most `timeout` for it to finish.
    ///
    /// Returns `Ok(false)` if the reactor did not finish in time, typically
    /// because it is still blocked in the readiness wait. Its thread is then
    /// detached and ends on its own once the wait returns, or with the process.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Result<bool> {
        let Some(handle) = self.reactor.take() else {
            return Ok(true);
        };
        self.queue.post(Command::Stop);

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                warn!("Client reactor still busy ({}), detaching it", self.state());
                return Ok(false);
            }
            std::thread::sleep(ChannelConfig::SHUTDOWN_POLL_INTERVAL.min(deadline - now));
        }
        handle
            .join()
            .map_err(|_| ReadyPipeError::ThreadPanicked {
                component: "client reactor",
            })?
            .map(|()| true)
    }

    fn stop_and_join(&mut self) -> Result<()> {
        let Some(handle) = self.reactor.take() else {
            return Ok(());
        };
        self.queue.post(Command::Stop);
        handle.join().map_err(|_| ReadyPipeError::ThreadPanicked {
            component: "client reactor",
        })?
    }
}

impl Drop for ReconnectingChannel {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!("Client reactor ended with error: {}", e);
        }
    }
}

/// Whether the reactor keeps cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

enum Connect<S> {
    Established(S),
    Failed(ReadyPipeError),
    Stopped,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    stop: bool,
    write_failed: bool,
    written: usize,
    discarded: usize,
}

/// Writer type used when a batch is applied with no connection.
type NoConnection = tokio::io::Sink;

struct Reactor<T, R> {
    transport: T,
    readiness: R,
    endpoint: Endpoint,
    options: ChannelOptions,
    queue: Arc<CommandQueue>,
    state: watch::Sender<ChannelState>,
}

impl<T: Transport, R: ReadinessWait> Reactor<T, R> {
    async fn run(self) -> Result<()> {
        let result = self.cycle().await;
        if let Err(e) = &result {
            error!("Client reactor failed: {}", e);
        }
        self.set_state(ChannelState::Stopped);
        info!("Client reactor stopped");
        result
    }

    async fn cycle(&self) -> Result<()> {
        loop {
            self.set_state(ChannelState::Disconnected);
            info!("Waiting for the server to become available...");
            self.readiness.wait_ready()?;

            // Anything posted while blocked in the wait predates this connection.
            if self.apply_batch(None::<&mut NoConnection>).await.stop {
                return Ok(());
            }

            self.set_state(ChannelState::Connecting);
            info!("Connecting to {}...", self.endpoint);
            match self.connect().await {
                Connect::Stopped => return Ok(()),
                Connect::Failed(e) if e.is_recoverable() => warn!("Client error: {}", e),
                Connect::Failed(e) => return Err(e),
                Connect::Established(stream) => {
                    self.set_state(ChannelState::Connected);
                    info!("Connected");
                    if self.serve(stream).await == Flow::Stop {
                        return Ok(());
                    }
                    info!("Disconnected");
                }
            }

            self.set_state(ChannelState::CoolingDown);
            info!("Cooldown for {:?}...", self.options.cooldown);
            if self.cool_down().await == Flow::Stop {
                return Ok(());
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Client state: {} -> {}", previous, state);
        }
    }

    async fn connect(&self) -> Connect<T::Stream> {
        let connect = self.transport.connect(&self.endpoint);
        tokio::pin!(connect);
        loop {
            tokio::select! {
                biased;
                _ = self.queue.notified() => {
                    if self.apply_batch(None::<&mut NoConnection>).await.stop {
                        return Connect::Stopped;
                    }
                }
                result = &mut connect => {
                    return match result {
                        Ok(stream) => Connect::Established(stream),
                        Err(e) => Connect::Failed(e),
                    };
                }
            }
        }
    }

    async fn serve(&self, stream: T::Stream) -> Flow {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = vec![0u8; self.options.read_buffer_size.max(1)];

        loop {
            tokio::select! {
                biased;
                _ = self.queue.notified() => {
                    let outcome = self.apply_batch(Some(&mut writer)).await;
                    if outcome.stop {
                        if let Err(e) = writer.shutdown().await {
                            debug!("Error while closing connection: {}", e);
                        }
                        info!("Connection closed");
                        return Flow::Stop;
                    }
                    if outcome.write_failed {
                        return Flow::Continue;
                    }
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("The server has closed the connection");
                        return Flow::Continue;
                    }
                    Ok(n) => debug!("Received {} byte(s) from the server", n),
                    Err(e) => {
                        warn!("Client read error: {}", e);
                        return Flow::Continue;
                    }
                },
            }
        }
    }

    async fn cool_down(&self) -> Flow {
        let sleep = tokio::time::sleep(self.options.cooldown);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.queue.notified() => {
                    if self.apply_batch(None::<&mut NoConnection>).await.stop {
                        return Flow::Stop;
                    }
                }
                _ = &mut sleep => return Flow::Continue,
            }
        }
    }

    /// Drain the queue and apply every command in post order.
    ///
    /// Without a connection, or after a failed write, messages are dropped.
    /// A Stop ends the batch; commands behind it are discarded.
    async fn apply_batch<W>(&self, mut connection: Option<&mut W>) -> BatchOutcome
    where
        W: AsyncWrite + Unpin,
    {
        let mut outcome = BatchOutcome::default();
        for command in self.queue.drain() {
            match command {
                Command::Stop => {
                    outcome.stop = true;
                    break;
                }
                Command::Message(payload) => match connection.as_deref_mut() {
                    Some(writer) if !outcome.write_failed => {
                        let write = writer.write_all(&payload);
                        match tokio::time::timeout(self.options.write_timeout, write).await {
                            Ok(Ok(())) => outcome.written += 1,
                            Ok(Err(e)) => {
                                warn!("Client write error: {}", e);
                                outcome.write_failed = true;
                            }
                            Err(_) => {
                                warn!(
                                    "Client write timed out after {:?}",
                                    self.options.write_timeout
                                );
                                outcome.write_failed = true;
                            }
                        }
                    }
                    _ => outcome.discarded += 1,
                },
            }
        }

        if outcome.written > 0 {
            debug!("Wrote {} message(s)", outcome.written);
        }
        if outcome.discarded > 0 {
            debug!(
                "Discarded {} message(s) while {}",
                outcome.discarded,
                *self.state.borrow()
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::{InterprocessSignal, LocalLock, LocalSignal, ReadinessCoordinator};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tokio::io::DuplexStream;
    use tokio::sync::{mpsc, Notify};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// In-memory transport: every connect hands the server end to the test.
    struct DuplexTransport {
        peers: mpsc::UnboundedSender<DuplexStream>,
        attempts: Arc<AtomicUsize>,
        fail_first: usize,
    }

    impl DuplexTransport {
        fn new(fail_first: usize) -> (Self, mpsc::UnboundedReceiver<DuplexStream>, Arc<AtomicUsize>) {
            let (peers, rx) = mpsc::unbounded_channel();
            let attempts = Arc::new(AtomicUsize::new(0));
            let transport = Self {
                peers,
                attempts: attempts.clone(),
                fail_first,
            };
            (transport, rx, attempts)
        }
    }

    #[async_trait]
    impl Transport for DuplexTransport {
        type Stream = DuplexStream;

        async fn connect(&self, endpoint: &Endpoint) -> Result<DuplexStream> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(ReadyPipeError::transport(
                    endpoint.as_str(),
                    std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                ));
            }
            let (client, server) = tokio::io::duplex(1024);
            let _ = self.peers.send(server);
            Ok(client)
        }
    }

    /// Transport whose connect stays pending until the gate is opened.
    struct GatedTransport {
        gate: Arc<Notify>,
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    impl GatedTransport {
        fn new() -> (Self, Arc<Notify>, mpsc::UnboundedReceiver<DuplexStream>) {
            let gate = Arc::new(Notify::new());
            let (peers, rx) = mpsc::unbounded_channel();
            let transport = Self {
                gate: gate.clone(),
                peers,
            };
            (transport, gate, rx)
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        type Stream = DuplexStream;

        async fn connect(&self, _endpoint: &Endpoint) -> Result<DuplexStream> {
            self.gate.notified().await;
            let (client, server) = tokio::io::duplex(1024);
            let _ = self.peers.send(server);
            Ok(client)
        }
    }

    /// Transport that fails with a local, non-transport error.
    struct MisconfiguredTransport;

    #[async_trait]
    impl Transport for MisconfiguredTransport {
        type Stream = DuplexStream;

        async fn connect(&self, _endpoint: &Endpoint) -> Result<DuplexStream> {
            Err(ReadyPipeError::Validation {
                field: "endpoint".to_string(),
                message: "unsupported endpoint".to_string(),
            })
        }
    }

    #[derive(Default, Clone)]
    struct AlwaysReady {
        waits: Arc<AtomicUsize>,
    }

    impl ReadinessWait for AlwaysReady {
        fn wait_ready(&self) -> Result<()> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenReadiness;

    impl ReadinessWait for BrokenReadiness {
        fn wait_ready(&self) -> Result<()> {
            Err(ReadyPipeError::sync(
                "sem_wait",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ))
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("in-memory")
    }

    fn options(cooldown: Duration) -> ChannelOptions {
        ChannelOptions::default().with_cooldown(cooldown)
    }

    async fn wait_for_state(channel: &ReconnectingChannel, state: ChannelState) {
        let mut rx = channel.subscribe_state();
        timeout(WAIT, rx.wait_for(|current| *current == state))
            .await
            .expect("timed out waiting for state")
            .expect("reactor dropped state sender");
    }

    async fn next_peer(peers: &mut mpsc::UnboundedReceiver<DuplexStream>) -> DuplexStream {
        timeout(WAIT, peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }

    async fn read_until_closed(peer: &mut DuplexStream) -> Vec<u8> {
        let mut received = Vec::new();
        timeout(WAIT, peer.read_to_end(&mut received))
            .await
            .expect("timed out reading from client")
            .unwrap();
        received
    }

    #[tokio::test]
    async fn test_commands_arrive_in_order_and_stop_closes_connection() {
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(50)),
        )
        .unwrap();

        let mut peer = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;

        channel.send("a");
        channel.send("b");
        channel.post_command(Command::Stop);

        assert_eq!(read_until_closed(&mut peer).await, b"ab");

        let state = channel.subscribe_state();
        channel.shutdown().unwrap();
        assert_eq!(*state.borrow(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_messages_before_readiness_are_dropped() {
        let signal = LocalSignal::new();
        let readiness = ReadinessCoordinator::new("lossy", LocalLock::new(), signal.clone());
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            readiness,
            endpoint(),
            options(Duration::from_millis(50)),
        )
        .unwrap();

        assert_eq!(channel.state(), ChannelState::Disconnected);
        channel.send("dropped");
        signal.post().unwrap();

        let mut peer = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        channel.send("kept");
        channel.post_command(Command::Stop);

        assert_eq!(read_until_closed(&mut peer).await, b"kept");
        channel.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_connect_errors_cool_down_and_retry() {
        let cooldown = Duration::from_millis(40);
        let readiness = AlwaysReady::default();
        let (transport, mut peers, attempts) = DuplexTransport::new(2);
        let started = Instant::now();
        let channel =
            ReconnectingChannel::start(transport, readiness.clone(), endpoint(), options(cooldown))
                .unwrap();

        let _peer = next_peer(&mut peers).await;

        assert!(started.elapsed() >= cooldown * 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(readiness.waits.load(Ordering::SeqCst), 3);
        channel.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_peer_end_triggers_cooldown_then_reconnect() {
        let cooldown = Duration::from_millis(200);
        let readiness = AlwaysReady::default();
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel =
            ReconnectingChannel::start(transport, readiness.clone(), endpoint(), options(cooldown))
                .unwrap();

        let mut peer = next_peer(&mut peers).await;
        for round in 1..=3 {
            wait_for_state(&channel, ChannelState::Connected).await;
            assert_eq!(readiness.waits.load(Ordering::SeqCst), round);

            let dropped_at = Instant::now();
            drop(peer);
            wait_for_state(&channel, ChannelState::CoolingDown).await;
            peer = next_peer(&mut peers).await;
            assert!(dropped_at.elapsed() >= cooldown);
        }

        drop(peer);
        channel.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_messages_during_cooldown_are_not_replayed() {
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(200)),
        )
        .unwrap();

        let first = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        drop(first);
        wait_for_state(&channel, ChannelState::CoolingDown).await;
        channel.send("lost");

        let mut second = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        channel.send("fresh");
        channel.post_command(Command::Stop);

        assert_eq!(read_until_closed(&mut second).await, b"fresh");
        channel.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_cooldown() {
        let (transport, _peers, _) = DuplexTransport::new(usize::MAX);
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_secs(60)),
        )
        .unwrap();

        wait_for_state(&channel, ChannelState::CoolingDown).await;
        let started = Instant::now();
        channel.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_readiness_failure_stops_reactor_with_error() {
        let (transport, _peers, attempts) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            BrokenReadiness,
            endpoint(),
            options(Duration::from_millis(10)),
        )
        .unwrap();

        wait_for_state(&channel, ChannelState::Stopped).await;
        assert!(matches!(
            channel.shutdown(),
            Err(ReadyPipeError::Sync { operation: "sem_wait", .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_stops_reactor() {
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(50)),
        )
        .unwrap();

        let mut peer = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        drop(channel);

        assert!(read_until_closed(&mut peer).await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_interrupts_pending_connect() {
        let (transport, _gate, mut peers) = GatedTransport::new();
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(50)),
        )
        .unwrap();

        wait_for_state(&channel, ChannelState::Connecting).await;
        channel.send("never");
        let state = channel.subscribe_state();
        let started = Instant::now();
        channel.shutdown().unwrap();

        assert!(started.elapsed() < WAIT);
        assert_eq!(*state.borrow(), ChannelState::Stopped);
        assert!(peers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_while_connecting_are_dropped() {
        let (transport, gate, mut peers) = GatedTransport::new();
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(50)),
        )
        .unwrap();

        wait_for_state(&channel, ChannelState::Connecting).await;
        channel.send("early");
        gate.notify_one();

        let mut peer = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        channel.send("late");
        channel.post_command(Command::Stop);

        assert_eq!(read_until_closed(&mut peer).await, b"late");
        channel.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_peer_write_times_out() {
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_secs(60)).with_write_timeout(Duration::from_millis(50)),
        )
        .unwrap();

        // Kept open but never read, so the duplex buffer fills up.
        let _peer = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        channel.send(vec![0u8; 64 * 1024]);

        wait_for_state(&channel, ChannelState::CoolingDown).await;
        let started = Instant::now();
        channel.shutdown().unwrap();
        assert!(started.elapsed() < WAIT);
    }

    #[tokio::test]
    async fn test_unrecoverable_connect_error_stops_reactor() {
        let channel = ReconnectingChannel::start(
            MisconfiguredTransport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(10)),
        )
        .unwrap();

        wait_for_state(&channel, ChannelState::Stopped).await;
        assert!(matches!(
            channel.shutdown(),
            Err(ReadyPipeError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_timeout_detaches_reactor_blocked_on_readiness() {
        let signal = LocalSignal::new();
        let readiness = ReadinessCoordinator::new("detach", LocalLock::new(), signal.clone());
        let (transport, _peers, attempts) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            readiness,
            endpoint(),
            options(Duration::from_millis(10)),
        )
        .unwrap();

        let started = Instant::now();
        assert!(!channel.shutdown_timeout(Duration::from_millis(50)).unwrap());
        assert!(started.elapsed() < WAIT);

        // Once a server shows up the detached reactor sees the Stop and exits.
        signal.post().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_joins_running_reactor() {
        let (transport, mut peers, _) = DuplexTransport::new(0);
        let channel = ReconnectingChannel::start(
            transport,
            AlwaysReady::default(),
            endpoint(),
            options(Duration::from_millis(50)),
        )
        .unwrap();

        let mut peer = next_peer(&mut peers).await;
        wait_for_state(&channel, ChannelState::Connected).await;
        assert!(channel.shutdown_timeout(WAIT).unwrap());
        assert!(read_until_closed(&mut peer).await.is_empty());
    }
}
