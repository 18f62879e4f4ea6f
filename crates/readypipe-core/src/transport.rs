//! OS-local byte-stream transport.
//!
//! Unix domain sockets on Unix and named pipes on Windows, both through
//! `tokio::net`. The client state machine only depends on the [`Transport`]
//! trait, so tests can swap in an in-memory stream.

use crate::error::{ReadyPipeError, Result};
use crate::platform::Endpoint;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Connects to a local endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream>;
}

/// Default transport over the platform's local sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSocketTransport;

#[cfg(unix)]
#[async_trait]
impl Transport for LocalSocketTransport {
    type Stream = tokio::net::UnixStream;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream> {
        let stream = tokio::net::UnixStream::connect(endpoint.as_path())
            .await
            .map_err(|e| ReadyPipeError::transport(endpoint.as_str(), e))?;
        debug!("Connected to {}", endpoint);
        Ok(stream)
    }
}

#[cfg(windows)]
#[async_trait]
impl Transport for LocalSocketTransport {
    type Stream = tokio::net::windows::named_pipe::NamedPipeClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream> {
        use tokio::net::windows::named_pipe::ClientOptions;
        use windows_sys::Win32::Foundation::ERROR_PIPE_BUSY;

        const BUSY_RETRY: std::time::Duration = std::time::Duration::from_millis(50);
        const BUSY_ATTEMPTS: u32 = 20;

        let mut attempt = 0;
        loop {
            match ClientOptions::new().open(endpoint.as_str()) {
                Ok(client) => {
                    debug!("Connected to {}", endpoint);
                    return Ok(client);
                }
                // Every server instance is taken; the listener creates the
                // next one right after accepting.
                Err(e)
                    if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32)
                        && attempt < BUSY_ATTEMPTS =>
                {
                    attempt += 1;
                    tokio::time::sleep(BUSY_RETRY).await;
                }
                Err(e) => return Err(ReadyPipeError::transport(endpoint.as_str(), e)),
            }
        }
    }
}

/// Server side of the local transport.
#[derive(Debug)]
pub struct LocalListener {
    endpoint: Endpoint,
    #[cfg(unix)]
    inner: tokio::net::UnixListener,
    #[cfg(windows)]
    next: tokio::net::windows::named_pipe::NamedPipeServer,
}

#[cfg(unix)]
pub type ServerStream = tokio::net::UnixStream;
#[cfg(windows)]
pub type ServerStream = tokio::net::windows::named_pipe::NamedPipeServer;

impl LocalListener {
    /// Bind the endpoint. Must run inside a tokio runtime.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let bind_error = |source| ReadyPipeError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        #[cfg(unix)]
        {
            let inner = tokio::net::UnixListener::bind(endpoint.as_path()).map_err(bind_error)?;
            Ok(Self {
                endpoint: endpoint.clone(),
                inner,
            })
        }

        #[cfg(windows)]
        {
            use tokio::net::windows::named_pipe::ServerOptions;

            let next = ServerOptions::new()
                .first_pipe_instance(true)
                .create(endpoint.as_str())
                .map_err(bind_error)?;
            Ok(Self {
                endpoint: endpoint.clone(),
                next,
            })
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Wait for the next inbound connection.
    pub async fn accept(&mut self) -> std::io::Result<ServerStream> {
        #[cfg(unix)]
        {
            let (stream, _addr) = self.inner.accept().await?;
            Ok(stream)
        }

        #[cfg(windows)]
        {
            use tokio::net::windows::named_pipe::ServerOptions;

            self.next.connect().await?;
            let fresh = ServerOptions::new().create(self.endpoint.as_str())?;
            Ok(std::mem::replace(&mut self.next, fresh))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_exchange_bytes() {
        let tmp = TempDir::new().unwrap();
        let endpoint = Endpoint::new(tmp.path().join("t.sock").to_string_lossy());
        let mut listener = LocalListener::bind(&endpoint).unwrap();

        let client = tokio::spawn({
            let endpoint = endpoint.clone();
            async move {
                let mut stream = LocalSocketTransport.connect(&endpoint).await.unwrap();
                stream.write_all(b"ping").await.unwrap();
            }
        });

        let mut server = listener.accept().await.unwrap();
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        client.await.unwrap();

        assert_eq!(received, b"ping");
    }

    #[tokio::test]
    async fn test_connect_without_listener_is_transport_error() {
        let tmp = TempDir::new().unwrap();
        let endpoint = Endpoint::new(tmp.path().join("absent.sock").to_string_lossy());

        match LocalSocketTransport.connect(&endpoint).await {
            Err(err) => assert!(err.is_recoverable()),
            Ok(_) => panic!("connect should fail without a listener"),
        }
    }

    #[tokio::test]
    async fn test_bind_twice_is_bind_error() {
        let tmp = TempDir::new().unwrap();
        let endpoint = Endpoint::new(tmp.path().join("t.sock").to_string_lossy());
        let _first = LocalListener::bind(&endpoint).unwrap();

        assert!(matches!(
            LocalListener::bind(&endpoint),
            Err(ReadyPipeError::Bind { .. })
        ));
    }
}
