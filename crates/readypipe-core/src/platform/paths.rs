//! Platform-specific names for the shared instance resources.
//!
//! Every resource two processes agree on is derived from one instance name:
//! - the lock file (single-instance marker)
//! - the counting semaphore (readiness announcement)
//! - the local socket endpoint

use crate::config::{AppConfig, ReadinessConfig};
use crate::error::{ReadyPipeError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of an OS-local stream endpoint.
///
/// # Platform Behavior
/// - **Unix**: filesystem path of a Unix domain socket
/// - **Windows**: `\\.\pipe\readypipe-<instance>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.name)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resource names shared by the server and client of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    instance: String,
    base_dir: PathBuf,
}

impl InstancePaths {
    /// Resolve names for `instance` under the default runtime directory.
    pub fn new(instance: impl Into<String>) -> Result<Self> {
        Self::with_base_dir(instance, default_base_dir())
    }

    /// Resolve names for `instance` under an explicit base directory.
    pub fn with_base_dir(instance: impl Into<String>, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let instance = instance.into();
        validate_instance_name(&instance)?;
        Ok(Self {
            instance,
            base_dir: base_dir.into(),
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path to the lock file, creating its directory if necessary.
    pub fn lock_file(&self) -> Result<PathBuf> {
        self.ensure_base_dir()?;
        Ok(self
            .base_dir
            .join(format!("{}{}", self.instance, AppConfig::LOCK_FILE_SUFFIX)))
    }

    /// Name of the counting semaphore used for readiness announcements.
    pub fn semaphore_name(&self) -> String {
        #[cfg(windows)]
        {
            format!("{}{}", AppConfig::WINDOWS_SEMAPHORE_PREFIX, self.instance)
        }
        #[cfg(not(windows))]
        {
            format!("{}{}", AppConfig::UNIX_SEMAPHORE_PREFIX, self.instance)
        }
    }

    /// Endpoint of the local socket.
    ///
    /// With `delete_stale` the socket file left behind by a previous server is
    /// removed first. Only do that while holding the single-instance lock,
    /// since nobody else can be listening on it then. The flag has no effect
    /// on Windows, where pipes do not live in the filesystem.
    pub fn socket_endpoint(&self, delete_stale: bool) -> Result<Endpoint> {
        #[cfg(windows)]
        {
            let _ = delete_stale;
            Ok(Endpoint::new(format!(
                "{}{}",
                AppConfig::WINDOWS_PIPE_PREFIX,
                self.instance
            )))
        }

        #[cfg(not(windows))]
        {
            self.ensure_base_dir()?;
            let path = self
                .base_dir
                .join(format!("{}{}", self.instance, AppConfig::SOCKET_FILE_SUFFIX));
            if delete_stale {
                remove_socket_file(&path)?;
            }
            Ok(Endpoint::new(path.to_string_lossy().into_owned()))
        }
    }

    fn ensure_base_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| ReadyPipeError::io_with_path(e, &self.base_dir))
    }
}

/// Remove a socket file if it exists.
pub fn remove_socket_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale socket file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ReadyPipeError::io_with_path(e, path)),
    }
}

/// Default directory for lock and socket files.
///
/// # Platform Behavior
/// - **Linux**: `$XDG_RUNTIME_DIR/readypipe`, falling back to the temp dir
/// - **macOS/Windows**: `<temp dir>/readypipe`
pub fn default_base_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(AppConfig::RUNTIME_DIR_NAME)
}

fn validate_instance_name(instance: &str) -> Result<()> {
    if instance.is_empty() {
        return Err(ReadyPipeError::Validation {
            field: "instance".to_string(),
            message: "Instance name must not be empty".to_string(),
        });
    }
    if instance.len() > ReadinessConfig::MAX_INSTANCE_NAME_LEN {
        return Err(ReadyPipeError::Validation {
            field: "instance".to_string(),
            message: format!(
                "Instance name is {} characters, maximum is {}",
                instance.len(),
                ReadinessConfig::MAX_INSTANCE_NAME_LEN
            ),
        });
    }
    if !instance
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReadyPipeError::Validation {
            field: "instance".to_string(),
            message: format!("Instance name {:?} may only contain [A-Za-z0-9_-]", instance),
        });
    }
    Ok(())
}
