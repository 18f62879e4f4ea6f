//! Host-wide named counting semaphore.
//!
//! # Platform Behavior
//! - **Linux/macOS**: POSIX named semaphore (`sem_open`)
//! - **Windows**: named Win32 semaphore (`CreateSemaphoreW`)
//!
//! Neither platform has a portable timed wait (macOS lacks `sem_timedwait`),
//! so bounded waits poll `try_wait` at [`ReadinessConfig::WAIT_POLL_INTERVAL`].
//! The readiness protocol itself always waits without a timeout.

// This module owns the semaphore FFI boundary.
#![allow(unsafe_code)]

use crate::config::ReadinessConfig;
use crate::error::{ReadyPipeError, Result};
use crate::readiness::InterprocessSignal;
use std::time::{Duration, Instant};

fn poll_until<F>(timeout: Duration, mut try_wait: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if try_wait()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        std::thread::sleep(ReadinessConfig::WAIT_POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use nix::errno::Errno;
    use std::ffi::CString;

    /// POSIX named semaphore handle.
    #[derive(Debug)]
    pub struct NamedSemaphore {
        sem: *mut libc::sem_t,
        name: String,
    }

    // SAFETY: POSIX semaphores are designed for concurrent use from any
    // thread; the handle is only closed in `Drop`.
    unsafe impl Send for NamedSemaphore {}
    // SAFETY: see `Send`; every operation goes through thread-safe sem_* calls.
    unsafe impl Sync for NamedSemaphore {}

    fn c_name(name: &str) -> Result<CString> {
        CString::new(name).map_err(|_| ReadyPipeError::Validation {
            field: "semaphore_name".to_string(),
            message: format!("Semaphore name {:?} contains a NUL byte", name),
        })
    }

    impl NamedSemaphore {
        /// Open the semaphore `name`, creating it with a count of zero.
        pub fn open(name: &str) -> Result<Self> {
            let c_name = c_name(name)?;
            // SAFETY: `c_name` is a valid NUL-terminated string; the variadic
            // mode and value arguments are passed as `c_uint` as required for
            // C default argument promotion.
            let sem = unsafe {
                libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT,
                    0o600 as libc::c_uint,
                    0 as libc::c_uint,
                )
            };
            if sem == libc::SEM_FAILED {
                return Err(ReadyPipeError::sync(
                    "sem_open",
                    std::io::Error::last_os_error(),
                ));
            }
            Ok(Self {
                sem,
                name: name.to_string(),
            })
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        /// Remove the name from the system. Open handles stay valid.
        pub fn unlink(name: &str) -> Result<()> {
            let c_name = c_name(name)?;
            // SAFETY: `c_name` is a valid NUL-terminated string.
            if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::ENOENT => Ok(()),
                errno => Err(ReadyPipeError::sync("sem_unlink", errno.into())),
            }
        }
    }

    impl InterprocessSignal for NamedSemaphore {
        fn try_wait(&self) -> Result<bool> {
            loop {
                // SAFETY: `self.sem` came from a successful sem_open and is
                // not closed before drop.
                if unsafe { libc::sem_trywait(self.sem) } == 0 {
                    return Ok(true);
                }
                match Errno::last() {
                    Errno::EAGAIN => return Ok(false),
                    Errno::EINTR => continue,
                    errno => return Err(ReadyPipeError::sync("sem_trywait", errno.into())),
                }
            }
        }

        fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
            if let Some(timeout) = timeout {
                return poll_until(timeout, || self.try_wait());
            }
            loop {
                // SAFETY: see `try_wait`.
                if unsafe { libc::sem_wait(self.sem) } == 0 {
                    return Ok(true);
                }
                match Errno::last() {
                    Errno::EINTR => continue,
                    errno => return Err(ReadyPipeError::sync("sem_wait", errno.into())),
                }
            }
        }

        fn post(&self) -> Result<()> {
            // SAFETY: see `try_wait`.
            if unsafe { libc::sem_post(self.sem) } == 0 {
                Ok(())
            } else {
                Err(ReadyPipeError::sync("sem_post", std::io::Error::last_os_error()))
            }
        }
    }

    impl Drop for NamedSemaphore {
        fn drop(&mut self) {
            // SAFETY: the handle is valid and no other reference outlives `self`.
            unsafe {
                libc::sem_close(self.sem);
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
    use windows_sys::Win32::System::Threading::{
        CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE,
    };

    /// Win32 named semaphore handle.
    #[derive(Debug)]
    pub struct NamedSemaphore {
        handle: HANDLE,
        name: String,
    }

    // SAFETY: Win32 semaphore handles may be used from any thread.
    unsafe impl Send for NamedSemaphore {}
    // SAFETY: see `Send`.
    unsafe impl Sync for NamedSemaphore {}

    impl NamedSemaphore {
        /// Open the semaphore `name`, creating it with a count of zero.
        pub fn open(name: &str) -> Result<Self> {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            // SAFETY: `wide` is NUL-terminated and outlives the call; null
            // security attributes select the defaults.
            let handle = unsafe { CreateSemaphoreW(std::ptr::null(), 0, i32::MAX, wide.as_ptr()) };
            if handle.is_null() {
                return Err(ReadyPipeError::sync(
                    "CreateSemaphoreW",
                    std::io::Error::last_os_error(),
                ));
            }
            Ok(Self {
                handle,
                name: name.to_string(),
            })
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        /// Named kernel objects vanish with their last handle; nothing to do.
        pub fn unlink(_name: &str) -> Result<()> {
            Ok(())
        }

        fn wait_ms(&self, millis: u32, operation: &'static str) -> Result<bool> {
            // SAFETY: `self.handle` is a valid semaphore handle until drop.
            match unsafe { WaitForSingleObject(self.handle, millis) } {
                WAIT_OBJECT_0 => Ok(true),
                WAIT_TIMEOUT => Ok(false),
                _ => Err(ReadyPipeError::sync(
                    operation,
                    std::io::Error::last_os_error(),
                )),
            }
        }
    }

    impl InterprocessSignal for NamedSemaphore {
        fn try_wait(&self) -> Result<bool> {
            self.wait_ms(0, "WaitForSingleObject")
        }

        fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
            match timeout {
                None => self.wait_ms(INFINITE, "WaitForSingleObject"),
                Some(timeout) => poll_until(timeout, || self.try_wait()),
            }
        }

        fn post(&self) -> Result<()> {
            // SAFETY: valid handle; the previous count is not requested.
            if unsafe { ReleaseSemaphore(self.handle, 1, std::ptr::null_mut()) } != 0 {
                Ok(())
            } else {
                Err(ReadyPipeError::sync(
                    "ReleaseSemaphore",
                    std::io::Error::last_os_error(),
                ))
            }
        }
    }

    impl Drop for NamedSemaphore {
        fn drop(&mut self) {
            // SAFETY: the handle is valid and owned by `self`.
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

pub use imp::NamedSemaphore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn unique_name() -> String {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        #[cfg(windows)]
        {
            format!("Local\\rp-test-{}-{}", std::process::id(), n)
        }
        #[cfg(not(windows))]
        {
            format!("/rpt{}-{}", std::process::id(), n)
        }
    }

    #[test]
    fn test_post_and_try_wait() {
        let name = unique_name();
        let sem = NamedSemaphore::open(&name).unwrap();

        assert!(!sem.try_wait().unwrap());
        sem.post().unwrap();
        sem.post().unwrap();
        assert!(sem.try_wait().unwrap());
        assert!(sem.try_wait().unwrap());
        assert!(!sem.try_wait().unwrap());

        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_handles_with_same_name_share_count() {
        let name = unique_name();
        let server = NamedSemaphore::open(&name).unwrap();
        let client = NamedSemaphore::open(&name).unwrap();

        server.post().unwrap();
        assert!(client.wait(Some(Duration::from_secs(1))).unwrap());
        assert!(!server.try_wait().unwrap());

        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let name = unique_name();
        let sem = NamedSemaphore::open(&name).unwrap();

        let started = Instant::now();
        assert!(!sem.wait(Some(Duration::from_millis(30))).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(30));

        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_unlink_missing_name_is_ok() {
        assert!(NamedSemaphore::unlink(&unique_name()).is_ok());
    }
}
