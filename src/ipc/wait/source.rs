/*!
 * Descriptor Sources
 * Raw descriptors (a child's stdout, a socket) as waitables
 */

use super::multiplexer::{ReadinessFd, Waitable};
use super::selector::probe_readable;
use super::signal::ReadySignal;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Arc;
use tracing::warn;

/// Waitable wrapper around an owned descriptor
///
/// Readable whenever poll(2) reports any event on the descriptor, hang-up
/// included. Reading is left to the owner through [`FdSource::as_fd`].
pub struct FdSource {
    fd: Arc<OwnedFd>,
    signal: Arc<ReadySignal>,
}

impl FdSource {
    pub fn new(fd: impl Into<OwnedFd>) -> Self {
        Self {
            fd: Arc::new(fd.into()),
            signal: Arc::new(ReadySignal::new()),
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Give the descriptor back; fails if a wait still holds it
    pub fn into_inner(self) -> Result<OwnedFd, Self> {
        let signal = self.signal;
        Arc::try_unwrap(self.fd).map_err(|fd| Self { fd, signal })
    }
}

impl AsFd for FdSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Waitable for FdSource {
    fn is_ready_for_read(&self) -> bool {
        match probe_readable(self.fd.as_fd()) {
            Ok(ready) => ready,
            Err(e) => {
                // Report ready so the caller's read surfaces the error
                warn!(fd = self.raw_fd(), error = %e, "readiness probe failed");
                true
            }
        }
    }

    fn ready_signal(&self) -> &Arc<ReadySignal> {
        &self.signal
    }

    fn readiness_fd(&self) -> Option<ReadinessFd> {
        Some(self.fd.clone() as ReadinessFd)
    }
}

impl fmt::Debug for FdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FdSource").field("fd", &self.raw_fd()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_fd_source_tracks_readability() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let source = FdSource::new(a);
        assert!(!source.is_ready_for_read());

        b.write_all(b"ping").unwrap();
        assert!(source.is_ready_for_read());
        assert!(source.readiness_fd().is_some());
    }

    #[test]
    fn test_into_inner_returns_descriptor() {
        let (a, _b) = UnixStream::pair().unwrap();
        let raw = a.as_raw_fd();
        let source = FdSource::new(a);
        let fd = source.into_inner().unwrap();
        assert_eq!(fd.as_raw_fd(), raw);
    }
}
