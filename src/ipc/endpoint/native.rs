/*!
 * Native Endpoints
 * OS descriptors over socketpair(2)
 *
 * Duplex pipes use both directions of the pair. Simplex pipes half-close
 * it with shutdown(2), so the read end never writes and the write end
 * never reads. Writes go through send(2) with `MSG_NOSIGNAL`: a vanished
 * reader surfaces as `BrokenPipe` rather than SIGPIPE, whatever the
 * host's signal disposition.
 */

use super::traits::Endpoint;
use crate::ipc::types::{Backend, IpcError, IpcResult};
use crate::ipc::wait::selector::probe_readable;
use crate::ipc::wait::{ReadinessFd, ReadySignal};
use nix::errno::Errno;
use nix::sys::socket::{send, MsgFlags};
use parking_lot::Mutex;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use tracing::debug;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

/// Socket-backed endpoint
///
/// The socket sits behind an `Arc` so a concurrent `wait` keeps it
/// open (and its number unreused) after `close` drops the endpoint's copy.
pub struct NativeEndpoint {
    stream: Mutex<Option<Arc<UnixStream>>>,
    signal: Arc<ReadySignal>,
}

impl NativeEndpoint {
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream: Mutex::new(Some(Arc::new(stream))),
            signal: Arc::new(ReadySignal::new()),
        }
    }

    /// Connected duplex pair
    pub fn socket_pair() -> IpcResult<(Self, Self)> {
        let (a, b) = UnixStream::pair().map_err(IpcError::from_io)?;
        debug!(a = a.as_raw_fd(), b = b.as_raw_fd(), "created socket pair");
        Ok((Self::from_stream(a), Self::from_stream(b)))
    }

    /// One-way pair, returned as (read end, write end)
    pub fn pipe_pair() -> IpcResult<(Self, Self)> {
        let (rx, tx) = UnixStream::pair().map_err(IpcError::from_io)?;
        rx.shutdown(Shutdown::Write).map_err(IpcError::from_io)?;
        tx.shutdown(Shutdown::Read).map_err(IpcError::from_io)?;
        debug!(rx = rx.as_raw_fd(), tx = tx.as_raw_fd(), "created one-way socket pair");
        Ok((Self::from_stream(rx), Self::from_stream(tx)))
    }

    fn stream(&self) -> IpcResult<Arc<UnixStream>> {
        self.stream.lock().clone().ok_or(IpcError::Closed)
    }
}

impl Endpoint for NativeEndpoint {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    fn write_all(&self, buf: &[u8]) -> IpcResult<()> {
        let stream = self.stream()?;
        let mut remaining = buf;
        while !remaining.is_empty() {
            match send(stream.as_raw_fd(), remaining, SEND_FLAGS) {
                Ok(0) => return Err(IpcError::BrokenPipe),
                Ok(n) => remaining = &remaining[n..],
                Err(Errno::EINTR) => continue,
                Err(Errno::EPIPE) | Err(Errno::ECONNRESET) => return Err(IpcError::BrokenPipe),
                Err(errno) => return Err(IpcError::from(errno)),
            }
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> IpcResult<usize> {
        let stream = self.stream()?;
        loop {
            match (&*stream).read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // A reset socket reads as end of stream
                Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ok(0),
                Err(e) => return Err(IpcError::from_io(e)),
            }
        }
    }

    fn try_read(&self, buf: &mut [u8]) -> IpcResult<Option<usize>> {
        let stream = self.stream()?;
        if !probe_readable(stream.as_fd())? {
            return Ok(None);
        }
        // Only the owning thread reads, so a positive probe cannot go stale
        self.read(buf).map(Some)
    }

    fn ready_signal(&self) -> &Arc<ReadySignal> {
        &self.signal
    }

    fn readiness_fd(&self) -> Option<ReadinessFd> {
        self.stream
            .lock()
            .as_ref()
            .map(|stream| Arc::clone(stream) as ReadinessFd)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.stream.lock().as_ref().map(|stream| stream.as_raw_fd())
    }

    fn close(&self) {
        let taken = self.stream.lock().take();
        if let Some(stream) = taken {
            debug!(fd = stream.as_raw_fd(), "closing native endpoint");
            drop(stream);
            self.signal.notify();
        }
    }
}

impl Drop for NativeEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for NativeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEndpoint")
            .field("fd", &self.raw_fd())
            .finish()
    }
}
