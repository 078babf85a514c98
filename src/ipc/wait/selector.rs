/*!
 * Selector Strategies
 *
 * The blocking primitive under the multiplexer. The multiplexer never picks
 * one itself: it is handed a `Selector` at construction, and
 * `Multiplexer::default()` resolves `SelectorKind::Auto` for the platform.
 */

use crate::ipc::types::{IpcError, IpcResult};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::fd::BorrowedFd;
use std::sync::Arc;
use std::time::Duration;

/// Strategy for blocking until descriptors become readable
///
/// Implementations must be:
/// - **Thread-safe**: one selector is shared by every wait on a multiplexer
/// - **Level-triggered**: a descriptor that stays readable keeps reporting ready
pub trait Selector: Send + Sync + fmt::Debug {
    /// Block until one of `fds` is readable, hung up or errored, or until
    /// `timeout` lapses (`None` blocks indefinitely)
    ///
    /// Returns the number of ready descriptors; zero on timeout or when a
    /// signal interrupted the call.
    fn select(&self, fds: &[BorrowedFd<'_>], timeout: Option<Duration>) -> IpcResult<usize>;

    /// Strategy name for diagnostics
    fn name(&self) -> &'static str;
}

/// Strategy type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// poll(2)
    Poll,
    /// Best available for the current platform
    #[default]
    Auto,
}

impl SelectorKind {
    /// Resolve `Auto` to a concrete strategy
    pub fn resolve(self) -> SelectorKind {
        match self {
            SelectorKind::Auto => SelectorKind::Poll,
            other => other,
        }
    }

    /// Build the strategy object
    pub fn build(self) -> Arc<dyn Selector> {
        match self.resolve() {
            SelectorKind::Poll | SelectorKind::Auto => Arc::new(PollSelector),
        }
    }
}

/// poll(2)-based selector
#[derive(Debug, Clone, Copy, Default)]
pub struct PollSelector;

impl Selector for PollSelector {
    fn select(&self, fds: &[BorrowedFd<'_>], timeout: Option<Duration>) -> IpcResult<usize> {
        let mut pollfds: Vec<PollFd<'_>> = fds
            .iter()
            .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
            .collect();

        match poll(&mut pollfds, poll_timeout(timeout)) {
            Ok(n) => Ok(n.max(0) as usize),
            Err(Errno::EINTR) => Ok(0),
            Err(errno) => Err(IpcError::from(errno)),
        }
    }

    fn name(&self) -> &'static str {
        "poll"
    }
}

/// Non-blocking readability probe for a single descriptor
///
/// Hang-up and error conditions count as readable: the next read reports them.
pub(crate) fn probe_readable(fd: BorrowedFd<'_>) -> IpcResult<bool> {
    let mut pollfds = [PollFd::new(fd, PollFlags::POLLIN)];
    loop {
        match poll(&mut pollfds, PollTimeout::ZERO) {
            Ok(0) => return Ok(false),
            Ok(_) => {
                return Ok(pollfds[0]
                    .revents()
                    .map(|revents| !revents.is_empty())
                    .unwrap_or(false))
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(IpcError::from(errno)),
        }
    }
}

/// Convert a remaining duration to a poll timeout
///
/// Rounds up to whole milliseconds so a sub-millisecond remainder never
/// degenerates into a zero-timeout spin. Durations beyond the u16 range are
/// clamped; the multiplexer loop re-arms with the remaining time.
fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        Some(d) => {
            let mut ms = d.as_millis();
            if d > Duration::from_millis(ms as u64) {
                ms += 1;
            }
            PollTimeout::from(ms.min(u16::MAX as u128) as u16)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    #[test]
    fn test_poll_timeout_rounds_up() {
        assert_eq!(poll_timeout(Some(Duration::ZERO)), PollTimeout::ZERO);
        assert_eq!(
            poll_timeout(Some(Duration::from_micros(1))),
            PollTimeout::from(1u16)
        );
        assert_eq!(
            poll_timeout(Some(Duration::from_secs(3600))),
            PollTimeout::from(u16::MAX)
        );
        assert_eq!(poll_timeout(None), PollTimeout::NONE);
    }

    #[test]
    fn test_poll_selector_timeout() {
        let (a, _b) = UnixStream::pair().unwrap();
        let start = Instant::now();
        let ready = PollSelector
            .select(&[a.as_fd()], Some(Duration::from_millis(50)))
            .unwrap();
        assert_eq!(ready, 0);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_poll_selector_reports_readable() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();
        let ready = PollSelector
            .select(&[a.as_fd()], Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(ready, 1);
        assert!(probe_readable(a.as_fd()).unwrap());
    }

    #[test]
    fn test_probe_reports_hangup() {
        let (a, b) = UnixStream::pair().unwrap();
        assert!(!probe_readable(a.as_fd()).unwrap());
        drop(b);
        assert!(probe_readable(a.as_fd()).unwrap());
    }

    #[test]
    fn test_auto_resolves_to_poll() {
        assert_eq!(SelectorKind::Auto.resolve(), SelectorKind::Poll);
        assert_eq!(SelectorKind::default().build().name(), "poll");
    }
}
