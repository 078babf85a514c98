/*!
 * Readiness Signals
 *
 * In-process readiness changes (emulated transport writes, closes) have no
 * descriptor of their own. Each waitable owns a `ReadySignal`; a blocked
 * `wait` subscribes its `Wakeup` to every signal in its set and polls the
 * wakeup descriptor next to the native ones, so any notify cancels the
 * suspension.
 */

use crate::ipc::types::{IpcError, IpcResult};
use parking_lot::Mutex;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Self-pipe used to interrupt a blocked selector
pub struct Wakeup {
    rx: UnixStream,
    tx: UnixStream,
}

impl Wakeup {
    pub fn new() -> IpcResult<Self> {
        let (rx, tx) = UnixStream::pair().map_err(IpcError::from_io)?;
        rx.set_nonblocking(true).map_err(IpcError::from_io)?;
        tx.set_nonblocking(true).map_err(IpcError::from_io)?;
        Ok(Self { rx, tx })
    }

    /// Make the wakeup descriptor readable
    ///
    /// A full socket buffer already guarantees readability, so WouldBlock is ignored.
    pub fn notify(&self) {
        match (&self.tx).write(&[1]) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!(error = %e, "failed to post wakeup"),
        }
    }

    /// Consume every pending notification
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl AsFd for Wakeup {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.rx.as_fd()
    }
}

impl fmt::Debug for Wakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wakeup").finish_non_exhaustive()
    }
}

/// Fan-out of readiness changes to subscribed waiters
#[derive(Default)]
pub struct ReadySignal {
    waiters: Mutex<Vec<(u64, Arc<Wakeup>)>>,
    next_token: AtomicU64,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wakeup until the returned guard is dropped
    pub fn subscribe(self: &Arc<Self>, wakeup: &Arc<Wakeup>) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.waiters.lock().push((token, Arc::clone(wakeup)));
        Subscription {
            signal: Arc::clone(self),
            token,
        }
    }

    /// Wake every subscribed waiter
    pub fn notify(&self) {
        // No lock is held while writing to wakeup sockets
        let waiters: Vec<Arc<Wakeup>> = self
            .waiters
            .lock()
            .iter()
            .map(|(_, wakeup)| Arc::clone(wakeup))
            .collect();

        for wakeup in waiters {
            wakeup.notify();
        }
    }

    /// Number of waiters currently subscribed (for diagnostics)
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn unsubscribe(&self, token: u64) {
        self.waiters.lock().retain(|(t, _)| *t != token);
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal")
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// Subscription guard; unsubscribes on drop
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    signal: Arc<ReadySignal>,
    token: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signal.unsubscribe(self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::wait::selector::{PollSelector, Selector};
    use std::time::Duration;

    #[test]
    fn test_notify_makes_wakeup_readable() {
        let wakeup = Arc::new(Wakeup::new().unwrap());
        let signal = Arc::new(ReadySignal::new());
        let _sub = signal.subscribe(&wakeup);

        signal.notify();

        let ready = PollSelector
            .select(&[wakeup.as_fd()], Some(Duration::ZERO))
            .unwrap();
        assert_eq!(ready, 1);

        wakeup.drain();
        let ready = PollSelector
            .select(&[wakeup.as_fd()], Some(Duration::ZERO))
            .unwrap();
        assert_eq!(ready, 0);
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let wakeup = Arc::new(Wakeup::new().unwrap());
        let signal = Arc::new(ReadySignal::new());

        let first = signal.subscribe(&wakeup);
        let second = signal.subscribe(&wakeup);
        assert_eq!(signal.waiter_count(), 2);

        drop(first);
        assert_eq!(signal.waiter_count(), 1);
        drop(second);
        assert_eq!(signal.waiter_count(), 0);
    }

    #[test]
    fn test_repeated_notify_never_blocks() {
        let wakeup = Wakeup::new().unwrap();
        for _ in 0..10_000 {
            wakeup.notify();
        }
        wakeup.drain();
    }
}
