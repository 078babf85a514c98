/*!
 * Readiness Multiplexer
 *
 * Blocks until at least one of a mixed set of waitables is ready for
 * reading, or a deadline passes.
 *
 * # Algorithm
 *
 * 1. Subscribe one `Wakeup` to every object's `ReadySignal`
 * 2. Evaluate readiness of every object; return the full ready subset if non-empty
 * 3. Otherwise block in the `Selector` on the wakeup plus all native descriptors
 * 4. Drain the wakeup and loop until the deadline
 *
 * Subscribing before the first readiness check means a notify that races
 * the check leaves the wakeup readable and the selector returns at once.
 */

use super::selector::{Selector, SelectorKind};
use super::signal::{ReadySignal, Subscription, Wakeup};
use crate::ipc::types::IpcResult;
use std::fmt;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, trace_span};

/// Descriptor kept alive for the duration of a wait
pub type ReadinessFd = Arc<dyn AsFd + Send + Sync>;

/// Anything the multiplexer can wait on
pub trait Waitable: Send + Sync {
    /// Non-blocking: true iff a read would complete without blocking
    fn is_ready_for_read(&self) -> bool;

    /// Signal notified on in-process readiness changes and on close
    fn ready_signal(&self) -> &Arc<ReadySignal>;

    /// Descriptor whose readability tracks this object, if it has one
    fn readiness_fd(&self) -> Option<ReadinessFd>;
}

/// Readiness multiplexer with an injected selector strategy
#[derive(Clone)]
pub struct Multiplexer {
    selector: Arc<dyn Selector>,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::with_selector(SelectorKind::Auto.build())
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("selector", &self.selector.name())
            .finish()
    }
}

impl Multiplexer {
    pub fn with_selector(selector: Arc<dyn Selector>) -> Self {
        Self { selector }
    }

    /// Name of the active selector strategy
    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Wait until one or more of `objects` are ready
    ///
    /// Returns every object ready at return time, in input order. An empty
    /// result means the timeout elapsed; `None` waits indefinitely and
    /// `Some(Duration::ZERO)` performs a single non-blocking pass.
    pub fn wait<'a, W>(
        &self,
        objects: &[&'a W],
        timeout: Option<Duration>,
    ) -> IpcResult<Vec<&'a W>>
    where
        W: Waitable + ?Sized,
    {
        let span = trace_span!(
            "wait",
            objects = objects.len(),
            timeout_ms = ?timeout.map(|t| t.as_millis())
        );
        let _entered = span.enter();

        let start = Instant::now();
        let deadline = timeout.and_then(|t| start.checked_add(t));

        let wakeup = Arc::new(Wakeup::new()?);
        let _subscriptions: Vec<Subscription> = objects
            .iter()
            .map(|object| object.ready_signal().subscribe(&wakeup))
            .collect();
        let sources: Vec<ReadinessFd> = objects
            .iter()
            .filter_map(|object| object.readiness_fd())
            .collect();

        let mut rounds = 0u32;
        loop {
            let ready: Vec<&'a W> = objects
                .iter()
                .copied()
                .filter(|object| object.is_ready_for_read())
                .collect();
            if !ready.is_empty() {
                trace!(ready = ready.len(), rounds, "wait satisfied");
                return Ok(ready);
            }

            let remaining = match (timeout, deadline) {
                (None, _) => None,
                (Some(_), Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        trace!(
                            rounds,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "wait timed out"
                        );
                        return Ok(Vec::new());
                    }
                    Some(deadline - now)
                }
                // Deadline overflowed Instant; treat as unbounded
                (Some(_), None) => None,
            };

            let mut fds: Vec<BorrowedFd<'_>> = Vec::with_capacity(sources.len() + 1);
            fds.push(wakeup.as_fd());
            fds.extend(sources.iter().map(|source| source.as_fd()));

            self.selector.select(&fds, remaining)?;
            wakeup.drain();
            rounds += 1;
        }
    }
}

/// Wait on `objects` with the platform default selector
///
/// See [`Multiplexer::wait`].
pub fn wait<'a, W>(objects: &[&'a W], timeout: Option<Duration>) -> IpcResult<Vec<&'a W>>
where
    W: Waitable + ?Sized,
{
    Multiplexer::default().wait(objects, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    /// Waitable flipped by hand; readiness changes go through the signal only
    struct Flag {
        ready: AtomicBool,
        signal: Arc<ReadySignal>,
    }

    impl Flag {
        fn new(ready: bool) -> Self {
            Self {
                ready: AtomicBool::new(ready),
                signal: Arc::new(ReadySignal::new()),
            }
        }

        fn set(&self) {
            self.ready.store(true, Ordering::SeqCst);
            self.signal.notify();
        }
    }

    impl Waitable for Flag {
        fn is_ready_for_read(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn ready_signal(&self) -> &Arc<ReadySignal> {
            &self.signal
        }

        fn readiness_fd(&self) -> Option<ReadinessFd> {
            None
        }
    }

    /// Selector wrapper counting blocking calls
    #[derive(Debug, Default)]
    struct CountingSelector {
        calls: AtomicUsize,
    }

    impl Selector for CountingSelector {
        fn select(&self, fds: &[BorrowedFd<'_>], timeout: Option<Duration>) -> IpcResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            super::super::selector::PollSelector.select(fds, timeout)
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_ready_objects_return_without_blocking() {
        let selector = Arc::new(CountingSelector::default());
        let mux = Multiplexer::with_selector(selector.clone());
        let a = Flag::new(true);
        let b = Flag::new(false);
        let c = Flag::new(true);

        let ready = mux.wait(&[&a, &b, &c], None).unwrap();
        assert_eq!(ready.len(), 2);
        assert!(std::ptr::eq(ready[0], &a));
        assert!(std::ptr::eq(ready[1], &c));
        assert_eq!(selector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_timeout_is_single_pass() {
        let selector = Arc::new(CountingSelector::default());
        let mux = Multiplexer::with_selector(selector.clone());
        let a = Flag::new(false);

        let ready = mux.wait(&[&a], Some(Duration::ZERO)).unwrap();
        assert!(ready.is_empty());
        assert_eq!(selector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_signal_cancels_unbounded_wait() {
        let flag = Arc::new(Flag::new(false));
        let setter = flag.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            setter.set();
        });

        let start = Instant::now();
        let ready = wait(&[flag.as_ref()], None).unwrap();
        assert_eq!(ready.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();

        // Subscriptions are released once the wait returns
        assert_eq!(flag.signal.waiter_count(), 0);
    }

    #[test]
    fn test_empty_set_times_out() {
        let objects: [&Flag; 0] = [];
        let start = Instant::now();
        let ready = wait(&objects, Some(Duration::from_millis(30))).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_default_selector_name() {
        assert_eq!(Multiplexer::default().selector_name(), "poll");
    }
}
