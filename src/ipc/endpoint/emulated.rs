/*!
 * Emulated Endpoints
 * In-process transport over ringbuf circular buffers
 *
 * Each direction is a `Channel`: a bounded byte ring guarded by a mutex,
 * a condvar per side, and the reading endpoint's `ReadySignal`. Writers
 * block while the ring is full and resume as the reader drains.
 */

use super::traits::Endpoint;
use crate::ipc::types::{Backend, IpcError, IpcResult};
use crate::ipc::wait::{ReadinessFd, ReadySignal};
use parking_lot::{Condvar, Mutex};
use ringbuf::{traits::*, HeapRb};
use std::fmt;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct ChannelState {
    ring: HeapRb<u8>,
    writer_closed: bool,
    reader_closed: bool,
}

/// One direction of an emulated transport
struct Channel {
    state: Mutex<ChannelState>,
    readable: Condvar,
    writable: Condvar,
    reader_signal: Arc<ReadySignal>,
    capacity: usize,
}

impl Channel {
    fn new(capacity: usize, reader_signal: Arc<ReadySignal>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChannelState {
                ring: HeapRb::<u8>::new(capacity),
                writer_closed: false,
                reader_closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            reader_signal,
            capacity,
        })
    }

    fn write_all(&self, mut data: &[u8]) -> IpcResult<()> {
        while !data.is_empty() {
            let pushed = {
                let mut state = self.state.lock();
                loop {
                    if state.reader_closed {
                        return Err(IpcError::BrokenPipe);
                    }
                    if !state.ring.is_full() {
                        break;
                    }
                    self.writable.wait(&mut state);
                }
                let pushed = state.ring.push_slice(data);
                self.readable.notify_all();
                pushed
            };
            data = &data[pushed..];
            self.reader_signal.notify();
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8], block: bool) -> IpcResult<Option<usize>> {
        let mut state = self.state.lock();
        loop {
            if state.reader_closed {
                return Err(IpcError::Closed);
            }
            if !state.ring.is_empty() {
                let n = state.ring.pop_slice(buf);
                self.writable.notify_all();
                return Ok(Some(n));
            }
            if state.writer_closed {
                return Ok(Some(0));
            }
            if !block {
                return Ok(None);
            }
            self.readable.wait(&mut state);
        }
    }

    fn close_writer(&self) {
        {
            let mut state = self.state.lock();
            state.writer_closed = true;
            self.readable.notify_all();
        }
        self.reader_signal.notify();
    }

    fn close_reader(&self) {
        let mut state = self.state.lock();
        state.reader_closed = true;
        self.writable.notify_all();
        self.readable.notify_all();
    }

    fn buffered(&self) -> usize {
        self.state.lock().ring.occupied_len()
    }
}

/// Ring-buffer endpoint
pub struct EmulatedEndpoint {
    inbound: Option<Arc<Channel>>,
    outbound: Option<Arc<Channel>>,
    signal: Arc<ReadySignal>,
    closed: AtomicBool,
}

impl EmulatedEndpoint {
    /// Connected duplex pair; each direction holds `capacity` bytes
    pub fn duplex_pair(capacity: usize) -> (Self, Self) {
        let a_signal = Arc::new(ReadySignal::new());
        let b_signal = Arc::new(ReadySignal::new());
        let a_to_b = Channel::new(capacity, Arc::clone(&b_signal));
        let b_to_a = Channel::new(capacity, Arc::clone(&a_signal));

        debug!(capacity, "created emulated duplex pair");
        (
            Self::new(Some(Arc::clone(&b_to_a)), Some(Arc::clone(&a_to_b)), a_signal),
            Self::new(Some(a_to_b), Some(b_to_a), b_signal),
        )
    }

    /// One-way pair, returned as (read end, write end)
    pub fn simplex_pair(capacity: usize) -> (Self, Self) {
        let reader_signal = Arc::new(ReadySignal::new());
        let channel = Channel::new(capacity, Arc::clone(&reader_signal));

        debug!(capacity, "created emulated simplex pair");
        (
            Self::new(Some(Arc::clone(&channel)), None, reader_signal),
            Self::new(None, Some(channel), Arc::new(ReadySignal::new())),
        )
    }

    fn new(
        inbound: Option<Arc<Channel>>,
        outbound: Option<Arc<Channel>>,
        signal: Arc<ReadySignal>,
    ) -> Self {
        Self {
            inbound,
            outbound,
            signal,
            closed: AtomicBool::new(false),
        }
    }

    /// Bytes waiting in the inbound ring
    pub fn buffered(&self) -> usize {
        self.inbound.as_ref().map(|ch| ch.buffered()).unwrap_or(0)
    }

    /// Ring capacity per direction
    pub fn capacity(&self) -> usize {
        self.inbound
            .as_ref()
            .or(self.outbound.as_ref())
            .map(|ch| ch.capacity)
            .unwrap_or(0)
    }

    fn check_open(&self) -> IpcResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(IpcError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Endpoint for EmulatedEndpoint {
    fn backend(&self) -> Backend {
        Backend::Emulated
    }

    fn write_all(&self, buf: &[u8]) -> IpcResult<()> {
        self.check_open()?;
        let channel = self.outbound.as_ref().ok_or(IpcError::NotWritable)?;
        channel.write_all(buf)
    }

    fn read(&self, buf: &mut [u8]) -> IpcResult<usize> {
        self.check_open()?;
        let channel = self.inbound.as_ref().ok_or(IpcError::NotReadable)?;
        Ok(channel.read(buf, true)?.unwrap_or(0))
    }

    fn try_read(&self, buf: &mut [u8]) -> IpcResult<Option<usize>> {
        self.check_open()?;
        let channel = self.inbound.as_ref().ok_or(IpcError::NotReadable)?;
        channel.read(buf, false)
    }

    fn ready_signal(&self) -> &Arc<ReadySignal> {
        &self.signal
    }

    fn readiness_fd(&self) -> Option<ReadinessFd> {
        None
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(outbound) = &self.outbound {
            outbound.close_writer();
        }
        if let Some(inbound) = &self.inbound {
            inbound.close_reader();
        }
        debug!("closed emulated endpoint");
        self.signal.notify();
    }
}

impl Drop for EmulatedEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for EmulatedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedEndpoint")
            .field("readable", &self.inbound.is_some())
            .field("writable", &self.outbound.is_some())
            .field("buffered", &self.buffered())
            .field("capacity", &self.capacity())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
