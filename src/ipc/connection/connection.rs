/*!
 * Connection
 * Framed message channel over one transport endpoint
 */

use super::framing::{FrameHeader, FrameStatus, Inbox};
use crate::core::limits::{COALESCE_FRAME_MAX, READ_CHUNK_SIZE};
use crate::core::serialization::bincode as codec;
use crate::core::serialization::serde::{is_false, is_zero_usize};
use crate::ipc::endpoint::Endpoint;
use crate::ipc::types::{Backend, IpcError, IpcResult};
use crate::ipc::wait::{wait, ReadinessFd, ReadySignal, Waitable};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConnectionStats {
    pub id: ConnectionId,
    pub backend: Backend,
    pub readable: bool,
    pub writable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub closed: bool,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub buffered: usize,
}

#[derive(Default)]
struct Counters {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
}

/// One end of a pipe
///
/// Messages are delivered whole, in order, exactly once. A connection is
/// owned by one thread at a time; `close` and `wait` may race with it.
pub struct Connection {
    id: ConnectionId,
    endpoint: Box<dyn Endpoint>,
    readable: AtomicBool,
    writable: bool,
    closed: AtomicBool,
    inbox: Mutex<Inbox>,
    send_lock: Mutex<()>,
    max_message_len: usize,
    counters: Counters,
}

impl Connection {
    pub(crate) fn new(
        endpoint: Box<dyn Endpoint>,
        readable: bool,
        writable: bool,
        max_message_len: usize,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint,
            readable: AtomicBool::new(readable),
            writable,
            closed: AtomicBool::new(false),
            inbox: Mutex::new(Inbox::new()),
            send_lock: Mutex::new(()),
            max_message_len,
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn backend(&self) -> Backend {
        self.endpoint.backend()
    }

    pub fn readable(&self) -> bool {
        self.readable.load(Ordering::Acquire)
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Largest frame this end accepts
    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    /// Native descriptor, or `None` for in-process transports
    pub fn fileno(&self) -> IpcResult<Option<RawFd>> {
        if self.is_closed() {
            return Err(IpcError::Closed);
        }
        Ok(self.endpoint.raw_fd())
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send one message
    pub fn send_bytes(&self, payload: &[u8]) -> IpcResult<()> {
        self.check_writable()?;
        let header = FrameHeader::for_payload(payload.len());

        let _guard = self.send_lock.lock();
        if payload.len() <= COALESCE_FRAME_MAX {
            let mut frame = BytesMut::with_capacity(header.as_bytes().len() + payload.len());
            frame.extend_from_slice(header.as_bytes());
            frame.extend_from_slice(payload);
            self.endpoint.write_all(&frame)?;
        } else {
            self.endpoint.write_all(header.as_bytes())?;
            self.endpoint.write_all(payload)?;
        }

        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        trace!(id = %self.id, len = payload.len(), "sent message");
        Ok(())
    }

    /// Alias of [`Connection::send_bytes`]
    pub fn send(&self, payload: &[u8]) -> IpcResult<()> {
        self.send_bytes(payload)
    }

    /// Send `buf[offset..offset + size]` as one message
    pub fn send_bytes_range(&self, buf: &[u8], offset: usize, size: usize) -> IpcResult<()> {
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| {
                IpcError::InvalidArgument(format!(
                    "range {}+{} outside buffer of length {}",
                    offset,
                    size,
                    buf.len()
                ))
            })?;
        self.send_bytes(&buf[offset..end])
    }

    /// Serialize `value` with bincode and send it as one message
    pub fn send_obj<T: Serialize>(&self, value: &T) -> IpcResult<()> {
        let bytes = codec::to_vec(value)?;
        self.send_bytes(&bytes)
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Receive the next message, blocking until it is complete
    pub fn recv_bytes(&self) -> IpcResult<Bytes> {
        self.recv_frame(self.max_message_len)
    }

    /// Alias of [`Connection::recv_bytes`]
    pub fn recv(&self) -> IpcResult<Bytes> {
        self.recv_bytes()
    }

    /// Receive the next message, rejecting anything over `maxlength` bytes
    ///
    /// The connection's own `max_message_len` still applies; the error
    /// reports whichever bound is smaller. A rejected frame leaves the
    /// stream unusable: a duplex end stops being readable and a read-only
    /// end is closed.
    pub fn recv_bytes_limited(&self, maxlength: usize) -> IpcResult<Bytes> {
        self.recv_frame(maxlength.min(self.max_message_len))
    }

    /// Receive the next message into `buf`, returning its length
    ///
    /// The message is consumed even when `buf` is too short; it is then
    /// carried by the `BufferTooShort` error.
    pub fn recv_bytes_into(&self, buf: &mut [u8]) -> IpcResult<usize> {
        let frame = self.recv_bytes()?;
        if frame.len() > buf.len() {
            return Err(IpcError::BufferTooShort {
                message: frame.to_vec(),
            });
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    /// Receive the next message and decode it with bincode
    pub fn recv_obj<T: DeserializeOwned>(&self) -> IpcResult<T> {
        let frame = self.recv_bytes()?;
        Ok(codec::from_slice(&frame)?)
    }

    /// True iff `recv` would return without blocking
    ///
    /// Never blocks. A closed connection reports ready so a concurrent
    /// `wait` surfaces the close.
    pub fn is_ready_for_read(&self) -> bool {
        if self.is_closed() {
            return true;
        }
        if !self.readable() {
            return false;
        }
        // A reader holding the inbox is mid-recv; report not ready
        match self.inbox.try_lock() {
            Some(mut inbox) => self.fill_nonblocking(&mut inbox),
            None => false,
        }
    }

    /// Wait up to `timeout` for a message or end of stream
    ///
    /// `None` blocks until one arrives.
    pub fn poll(&self, timeout: Option<Duration>) -> IpcResult<bool> {
        self.check_readable()?;
        Ok(!wait(&[self], timeout)?.is_empty())
    }

    fn recv_frame(&self, max: usize) -> IpcResult<Bytes> {
        self.check_readable()?;
        let mut inbox = self.inbox.lock();
        let mut scratch = Vec::new();

        loop {
            match inbox.status(max)? {
                FrameStatus::Complete { .. } => {
                    if let Some(frame) = inbox.take_frame(max)? {
                        self.counters
                            .messages_received
                            .fetch_add(1, Ordering::Relaxed);
                        self.counters
                            .bytes_received
                            .fetch_add(frame.len() as u64, Ordering::Relaxed);
                        trace!(id = %self.id, len = frame.len(), "received message");
                        return Ok(frame);
                    }
                }
                FrameStatus::TooLong { payload_len } => {
                    drop(inbox);
                    self.reject_frame(payload_len, max);
                    return Err(IpcError::BadMessageLength {
                        len: payload_len,
                        max,
                    });
                }
                FrameStatus::Partial => {}
            }

            if inbox.is_eof() {
                return Err(match inbox.buffered() {
                    0 => IpcError::Eof,
                    buffered => IpcError::UnexpectedEof { buffered },
                });
            }

            if scratch.is_empty() {
                scratch.resize(READ_CHUNK_SIZE, 0);
            }
            match self.endpoint.read(&mut scratch)? {
                0 => inbox.mark_eof(),
                n => inbox.extend(&scratch[..n]),
            }
        }
    }

    fn reject_frame(&self, payload_len: u64, max: usize) {
        warn!(id = %self.id, len = payload_len, max, "rejecting oversized message");
        if self.writable {
            self.readable.store(false, Ordering::Release);
        } else {
            self.close();
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close this end; later calls have no effect
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.endpoint.close();
        debug!(id = %self.id, backend = %self.backend(), "closed connection");
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            id: self.id,
            backend: self.backend(),
            readable: self.readable(),
            writable: self.writable,
            closed: self.is_closed(),
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            buffered: self
                .inbox
                .try_lock()
                .map(|inbox| inbox.buffered())
                .unwrap_or(0),
        }
    }

    fn check_readable(&self) -> IpcResult<()> {
        if self.is_closed() {
            Err(IpcError::Closed)
        } else if !self.readable() {
            Err(IpcError::NotReadable)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> IpcResult<()> {
        if self.is_closed() {
            Err(IpcError::Closed)
        } else if !self.writable {
            Err(IpcError::NotWritable)
        } else {
            Ok(())
        }
    }

    /// Pull whatever the transport has without blocking
    ///
    /// Returns true once a whole frame, an oversized header or end of
    /// stream is buffered.
    fn fill_nonblocking(&self, inbox: &mut Inbox) -> bool {
        let mut scratch = [0u8; 4096];
        loop {
            match inbox.status(self.max_message_len) {
                Ok(FrameStatus::Partial) => {}
                // Complete, oversized or malformed: recv will report it
                _ => return true,
            }
            if inbox.is_eof() {
                return true;
            }
            match self.endpoint.try_read(&mut scratch) {
                Ok(Some(0)) => inbox.mark_eof(),
                Ok(Some(n)) => inbox.extend(&scratch[..n]),
                Ok(None) => return false,
                Err(e) => {
                    trace!(id = %self.id, error = %e, "readiness probe hit an error");
                    return true;
                }
            }
        }
    }
}

impl Waitable for Connection {
    fn is_ready_for_read(&self) -> bool {
        Connection::is_ready_for_read(self)
    }

    fn ready_signal(&self) -> &Arc<ReadySignal> {
        self.endpoint.ready_signal()
    }

    fn readiness_fd(&self) -> Option<ReadinessFd> {
        if self.is_closed() || !self.readable() {
            return None;
        }
        self.endpoint.readiness_fd()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("backend", &self.backend())
            .field("readable", &self.readable())
            .field("writable", &self.writable)
            .field("closed", &self.is_closed())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::DEFAULT_MAX_MESSAGE_LEN;
    use crate::ipc::endpoint::{EmulatedEndpoint, NativeEndpoint};

    fn emulated_pair() -> (Connection, Connection) {
        let (a, b) = EmulatedEndpoint::duplex_pair(1024);
        (
            Connection::new(Box::new(a), true, true, DEFAULT_MAX_MESSAGE_LEN),
            Connection::new(Box::new(b), true, true, DEFAULT_MAX_MESSAGE_LEN),
        )
    }

    fn native_simplex() -> (Connection, Connection) {
        let (rx, tx) = NativeEndpoint::pipe_pair().unwrap();
        (
            Connection::new(Box::new(rx), true, false, DEFAULT_MAX_MESSAGE_LEN),
            Connection::new(Box::new(tx), false, true, DEFAULT_MAX_MESSAGE_LEN),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, b) = emulated_pair();
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("conn-"));
    }

    #[test]
    fn test_readiness_requires_whole_frame() {
        let (a, b) = emulated_pair();
        assert!(!b.is_ready_for_read());

        // Header alone announces 3 bytes that have not arrived
        a.endpoint.write_all(&[0, 0, 0, 3, b'a']).unwrap();
        assert!(!b.is_ready_for_read());
        assert_eq!(b.stats().buffered, 5);

        a.endpoint.write_all(b"bc").unwrap();
        assert!(b.is_ready_for_read());
        assert_eq!(&b.recv_bytes().unwrap()[..], b"abc");
    }

    #[test]
    fn test_truncated_frame_is_unexpected_eof() {
        let (a, b) = emulated_pair();
        a.endpoint.write_all(&[0, 0, 0, 9, 1, 2]).unwrap();
        a.close();
        assert!(matches!(
            b.recv_bytes(),
            Err(IpcError::UnexpectedEof { buffered: 6 })
        ));
    }

    #[test]
    fn test_oversized_frame_on_duplex_end_stops_reading() {
        let (a, b) = emulated_pair();
        a.send_bytes(&[7u8; 100]).unwrap();

        let err = b.recv_bytes_limited(10).unwrap_err();
        assert!(matches!(err, IpcError::BadMessageLength { len: 100, max: 10 }));
        assert!(!b.readable());
        assert!(!b.is_closed());
        assert!(matches!(b.recv_bytes(), Err(IpcError::NotReadable)));
        // Writing still works
        b.send_bytes(b"still here").unwrap();
        assert_eq!(&a.recv_bytes().unwrap()[..], b"still here");
    }

    #[test]
    fn test_limit_reports_the_bound_that_applied() {
        let (a, b) = EmulatedEndpoint::duplex_pair(1024);
        let a = Connection::new(Box::new(a), true, true, DEFAULT_MAX_MESSAGE_LEN);
        let b = Connection::new(Box::new(b), true, true, 32);
        a.send_bytes(&[0u8; 40]).unwrap();

        let err = b.recv_bytes_limited(1000).unwrap_err();
        assert!(matches!(err, IpcError::BadMessageLength { len: 40, max: 32 }));
    }

    #[test]
    fn test_oversized_frame_on_read_only_end_closes() {
        let (rx, tx) = native_simplex();
        tx.send_bytes(&[1u8; 64]).unwrap();
        assert!(matches!(
            rx.recv_bytes_limited(8),
            Err(IpcError::BadMessageLength { len: 64, max: 8 })
        ));
        assert!(rx.is_closed());
    }

    #[test]
    fn test_roles_of_simplex_ends() {
        let (rx, tx) = native_simplex();
        assert!(matches!(rx.send_bytes(b"x"), Err(IpcError::NotWritable)));
        assert!(matches!(tx.recv_bytes(), Err(IpcError::NotReadable)));
        assert!(tx.readiness_fd().is_none());
        assert!(rx.readiness_fd().is_some());
        assert!(rx.fileno().unwrap().is_some());
    }

    #[test]
    fn test_large_frame_split_across_writes() {
        let (a, b) = emulated_pair();
        let payload: Vec<u8> = (0..(COALESCE_FRAME_MAX * 2)).map(|i| i as u8).collect();

        let sender = std::thread::spawn(move || {
            a.send_bytes(&payload).unwrap();
            a
        });
        let received = b.recv_bytes().unwrap();
        let a = sender.join().unwrap();

        assert_eq!(received.len(), COALESCE_FRAME_MAX * 2);
        assert_eq!(received[1234], (1234 % 256) as u8);
        assert_eq!(a.stats().messages_sent, 1);
        assert_eq!(b.stats().bytes_received, (COALESCE_FRAME_MAX * 2) as u64);
    }

    #[test]
    fn test_stats_serialize_without_defaults() {
        let (a, _b) = emulated_pair();
        let json = serde_json::to_value(a.stats()).unwrap();
        assert_eq!(json["backend"], "emulated");
        assert!(json.get("closed").is_none());
        assert!(json.get("buffered").is_none());
    }
}
