/*!
 * Endpoint Traits
 * Byte-stream transport capability behind every connection
 */

use crate::ipc::types::{Backend, IpcResult};
use crate::ipc::wait::{ReadinessFd, ReadySignal};
use std::fmt;
use std::os::fd::RawFd;
use std::sync::Arc;

/// One half of a transport
///
/// Endpoints carry raw bytes only; framing lives in the connection.
/// Implementations must tolerate `close` racing with any other call.
pub trait Endpoint: Send + Sync + fmt::Debug {
    /// Transport kind
    fn backend(&self) -> Backend;

    /// Write the whole buffer, blocking while the transport is full
    fn write_all(&self, buf: &[u8]) -> IpcResult<()>;

    /// Blocking read; `Ok(0)` means the peer closed its sending side
    fn read(&self, buf: &mut [u8]) -> IpcResult<usize>;

    /// Non-blocking read; `Ok(None)` when no bytes are available yet
    fn try_read(&self, buf: &mut [u8]) -> IpcResult<Option<usize>>;

    /// Signal notified on inbound bytes, peer close and local close
    fn ready_signal(&self) -> &Arc<ReadySignal>;

    /// Descriptor for the selector, if the transport has one
    fn readiness_fd(&self) -> Option<ReadinessFd>;

    /// Raw descriptor number, if the transport has one
    fn raw_fd(&self) -> Option<RawFd>;

    /// Release the transport half; idempotent
    fn close(&self);
}
