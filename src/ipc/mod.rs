/*!
 * IPC Module
 * Message connections, readiness multiplexing and shared-memory cells
 */

pub mod connection;
pub mod endpoint;
pub mod pipe;
pub mod shm;
pub mod types;
pub mod wait;

// Re-export for convenience
pub use connection::{Connection, ConnectionId, ConnectionStats};
pub use pipe::{make_pipe, make_pipe_with, PipeFactory};
pub use types::{Backend, IpcError, IpcResult};
pub use wait::{wait, Waitable};
