/*!
 * conduit
 * Inter-process communication primitives for worker processes
 *
 * - Duplex and simplex message connections over two interchangeable
 *   transports (OS descriptors and in-process ring buffers)
 * - A readiness multiplexer that waits on mixed sets of connections
 * - A shared-memory arena handing out typed scalar and array cells
 */

pub mod core;
pub mod ipc;
pub mod monitoring;

// Re-exports
pub use crate::core::{ConduitError, ConfigError, IpcConfig};
pub use ipc::connection::{Connection, ConnectionId, ConnectionStats};
pub use ipc::pipe::{
    make_pipe, make_pipe_with, EmulatedPipeFactory, NativePipeFactory, PipeFactory,
};
pub use ipc::shm::{
    Array, Cell, CellInit, Scalar, SharedArena, SharedBlock, ShmError, TypeCode, Value,
};
pub use ipc::types::{Backend, IpcError, IpcResult};
pub use ipc::wait::{wait, FdSource, Multiplexer, PollSelector, Selector, Waitable};
pub use monitoring::{init_tracing, try_init_tracing};
