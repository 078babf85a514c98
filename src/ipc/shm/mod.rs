/*!
 * Shared Memory Module
 * Typed scalar and array cells packed into one shared block
 */

pub mod arena;
pub mod block;
pub mod cell;
pub mod typecode;
pub mod types;

// Re-export public API
pub use arena::{Extent, SharedArena};
pub use block::SharedBlock;
pub use cell::{Array, Cell, CellInit, Value};
pub use typecode::{Element, Scalar, TypeCode};
pub use types::{ArenaStats, ShmError};
