/*!
 * Core Types
 * Common types used across the crate
 */

/// Size type for buffer and memory operations
pub type Size = usize;

/// Byte offset into a shared block
pub type Offset = usize;

/// Common result type for crate operations
pub type ConduitResult<T> = Result<T, super::errors::ConduitError>;
