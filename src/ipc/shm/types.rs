/*!
 * Shared Arena Types
 * Errors and statistics for the shared-memory arena
 */

use crate::core::serialization::serde::is_false;
use crate::core::types::{Offset, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared arena error types
#[derive(Debug, Clone, PartialEq, Error, Diagnostic, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ShmError {
    #[error("Index {index} out of range for array of length {len}")]
    #[diagnostic(code(shm::index_out_of_range))]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Length mismatch: expected {expected} elements, got {actual}")]
    #[diagnostic(code(shm::length_mismatch))]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Arena exhausted: requested {requested} bytes, {available} of {capacity} available")]
    #[diagnostic(
        code(shm::out_of_space),
        help("Create the arena with a larger block; arenas never grow.")
    )]
    OutOfSpace {
        requested: Size,
        available: Size,
        capacity: Size,
    },

    #[error("Misaligned cell: offset {offset} for typecode '{typecode}' (alignment {align})")]
    #[diagnostic(code(shm::misaligned))]
    Misaligned {
        offset: Offset,
        align: usize,
        typecode: char,
    },

    #[error("Cell [{offset}, {end}) overlaps live cell [{other_offset}, {other_end})")]
    #[diagnostic(code(shm::overlap))]
    Overlap {
        offset: Offset,
        end: Offset,
        other_offset: Offset,
        other_end: Offset,
    },

    #[error("Type mismatch: cannot store {value} in a '{typecode}' cell")]
    #[diagnostic(code(shm::type_mismatch))]
    TypeMismatch { typecode: char, value: String },

    #[error("Value {value} out of range for typecode '{typecode}'")]
    #[diagnostic(code(shm::value_out_of_range))]
    ValueOutOfRange { typecode: char, value: String },

    #[error("Unknown typecode: {0:?}")]
    #[diagnostic(
        code(shm::unknown_typecode),
        help("Valid typecodes: c b B h H i I l L q Q f d")
    )]
    UnknownTypeCode(String),

    #[error("Invalid block size {size} (allowed 1..={max})")]
    #[diagnostic(code(shm::invalid_size))]
    InvalidSize { size: Size, max: Size },

    #[error("Mapping failed: {0}")]
    #[diagnostic(code(shm::mapping))]
    Mapping(String),
}

/// Arena statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArenaStats {
    pub capacity: Size,
    pub used: Size,
    pub live_cells: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    pub shared: bool,
}

impl ArenaStats {
    pub fn available(&self) -> Size {
        self.capacity.saturating_sub(self.used)
    }
}
