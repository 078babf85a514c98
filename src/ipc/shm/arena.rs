/*!
 * Shared Arena
 * Bump allocator carving typed cells out of one shared block
 *
 * # Layout
 *
 * Each cell starts at the cursor rounded up to its typecode's alignment and
 * spans `size × count` bytes. Cells are never freed; they keep the block
 * alive after the arena itself is dropped.
 */

use super::block::SharedBlock;
use super::cell::{Array, Cell, CellInit, Value};
use super::typecode::{Element, TypeCode};
use super::types::{ArenaStats, ShmError};
use crate::core::types::{Offset, Size};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Byte range owned by one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub offset: Offset,
    pub len: Size,
    pub typecode: TypeCode,
}

impl Extent {
    pub fn end(&self) -> Offset {
        self.offset + self.len
    }

    /// Half-open ranges intersect; empty ranges intersect nothing
    pub fn overlaps(&self, other: &Extent) -> bool {
        self.len > 0 && other.len > 0 && self.offset < other.end() && other.offset < self.end()
    }
}

#[derive(Debug, Default)]
struct ArenaState {
    cursor: Offset,
    extents: Vec<Extent>,
}

/// Allocator over a fixed-size block
#[derive(Debug)]
pub struct SharedArena {
    block: Arc<SharedBlock>,
    state: Mutex<ArenaState>,
}

impl SharedArena {
    /// Arena over an anonymous shared mapping of `total_bytes`
    pub fn new(total_bytes: Size) -> Result<Self, ShmError> {
        Ok(Self::with_block(SharedBlock::anonymous(total_bytes)?))
    }

    /// Arena over private heap memory
    pub fn private(total_bytes: Size) -> Result<Self, ShmError> {
        Ok(Self::with_block(SharedBlock::private(total_bytes)?))
    }

    pub fn with_block(block: SharedBlock) -> Self {
        Self {
            block: Arc::new(block),
            state: Mutex::new(ArenaState::default()),
        }
    }

    pub fn capacity(&self) -> Size {
        self.block.len()
    }

    /// Bytes consumed so far, alignment padding included
    pub fn used(&self) -> Size {
        self.state.lock().cursor
    }

    pub fn stats(&self) -> ArenaStats {
        let state = self.state.lock();
        ArenaStats {
            capacity: self.block.len(),
            used: state.cursor,
            live_cells: state.extents.len(),
            shared: self.block.is_shared(),
        }
    }

    /// Byte ranges of every cell handed out, in allocation order
    pub fn extents(&self) -> Vec<Extent> {
        self.state.lock().extents.clone()
    }

    /// Allocate a cell of `typecode` and fill it from `init`
    pub fn make_cell(&self, typecode: TypeCode, init: CellInit) -> Result<Cell, ShmError> {
        // Validate values before consuming space
        let values = match &init {
            CellInit::Value(value) => {
                typecode.encode(*value)?;
                Some(std::slice::from_ref(value))
            }
            CellInit::Values(values) => {
                for value in values {
                    typecode.encode(*value)?;
                }
                Some(values.as_slice())
            }
            CellInit::Zeroed(_) => None,
        };

        let mut cell = self.allocate(typecode, init.count())?;
        cell.zero();
        if let Some(values) = values {
            cell.write_all(values)?;
        }
        Ok(cell)
    }

    /// Typed single-element cell
    pub fn value<T>(&self, initial: T) -> Result<Value<T>, ShmError>
    where
        T: Element,
    {
        let cell = self.allocate(T::TYPECODE, 1)?;
        let mut value = cell.into_value::<T>().map_err(|cell| mismatch::<T>(&cell))?;
        value.set(initial);
        Ok(value)
    }

    /// Typed array initialised from `values`
    pub fn array<T, I>(&self, values: I) -> Result<Array<T>, ShmError>
    where
        T: Element,
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        let mut array = self.array_zeroed::<T>(values.len())?;
        array.copy_from_slice(&values)?;
        Ok(array)
    }

    /// Typed array of `len` zeroed elements
    pub fn array_zeroed<T>(&self, len: usize) -> Result<Array<T>, ShmError>
    where
        T: Element,
    {
        let mut cell = self.allocate(T::TYPECODE, len)?;
        cell.zero();
        cell.into_array::<T>().map_err(|cell| mismatch::<T>(&cell))
    }

    fn allocate(&self, typecode: TypeCode, count: usize) -> Result<Cell, ShmError> {
        let size = typecode.size();
        let align = typecode.align();
        let capacity = self.block.len();

        let mut state = self.state.lock();
        let out_of_space = |requested: Size| ShmError::OutOfSpace {
            requested,
            available: capacity.saturating_sub(state.cursor),
            capacity,
        };

        let len = size.checked_mul(count).ok_or_else(|| out_of_space(usize::MAX))?;
        let offset = align_up(state.cursor, align).ok_or_else(|| out_of_space(len))?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= capacity)
            .ok_or_else(|| out_of_space(len))?;

        let extent = Extent {
            offset,
            len,
            typecode,
        };
        self.check_placement(&state.extents, &extent)?;

        state.extents.push(extent);
        state.cursor = end;
        drop(state);

        debug!(
            typecode = %typecode,
            count,
            offset,
            len,
            "allocated cell"
        );
        Ok(Cell::new(Arc::clone(&self.block), typecode, offset, count))
    }

    /// Alignment and non-overlap checks, run on every allocation
    fn check_placement(&self, live: &[Extent], extent: &Extent) -> Result<(), ShmError> {
        let align = extent.typecode.align();
        if extent.offset % align != 0 || (self.block.base_addr() + extent.offset) % align != 0 {
            warn!(offset = extent.offset, align, "misaligned cell");
            debug_assert!(false, "misaligned cell at offset {}", extent.offset);
            return Err(ShmError::Misaligned {
                offset: extent.offset,
                align,
                typecode: extent.typecode.as_char(),
            });
        }

        if let Some(other) = live.iter().find(|other| other.overlaps(extent)) {
            warn!(
                offset = extent.offset,
                other = other.offset,
                "cell overlaps a live cell"
            );
            debug_assert!(false, "overlapping cells");
            return Err(ShmError::Overlap {
                offset: extent.offset,
                end: extent.end(),
                other_offset: other.offset,
                other_end: other.end(),
            });
        }
        Ok(())
    }
}

fn mismatch<T: Element>(cell: &Cell) -> ShmError {
    ShmError::TypeMismatch {
        typecode: cell.typecode().as_char(),
        value: format!("{:?}", T::TYPECODE),
    }
}

/// Round `offset` up to a power-of-two `align`
fn align_up(offset: Offset, align: usize) -> Option<Offset> {
    debug_assert!(align.is_power_of_two());
    offset.checked_add(align - 1).map(|n| n & !(align - 1))
}
