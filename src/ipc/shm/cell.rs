/*!
 * Cells
 * Typed views over byte ranges of a shared block
 *
 * Cells are `Send` but not `Sync`: a cell may move to another thread,
 * but is never shared between threads. Access across processes is
 * unsynchronised and coordinated by the caller.
 */

use super::block::SharedBlock;
use super::typecode::{Element, Scalar, TypeCode};
use super::types::ShmError;
use crate::core::types::{Offset, Size};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;

/// Initial contents of a new cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellInit {
    /// Single element
    Value(Scalar),
    /// `count` zeroed elements
    Zeroed(usize),
    /// One element per entry
    Values(Vec<Scalar>),
}

impl CellInit {
    pub fn count(&self) -> usize {
        match self {
            CellInit::Value(_) => 1,
            CellInit::Zeroed(count) => *count,
            CellInit::Values(values) => values.len(),
        }
    }
}

/// Dynamically typed view of `len` elements at `offset`
pub struct Cell {
    block: Arc<SharedBlock>,
    typecode: TypeCode,
    offset: Offset,
    len: usize,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl Cell {
    /// Caller guarantees the range is inside the block, aligned, and owned
    /// by no other cell.
    pub(crate) fn new(
        block: Arc<SharedBlock>,
        typecode: TypeCode,
        offset: Offset,
        len: usize,
    ) -> Self {
        Self {
            block,
            typecode,
            offset,
            len,
            _not_sync: PhantomData,
        }
    }

    pub fn typecode(&self) -> TypeCode {
        self.typecode
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset inside the block
    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn byte_len(&self) -> Size {
        self.len * self.typecode.size()
    }

    fn element_ptr(&self, index: usize) -> Result<*mut u8, ShmError> {
        if index >= self.len {
            return Err(ShmError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len and the cell range lies inside the block
        Ok(unsafe { self.block.ptr_at(self.offset + index * self.typecode.size()) })
    }

    /// First element
    pub fn read(&self) -> Result<Scalar, ShmError> {
        self.read_at(0)
    }

    pub fn read_at(&self, index: usize) -> Result<Scalar, ShmError> {
        let ptr = self.element_ptr(index)?;
        // SAFETY: in-bounds and aligned by the arena
        Ok(unsafe { self.typecode.load(ptr) })
    }

    pub fn read_all(&self) -> Vec<Scalar> {
        (0..self.len)
            .filter_map(|index| self.read_at(index).ok())
            .collect()
    }

    /// Overwrite the first element
    pub fn write(&mut self, value: Scalar) -> Result<(), ShmError> {
        self.write_at(0, value)
    }

    pub fn write_at(&mut self, index: usize, value: Scalar) -> Result<(), ShmError> {
        let ptr = self.element_ptr(index)?;
        let native = self.typecode.encode(value)?;
        // SAFETY: in-bounds and aligned by the arena
        unsafe { native.store(ptr) };
        Ok(())
    }

    /// Overwrite every element from `values`
    pub fn write_all(&mut self, values: &[Scalar]) -> Result<(), ShmError> {
        if values.len() != self.len {
            return Err(ShmError::LengthMismatch {
                expected: self.len,
                actual: values.len(),
            });
        }
        // Convert everything first so a bad value leaves the cell untouched
        let natives = values
            .iter()
            .map(|value| self.typecode.encode(*value))
            .collect::<Result<Vec<_>, _>>()?;
        for (index, native) in natives.into_iter().enumerate() {
            let ptr = self.element_ptr(index)?;
            // SAFETY: in-bounds and aligned by the arena
            unsafe { native.store(ptr) };
        }
        Ok(())
    }

    pub(crate) fn zero(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: the whole byte range belongs to this cell
        unsafe { ptr::write_bytes(self.block.ptr_at(self.offset), 0, self.byte_len()) };
    }

    /// Typed view; fails unless `T` matches the typecode
    pub fn into_value<T: Element>(self) -> Result<Value<T>, Self> {
        if T::TYPECODE == self.typecode && self.len == 1 {
            Ok(Value {
                cell: self,
                _marker: PhantomData,
            })
        } else {
            Err(self)
        }
    }

    /// Typed view; fails unless `T` matches the typecode
    pub fn into_array<T: Element>(self) -> Result<Array<T>, Self> {
        if T::TYPECODE == self.typecode {
            Ok(Array {
                cell: self,
                _marker: PhantomData,
            })
        } else {
            Err(self)
        }
    }

    fn typed_ptr<T: Element>(&self, index: usize) -> Result<*mut T, ShmError> {
        debug_assert_eq!(T::TYPECODE, self.typecode);
        self.element_ptr(index).map(|ptr| ptr as *mut T)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("typecode", &self.typecode.as_char())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Single typed element
pub struct Value<T: Element> {
    cell: Cell,
    _marker: PhantomData<T>,
}

impl<T: Element> Value<T> {
    fn ptr(&self) -> *mut T {
        // SAFETY: a value cell holds exactly one element of type T inside the block
        unsafe { self.cell.block.ptr_at(self.cell.offset) as *mut T }
    }

    pub fn get(&self) -> T {
        // SAFETY: typecode matches T, so size and alignment do too
        unsafe { ptr::read_volatile(self.ptr()) }
    }

    pub fn set(&mut self, value: T) {
        // SAFETY: typecode matches T, so size and alignment do too
        unsafe { ptr::write_volatile(self.ptr(), value) };
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn into_cell(self) -> Cell {
        self.cell
    }
}

impl<T: Element> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("typecode", &self.cell.typecode.as_char())
            .field("value", &self.get())
            .finish()
    }
}

/// Fixed-length typed array
pub struct Array<T: Element> {
    cell: Cell,
    _marker: PhantomData<T>,
}

impl<T: Element> Array<T> {
    pub fn len(&self) -> usize {
        self.cell.len
    }

    pub fn is_empty(&self) -> bool {
        self.cell.len == 0
    }

    pub fn get(&self, index: usize) -> Result<T, ShmError> {
        let ptr = self.cell.typed_ptr::<T>(index)?;
        // SAFETY: bounds checked; typecode matches T
        Ok(unsafe { ptr::read_volatile(ptr) })
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), ShmError> {
        let ptr = self.cell.typed_ptr::<T>(index)?;
        // SAFETY: bounds checked; typecode matches T
        unsafe { ptr::write_volatile(ptr, value) };
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).filter_map(|i| self.get(i).ok()).collect()
    }

    pub fn copy_from_slice(&mut self, values: &[T]) -> Result<(), ShmError> {
        if values.len() != self.len() {
            return Err(ShmError::LengthMismatch {
                expected: self.len(),
                actual: values.len(),
            });
        }
        for (index, value) in values.iter().enumerate() {
            self.set(index, *value)?;
        }
        Ok(())
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn into_cell(self) -> Cell {
        self.cell
    }
}

impl<T: Element> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("typecode", &self.cell.typecode.as_char())
            .field("values", &self.to_vec())
            .finish()
    }
}
