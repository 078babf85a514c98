/*!
 * Shared Blocks
 * Memory maps backing an arena
 *
 * A shared block maps an unnamed memory file with `MAP_SHARED`, so forked
 * children see the same pages. A private block is an anonymous map seen by
 * this process only. Both start zeroed and are unmapped on drop.
 */

use super::types::ShmError;
use crate::core::limits::MAX_BLOCK_SIZE;
use crate::core::types::Size;
use memmap2::{MmapMut, MmapOptions};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use std::fmt;
use std::fs::File;
use std::ptr::NonNull;
use tracing::debug;

/// Contiguous zero-initialised memory block
///
/// The block hands out raw pointers only; cells carved from it decide how
/// the bytes are typed. The base address is page aligned.
pub struct SharedBlock {
    ptr: NonNull<u8>,
    len: Size,
    shared: bool,
    _mmap: MmapMut,
}

// SAFETY: `ptr` points into the map owned by this value; all typed access
// goes through cells, which are `!Sync`.
unsafe impl Send for SharedBlock {}
unsafe impl Sync for SharedBlock {}

impl SharedBlock {
    /// Shared mapping of `len` bytes, inherited by forked children
    pub fn anonymous(len: Size) -> Result<Self, ShmError> {
        Self::check_len(len)?;
        let fd = memfd_create(c"conduit-arena", MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|errno| ShmError::Mapping(errno.to_string()))?;
        let file = File::from(fd);
        file.set_len(len as u64)
            .map_err(|e| ShmError::Mapping(e.to_string()))?;

        // SAFETY: the memory file is unnamed and owned here; nothing else
        // can resize or truncate it under the map
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| ShmError::Mapping(e.to_string()))?;

        debug!(len, "mapped shared block");
        Self::from_mmap(mmap, len, true)
    }

    /// Anonymous block for single-process use
    pub fn private(len: Size) -> Result<Self, ShmError> {
        Self::check_len(len)?;
        let mmap = MmapMut::map_anon(len).map_err(|e| ShmError::Mapping(e.to_string()))?;

        debug!(len, "mapped private block");
        Self::from_mmap(mmap, len, false)
    }

    fn from_mmap(mut mmap: MmapMut, len: Size, shared: bool) -> Result<Self, ShmError> {
        let ptr = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| ShmError::Mapping("map returned a null base".into()))?;
        Ok(Self {
            ptr,
            len,
            shared,
            _mmap: mmap,
        })
    }

    fn check_len(len: Size) -> Result<(), ShmError> {
        if len == 0 || len > MAX_BLOCK_SIZE {
            return Err(ShmError::InvalidSize {
                size: len,
                max: MAX_BLOCK_SIZE,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> Size {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True for mappings visible to forked children
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Pointer to `offset` bytes into the block
    ///
    /// # Safety
    /// `offset` must be within the block.
    pub(crate) unsafe fn ptr_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.len);
        self.ptr.as_ptr().add(offset)
    }
}

impl fmt::Debug for SharedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBlock")
            .field("base", &format_args!("0x{:x}", self.base_addr()))
            .field("len", &self.len)
            .field("shared", &self.shared)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::BLOCK_BASE_ALIGN;

    #[test]
    fn test_blocks_are_zeroed_and_aligned() {
        for block in [SharedBlock::anonymous(256).unwrap(), SharedBlock::private(256).unwrap()] {
            assert_eq!(block.len(), 256);
            assert_eq!(block.base_addr() % BLOCK_BASE_ALIGN, 0);
            let bytes = unsafe { std::slice::from_raw_parts(block.ptr_at(0), block.len()) };
            assert!(bytes.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_shared_flag() {
        assert!(SharedBlock::anonymous(64).unwrap().is_shared());
        assert!(!SharedBlock::private(64).unwrap().is_shared());
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            SharedBlock::private(0),
            Err(ShmError::InvalidSize { size: 0, .. })
        ));
        assert!(SharedBlock::anonymous(MAX_BLOCK_SIZE + 1).is_err());
    }
}
