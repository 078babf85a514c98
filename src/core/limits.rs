/*!
 * Limits and Constants
 *
 * Centralized location for transport, framing and arena limits.
 */

// =============================================================================
// FRAMING
// =============================================================================

/// Length of the short frame header (big-endian i32)
pub const FRAME_HEADER_LEN: usize = 4;

/// Length of the long frame header (-1 sentinel followed by a big-endian u64)
pub const LONG_FRAME_HEADER_LEN: usize = 12;

/// Sentinel announcing a long frame header
pub const LONG_FRAME_SENTINEL: i32 = -1;

/// Frames up to this size are written header and payload in one call
/// [PERF] Avoids a second syscall for the common small-message case
pub const COALESCE_FRAME_MAX: usize = 16 * 1024;

/// Default upper bound on an accepted frame (256MB)
/// Guards against corrupt headers allocating unbounded buffers
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 256 * 1024 * 1024;

/// Scratch buffer used when pulling bytes off a transport
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// TRANSPORTS
// =============================================================================

/// Default ring capacity of the emulated transport (64KB)
/// [LINUX-COMPAT] Matches the default pipe buffer size on Linux
pub const DEFAULT_EMULATED_CAPACITY: usize = 64 * 1024;

/// Smallest ring capacity accepted for the emulated transport
pub const MIN_EMULATED_CAPACITY: usize = 16;

/// Largest ring capacity accepted for the emulated transport (64MB)
pub const MAX_EMULATED_CAPACITY: usize = 64 * 1024 * 1024;

// =============================================================================
// SHARED ARENA
// =============================================================================

/// Alignment guaranteed for the base of every shared block
/// Covers the strictest element alignment in the typecode table
pub const BLOCK_BASE_ALIGN: usize = 16;

/// Largest shared block accepted (1GB)
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024 * 1024;
