/*!
 * Serialization Utilities
 *
 * - Bincode for objects sent over connections (`send_obj` / `recv_obj`)
 * - Serde helpers for skipping default fields in stats output
 */

pub mod bincode;
pub mod serde;

// Re-export commonly used functions
pub use bincode::{from_slice as from_bincode, to_vec as to_bincode, BincodeError, BincodeResult};
pub use serde::{is_false, is_zero_usize};
