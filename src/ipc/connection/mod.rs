/*!
 * Connection Module
 * Length-prefixed message channels
 */

pub mod connection;
pub mod framing;

// Re-export public API
pub use connection::{Connection, ConnectionId, ConnectionStats};
pub use framing::{decode_header, FrameHeader, FrameStatus, Inbox};
