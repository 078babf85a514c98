/*!
 * Core Module
 * Configuration, limits, shared types and error handling
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod serialization;
pub mod types;

// Re-export for convenience
pub use config::{ConfigError, IpcConfig};
pub use errors::*;
pub use types::*;
