/*!
 * Endpoint Module
 * Transports underneath connections
 */

pub mod emulated;
pub mod native;
pub mod traits;

// Re-export public API
pub use emulated::EmulatedEndpoint;
pub use native::NativeEndpoint;
pub use traits::Endpoint;
