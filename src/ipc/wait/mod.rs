/*!
 * Wait Module
 * Readiness multiplexing across mixed connection backends and raw descriptors
 */

pub mod multiplexer;
pub mod selector;
pub mod signal;
pub mod source;

// Re-export public API
pub use multiplexer::{wait, Multiplexer, ReadinessFd, Waitable};
pub use selector::{PollSelector, Selector, SelectorKind};
pub use signal::{ReadySignal, Subscription, Wakeup};
pub use source::FdSource;
