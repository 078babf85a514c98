/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

pub use super::config::ConfigError;
pub use super::serialization::bincode::BincodeError;
pub use crate::ipc::shm::ShmError;
pub use crate::ipc::types::IpcError;

/// Unified error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum ConduitError {
    #[error("IPC error: {0}")]
    #[diagnostic(transparent)]
    Ipc(#[from] IpcError),

    #[error("Shared memory error: {0}")]
    #[diagnostic(transparent)]
    Shm(#[from] ShmError),

    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl ConduitError {
    /// True for every member of the closed-handle family
    pub fn is_closed(&self) -> bool {
        matches!(self, ConduitError::Ipc(e) if e.is_closed())
    }

    /// True when the peer closed with nothing left to read
    pub fn is_eof(&self) -> bool {
        matches!(self, ConduitError::Ipc(IpcError::Eof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_classification() {
        let err: ConduitError = IpcError::NotWritable.into();
        assert!(err.is_closed());
        assert!(!err.is_eof());

        let err: ConduitError = IpcError::Eof.into();
        assert!(err.is_eof());

        let err: ConduitError = ShmError::IndexOutOfRange { index: 10, len: 10 }.into();
        assert!(!err.is_closed());
        assert_eq!(
            err.to_string(),
            "Shared memory error: Index 10 out of range for array of length 10"
        );
    }
}
