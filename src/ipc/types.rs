/*!
 * IPC Types
 * Common types and errors for connections and the multiplexer
 */

use crate::core::serialization::bincode::BincodeError;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// IPC operation result
pub type IpcResult<T> = Result<T, IpcError>;

/// Unified IPC error type
#[derive(Debug, Error, Diagnostic)]
pub enum IpcError {
    #[error("Handle is closed")]
    #[diagnostic(
        code(ipc::closed),
        help("The connection was closed locally; open a new pipe.")
    )]
    Closed,

    #[error("Connection is write-only")]
    #[diagnostic(code(ipc::not_readable))]
    NotReadable,

    #[error("Connection is read-only")]
    #[diagnostic(code(ipc::not_writable))]
    NotWritable,

    #[error("End of file: peer closed the connection")]
    #[diagnostic(code(ipc::eof))]
    Eof,

    #[error("Got end of file during message ({buffered} bytes buffered)")]
    #[diagnostic(
        code(ipc::unexpected_eof),
        help("The peer closed in the middle of a frame.")
    )]
    UnexpectedEof { buffered: usize },

    #[error("Broken pipe: peer is no longer reading")]
    #[diagnostic(code(ipc::broken_pipe))]
    BrokenPipe,

    #[error("Bad message length: {len} (limit {max})")]
    #[diagnostic(
        code(ipc::bad_message_length),
        help("The announced frame is longer than the caller accepts.")
    )]
    BadMessageLength { len: u64, max: usize },

    #[error("Malformed frame header: {0}")]
    #[diagnostic(code(ipc::malformed_header))]
    MalformedHeader(i32),

    #[error("Buffer too short for {}-byte message", .message.len())]
    #[diagnostic(
        code(ipc::buffer_too_short),
        help("The message was consumed and is carried by this error.")
    )]
    BufferTooShort { message: Vec<u8> },

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(ipc::invalid_argument))]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(ipc::serialization))]
    Serialization(#[from] BincodeError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(ipc::io))]
    Io(#[from] std::io::Error),
}

impl IpcError {
    /// True for every member of the closed-handle family
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            IpcError::Closed | IpcError::NotReadable | IpcError::NotWritable
        )
    }

    /// Map a transport I/O error, folding EPIPE into `BrokenPipe`
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => IpcError::BrokenPipe,
            _ => IpcError::Io(err),
        }
    }
}

impl From<nix::errno::Errno> for IpcError {
    fn from(errno: nix::errno::Errno) -> Self {
        IpcError::from_io(std::io::Error::from(errno))
    }
}

/// Transport backing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// OS descriptors: socketpair(2), half-closed for simplex pipes
    Native,
    /// In-process ring buffers
    Emulated,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Emulated => "emulated",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = IpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "os" => Ok(Backend::Native),
            "emulated" | "memory" => Ok(Backend::Emulated),
            other => Err(IpcError::InvalidArgument(format!(
                "unknown backend: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("native".parse::<Backend>().unwrap(), Backend::Native);
        assert_eq!(" Emulated ".parse::<Backend>().unwrap(), Backend::Emulated);
        assert!("udp".parse::<Backend>().is_err());
        assert_eq!(Backend::Emulated.to_string(), "emulated");
    }

    #[test]
    fn test_closed_family() {
        assert!(IpcError::Closed.is_closed());
        assert!(IpcError::NotReadable.is_closed());
        assert!(IpcError::NotWritable.is_closed());
        assert!(!IpcError::Eof.is_closed());
    }

    #[test]
    fn test_broken_pipe_mapping() {
        let err = IpcError::from_io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(err, IpcError::BrokenPipe));

        let err = IpcError::from(nix::errno::Errno::EPIPE);
        assert!(matches!(err, IpcError::BrokenPipe));
    }
}
