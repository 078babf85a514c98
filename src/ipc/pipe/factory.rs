/*!
 * Pipe Factories
 * Linked connection pairs over either transport
 */

use crate::core::config::IpcConfig;
use crate::core::limits::{
    DEFAULT_EMULATED_CAPACITY, DEFAULT_MAX_MESSAGE_LEN, MAX_EMULATED_CAPACITY,
    MIN_EMULATED_CAPACITY,
};
use crate::ipc::connection::Connection;
use crate::ipc::endpoint::{EmulatedEndpoint, NativeEndpoint};
use crate::ipc::types::{Backend, IpcError, IpcResult};
use std::fmt;
use tracing::debug;

/// Creates linked connection pairs
///
/// Duplex pairs are symmetric. Simplex pairs are `(read end, write end)`.
/// Every factory honours the same ordering, framing and readiness
/// contracts, so callers cannot tell backends apart through `recv`/`wait`.
pub trait PipeFactory: Send + Sync + fmt::Debug {
    fn backend(&self) -> Backend;

    fn pipe(&self, duplex: bool) -> IpcResult<(Connection, Connection)>;
}

/// Build the factory selected by `config`
pub fn from_config(config: &IpcConfig) -> IpcResult<Box<dyn PipeFactory>> {
    Ok(match config.backend {
        Backend::Native => {
            Box::new(NativePipeFactory::new().with_max_message_len(config.max_message_len))
        }
        Backend::Emulated => Box::new(
            EmulatedPipeFactory::with_capacity(config.emulated_capacity)?
                .with_max_message_len(config.max_message_len),
        ),
    })
}

fn pair(a: Connection, b: Connection, duplex: bool) -> (Connection, Connection) {
    debug!(
        a = %a.id(),
        b = %b.id(),
        backend = %a.backend(),
        duplex,
        "created pipe"
    );
    (a, b)
}

/// Factory over OS descriptors
#[derive(Debug, Clone)]
pub struct NativePipeFactory {
    max_message_len: usize,
}

impl Default for NativePipeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl NativePipeFactory {
    pub fn new() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }
}

impl PipeFactory for NativePipeFactory {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    fn pipe(&self, duplex: bool) -> IpcResult<(Connection, Connection)> {
        let max = self.max_message_len;
        if duplex {
            let (a, b) = NativeEndpoint::socket_pair()?;
            Ok(pair(
                Connection::new(Box::new(a), true, true, max),
                Connection::new(Box::new(b), true, true, max),
                true,
            ))
        } else {
            let (rx, tx) = NativeEndpoint::pipe_pair()?;
            Ok(pair(
                Connection::new(Box::new(rx), true, false, max),
                Connection::new(Box::new(tx), false, true, max),
                false,
            ))
        }
    }
}

/// Factory over in-process ring buffers
#[derive(Debug, Clone)]
pub struct EmulatedPipeFactory {
    capacity: usize,
    max_message_len: usize,
}

impl Default for EmulatedPipeFactory {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EMULATED_CAPACITY,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

impl EmulatedPipeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose rings hold `capacity` bytes per direction
    pub fn with_capacity(capacity: usize) -> IpcResult<Self> {
        if !(MIN_EMULATED_CAPACITY..=MAX_EMULATED_CAPACITY).contains(&capacity) {
            return Err(IpcError::InvalidArgument(format!(
                "emulated capacity {} outside {}..={}",
                capacity, MIN_EMULATED_CAPACITY, MAX_EMULATED_CAPACITY
            )));
        }
        Ok(Self {
            capacity,
            ..Self::default()
        })
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl PipeFactory for EmulatedPipeFactory {
    fn backend(&self) -> Backend {
        Backend::Emulated
    }

    fn pipe(&self, duplex: bool) -> IpcResult<(Connection, Connection)> {
        let max = self.max_message_len;
        if duplex {
            let (a, b) = EmulatedEndpoint::duplex_pair(self.capacity);
            Ok(pair(
                Connection::new(Box::new(a), true, true, max),
                Connection::new(Box::new(b), true, true, max),
                true,
            ))
        } else {
            let (rx, tx) = EmulatedEndpoint::simplex_pair(self.capacity);
            Ok(pair(
                Connection::new(Box::new(rx), true, false, max),
                Connection::new(Box::new(tx), false, true, max),
                false,
            ))
        }
    }
}

/// Create a pipe over OS descriptors
pub fn make_pipe(duplex: bool) -> IpcResult<(Connection, Connection)> {
    NativePipeFactory::new().pipe(duplex)
}

/// Create a pipe over the chosen transport with default limits
pub fn make_pipe_with(backend: Backend, duplex: bool) -> IpcResult<(Connection, Connection)> {
    match backend {
        Backend::Native => NativePipeFactory::new().pipe(duplex),
        Backend::Emulated => EmulatedPipeFactory::new().pipe(duplex),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bounds() {
        assert!(EmulatedPipeFactory::with_capacity(MIN_EMULATED_CAPACITY).is_ok());
        assert!(matches!(
            EmulatedPipeFactory::with_capacity(1),
            Err(IpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_config_selects_backend() {
        let factory = from_config(&IpcConfig::emulated()).unwrap();
        assert_eq!(factory.backend(), Backend::Emulated);
        let factory = from_config(&IpcConfig::default()).unwrap();
        assert_eq!(factory.backend(), Backend::Native);
    }

    #[test]
    fn test_config_limit_reaches_connections() {
        let config = IpcConfig {
            max_message_len: 32,
            ..IpcConfig::emulated()
        };
        let (a, b) = from_config(&config).unwrap().pipe(true).unwrap();
        assert_eq!(a.max_message_len(), 32);
        a.send_bytes(&[0u8; 33]).unwrap();
        assert!(matches!(
            b.recv_bytes(),
            Err(IpcError::BadMessageLength { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_simplex_pair_roles() {
        for backend in [Backend::Native, Backend::Emulated] {
            let (rx, tx) = make_pipe_with(backend, false).unwrap();
            assert!(rx.readable() && !rx.writable());
            assert!(!tx.readable() && tx.writable());
            assert_eq!(rx.backend(), backend);
        }
    }
}
