/*!
 * Binary Serialization with bincode
 * Object encoding for values sent over connections
 *
 * Connections only move bytes; `send_obj` / `recv_obj` route typed values
 * through these helpers.
 */

use serde::{de::DeserializeOwned, Serialize};

/// Result type for bincode operations
pub type BincodeResult<T> = Result<T, BincodeError>;

/// Binary serialization errors with context
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BincodeError {
    #[error("Serialization failed: {context}")]
    Serialization {
        context: &'static str,
        #[source]
        source: Box<bincode::ErrorKind>,
    },

    #[error("Deserialization failed: {context}")]
    Deserialization {
        context: &'static str,
        #[source]
        source: Box<bincode::ErrorKind>,
    },
}

/// Serialize to binary bytes using bincode
#[inline]
pub fn to_vec<T: Serialize>(value: &T) -> BincodeResult<Vec<u8>> {
    bincode::serialize(value).map_err(|source| BincodeError::Serialization {
        context: "object serialization",
        source,
    })
}

/// Deserialize from binary bytes using bincode
///
/// Matches the output of `to_vec()`.
#[inline]
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> BincodeResult<T> {
    bincode::deserialize(bytes).map_err(|source| BincodeError::Deserialization {
        context: "object deserialization",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Job {
        id: u32,
        args: Vec<String>,
    }

    #[test]
    fn test_object_round_trip() {
        let job = Job {
            id: 7,
            args: vec!["--fast".into()],
        };
        let bytes = to_vec(&job).unwrap();
        let decoded: Job = from_slice(&bytes).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_truncated_input_fails() {
        let bytes = to_vec(&42u64).unwrap();
        let result: BincodeResult<u64> = from_slice(&bytes[..3]);
        assert!(matches!(result, Err(BincodeError::Deserialization { .. })));
    }
}
