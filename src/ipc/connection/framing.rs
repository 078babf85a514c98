/*!
 * Message Framing
 *
 * Every message is a length-prefixed frame:
 *
 * ```text
 * short:  [ len: i32 BE ][ payload ]                 len <= i32::MAX
 * long:   [ -1:  i32 BE ][ len: u64 BE ][ payload ]
 * ```
 */

use crate::core::limits::{FRAME_HEADER_LEN, LONG_FRAME_HEADER_LEN, LONG_FRAME_SENTINEL};
use crate::ipc::types::{IpcError, IpcResult};
use bytes::{Buf, Bytes, BytesMut};

/// Encoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    bytes: [u8; LONG_FRAME_HEADER_LEN],
    len: usize,
}

impl FrameHeader {
    pub fn for_payload(payload_len: usize) -> Self {
        let mut bytes = [0u8; LONG_FRAME_HEADER_LEN];
        match i32::try_from(payload_len) {
            Ok(short) => {
                bytes[..FRAME_HEADER_LEN].copy_from_slice(&short.to_be_bytes());
                Self {
                    bytes,
                    len: FRAME_HEADER_LEN,
                }
            }
            Err(_) => {
                bytes[..FRAME_HEADER_LEN].copy_from_slice(&LONG_FRAME_SENTINEL.to_be_bytes());
                bytes[FRAME_HEADER_LEN..].copy_from_slice(&(payload_len as u64).to_be_bytes());
                Self {
                    bytes,
                    len: LONG_FRAME_HEADER_LEN,
                }
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Decode a frame header from the front of `buf`
///
/// Returns `(header_len, payload_len)`, or `None` while the header is incomplete.
pub fn decode_header(buf: &[u8]) -> IpcResult<Option<(usize, u64)>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let mut prefix = [0u8; FRAME_HEADER_LEN];
    prefix.copy_from_slice(&buf[..FRAME_HEADER_LEN]);

    match i32::from_be_bytes(prefix) {
        LONG_FRAME_SENTINEL => {
            if buf.len() < LONG_FRAME_HEADER_LEN {
                return Ok(None);
            }
            let mut long = [0u8; 8];
            long.copy_from_slice(&buf[FRAME_HEADER_LEN..LONG_FRAME_HEADER_LEN]);
            Ok(Some((LONG_FRAME_HEADER_LEN, u64::from_be_bytes(long))))
        }
        n if n < 0 => Err(IpcError::MalformedHeader(n)),
        n => Ok(Some((FRAME_HEADER_LEN, n as u64))),
    }
}

/// Next frame in the inbox, as seen without consuming it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Header or payload still partially buffered
    Partial,
    /// Whole frame buffered
    Complete { payload_len: u64 },
    /// Header announces more than the caller accepts
    TooLong { payload_len: u64 },
}

/// Read-ahead buffer between a transport and frame decoding
#[derive(Debug, Default)]
pub struct Inbox {
    buf: BytesMut,
    eof: bool,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Bytes buffered but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Classify the frame at the front against `max` payload bytes
    pub fn status(&self, max: usize) -> IpcResult<FrameStatus> {
        let Some((header_len, payload_len)) = decode_header(&self.buf)? else {
            return Ok(FrameStatus::Partial);
        };
        if payload_len > max as u64 {
            return Ok(FrameStatus::TooLong { payload_len });
        }
        if (self.buf.len() - header_len) as u64 >= payload_len {
            Ok(FrameStatus::Complete { payload_len })
        } else {
            Ok(FrameStatus::Partial)
        }
    }

    /// Remove and return the complete frame at the front
    pub fn take_frame(&mut self, max: usize) -> IpcResult<Option<Bytes>> {
        match self.status(max)? {
            FrameStatus::Complete { payload_len } => {
                let header_len = decode_header(&self.buf)?.map(|(h, _)| h).unwrap_or(0);
                self.buf.advance(header_len);
                Ok(Some(self.buf.split_to(payload_len as usize).freeze()))
            }
            _ => Ok(None),
        }
    }
}
