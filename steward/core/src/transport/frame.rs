//! Bridge Frame Codec
//!
//! Each frame is a JSON-encoded [`BridgeFrame`] behind an 8-byte header:
//!
//! ```text
//! +------------------+------------------+------------------------+
//! | payload len (4)  | CRC32 (4)        | JSON payload           |
//! | big-endian u32   | of payload only  | BridgeFrame            |
//! +------------------+------------------+------------------------+
//! ```
//!
//! The length is checked against [`MAX_FRAME_SIZE`] before anything is
//! buffered for the payload, and the checksum is verified before decoding.
//!
//! [`BridgeFrame`]: super::BridgeFrame

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::TransportError;

/// Largest accepted payload (1 MiB); interaction events are small
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length + checksum
pub const HEADER_LEN: usize = 8;

const INITIAL_CAPACITY: usize = 4096;

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(word)
}

/// Serialize `frame` into header + payload bytes
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, TransportError> {
    let payload = serde_json::to_vec(frame).map_err(|e| TransportError::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|_| payload.len() <= MAX_FRAME_SIZE)
        .ok_or(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        })?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Incremental decoder over a byte stream
///
/// Feed it whatever the socket returned with [`FrameDecoder::push`], then
/// call [`FrameDecoder::next_frame`] until it yields `None`.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    start: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            start: 0,
        }
    }

    /// Buffer more input
    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 && self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        } else if self.start > INITIAL_CAPACITY {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Next complete frame, or `None` when more input is needed
    ///
    /// A checksum or decode failure consumes the bad frame, so the stream
    /// stays aligned. An oversized length does not; the connection should be
    /// dropped.
    pub fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let pending = &self.buf[self.start..];
        if pending.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = read_u32(pending) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if pending.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let expected = read_u32(&pending[4..]);
        let payload = &pending[HEADER_LEN..HEADER_LEN + len];
        let actual = crc32fast::hash(payload);
        let decoded = if actual == expected {
            serde_json::from_slice(payload).map_err(|e| TransportError::Decode(e.to_string()))
        } else {
            Err(TransportError::ChecksumMismatch { expected, actual })
        };

        self.start += HEADER_LEN + len;
        decoded.map(Some)
    }
}
