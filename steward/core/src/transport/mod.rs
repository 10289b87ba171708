//! Gateway Bridge Transport
//!
//! The daemon does not hold the platform's gateway connection itself. A bridge
//! process forwards interaction events over a Unix socket and relays the
//! acknowledgments back to the platform.
//!
//! # Protocol
//!
//! ```text
//! bridge  --Interaction(event)------------------>  daemon
//! bridge  <--Reply { interaction_id, reply }-----  daemon   (one per event)
//! bridge  --Ping-->  daemon  --Pong-->  bridge
//! ```
//!
//! Frames use the CRC32-checked codec in [`frame`].

pub mod frame;

pub use frame::{encode_frame, FrameDecoder, MAX_FRAME_SIZE};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::InteractionEvent;
use crate::messages::Reply;

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be serialized
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// A frame payload was not a valid message
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// Payload bytes do not match the header checksum
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum from the header
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// Frame length exceeds [`MAX_FRAME_SIZE`]
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Limit
        max: usize,
    },
}

impl TransportError {
    /// Whether the stream is still usable after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::Decode(_))
    }
}

/// Messages exchanged with the gateway bridge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    /// An interaction delivered by the platform
    Interaction(InteractionEvent),
    /// Acknowledgment for an interaction
    Reply {
        /// The interaction being answered
        interaction_id: String,
        /// What to show
        reply: Reply,
    },
    /// Liveness probe
    Ping,
    /// Liveness answer
    Pong,
}

/// Reads [`BridgeFrame`]s from a byte stream
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            chunk: vec![0; 8192],
        }
    }

    /// Next frame; `Ok(None)` on clean end of stream
    pub async fn read_frame(&mut self) -> Result<Option<BridgeFrame>, TransportError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.push(&self.chunk[..n]);
        }
    }
}

/// Encode and write one frame
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &BridgeFrame,
) -> Result<(), TransportError> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
