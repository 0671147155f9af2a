//! Message framing for the engine wire protocol.
//!
//! One JSON message per line. A batch's framed output travels inside a
//! single `execute_batch` response, so the per-message cap is effectively a
//! cap on the output of one batch; it is set by `engine.max_message_bytes`.
//! Blank lines between messages are skipped at this layer.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default per-message cap: 1 MiB.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_048_576;

/// Decodes inbound messages as raw JSON text and encodes outbound ones
/// from any `Serialize` value.
#[derive(Debug)]
pub struct EngineCodec {
    lines: LinesCodec,
    max_message_bytes: usize,
}

impl EngineCodec {
    /// Codec capped at [`DEFAULT_MAX_MESSAGE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Codec capped at `max_message_bytes` per inbound message.
    #[must_use]
    pub fn with_limit(max_message_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_message_bytes),
            max_message_bytes,
        }
    }

    /// Inbound message cap in bytes.
    #[must_use]
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    fn decode_with(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<String>> {
        loop {
            let next = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };
            match next.map_err(|err| self.codec_error(err))? {
                Some(line) if line.trim().is_empty() => {}
                other => return Ok(other),
            }
        }
    }

    fn codec_error(&self, err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
                "engine message exceeded {} bytes; raise engine.max_message_bytes \
                 or lower batch_size",
                self.max_message_bytes
            )),
            LinesCodecError::Io(err) => AppError::Io(err.to_string()),
        }
    }
}

impl Default for EngineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EngineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.decode_with(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.decode_with(src, true)
    }
}

impl<T: Serialize + ?Sized> Encoder<&T> for EngineCodec {
    type Error = AppError;

    fn encode(&mut self, message: &T, dst: &mut BytesMut) -> Result<()> {
        let encoded = serde_json::to_vec(message)?;
        dst.reserve(encoded.len() + 1);
        dst.extend_from_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }
}
