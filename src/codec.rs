//! Line framing for chat protocol connections.
//!
//! The wire format is a stream of text lines terminated by `\r\n` (servers
//! occasionally send bare `\n`). [`LineCodec`] splits the inbound stream into
//! `String` lines and appends the terminator to outbound lines.
//!
//! # Error Handling
//!
//! Inbound lines longer than the configured maximum are discarded up to the
//! next terminator and logged; the stream keeps going. Bytes that are not
//! valid UTF-8 are replaced rather than rejected, because legacy clients still
//! send Latin-1 text. Outbound lines that are too long or carry an embedded
//! line break fail with [`CodecError`].

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub mod error;

pub use error::{CodecError, FramingError};

/// Classic protocol line limit, including the terminator.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 512;

/// Upper bound accepted by [`LineCodec::new`]: 8 KiB of message tags on top
/// of the classic limit.
pub const MAX_LINE_LENGTH: usize = 8192 + DEFAULT_MAX_LINE_LENGTH;

const TERMINATOR: &[u8] = b"\r\n";

/// Codec turning a byte stream into protocol lines.
#[derive(Clone, Debug)]
pub struct LineCodec {
    max_line_length: usize,
    /// Set while skipping the remainder of an oversized line.
    discarding: bool,
    /// Offset up to which the buffer is known to contain no terminator.
    next_index: usize,
}

impl LineCodec {
    /// Create a codec accepting lines up to `max_line_length` bytes,
    /// clamped to `[DEFAULT_MAX_LINE_LENGTH, MAX_LINE_LENGTH]`.
    #[must_use]
    pub fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length: max_line_length.clamp(DEFAULT_MAX_LINE_LENGTH, MAX_LINE_LENGTH),
            discarding: false,
            next_index: 0,
        }
    }

    /// Maximum accepted line length in bytes.
    #[must_use]
    pub fn max_line_length(&self) -> usize { self.max_line_length }
}

impl Default for LineCodec {
    fn default() -> Self { Self::new(MAX_LINE_LENGTH) }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let search = src.get(self.next_index..).unwrap_or_default();
            let Some(offset) = search.iter().position(|byte| *byte == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_line_length + TERMINATOR.len() {
                    tracing::warn!(
                        size = src.len(),
                        max = self.max_line_length,
                        "discarding oversized inbound line"
                    );
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                }
                return Ok(None);
            };
            let end = self.next_index + offset + 1;
            self.next_index = 0;
            let line = src.split_to(end);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line_length + TERMINATOR.len() {
                tracing::warn!(
                    size = line.len(),
                    max = self.max_line_length,
                    "discarding oversized inbound line"
                );
                continue;
            }
            return Ok(Some(decode_line(&line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }
        // A final unterminated line is still a line.
        let line = src.split();
        Ok(Some(decode_line(&line)))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref();
        if line.bytes().any(|byte| byte == b'\r' || byte == b'\n') {
            return Err(FramingError::EmbeddedLineBreak.into());
        }
        if line.len() + TERMINATOR.len() > self.max_line_length {
            return Err(FramingError::OversizedLine {
                size: line.len() + TERMINATOR.len(),
                max: self.max_line_length,
            }
            .into());
        }
        dst.reserve(line.len() + TERMINATOR.len());
        dst.put_slice(line.as_bytes());
        dst.put_slice(TERMINATOR);
        crate::metrics::inc_lines(crate::metrics::Direction::Outbound);
        Ok(())
    }
}
