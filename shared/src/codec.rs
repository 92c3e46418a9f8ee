//! Newline framing for the chat byte stream

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Longest line accepted by default (64 KiB, terminator excluded)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits a byte stream into lines
///
/// Bytes are buffered until a `\n` arrives, so a line split across several
/// reads is only yielded once it is complete. The terminator and a single
/// `\r` right before it are stripped; everything else is passed through
/// untouched, backspaces included.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    // Where to resume scanning for the terminator
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of a line once a single trailing `\r` is discounted
fn content_length(line: &[u8]) -> usize {
    match line.last() {
        Some(b'\r') => line.len() - 1,
        _ => line.len(),
    }
}

fn strip_carriage_return(mut line: BytesMut) -> Bytes {
    if line.ends_with(b"\r") {
        line.truncate(line.len() - 1);
    }
    line.freeze()
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.next_index.min(src.len());

        if let Some(offset) = src[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            self.next_index = 0;

            if content_length(&src[..end]) > self.max_length {
                return Err(CodecError::LineTooLong {
                    max: self.max_length,
                });
            }

            let mut line = src.split_to(end + 1);
            line.truncate(end);
            return Ok(Some(strip_carriage_return(line)));
        }

        // A trailing `\r` may still turn out to be part of the terminator
        if content_length(&src[..]) > self.max_length {
            return Err(CodecError::LineTooLong {
                max: self.max_length,
            });
        }

        self.next_index = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // The peer is gone, so whatever is left is the final line
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let line = src.split_to(src.len());
        Ok(Some(strip_carriage_return(line)))
    }
}
