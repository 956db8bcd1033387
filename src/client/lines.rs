//! Module `lines`
//!
//! Bounded line framing for the inbound side of a connection. At most
//! `max_line_length` bytes of an unfinished line are ever buffered; the rest
//! of an oversized line is discarded up to its terminator.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::client::state::Inbound;

const READ_CHUNK: usize = 4096;

/// A line exceeded the configured limit and was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTooLong;

pub struct LineReader<R> {
    reader: R,
    codec: LinesCodec,
    buffer: BytesMut,
    eof: bool,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            reader,
            codec: LinesCodec::new_with_max_length(max_line_length),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Reads the next line with its `\n` or `\r\n` removed.
    ///
    /// An unterminated fragment before end of stream is returned as a line.
    /// Invalid UTF-8 surfaces as `Inbound::Error(InvalidData)`.
    pub async fn recv(&mut self) -> Result<Inbound, LineTooLong> {
        loop {
            let decoded = if self.eof {
                self.codec.decode_eof(&mut self.buffer)
            } else {
                self.codec.decode(&mut self.buffer)
            };

            match decoded {
                Ok(Some(line)) => return Ok(Inbound::Data(line)),
                Ok(None) if self.eof => return Ok(Inbound::Closed),
                Ok(None) => {}
                Err(LinesCodecError::MaxLineLengthExceeded) => return Err(LineTooLong),
                Err(LinesCodecError::Io(e)) => return Ok(Inbound::Error(e.kind())),
            }

            self.buffer.reserve(READ_CHUNK);
            match self.reader.read_buf(&mut self.buffer).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(e) => return Ok(Inbound::Error(e.kind())),
            }
        }
    }

    /// Bytes currently held for lines not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}
