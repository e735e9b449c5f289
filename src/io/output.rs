use std::io::Write;

use tracing::{debug, warn};

use super::{Charset, Chunk, Stream, StreamError};

/// Sink encoding chunks onto a byte writer.
///
/// Text is encoded with the configured [`Charset`]; bytes pass through.
/// Property chunks are not data and are skipped, bridges read them before the
/// body reaches this sink.
pub struct OutputStream<W: Write> {
    charset: Charset,
    writer: W,
    scratch: Vec<u8>,
    closed: bool,
    written: usize,
}

impl<W: Write> OutputStream<W> {
    pub fn new(charset: Charset, writer: W) -> Self {
        Self {
            charset,
            writer,
            scratch: Vec::new(),
            closed: false,
            written: 0,
        }
    }

    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Bytes written so far
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Stream for OutputStream<W> {
    fn provide(&mut self, chunk: Chunk) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        match chunk {
            Chunk::Text(text) => {
                self.scratch.clear();
                self.charset.encode_into(&text, &mut self.scratch);
                self.writer.write_all(&self.scratch)?;
                self.written += self.scratch.len();
            }
            Chunk::Bytes(bytes) => {
                self.writer.write_all(&bytes)?;
                self.written += bytes.len();
            }
            Chunk::Property(p) => {
                debug!(property = %p.key(), "output stream skipping property chunk");
            }
        }
        Ok(())
    }

    fn close(&mut self, error: Option<&StreamError>) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(e) = error {
            warn!(error = %e, written = self.written, "output stream closed on error");
        }
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "output stream flush failed");
        }
    }
}
