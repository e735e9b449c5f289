use std::fmt;
use std::io::Read;

use tracing::debug;

use super::{Chunk, PropertyChunk, Stream, StreamError};
use crate::property::PropertyMap;

/// Block size used when reading lazily from a byte source
pub const READ_BLOCK_SIZE: usize = 8 * 1024;

/// In-memory chunk sequence.
///
/// Works both as a builder (`append`) and as a [`Stream`] sink collecting
/// whatever another producer sends.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Chunk>,
    closed: bool,
    error: Option<String>,
}

impl ChunkBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn append(mut self, chunk: Chunk) -> Self {
        self.chunks.push(chunk);
        self
    }

    pub fn push(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Whether `close` has been received while acting as a sink
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Error message received with `close`, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Concatenated text chunks, ignoring bytes and properties
    #[must_use]
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Finish building and hand the sequence over as a body
    #[must_use]
    pub fn into_streamable(self) -> Streamable {
        Streamable::from_chunks(self.chunks)
    }
}

impl Stream for ChunkBuffer {
    fn provide(&mut self, chunk: Chunk) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.chunks.push(chunk);
        Ok(())
    }

    fn close(&mut self, error: Option<&StreamError>) {
        self.closed = true;
        self.error = error.map(ToString::to_string);
    }
}

enum Source {
    Chunks(std::vec::IntoIter<Chunk>),
    Reader(Box<dyn Read + Send>),
    Exhausted,
}

/// Finite, ordered sequence of chunks produced once.
///
/// Character and byte payloads are buffered; a reader is consumed lazily in
/// [`READ_BLOCK_SIZE`] blocks so large bodies never sit fully in memory.
pub struct Streamable {
    source: Source,
}

impl Streamable {
    #[must_use]
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self {
            source: Source::Chunks(chunks.into_iter()),
        }
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            source: Source::Reader(Box::new(reader)),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            source: Source::Exhausted,
        }
    }

    /// Produce the next chunk; `None` once the sequence is exhausted or closed
    pub fn next_chunk(&mut self) -> Option<Result<Chunk, StreamError>> {
        match &mut self.source {
            Source::Chunks(iter) => {
                let next = iter.next();
                if next.is_none() {
                    self.source = Source::Exhausted;
                }
                next.map(Ok)
            }
            Source::Reader(reader) => {
                let mut block = vec![0u8; READ_BLOCK_SIZE];
                loop {
                    match reader.read(&mut block) {
                        Ok(0) => {
                            self.source = Source::Exhausted;
                            return None;
                        }
                        Ok(n) => {
                            block.truncate(n);
                            return Some(Ok(Chunk::Bytes(block)));
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            self.source = Source::Exhausted;
                            return Some(Err(StreamError::Io(e)));
                        }
                    }
                }
            }
            Source::Exhausted => None,
        }
    }

    /// Stop producing and release the underlying source
    pub fn close(&mut self) {
        if !matches!(self.source, Source::Exhausted) {
            debug!("streamable closed before exhaustion");
        }
        self.source = Source::Exhausted;
    }

    /// Send every remaining chunk to `stream`, then close it
    pub fn send(mut self, stream: &mut dyn Stream) -> Result<(), StreamError> {
        while let Some(next) = self.next_chunk() {
            let result = next.and_then(|chunk| stream.provide(chunk));
            if let Err(e) = result {
                self.close();
                stream.close(Some(&e));
                return Err(e);
            }
        }
        stream.close(None);
        Ok(())
    }

    /// Drain into a byte vector, encoding text as UTF-8
    pub fn into_bytes(mut self) -> Result<Vec<u8>, StreamError> {
        let mut out = Vec::new();
        while let Some(next) = self.next_chunk() {
            match next? {
                Chunk::Text(t) => out.extend_from_slice(t.as_bytes()),
                Chunk::Bytes(b) => out.extend_from_slice(&b),
                Chunk::Property(_) => {}
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for Streamable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Chunks(iter) => format!("buffered({})", iter.len()),
            Source::Reader(_) => "reader".to_string(),
            Source::Exhausted => "exhausted".to_string(),
        };
        write!(f, "Streamable({kind})")
    }
}

impl From<String> for Streamable {
    fn from(s: String) -> Self {
        Self::from_chunks(vec![Chunk::Text(s)])
    }
}

impl From<&str> for Streamable {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Vec<u8>> for Streamable {
    fn from(b: Vec<u8>) -> Self {
        Self::from_chunks(vec![Chunk::Bytes(b)])
    }
}

impl From<&[u8]> for Streamable {
    fn from(b: &[u8]) -> Self {
        Self::from(b.to_vec())
    }
}

impl From<ChunkBuffer> for Streamable {
    fn from(buffer: ChunkBuffer) -> Self {
        buffer.into_streamable()
    }
}

/// Chunk sequence for a status-family response: every property first, then
/// the body data, if any.
pub struct ResponseStream {
    properties: std::vec::IntoIter<Chunk>,
    body: Option<Streamable>,
    closed: bool,
}

impl ResponseStream {
    pub(crate) fn new(properties: &PropertyMap, body: Option<Streamable>) -> Self {
        let properties: Vec<Chunk> = properties
            .iter()
            .map(|(key, value)| Chunk::Property(PropertyChunk::new(key, std::sync::Arc::clone(value))))
            .collect();
        Self {
            properties: properties.into_iter(),
            body,
            closed: false,
        }
    }

    /// Stop the sequence and release the body source
    pub fn close(&mut self) {
        self.closed = true;
        if let Some(mut body) = self.body.take() {
            body.close();
        }
    }

    /// Send the whole sequence to `stream`.
    ///
    /// The sink is closed with `None` after the last chunk, or with the error
    /// that stopped the transfer.
    pub fn send(mut self, stream: &mut dyn Stream) -> Result<(), StreamError> {
        while let Some(next) = self.next() {
            let result = next.and_then(|chunk| stream.provide(chunk));
            if let Err(e) = result {
                self.close();
                stream.close(Some(&e));
                return Err(e);
            }
        }
        stream.close(None);
        Ok(())
    }
}

impl Iterator for ResponseStream {
    type Item = Result<Chunk, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        if let Some(chunk) = self.properties.next() {
            return Some(Ok(chunk));
        }
        match self.body.as_mut().and_then(Streamable::next_chunk) {
            Some(item) => Some(item),
            None => {
                self.closed = true;
                self.body = None;
                None
            }
        }
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("pending_properties", &self.properties.len())
            .field("body", &self.body)
            .field("closed", &self.closed)
            .finish()
    }
}
