//! # I/O Module
//!
//! Chunked output plumbing between responses and transport bridges.
//!
//! A response body is a [`Streamable`]: a finite sequence of [`Chunk`]s that is
//! either fully buffered or read lazily from a byte source. Bridges consume it
//! through the [`Stream`] sink trait.
//!
//! ## Chunk Kinds
//!
//! - [`Chunk::Property`] - a typed property value, sent before any data
//! - [`Chunk::Text`] - character data, encoded by the sink's [`Charset`]
//! - [`Chunk::Bytes`] - raw bytes, written as-is
//!
//! ## Sinks
//!
//! - [`ChunkBuffer`] - collects chunks in memory, and turns into a [`Streamable`]
//! - [`OutputStream`] - encodes onto any [`std::io::Write`]

mod output;
mod streamable;

pub use output::OutputStream;
pub use streamable::{ChunkBuffer, ResponseStream, Streamable, READ_BLOCK_SIZE};

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::property::{PropertyKey, PropertyType, PropertyValue};

/// Failures while producing or consuming a chunk sequence
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A chunk was provided after the sink was closed
    #[error("stream is closed")]
    Closed,
    /// The bridge rejected the response (headers already sent, invalid header value, ...)
    #[error("bridge error: {0}")]
    Bridge(String),
}

/// Character sets a sink can encode text into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Iso8859_1,
}

impl Charset {
    /// Canonical IANA name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Iso8859_1 => "ISO-8859-1",
        }
    }

    /// Append the encoded form of `text` to `out`.
    ///
    /// Characters outside ISO-8859-1 are written as `?`.
    pub fn encode_into(&self, text: &str, out: &mut Vec<u8>) {
        match self {
            Charset::Utf8 => out.extend_from_slice(text.as_bytes()),
            Charset::Iso8859_1 => {
                out.reserve(text.len());
                out.extend(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
            }
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Charset::Iso8859_1),
            other => Err(format!("unsupported charset: {other}")),
        }
    }
}

/// A property value travelling through a stream
#[derive(Clone)]
pub struct PropertyChunk {
    key: PropertyKey,
    value: PropertyValue,
}

impl PropertyChunk {
    #[must_use]
    pub fn new(key: PropertyKey, value: PropertyValue) -> Self {
        Self { key, value }
    }

    #[must_use]
    pub fn key(&self) -> PropertyKey {
        self.key
    }

    /// Typed access; `None` when the chunk belongs to another property type
    #[must_use]
    pub fn value_of<T: Any + Send + Sync>(&self, ty: &'static PropertyType<T>) -> Option<&T> {
        if self.key == ty.key() {
            self.value.downcast_ref::<T>()
        } else {
            None
        }
    }
}

impl fmt::Debug for PropertyChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyChunk({})", self.key)
    }
}

/// Unit of output
#[derive(Debug, Clone)]
pub enum Chunk {
    Property(PropertyChunk),
    Text(String),
    Bytes(Vec<u8>),
}

impl Chunk {
    pub fn text(s: impl Into<String>) -> Self {
        Chunk::Text(s.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Chunk::Bytes(b.into())
    }

    pub fn property<T: Any + Send + Sync>(ty: &'static PropertyType<T>, value: T) -> Self {
        Chunk::Property(PropertyChunk::new(ty.key(), std::sync::Arc::new(value)))
    }

    /// Whether this chunk carries response data rather than metadata
    #[must_use]
    pub fn is_data(&self) -> bool {
        !matches!(self, Chunk::Property(_))
    }
}

/// Sink for chunk sequences.
///
/// `close` is called exactly once per sequence: with `None` on normal completion,
/// or with the error that interrupted production.
pub trait Stream {
    fn provide(&mut self, chunk: Chunk) -> Result<(), StreamError>;
    fn close(&mut self, error: Option<&StreamError>);
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn provide(&mut self, chunk: Chunk) -> Result<(), StreamError> {
        (**self).provide(chunk)
    }

    fn close(&mut self, error: Option<&StreamError>) {
        (**self).close(error)
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn provide(&mut self, chunk: Chunk) -> Result<(), StreamError> {
        (**self).provide(chunk)
    }

    fn close(&mut self, error: Option<&StreamError>) {
        (**self).close(error)
    }
}
