//! # Bridge Module
//!
//! The seam between the dispatch core and a transport.
//!
//! A [`Bridge`] supplies the inbound [`Interaction`] and its container
//! properties, and accepts the finished response: a status, headers, a
//! redirect, or a streamed body. [`end`] performs that translation:
//!
//! | Response   | Transport                                                 |
//! |------------|-----------------------------------------------------------|
//! | `Redirect` | `send_redirect(location)`                                 |
//! | `View`     | `send_redirect(view.url())`                               |
//! | `Status`   | status + `HEADER` properties, empty body                  |
//! | `Body`     | status + headers + body streamed through `create_stream`  |
//! | `Content`  | as `Body`                                                 |
//! | `Error`    | `as_status(verbose)`, then as above                       |
//!
//! The body charset is the response's `ENCODING` property, or the bridge's
//! request encoding when unset.

mod http;

pub use self::http::HttpBridge;

use tracing::debug;

use crate::controller::Phase;
use crate::dispatcher::Interaction;
use crate::io::{Charset, ResponseStream, Stream, StreamError};
use crate::property::{PropertyMap, ENCODING, HEADER, MIME_TYPE};
use crate::response::{Response, WithProperties};

pub trait Bridge {
    fn interaction(&self) -> &Interaction;

    fn phase(&self) -> Phase {
        self.interaction().phase()
    }

    /// Container property; the core reads these but never changes them
    fn property(&self, name: &str) -> Option<&str> {
        self.interaction().property(name)
    }

    /// Encoding used for bodies that do not choose one
    fn request_encoding(&self) -> Charset;

    fn set_status(&mut self, code: u16);

    fn set_header(&mut self, name: &str, value: &str);

    fn send_redirect(&mut self, location: &str) -> Result<(), StreamError>;

    /// Sink for the response body
    fn create_stream(
        &mut self,
        mime_type: Option<&str>,
        charset: Charset,
    ) -> Result<Box<dyn Stream + '_>, StreamError>;
}

fn apply_headers(bridge: &mut dyn Bridge, properties: &PropertyMap) {
    for header in properties.values(&HEADER) {
        for value in &header.values {
            bridge.set_header(&header.name, value);
        }
    }
}

fn send_body(
    bridge: &mut dyn Bridge,
    code: u16,
    properties: &PropertyMap,
    body: ResponseStream,
) -> Result<(), StreamError> {
    bridge.set_status(code);
    apply_headers(bridge, properties);
    let mime_type = properties.value(&MIME_TYPE).cloned();
    let charset = properties
        .value(&ENCODING)
        .copied()
        .unwrap_or_else(|| bridge.request_encoding());
    debug!(
        status = code,
        mime_type = ?mime_type,
        charset = %charset,
        "Streaming response"
    );
    let mut stream = bridge.create_stream(mime_type.as_deref(), charset)?;
    body.send(&mut *stream)
}

/// Hand a finished response to `bridge`.
///
/// # Errors
///
/// Failures of the bridge's stream; the stream has been closed with the
/// error by then.
pub fn end(bridge: &mut dyn Bridge, response: Response, verbose: bool) -> Result<(), StreamError> {
    match response {
        Response::Redirect(redirect) => {
            apply_headers(bridge, redirect.properties());
            bridge.send_redirect(redirect.location())
        }
        Response::View(view) => {
            apply_headers(bridge, view.properties());
            bridge.send_redirect(&view.url())
        }
        // as_status yields a Status or Content, never another Error
        Response::Error(error) => end(bridge, error.as_status(verbose), verbose),
        Response::Status(status) => {
            let properties = status.properties().clone();
            send_body(bridge, status.code(), &properties, status.streamable())
        }
        Response::Body(body) => {
            let properties = body.properties().clone();
            send_body(bridge, body.code(), &properties, body.streamable())
        }
        Response::Content(content) => {
            let properties = content.properties().clone();
            send_body(bridge, content.code(), &properties, content.streamable())
        }
    }
}
