use std::backtrace::BacktraceStatus;

use thiserror::Error as ThisError;

use super::{Response, Status};
use crate::property::PropertyMap;

/// Marker fault for access violations.
///
/// Controllers return it (directly or wrapped in `anyhow`) to have the fault
/// answered with 403 instead of 500.
#[derive(Debug, ThisError)]
#[error("access denied: {0}")]
pub struct AccessDenied(pub String);

/// Fault category, deciding the status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Internal,
    Forbidden,
}

impl ErrorKind {
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::Internal => 500,
            ErrorKind::Forbidden => 403,
        }
    }
}

/// Controller fault, carried as either a message or a cause.
///
/// When both are present the cause is what gets rendered.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    cause: Option<anyhow::Error>,
    pub(super) properties: PropertyMap,
}

const STYLESHEET: &str = "<style type=\"text/css\">\
.phasekit-fault{font-family:sans-serif;margin:1em;padding:1em;border:1px solid #c33;background:#fdf3f3}\
.phasekit-fault h1{font-size:1.4em;color:#c33;margin-top:0}\
.phasekit-fault ol{padding-left:1.2em}\
.phasekit-fault pre{font-size:0.85em;overflow:auto;background:#fff;padding:0.5em}\
</style>";

impl Error {
    fn build(kind: ErrorKind, message: Option<String>, cause: Option<anyhow::Error>) -> Self {
        Self {
            kind,
            message,
            cause,
            properties: PropertyMap::new(),
        }
    }

    /// Internal fault from a cause; access faults ([`AccessDenied`]) map to 403
    pub fn from_cause(cause: impl Into<anyhow::Error>) -> Self {
        let cause = cause.into();
        let kind = if cause.downcast_ref::<AccessDenied>().is_some() {
            ErrorKind::Forbidden
        } else {
            ErrorKind::Internal
        };
        Self::build(kind, None, Some(cause))
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Internal, Some(message.into()), None)
    }

    pub fn forbidden(cause: impl Into<anyhow::Error>) -> Self {
        Self::build(ErrorKind::Forbidden, None, Some(cause.into()))
    }

    pub fn forbidden_message(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Forbidden, Some(message.into()), None)
    }

    pub fn forbidden_with(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::build(ErrorKind::Forbidden, Some(message.into()), Some(cause.into()))
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// Message as given, or the cause's top-level message
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.cause.as_ref().map(ToString::to_string))
    }

    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    /// HTML-escaped message
    #[must_use]
    pub fn html_message(&self) -> Option<String> {
        self.message
            .as_deref()
            .map(|m| html_escape::encode_text(m).into_owned())
    }

    /// Translate into a status-family response.
    ///
    /// Terse mode yields an empty body with the mapped code. Verbose mode
    /// renders an HTML page with the cause chain, or the escaped message when
    /// there is no cause.
    #[must_use]
    pub fn as_status(&self, verbose: bool) -> Response {
        let status = Status::new(self.code());
        if !verbose {
            return Response::Status(status);
        }
        let mut html = String::with_capacity(1024);
        html.push_str(STYLESHEET);
        html.push_str("<div class=\"phasekit-fault\"><h1>Something went wrong</h1>");
        if let Some(cause) = &self.cause {
            render_cause(&mut html, cause);
        } else if let Some(message) = self.html_message() {
            html.push_str("<p>");
            html.push_str(&message);
            html.push_str("</p>");
        }
        html.push_str("</div>");
        Response::Content(status.content(html).with_mime_type("text/html"))
    }
}

fn render_cause(html: &mut String, cause: &anyhow::Error) {
    html.push_str("<ol class=\"causes\">");
    for (depth, link) in cause.chain().enumerate() {
        let text = html_escape::encode_text(&link.to_string()).into_owned();
        if depth == 0 {
            html.push_str("<li><strong>");
            html.push_str(&text);
            html.push_str("</strong></li>");
        } else {
            html.push_str("<li>caused by: ");
            html.push_str(&text);
            html.push_str("</li>");
        }
    }
    html.push_str("</ol>");
    let backtrace = cause.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        let trace = html_escape::encode_text(&backtrace.to_string()).into_owned();
        html.push_str("<pre>");
        html.push_str(&trace);
        html.push_str("</pre>");
    }
}
