use std::str::FromStr;

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::{Method, Request, Response as HttpResponse, StatusCode};
use tracing::warn;

use super::Bridge;
use crate::controller::Phase;
use crate::dispatcher::{DispatchError, Interaction, InteractionId, PHASE_PARAMETER};
use crate::io::{Charset, OutputStream, Stream, StreamError};

/// Header carrying a caller-supplied interaction id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// In-memory bridge over the `http` crate types
#[derive(Debug)]
pub struct HttpBridge {
    interaction: Interaction,
    request_encoding: Charset,
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

fn charset_param(content_type: &str) -> Option<Charset> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case("charset"))
        .and_then(|(_, v)| Charset::from_str(v.trim_matches('"')).ok())
}

/// Media type without parameters, matched case-insensitively
fn is_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

fn header<'r, B>(request: &'r Request<B>, name: &str) -> Option<&'r str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

impl HttpBridge {
    #[must_use]
    pub fn new(interaction: Interaction) -> Self {
        Self {
            interaction,
            request_encoding: Charset::Iso8859_1,
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Bridge for an HTTP request, with ISO-8859-1 as the default encoding.
    ///
    /// `GET` and `HEAD` are VIEW interactions, other methods ACTION; a
    /// `phase` query parameter overrides this. Query pairs, then urlencoded
    /// form pairs, become parameters. Request headers become container
    /// properties.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidTarget`] for a malformed `method` parameter
    /// or an unknown `phase`.
    pub fn from_request<B: AsRef<[u8]>>(request: &Request<B>) -> Result<Self, DispatchError> {
        Self::from_request_with_encoding(request, Charset::Iso8859_1)
    }

    /// As [`from_request`](Self::from_request), with `fallback` as the
    /// encoding when the request's content type names no charset.
    ///
    /// # Errors
    ///
    /// As [`from_request`](Self::from_request).
    pub fn from_request_with_encoding<B: AsRef<[u8]>>(
        request: &Request<B>,
        fallback: Charset,
    ) -> Result<Self, DispatchError> {
        let query = request.uri().query().unwrap_or("");
        let phase = match url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == PHASE_PARAMETER)
        {
            Some((_, value)) => value
                .parse::<Phase>()
                .map_err(|_| DispatchError::InvalidTarget(format!("phase={value}")))?,
            None if *request.method() == Method::GET || *request.method() == Method::HEAD => {
                Phase::View
            }
            None => Phase::Action,
        };

        let content_type = header(request, CONTENT_TYPE.as_str()).unwrap_or("");
        let mut interaction = Interaction::from_query(phase, query)?;
        if let Some(id) = header(request, REQUEST_ID_HEADER).and_then(InteractionId::supplied) {
            interaction = interaction.with_id(id);
        }

        if is_form(content_type) {
            for (name, value) in url::form_urlencoded::parse(request.body().as_ref()) {
                interaction = interaction.with_parameter(&name, value.into_owned());
            }
        }
        for (name, value) in request.headers() {
            if let Ok(value) = value.to_str() {
                interaction = interaction.with_property(name.as_str(), value);
            }
        }
        interaction = interaction.with_property("request-path", request.uri().path());

        let request_encoding = charset_param(content_type).unwrap_or(fallback);
        Ok(Self::new(interaction).with_request_encoding(request_encoding))
    }

    #[must_use]
    pub fn with_request_encoding(mut self, charset: Charset) -> Self {
        self.request_encoding = charset;
        self
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Last value set for `name`, case-insensitive
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Build the HTTP response.
    ///
    /// # Errors
    ///
    /// Invalid status codes and header names or values.
    pub fn into_response(self) -> Result<HttpResponse<Vec<u8>>, http::Error> {
        let mut builder = HttpResponse::builder().status(StatusCode::from_u16(self.status)?);
        for (name, value) in &self.headers {
            builder = builder.header(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
        }
        builder.body(self.body)
    }
}

impl Bridge for HttpBridge {
    fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    fn request_encoding(&self) -> Charset {
        self.request_encoding
    }

    fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if HeaderValue::from_str(value).is_err() {
            warn!(header = %name, "Dropping header with invalid value");
            return;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send_redirect(&mut self, location: &str) -> Result<(), StreamError> {
        HeaderValue::from_str(location)
            .map_err(|e| StreamError::Bridge(format!("invalid redirect location: {e}")))?;
        self.status = 302;
        self.headers.push((LOCATION.as_str().to_string(), location.to_string()));
        Ok(())
    }

    fn create_stream(
        &mut self,
        mime_type: Option<&str>,
        charset: Charset,
    ) -> Result<Box<dyn Stream + '_>, StreamError> {
        if let Some(mime_type) = mime_type {
            let value = if mime_type.starts_with("text/") {
                format!("{mime_type}; charset={}", charset.name())
            } else {
                mime_type.to_string()
            };
            self.headers.push((CONTENT_TYPE.as_str().to_string(), value));
        }
        self.body.clear();
        Ok(Box::new(OutputStream::new(charset, &mut self.body)))
    }
}
