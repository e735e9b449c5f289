use std::fmt;

use super::WithProperties;
use crate::io::{Charset, ResponseStream, Streamable};
use crate::property::{
    HeaderTag, MetaTag, PropertyError, PropertyMap, ASSET, ENCODING, HEADER_TAG, META_HTTP_EQUIV,
    META_TAG, MIME_TYPE, TITLE,
};

/// Send the client elsewhere
#[derive(Debug, Clone)]
pub struct Redirect {
    location: String,
    pub(super) properties: PropertyMap,
}

impl Redirect {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            properties: PropertyMap::new(),
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }
}

/// Bare status code
#[derive(Debug, Clone)]
pub struct Status {
    code: u16,
    pub(super) properties: PropertyMap,
}

impl Status {
    #[must_use]
    pub fn new(code: u16) -> Self {
        Self {
            code,
            properties: PropertyMap::new(),
        }
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Attach a payload, handing the properties over to the new [`Body`]
    pub fn body(self, data: impl Into<Streamable>) -> Body {
        Body {
            code: self.code,
            properties: self.properties,
            data: Some(data.into()),
        }
    }

    /// Attach page content, handing the properties over to the new [`Content`]
    pub fn content(self, data: impl Into<Streamable>) -> Content {
        Content(self.body(data))
    }

    /// Properties then immediate close
    #[must_use]
    pub fn streamable(self) -> ResponseStream {
        ResponseStream::new(&self.properties, None)
    }

    #[must_use]
    pub fn with_mime_type(self, mime_type: impl Into<String>) -> Self {
        self.with(&MIME_TYPE, mime_type.into())
    }

    #[must_use]
    pub fn with_charset(self, charset: Charset) -> Self {
        self.with(&ENCODING, charset)
    }
}

/// Status with a payload
#[derive(Debug)]
pub struct Body {
    code: u16,
    pub(super) properties: PropertyMap,
    data: Option<Streamable>,
}

impl Body {
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.properties.value(&MIME_TYPE).map(String::as_str)
    }

    #[must_use]
    pub fn charset(&self) -> Option<Charset> {
        self.properties.value(&ENCODING).copied()
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Take the payload out, leaving the body empty
    pub fn take_data(&mut self) -> Option<Streamable> {
        self.data.take()
    }

    #[must_use]
    pub fn with_mime_type(self, mime_type: impl Into<String>) -> Self {
        self.with(&MIME_TYPE, mime_type.into())
    }

    #[must_use]
    pub fn with_charset(self, charset: Charset) -> Self {
        self.with(&ENCODING, charset)
    }

    /// Properties first, then the payload chunks
    #[must_use]
    pub fn streamable(self) -> ResponseStream {
        ResponseStream::new(&self.properties, self.data)
    }
}

/// Page content: a [`Body`] that also carries title, assets and head metadata
pub struct Content(Body);

impl Content {
    #[must_use]
    pub fn code(&self) -> u16 {
        self.0.code
    }

    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.0.mime_type()
    }

    #[must_use]
    pub fn charset(&self) -> Option<Charset> {
        self.0.charset()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.0.properties.value(&TITLE).map(String::as_str)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.properties.values(&ASSET).map(String::as_str)
    }

    pub fn meta_tags(&self) -> impl Iterator<Item = &MetaTag> + '_ {
        self.0.properties.values(&META_TAG)
    }

    pub fn header_tags(&self) -> impl Iterator<Item = &HeaderTag> + '_ {
        self.0.properties.values(&HEADER_TAG)
    }

    #[must_use]
    pub fn with_mime_type(self, mime_type: impl Into<String>) -> Self {
        self.with(&MIME_TYPE, mime_type.into())
    }

    #[must_use]
    pub fn with_charset(self, charset: Charset) -> Self {
        self.with(&ENCODING, charset)
    }

    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with(&TITLE, title.into())
    }

    #[must_use]
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for asset in assets {
            self.0.properties.set(&ASSET, Some(asset.into()));
        }
        self
    }

    #[must_use]
    pub fn with_meta_tag(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(
            &META_TAG,
            MetaTag {
                name: name.into(),
                value: value.into(),
            },
        )
    }

    #[must_use]
    pub fn with_meta_http_equiv(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(
            &META_HTTP_EQUIV,
            MetaTag {
                name: name.into(),
                value: value.into(),
            },
        )
    }

    /// Add an element to the document head.
    ///
    /// # Errors
    ///
    /// [`PropertyError::InvalidHeaderTag`] unless `markup` is exactly one element.
    pub fn with_header_tag(self, markup: &str) -> Result<Self, PropertyError> {
        Ok(self.with(&HEADER_TAG, HeaderTag::parse(markup)?))
    }

    #[must_use]
    pub fn into_body(self) -> Body {
        self.0
    }

    pub fn take_data(&mut self) -> Option<Streamable> {
        self.0.take_data()
    }

    #[must_use]
    pub fn streamable(self) -> ResponseStream {
        self.0.streamable()
    }
}

impl WithProperties for Content {
    fn properties(&self) -> &PropertyMap {
        &self.0.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.0.properties
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("code", &self.0.code)
            .field("properties", &self.0.properties)
            .field("data", &self.0.data)
            .finish()
    }
}
