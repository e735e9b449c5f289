//! # Response Module
//!
//! The closed set of outcomes a controller method can return.
//!
//! ## Variants
//!
//! | Variant | Meaning | Code |
//! |---------|---------|------|
//! | [`Redirect`] | Send the client to an absolute location | 302 |
//! | [`Status`] | Bare status code, no body | any |
//! | [`Body`] | Status with a byte/char payload | any |
//! | [`Content`] | Body with page metadata (title, assets, meta tags) | any |
//! | [`Error`] | Controller fault, rendered as 500 (403 for access faults) | 500/403 |
//! | [`View`] | Instruction to render another controller's view | none |
//!
//! Every variant carries a [`PropertyMap`]; the builder methods on
//! [`WithProperties`] return the same response value so calls chain:
//!
//! ```rust
//! use phasekit::property::TITLE;
//! use phasekit::response::{Response, WithProperties};
//!
//! let page = Response::ok_content("<p>hi</p>").with(&TITLE, "Home".to_string());
//! assert_eq!(page.title(), Some("Home"));
//! ```
//!
//! ## Phase Conventions
//!
//! The dispatcher does not forbid any variant in any phase, but the intended use is:
//! VIEW and RESOURCE return content, ACTION returns [`View`] or [`Redirect`].

mod error;
mod status;
mod view;

pub use error::{AccessDenied, Error, ErrorKind};
pub use status::{Body, Content, Redirect, Status};
pub use view::View;

use std::any::Any;

use crate::controller::MethodId;
use crate::io::Streamable;
use crate::property::{Header, PropertyError, PropertyMap, PropertyType, HEADER};

/// Property-bag builder shared by every response variant.
///
/// Each method consumes and returns the response so calls can chain.
pub trait WithProperties: Sized {
    fn properties(&self) -> &PropertyMap;

    fn properties_mut(&mut self) -> &mut PropertyMap;

    /// Add a value; single-valued types are overwritten, multi-valued accumulate
    #[must_use]
    fn with<T: Any + Send + Sync>(mut self, ty: &'static PropertyType<T>, value: T) -> Self {
        self.properties_mut().set(ty, Some(value));
        self
    }

    /// Remove every value of a property type
    #[must_use]
    fn without<T: Any + Send + Sync>(mut self, ty: &'static PropertyType<T>) -> Self {
        self.properties_mut().set(ty, None);
        self
    }

    /// Write through an optional type and value; `None` value removes.
    ///
    /// # Errors
    ///
    /// [`PropertyError::NullPropertyType`] when no property type is given.
    fn try_with<T: Any + Send + Sync>(
        mut self,
        ty: Option<&'static PropertyType<T>>,
        value: Option<T>,
    ) -> Result<Self, PropertyError> {
        self.properties_mut().try_set(ty, value)?;
        Ok(self)
    }

    #[must_use]
    fn with_flag(self, ty: &'static PropertyType<bool>) -> Self {
        self.with(ty, true)
    }

    #[must_use]
    fn with_no(self, ty: &'static PropertyType<bool>) -> Self {
        self.with(ty, false)
    }

    /// Add a transport header
    #[must_use]
    fn with_header<I, V>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.with(&HEADER, Header::new(name, values))
    }
}

macro_rules! impl_with_properties {
    ($($ty:ty),*) => {
        $(impl WithProperties for $ty {
            fn properties(&self) -> &PropertyMap {
                &self.properties
            }

            fn properties_mut(&mut self) -> &mut PropertyMap {
                &mut self.properties
            }
        })*
    };
}

impl_with_properties!(Redirect, Status, Body, Error, View);

/// Outcome of a controller method
#[derive(Debug)]
pub enum Response {
    Redirect(Redirect),
    Status(Status),
    Body(Body),
    Content(Content),
    Error(Error),
    View(View),
}

impl Response {
    pub fn redirect(location: impl Into<String>) -> Redirect {
        Redirect::new(location)
    }

    pub fn status(code: u16) -> Status {
        Status::new(code)
    }

    pub fn ok() -> Status {
        Status::new(200)
    }

    pub fn not_found() -> Status {
        Status::new(404)
    }

    pub fn ok_content(data: impl Into<Streamable>) -> Content {
        Status::new(200).content(data)
    }

    pub fn not_found_content(data: impl Into<Streamable>) -> Content {
        Status::new(404).content(data)
    }

    pub fn content(code: u16, data: impl Into<Streamable>) -> Content {
        Status::new(code).content(data)
    }

    pub fn ok_body(data: impl Into<Streamable>) -> Body {
        Status::new(200).body(data)
    }

    pub fn body(code: u16, data: impl Into<Streamable>) -> Body {
        Status::new(code).body(data)
    }

    /// Fault response from an error
    pub fn error(cause: impl Into<anyhow::Error>) -> Error {
        Error::from_cause(cause)
    }

    /// Fault response from a message
    pub fn error_message(message: impl Into<String>) -> Error {
        Error::from_message(message)
    }

    /// Access fault from a cause, answered with 403
    pub fn forbidden(cause: impl Into<anyhow::Error>) -> Error {
        Error::forbidden(cause)
    }

    pub fn forbidden_message(message: impl Into<String>) -> Error {
        Error::forbidden_message(message)
    }

    pub fn forbidden_with(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Error {
        Error::forbidden_with(message, cause)
    }

    pub fn view(target: MethodId) -> View {
        View::new(target)
    }

    /// Effective status code; `None` for [`View`]
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Response::Redirect(_) => Some(302),
            Response::Status(s) => Some(s.code()),
            Response::Body(b) => Some(b.code()),
            Response::Content(c) => Some(c.code()),
            Response::Error(e) => Some(e.code()),
            Response::View(_) => None,
        }
    }

    #[must_use]
    pub fn properties(&self) -> &PropertyMap {
        match self {
            Response::Redirect(r) => r.properties(),
            Response::Status(s) => s.properties(),
            Response::Body(b) => b.properties(),
            Response::Content(c) => c.properties(),
            Response::Error(e) => e.properties(),
            Response::View(v) => v.properties(),
        }
    }

    /// Variant name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Redirect(_) => "redirect",
            Response::Status(_) => "status",
            Response::Body(_) => "body",
            Response::Content(_) => "content",
            Response::Error(_) => "error",
            Response::View(_) => "view",
        }
    }

    /// Whether this response carries page content
    #[must_use]
    pub fn is_content(&self) -> bool {
        matches!(self, Response::Content(_))
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(impl From<$variant> for Response {
            fn from(value: $variant) -> Self {
                Response::$variant(value)
            }
        })*
    };
}

impl_from_variant!(Redirect, Status, Body, Content, Error, View);
