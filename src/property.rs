//! # Property Module
//!
//! Typed, multi-valued property bag attached to responses.
//!
//! A [`PropertyType<T>`] is a capability token: only code holding the token can
//! store or read values of type `T` under it. Tokens are compared by identity
//! (their address), so two property types with the same name are still distinct
//! keys. Declare them as `static` items:
//!
//! ```rust
//! use phasekit::property::{PropertyMap, PropertyType};
//!
//! static RETRY_AFTER: PropertyType<u32> = PropertyType::single("retry-after");
//!
//! let mut map = PropertyMap::new();
//! map.set(&RETRY_AFTER, Some(30));
//! assert_eq!(map.value(&RETRY_AFTER), Some(&30));
//! ```
//!
//! ## Multiplicity
//!
//! - [`Multiplicity::Single`] keeps at most one value, last write wins
//! - [`Multiplicity::Multiple`] accumulates values in insertion order
//!
//! Writing `None` removes every value stored for the type.

use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

use crate::io::Charset;

/// Errors raised when manipulating properties
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// A property operation was attempted without a property type
    #[error("No null property type allowed")]
    NullPropertyType,
    /// A header tag could not be parsed as a single well formed element
    #[error("Invalid header tag markup: {0}")]
    InvalidHeaderTag(String),
    /// A null asset list was supplied
    #[error("No null asset accepted")]
    NullAsset,
}

/// How many values a property type holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// At most one value; a new write replaces the previous one
    Single,
    /// Values accumulate in insertion order
    Multiple,
}

/// A typed property key.
///
/// Equality is identity based, see [`PropertyType::key`].
pub struct PropertyType<T> {
    name: &'static str,
    multiplicity: Multiplicity,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PropertyType<T> {
    /// Declare a property type holding at most one value
    pub const fn single(name: &'static str) -> Self {
        Self {
            name,
            multiplicity: Multiplicity::Single,
            _marker: PhantomData,
        }
    }

    /// Declare a property type accumulating values
    pub const fn multiple(name: &'static str) -> Self {
        Self {
            name,
            multiplicity: Multiplicity::Multiple,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// Erased identity of this property type
    #[must_use]
    pub fn key(&'static self) -> PropertyKey {
        PropertyKey {
            addr: self as *const Self as *const () as usize,
            name: self.name,
            multiplicity: self.multiplicity,
        }
    }
}

impl<T> fmt::Debug for PropertyType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyType[{}]", self.name)
    }
}

/// Type-erased identity of a [`PropertyType`]
#[derive(Clone, Copy)]
pub struct PropertyKey {
    addr: usize,
    name: &'static str,
    multiplicity: Multiplicity,
}

impl PropertyKey {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A stored property value. Values are immutable once stored and shared by `Arc`.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// HTTP header carried by the [`HEADER`] property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub values: Vec<String>,
}

impl Header {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// `<meta>` tag carried by [`META_TAG`] and [`META_HTTP_EQUIV`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub name: String,
    pub value: String,
}

/// A well formed element to be written into the document head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTag {
    markup: String,
    element: String,
}

impl HeaderTag {
    /// Parse `markup`, which must contain exactly one root element.
    pub fn parse(markup: &str) -> Result<Self, PropertyError> {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let mut reader = Reader::from_str(markup);
        let mut depth = 0usize;
        let mut roots = 0usize;
        let mut element = None;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if depth == 0 {
                        roots += 1;
                        element.get_or_insert_with(|| {
                            String::from_utf8_lossy(e.name().as_ref()).into_owned()
                        });
                    }
                    depth += 1;
                }
                Ok(Event::End(_)) => {
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Empty(e)) => {
                    if depth == 0 {
                        roots += 1;
                        element.get_or_insert_with(|| {
                            String::from_utf8_lossy(e.name().as_ref()).into_owned()
                        });
                    }
                }
                Ok(Event::Text(t)) => {
                    if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(PropertyError::InvalidHeaderTag(
                            "text outside of the root element".to_string(),
                        ));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(PropertyError::InvalidHeaderTag(e.to_string())),
            }
        }
        match (roots, element) {
            (1, Some(element)) if depth == 0 => Ok(Self {
                markup: markup.trim().to_string(),
                element,
            }),
            (0, _) => Err(PropertyError::InvalidHeaderTag("no element".to_string())),
            _ => Err(PropertyError::InvalidHeaderTag(
                "expected a single root element".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Name of the root element, e.g. `script` or `link`
    #[must_use]
    pub fn element(&self) -> &str {
        &self.element
    }
}

/// Content mime type
pub static MIME_TYPE: PropertyType<String> = PropertyType::single("mime-type");
/// Output character set
pub static ENCODING: PropertyType<Charset> = PropertyType::single("encoding");
/// Page title
pub static TITLE: PropertyType<String> = PropertyType::single("title");
/// Transport header
pub static HEADER: PropertyType<Header> = PropertyType::multiple("header");
/// Asset identifier (script, stylesheet) required by the page
pub static ASSET: PropertyType<String> = PropertyType::multiple("asset");
/// `<meta name=.. content=..>`
pub static META_TAG: PropertyType<MetaTag> = PropertyType::multiple("meta-tag");
/// `<meta http-equiv=.. content=..>`
pub static META_HTTP_EQUIV: PropertyType<MetaTag> = PropertyType::multiple("meta-http-equiv");
/// Raw element for the document head
pub static HEADER_TAG: PropertyType<HeaderTag> = PropertyType::multiple("header-tag");
/// Whether text output should be XML escaped by the bridge
pub static ESCAPE_XML: PropertyType<bool> = PropertyType::single("escape-xml");
/// Whether an action should answer with a redirect rather than rendering directly
pub static REDIRECT_AFTER_ACTION: PropertyType<bool> =
    PropertyType::single("redirect-after-action");

/// Mapping from property type to one or many values.
///
/// Iteration follows the order in which property types were first written,
/// then value insertion order within a type.
#[derive(Clone, Default)]
pub struct PropertyMap {
    entries: SmallVec<[(PropertyKey, SmallVec<[PropertyValue; 1]>); 4]>,
}

impl PropertyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, or remove every value when `value` is `None`
    pub fn set<T: Any + Send + Sync>(&mut self, ty: &'static PropertyType<T>, value: Option<T>) {
        let key = ty.key();
        match value {
            None => self.remove_key(&key),
            Some(value) => {
                let value: PropertyValue = Arc::new(value);
                match self.entries.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, values)) => match ty.multiplicity {
                        Multiplicity::Single => {
                            values.clear();
                            values.push(value);
                        }
                        Multiplicity::Multiple => values.push(value),
                    },
                    None => {
                        let mut values = SmallVec::new();
                        values.push(value);
                        self.entries.push((key, values));
                    }
                }
            }
        }
    }

    /// Write through an optional property type, as handed over by dynamic callers
    pub fn try_set<T: Any + Send + Sync>(
        &mut self,
        ty: Option<&'static PropertyType<T>>,
        value: Option<T>,
    ) -> Result<(), PropertyError> {
        let ty = ty.ok_or(PropertyError::NullPropertyType)?;
        self.set(ty, value);
        Ok(())
    }

    /// Remove every value of a property type
    pub fn remove<T>(&mut self, ty: &'static PropertyType<T>) {
        self.remove_key(&ty.key());
    }

    fn remove_key(&mut self, key: &PropertyKey) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// First value stored for the type
    #[must_use]
    pub fn value<T: Any + Send + Sync>(&self, ty: &'static PropertyType<T>) -> Option<&T> {
        self.values(ty).next()
    }

    /// Every value stored for the type, in insertion order
    pub fn values<T: Any + Send + Sync>(
        &self,
        ty: &'static PropertyType<T>,
    ) -> impl Iterator<Item = &T> + '_ {
        let key = ty.key();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .flat_map(|(_, values)| values.iter())
            .filter_map(|v| v.downcast_ref::<T>())
    }

    #[must_use]
    pub fn contains<T>(&self, ty: &'static PropertyType<T>) -> bool {
        let key = ty.key();
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Property types currently holding values
    pub fn keys(&self) -> impl Iterator<Item = PropertyKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// Erased view over every (type, value) pair in emission order
    pub fn iter(&self) -> impl Iterator<Item = (PropertyKey, &PropertyValue)> + '_ {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (*k, v)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k.name(), v.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static LOCAL_TITLE: PropertyType<String> = PropertyType::single("title");

    #[test]
    fn single_valued_last_write_wins() {
        let mut map = PropertyMap::new();
        map.set(&TITLE, Some("a".to_string()));
        map.set(&TITLE, Some("b".to_string()));
        assert_eq!(map.value(&TITLE).map(String::as_str), Some("b"));
        assert_eq!(map.values(&TITLE).count(), 1);
    }

    #[test]
    fn multi_valued_accumulates_in_order() {
        let mut map = PropertyMap::new();
        map.set(&ASSET, Some("jquery".to_string()));
        map.set(&ASSET, Some("app".to_string()));
        let assets: Vec<_> = map.values(&ASSET).cloned().collect();
        assert_eq!(assets, vec!["jquery", "app"]);
    }

    #[test]
    fn none_removes_all_values() {
        let mut map = PropertyMap::new();
        map.set(&ASSET, Some("a".to_string()));
        map.set(&ASSET, Some("b".to_string()));
        map.set(&ASSET, None);
        assert!(!map.contains(&ASSET));
        assert!(map.is_empty());
    }

    #[test]
    fn identity_not_name_distinguishes_types() {
        let mut map = PropertyMap::new();
        map.set(&TITLE, Some("global".to_string()));
        assert!(map.value(&LOCAL_TITLE).is_none());
        assert_ne!(TITLE.key(), LOCAL_TITLE.key());
    }

    #[test]
    fn missing_type_is_rejected() {
        let mut map = PropertyMap::new();
        let err = map.try_set::<String>(None, None).unwrap_err();
        assert_eq!(err, PropertyError::NullPropertyType);
        let err = map
            .try_set::<String>(None, Some("x".to_string()))
            .unwrap_err();
        assert_eq!(err, PropertyError::NullPropertyType);
    }

    #[test]
    fn iteration_follows_type_then_value_order() {
        let mut map = PropertyMap::new();
        map.set(&MIME_TYPE, Some("text/html".to_string()));
        map.set(&ASSET, Some("a".to_string()));
        map.set(&ASSET, Some("b".to_string()));
        let names: Vec<_> = map.iter().map(|(k, _)| k.name()).collect();
        assert_eq!(names, vec!["mime-type", "asset", "asset"]);
    }

    #[test]
    fn header_tag_requires_single_element() {
        let tag = HeaderTag::parse("<script src=\"a.js\"></script>").unwrap();
        assert_eq!(tag.element(), "script");
        assert!(HeaderTag::parse("<a/><b/>").is_err());
        assert!(HeaderTag::parse("plain text").is_err());
        assert!(HeaderTag::parse("<a>").is_err());
    }
}
