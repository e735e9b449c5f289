use std::sync::Arc;

use crate::controller::{MethodId, ParamVec};
use crate::property::PropertyMap;

/// Instruction to render a VIEW-phase controller method next.
///
/// Two views are equal when they target the same method with the same
/// parameters; properties do not take part in equality.
#[derive(Debug, Clone)]
pub struct View {
    target: MethodId,
    parameters: ParamVec,
    pub(super) properties: PropertyMap,
}

impl View {
    #[must_use]
    pub fn new(target: MethodId) -> Self {
        Self {
            target,
            parameters: ParamVec::new(),
            properties: PropertyMap::new(),
        }
    }

    /// Append a parameter; repeating a name adds another value
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn target(&self) -> &MethodId {
        &self.target
    }

    #[must_use]
    pub fn parameters(&self) -> &ParamVec {
        &self.parameters
    }

    /// Relative URL rendering this view: `?method=Type.method&name=value`
    #[must_use]
    pub fn url(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("method", &self.target.to_string());
        for (name, value) in &self.parameters {
            query.append_pair(name, value);
        }
        format!("?{}", query.finish())
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.parameters == other.parameters
    }
}

impl Eq for View {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::TITLE;
    use crate::response::WithProperties;

    #[test]
    fn url_encodes_target_and_parameters() {
        let view = View::new(MethodId::new("Blog", "show"))
            .with_parameter("id", "4 2")
            .with_parameter("tag", "a&b");
        assert_eq!(view.url(), "?method=Blog.show&id=4+2&tag=a%26b");
    }

    #[test]
    fn equality_ignores_properties() {
        let a = View::new(MethodId::new("A", "show")).with_parameter("id", "1");
        let b = View::new(MethodId::new("A", "show"))
            .with_parameter("id", "1")
            .with(&TITLE, "x".to_string());
        let c = View::new(MethodId::new("A", "show")).with_parameter("id", "2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
