use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{ParamVec, Phase};
use crate::dispatcher::DispatchError;

/// `Type.method`, where the type may be package-qualified (`blog.Post.show`)
static METHOD_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*\.[A-Za-z_$][\w$]*$")
        .expect("method id regex should be valid")
});

/// Identity of a controller method: `Type.method`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    type_name: Arc<str>,
    method_name: Arc<str>,
}

impl MethodId {
    pub fn new(type_name: &str, method_name: &str) -> Self {
        Self {
            type_name: Arc::from(type_name),
            method_name: Arc::from(method_name),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method_name)
    }
}

impl FromStr for MethodId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((t, m)) if METHOD_ID_REGEX.is_match(s) => Ok(Self::new(t, m)),
            _ => Err(format!("invalid method id '{s}', expected Type.method")),
        }
    }
}

impl Serialize for MethodId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MethodId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether a parameter binds one value or all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multiple,
}

/// Declared controller method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub required: bool,
    pub cardinality: Cardinality,
}

impl ParameterDescriptor {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            cardinality: Cardinality::Single,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            cardinality: Cardinality::Single,
        }
    }

    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.cardinality = Cardinality::Multiple;
        self
    }
}

/// Arguments bound from request parameters, positional in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    values: Vec<(String, Vec<String>)>,
}

impl Arguments {
    /// First value bound to `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Every value bound to `name`
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// Values of the parameter at `index` in declaration order
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&[String]> {
        self.values.get(index).map(|(_, v)| v.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Descriptor of a controller method: identity, phase, and parameter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerMethod {
    id: MethodId,
    phase: Phase,
    parameters: Vec<ParameterDescriptor>,
}

impl ControllerMethod {
    pub fn new(phase: Phase, type_name: &str, method_name: &str) -> Self {
        Self {
            id: MethodId::new(type_name, method_name),
            phase,
            parameters: Vec::new(),
        }
    }

    pub fn view(type_name: &str, method_name: &str) -> Self {
        Self::new(Phase::View, type_name, method_name)
    }

    pub fn action(type_name: &str, method_name: &str) -> Self {
        Self::new(Phase::Action, type_name, method_name)
    }

    pub fn resource(type_name: &str, method_name: &str) -> Self {
        Self::new(Phase::Resource, type_name, method_name)
    }

    #[must_use]
    pub fn param(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn id(&self) -> &MethodId {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Bind request parameters to the declared argument list.
    ///
    /// Single-valued parameters take the last value supplied, matching the
    /// last-write-wins lookup used for request parameters.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingParameter`] when a required parameter has no value.
    pub fn bind(&self, params: &ParamVec) -> Result<Arguments, DispatchError> {
        let mut values = Vec::with_capacity(self.parameters.len());
        for descriptor in &self.parameters {
            let mut supplied: Vec<String> = params
                .iter()
                .filter(|(k, _)| k.as_ref() == descriptor.name)
                .map(|(_, v)| v.clone())
                .collect();
            if supplied.is_empty() && descriptor.required {
                return Err(DispatchError::MissingParameter {
                    method: self.id.clone(),
                    parameter: descriptor.name.clone(),
                });
            }
            if descriptor.cardinality == Cardinality::Single && supplied.len() > 1 {
                supplied.drain(..supplied.len() - 1);
            }
            values.push((descriptor.name.clone(), supplied));
        }
        Ok(Arguments { values })
    }
}
