use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::controller::{Arguments, ControllerMethod, MethodId, ParamVec, Phase};

use super::DispatchError;

/// Query parameter naming the target controller method
pub const METHOD_PARAMETER: &str = "method";

/// Query parameter overriding the phase a bridge derives from its transport
pub const PHASE_PARAMETER: &str = "phase";

/// Correlates the log lines of an interaction and of the VIEW follow-up an
/// action may trigger.
///
/// Backed by a ULID, so ids of consecutive interactions sort by arrival.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct InteractionId(ulid::Ulid);

impl InteractionId {
    fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Id handed over by the transport, kept only when it is a ULID
    #[must_use]
    pub fn supplied(value: &str) -> Option<Self> {
        ulid::Ulid::from_string(value.trim()).ok().map(Self)
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Inbound interaction as handed over by a bridge
#[derive(Debug, Clone)]
pub struct Interaction {
    id: InteractionId,
    phase: Phase,
    target: Option<MethodId>,
    parameters: ParamVec,
    properties: HashMap<String, String>,
    follow_up: bool,
}

impl Interaction {
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            id: InteractionId::generate(),
            phase,
            target: None,
            parameters: ParamVec::new(),
            properties: HashMap::new(),
            follow_up: false,
        }
    }

    /// Interaction from a URL query string.
    ///
    /// The `method` parameter selects the target and `phase` is left to the
    /// bridge; every other pair becomes a request parameter, in order.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidTarget`] when `method` is not `Type.method`.
    pub fn from_query(phase: Phase, query: &str) -> Result<Self, DispatchError> {
        let mut interaction = Self::new(phase);
        let query = query.strip_prefix('?').unwrap_or(query);
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if name == METHOD_PARAMETER {
                let target = value
                    .parse::<MethodId>()
                    .map_err(|_| DispatchError::InvalidTarget(value.to_string()))?;
                interaction.target = Some(target);
            } else if name != PHASE_PARAMETER {
                interaction.parameters.push((Arc::from(name.as_ref()), value.into_owned()));
            }
        }
        Ok(interaction)
    }

    #[must_use]
    pub fn with_id(mut self, id: InteractionId) -> Self {
        self.id = id;
        self
    }

    /// VIEW interaction rendering `target` in place of the redirect an
    /// action's view would otherwise cause.
    ///
    /// Shares the id and container properties of `self`; only the view's
    /// parameters are carried over.
    #[must_use]
    pub fn follow_up(&self, target: MethodId, parameters: ParamVec) -> Self {
        Self {
            id: self.id,
            phase: Phase::View,
            target: Some(target),
            parameters,
            properties: self.properties.clone(),
            follow_up: true,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: MethodId) -> Self {
        self.target = Some(target);
        self
    }

    /// Append a parameter; repeating a name adds another value
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: ParamVec) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Container property, read-only for controllers
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> InteractionId {
        self.id
    }

    /// Whether this interaction renders the view of a preceding action
    #[must_use]
    pub fn is_follow_up(&self) -> bool {
        self.follow_up
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn target(&self) -> Option<&MethodId> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn parameters(&self) -> &ParamVec {
        &self.parameters
    }

    /// Last value supplied for `name`
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// What a controller method receives
#[derive(Debug)]
pub struct Invocation<'a> {
    pub interaction_id: InteractionId,
    pub method: &'a ControllerMethod,
    /// Declared parameters bound from the interaction
    pub arguments: Arguments,
    pub interaction: &'a Interaction,
}
