use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{ControllerMethod, MethodId, Phase};
use crate::dispatcher::Invocation;
use crate::response::Response;

/// Type-erased controller method body
pub type Handler = Arc<dyn Fn(&Invocation<'_>) -> anyhow::Result<Response> + Send + Sync>;

/// A descriptor paired with its implementation
#[derive(Clone)]
pub struct RegisteredMethod {
    pub method: ControllerMethod,
    pub handler: Handler,
}

impl std::fmt::Debug for RegisteredMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredMethod")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Controller methods known to the application, keyed by [`MethodId`]
#[derive(Clone, Default, Debug)]
pub struct ControllerRegistry {
    methods: HashMap<MethodId, RegisteredMethod>,
    order: Vec<MethodId>,
    defaults: HashMap<Phase, MethodId>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller method.
    ///
    /// Re-registering an id replaces the previous implementation.
    pub fn register<F, R>(&mut self, method: ControllerMethod, handler: F) -> &mut Self
    where
        F: Fn(&Invocation<'_>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Response>,
    {
        let id = method.id().clone();
        let handler: Handler = Arc::new(move |inv: &Invocation<'_>| handler(inv).map(Into::into));
        if self.methods.contains_key(&id) {
            warn!(method = %id, "Replacing existing controller method");
        } else {
            self.order.push(id.clone());
        }
        info!(
            method = %id,
            phase = %method.phase(),
            parameters = method.parameters().len(),
            "Registered controller method"
        );
        self.methods.insert(id, RegisteredMethod { method, handler });
        self
    }

    /// Method invoked when an interaction of `phase` names no target
    pub fn set_default(&mut self, phase: Phase, id: MethodId) -> &mut Self {
        self.defaults.insert(phase, id);
        self
    }

    #[must_use]
    pub fn get(&self, id: &MethodId) -> Option<&RegisteredMethod> {
        self.methods.get(id)
    }

    /// Default method for a phase: the explicit default if set, otherwise the
    /// first registered method named `index`, otherwise the first of the phase
    #[must_use]
    pub fn default_method(&self, phase: Phase) -> Option<&RegisteredMethod> {
        if let Some(id) = self.defaults.get(&phase) {
            return self.methods.get(id);
        }
        let of_phase = || {
            self.order
                .iter()
                .filter_map(|id| self.methods.get(id))
                .filter(move |m| m.method.phase() == phase)
        };
        of_phase()
            .find(|m| m.method.id().method_name() == "index")
            .or_else(|| of_phase().next())
    }

    /// Methods in registration order
    pub fn methods(&self) -> impl Iterator<Item = &ControllerMethod> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.methods.get(id))
            .map(|m| &m.method)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
