use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Request, Response as HttpResponse, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{Interaction, Invocation};
use crate::bridge::{self, Bridge, HttpBridge};
use crate::config::AppConfig;
use crate::controller::{ControllerRegistry, MethodId, Phase, RegisteredMethod};
use crate::interceptor::Interceptor;
use crate::io::StreamError;
use crate::property::REDIRECT_AFTER_ACTION;
use crate::response::{Error, Redirect, Response, View, WithProperties};

/// Failure to get as far as running a controller method
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No controller method {0}")]
    MethodNotFound(MethodId),
    #[error("No default controller method for phase {0}")]
    NoDefault(Phase),
    #[error("Controller method {method} answers {expected}, not {actual}")]
    PhaseMismatch {
        method: MethodId,
        expected: Phase,
        actual: Phase,
    },
    #[error("Missing parameter '{parameter}' for {method}")]
    MissingParameter { method: MethodId, parameter: String },
    #[error("Invalid controller method reference '{0}'")]
    InvalidTarget(String),
}

impl DispatchError {
    /// Status a bridge reports for this failure
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::MethodNotFound(_)
            | DispatchError::NoDefault(_)
            | DispatchError::InvalidTarget(_) => 404,
            DispatchError::PhaseMismatch { .. } | DispatchError::MissingParameter { .. } => 400,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Routes interactions to controller methods
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ControllerRegistry>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: ControllerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            interceptors: Vec::new(),
        }
    }

    /// Interceptors run in the order they are added
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    fn resolve(&self, interaction: &Interaction) -> Result<&RegisteredMethod, DispatchError> {
        debug!(
            interaction_id = %interaction.id(),
            phase = %interaction.phase(),
            target = ?interaction.target().map(ToString::to_string),
            available_methods = self.registry.len(),
            "Controller method lookup"
        );
        let registered = match interaction.target() {
            Some(id) => self.registry.get(id).ok_or_else(|| {
                warn!(interaction_id = %interaction.id(), method = %id, "Controller method not found");
                DispatchError::MethodNotFound(id.clone())
            })?,
            None => self
                .registry
                .default_method(interaction.phase())
                .ok_or(DispatchError::NoDefault(interaction.phase()))?,
        };
        if registered.method.phase() != interaction.phase() {
            return Err(DispatchError::PhaseMismatch {
                method: registered.method.id().clone(),
                expected: registered.method.phase(),
                actual: interaction.phase(),
            });
        }
        Ok(registered)
    }

    /// Run the controller method targeted by `interaction`.
    ///
    /// Faults and panics raised by the method come back as
    /// [`Response::Error`]; they never escape this call.
    ///
    /// # Errors
    ///
    /// Resolution and binding failures, before any method runs.
    pub fn dispatch(&self, interaction: &Interaction) -> Result<Response, DispatchError> {
        let registered = self.resolve(interaction)?;
        let method = &registered.method;
        let arguments = method.bind(interaction.parameters())?;
        let invocation = Invocation {
            interaction_id: interaction.id(),
            method,
            arguments,
            interaction,
        };

        let mut early: Option<Response> = None;
        for (idx, interceptor) in self.interceptors.iter().enumerate() {
            let answer = interceptor.before(interaction);
            if early.is_none() && answer.is_some() {
                debug!(
                    interaction_id = %interaction.id(),
                    interceptor_idx = idx,
                    interceptor = std::any::type_name_of_val(interceptor.as_ref()),
                    "Interceptor answered the interaction"
                );
                early = answer;
            }
        }

        let (mut response, latency) = match early {
            Some(response) => (response, Duration::ZERO),
            None => {
                info!(
                    interaction_id = %interaction.id(),
                    method = %method.id(),
                    phase = %method.phase(),
                    follow_up = interaction.is_follow_up(),
                    "Controller invocation start"
                );
                let start = Instant::now();
                let response = self.invoke(registered, &invocation);
                (response, start.elapsed())
            }
        };

        if method.phase() == Phase::Action && response.is_content() {
            warn!(
                interaction_id = %interaction.id(),
                method = %method.id(),
                response = response.kind(),
                "Action method returned content"
            );
        }

        for interceptor in &self.interceptors {
            interceptor.after(interaction, &mut response, latency);
        }

        info!(
            interaction_id = %interaction.id(),
            method = %method.id(),
            response = response.kind(),
            status = ?response.code(),
            latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            "Controller invocation complete"
        );
        Ok(response)
    }

    fn invoke(&self, registered: &RegisteredMethod, invocation: &Invocation<'_>) -> Response {
        let id = registered.method.id();
        match catch_unwind(AssertUnwindSafe(|| (registered.handler)(invocation))) {
            Ok(Ok(response)) => response,
            Ok(Err(fault)) => {
                error!(
                    interaction_id = %invocation.interaction_id,
                    method = %id,
                    error = %fault,
                    "Controller method failed"
                );
                Response::Error(Error::from_cause(fault))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    interaction_id = %invocation.interaction_id,
                    method = %id,
                    panic_message = %message,
                    "Controller method panicked"
                );
                Response::Error(Error::from_message(format!("controller panicked: {message}")))
            }
        }
    }

    /// Dispatch and hand the outcome to `bridge`.
    ///
    /// Dispatch failures become bare statuses. A `View` outcome becomes a
    /// redirect to the view URL, except after an action whose view carries
    /// `REDIRECT_AFTER_ACTION = false`: that view is rendered directly as a
    /// new VIEW-phase interaction.
    ///
    /// # Errors
    ///
    /// Transport failures reported by the bridge's stream.
    pub fn process(
        &self,
        interaction: &Interaction,
        bridge: &mut dyn Bridge,
        verbose: bool,
    ) -> Result<(), StreamError> {
        let response = match self.dispatch(interaction) {
            Ok(Response::View(view)) => self.follow_view(interaction, view),
            Ok(response) => response,
            Err(e) => Self::failure(interaction, &e),
        };
        bridge::end(bridge, response, verbose)
    }

    /// [`process`](Self::process) the interaction carried by `bridge`
    pub fn serve(&self, bridge: &mut dyn Bridge, verbose: bool) -> Result<(), StreamError> {
        let interaction = bridge.interaction().clone();
        self.process(&interaction, bridge, verbose)
    }

    /// Serve one HTTP request the way `config` asks.
    ///
    /// Bodies default to `config.request_encoding` and faults render with
    /// [`AppConfig::verbose`]. A request the bridge cannot read becomes the
    /// matching dispatch status; transport failures become `500`.
    pub fn respond<B: AsRef<[u8]>>(
        &self,
        config: &AppConfig,
        request: &Request<B>,
    ) -> HttpResponse<Vec<u8>> {
        let bridge = HttpBridge::from_request_with_encoding(request, config.request_encoding);
        let mut bridge = match bridge {
            Ok(bridge) => bridge,
            Err(e) => {
                warn!(error = %e, status = e.status(), uri = %request.uri(), "Unreadable request");
                return bare_response(e.status());
            }
        };
        let id = bridge.interaction().id();
        if let Err(e) = self.serve(&mut bridge, config.verbose()) {
            error!(interaction_id = %id, error = %e, "Response stream failed");
            return bare_response(500);
        }
        bridge.into_response().unwrap_or_else(|e| {
            error!(interaction_id = %id, error = %e, "Invalid HTTP response");
            bare_response(500)
        })
    }

    fn follow_view(&self, interaction: &Interaction, view: View) -> Response {
        let redirect = view
            .properties()
            .value(&REDIRECT_AFTER_ACTION)
            .copied()
            .unwrap_or(true);
        if interaction.phase() != Phase::Action || redirect {
            return Response::Redirect(Redirect::new(view.url()));
        }
        let next = interaction.follow_up(view.target().clone(), view.parameters().clone());
        match self.dispatch(&next) {
            Ok(Response::View(view)) => Response::Redirect(Redirect::new(view.url())),
            Ok(response) => response,
            Err(e) => Self::failure(&next, &e),
        }
    }

    fn failure(interaction: &Interaction, e: &DispatchError) -> Response {
        warn!(
            interaction_id = %interaction.id(),
            error = %e,
            status = e.status(),
            "Dispatch failed"
        );
        Response::status(e.status()).into()
    }
}

fn bare_response(code: u16) -> HttpResponse<Vec<u8>> {
    let mut response = HttpResponse::new(Vec::new());
    *response.status_mut() = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.registry.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
