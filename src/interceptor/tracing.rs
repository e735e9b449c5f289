use std::time::Duration;

use tracing::{debug, info};

use super::Interceptor;
use crate::dispatcher::Interaction;
use crate::response::Response;

/// Logs every interaction with its outcome and latency
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
    fn before(&self, interaction: &Interaction) -> Option<Response> {
        debug!(
            interaction_id = %interaction.id(),
            phase = %interaction.phase(),
            target = ?interaction.target().map(ToString::to_string),
            parameters = interaction.parameters().len(),
            "Interaction started"
        );
        None
    }

    fn after(&self, interaction: &Interaction, response: &mut Response, latency: Duration) {
        info!(
            interaction_id = %interaction.id(),
            phase = %interaction.phase(),
            response = response.kind(),
            status = ?response.code(),
            latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            "Interaction finished"
        );
    }
}
