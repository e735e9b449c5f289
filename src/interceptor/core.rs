use std::time::Duration;

use crate::dispatcher::Interaction;
use crate::response::Response;

pub trait Interceptor: Send + Sync {
    fn before(&self, _interaction: &Interaction) -> Option<Response> {
        None
    }

    fn after(&self, _interaction: &Interaction, _response: &mut Response, _latency: Duration) {}
}
