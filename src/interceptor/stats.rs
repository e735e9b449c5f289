use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::Interceptor;
use crate::dispatcher::Interaction;
use crate::response::Response;

/// Lock-free interaction counters
#[derive(Debug, Default)]
pub struct StatsInterceptor {
    interactions: AtomicU64,
    errors: AtomicU64,
    redirects: AtomicU64,
    total_latency_ns: AtomicU64,
}

impl StatsInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn interactions(&self) -> u64 {
        self.interactions.load(Ordering::Relaxed)
    }

    /// Interactions that ended in an error response
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn redirects(&self) -> u64 {
        self.redirects.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.interactions();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
    }
}

impl Interceptor for StatsInterceptor {
    fn after(&self, _interaction: &Interaction, response: &mut Response, latency: Duration) {
        self.interactions.fetch_add(1, Ordering::Relaxed);
        match response {
            Response::Error(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            Response::Redirect(_) => {
                self.redirects.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }
}
