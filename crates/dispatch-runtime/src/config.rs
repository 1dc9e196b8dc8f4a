//! Coordinator configuration.

use std::time::Duration;

use dispatch_core::RouterConfig;

/// Configuration for the execution coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Maximum handlers running at once in parallel mode.
    pub max_concurrency: usize,
    /// Timeout applied to each handler invocation.
    pub per_call_timeout: Duration,
    /// Deadline for a whole candidate set, measured from dispatch.
    pub deadline: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            per_call_timeout: Duration::from_secs(30),
            deadline: None,
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive from router settings.
    pub fn from_router(router: &RouterConfig) -> Self {
        Self {
            max_concurrency: router.max_concurrency.max(1),
            per_call_timeout: router.per_call_timeout(),
            deadline: router.request_deadline(),
        }
    }

    /// Sets the worker pool size (at least 1).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Sets the per-call timeout.
    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Sets the outer deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
