//! Admission gate for oracle calls

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use authorlink_core::{
    DecisionOracle, DecisionRequest, GradingRequest, LinkError, OracleDecision, Result,
};
use tokio::sync::Semaphore;

/// [`DecisionOracle`] wrapper that bounds simultaneous in-flight calls.
///
/// Callers beyond the limit wait for a permit.
pub struct RateLimitedOracle {
    inner: Arc<dyn DecisionOracle>,
    semaphore: Semaphore,
    limit: usize,
    calls: AtomicUsize,
}

impl RateLimitedOracle {
    pub fn new(inner: Arc<dyn DecisionOracle>, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            inner,
            semaphore: Semaphore::new(limit),
            limit,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Calls admitted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl DecisionOracle for RateLimitedOracle {
    async fn decide(&self, request: &DecisionRequest) -> Result<OracleDecision> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LinkError::Oracle("Oracle gate closed".to_string()))?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.decide(request).await
    }

    async fn grade(&self, request: &GradingRequest) -> Result<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| LinkError::Oracle("Oracle gate closed".to_string()))?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.grade(request).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
