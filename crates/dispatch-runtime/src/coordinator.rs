//! Execution coordinator for selected candidates.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_agent::{Dispatch, HandlerContext, HandlerFactory};
use dispatch_models::{Candidate, ExecutionMode, ExecutionResult, Request};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;

const DEADLINE_REASON: &str = "request deadline exceeded";

/// Runs candidate handlers sequentially or through a bounded pool.
///
/// Every candidate yields exactly one [`ExecutionResult`], in input order.
/// Handler errors, panics, timeouts, and factory failures all become
/// failed results; nothing a handler does can abort its siblings.
pub struct ExecutionCoordinator {
    factory: Arc<dyn HandlerFactory>,
    config: CoordinatorConfig,
}

impl fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("config", &self.config)
            .finish()
    }
}

impl ExecutionCoordinator {
    pub fn new(factory: Arc<dyn HandlerFactory>, config: CoordinatorConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Execute `candidates` for `request`.
    pub async fn execute(
        &self,
        request: &Request,
        candidates: &[Candidate],
        mode: ExecutionMode,
        ctx: &HandlerContext,
    ) -> Vec<ExecutionResult> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let request = Arc::new(request.clone());

        info!(
            request_id = %request.id,
            candidates = candidates.len(),
            mode = %mode,
            "executing candidates"
        );

        let results = match mode {
            ExecutionMode::Sequential => {
                self.run_sequential(request, candidates, ctx, deadline).await
            }
            ExecutionMode::Parallel => self.run_parallel(request, candidates, ctx, deadline).await,
        };

        debug!(
            succeeded = results.iter().filter(|r| r.is_success()).count(),
            total = results.len(),
            "execution complete"
        );
        results
    }

    async fn run_sequential(
        &self,
        request: Arc<Request>,
        candidates: &[Candidate],
        ctx: &HandlerContext,
        deadline: Option<Instant>,
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let limit = match deadline {
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        results.push(deadline_result(candidate, Duration::ZERO));
                        continue;
                    }
                    remaining.min(self.config.per_call_timeout)
                }
                None => self.config.per_call_timeout,
            };

            let started = Instant::now();
            let task = self.spawn_invocation(
                Arc::clone(&request),
                candidate.clone(),
                ctx.clone(),
                limit,
                None,
            );
            results.push(join_result(task.await, candidate, started));
        }

        results
    }

    async fn run_parallel(
        &self,
        request: Arc<Request>,
        candidates: &[Candidate],
        ctx: &HandlerContext,
        deadline: Option<Instant>,
    ) -> Vec<ExecutionResult> {
        let pool = Arc::new(Semaphore::new(self.config.max_concurrency));
        let started = Instant::now();

        let tasks: Vec<JoinHandle<ExecutionResult>> = candidates
            .iter()
            .map(|candidate| {
                self.spawn_invocation(
                    Arc::clone(&request),
                    candidate.clone(),
                    ctx.clone(),
                    self.config.per_call_timeout,
                    Some(Arc::clone(&pool)),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (mut task, candidate) in tasks.into_iter().zip(candidates) {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, &mut task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        task.abort();
                        warn!(
                            request_id = %request.id,
                            capability_id = %candidate.capability_id,
                            "deadline reached, abandoning handler"
                        );
                        results.push(deadline_result(candidate, started.elapsed()));
                        continue;
                    }
                },
                None => task.await,
            };
            results.push(join_result(joined, candidate, started));
        }

        results
    }

    /// Spawn one invocation, optionally gated by a pool slot.
    ///
    /// The per-call timeout starts once the slot is held.
    fn spawn_invocation(
        &self,
        request: Arc<Request>,
        candidate: Candidate,
        ctx: HandlerContext,
        limit: Duration,
        pool: Option<Arc<Semaphore>>,
    ) -> JoinHandle<ExecutionResult> {
        let factory = Arc::clone(&self.factory);

        tokio::spawn(async move {
            let _slot = match pool {
                Some(pool) => match pool.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        return ExecutionResult::error(
                            candidate.capability_id,
                            candidate.confidence,
                            "worker pool closed",
                            Duration::ZERO,
                        )
                    }
                },
                None => None,
            };
            invoke(factory.as_ref(), &request, &candidate, &ctx, limit).await
        })
    }
}

async fn invoke(
    factory: &dyn HandlerFactory,
    request: &Request,
    candidate: &Candidate,
    ctx: &HandlerContext,
    limit: Duration,
) -> ExecutionResult {
    let id = candidate.capability_id.as_str();
    let confidence = candidate.confidence;
    let started = Instant::now();

    let handler = match factory.create(id, request) {
        Ok(handler) => handler,
        Err(e) => {
            warn!(
                request_id = %request.id,
                capability_id = %id,
                error = %e,
                "handler creation failed"
            );
            return ExecutionResult::error(id, confidence, e.to_string(), started.elapsed());
        }
    };

    match tokio::time::timeout(limit, handler.run(request, ctx)).await {
        Ok(Ok(content)) => {
            debug!(
                request_id = %request.id,
                capability_id = %id,
                duration_ms = started.elapsed().as_millis() as u64,
                "handler succeeded"
            );
            ExecutionResult::success(id, confidence, content, started.elapsed())
        }
        Ok(Err(e)) => {
            warn!(request_id = %request.id, capability_id = %id, error = %e, "handler failed");
            ExecutionResult::error(id, confidence, e.to_string(), started.elapsed())
        }
        Err(_) => {
            warn!(
                request_id = %request.id,
                capability_id = %id,
                timeout_ms = limit.as_millis() as u64,
                "handler timed out"
            );
            ExecutionResult::timeout(
                id,
                confidence,
                format!("timed out after {}ms", limit.as_millis()),
                started.elapsed(),
            )
        }
    }
}

fn join_result(
    joined: Result<ExecutionResult, tokio::task::JoinError>,
    candidate: &Candidate,
    started: Instant,
) -> ExecutionResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            let reason = if e.is_panic() {
                "handler panicked"
            } else {
                "handler cancelled"
            };
            warn!(capability_id = %candidate.capability_id, "{}", reason);
            ExecutionResult::error(
                candidate.capability_id.as_str(),
                candidate.confidence,
                reason,
                started.elapsed(),
            )
        }
    }
}

fn deadline_result(candidate: &Candidate, elapsed: Duration) -> ExecutionResult {
    ExecutionResult::timeout(
        candidate.capability_id.as_str(),
        candidate.confidence,
        DEADLINE_REASON,
        elapsed,
    )
}

#[async_trait]
impl Dispatch for ExecutionCoordinator {
    async fn dispatch(
        &self,
        request: &Request,
        candidates: &[Candidate],
        mode: ExecutionMode,
        ctx: &HandlerContext,
    ) -> Vec<ExecutionResult> {
        self.execute(request, candidates, mode, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_agent::{AgentError, Handler, HandlerRegistry, Result};
    use dispatch_models::ExecutionStatus;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Sleepy {
        delay: Duration,
        reply: &'static str,
        log: Option<Arc<Mutex<Vec<&'static str>>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Sleepy {
        async fn run(&self, _request: &Request, _ctx: &HandlerContext) -> Result<Value> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.lock().unwrap().push(self.reply);
            }
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(json!(self.reply))
        }
    }

    struct Failing;

    #[async_trait]
    impl Handler for Failing {
        async fn run(&self, _request: &Request, _ctx: &HandlerContext) -> Result<Value> {
            Err(AgentError::Execution {
                capability_id: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl Handler for Panicking {
        async fn run(&self, _request: &Request, _ctx: &HandlerContext) -> Result<Value> {
            panic!("handler bug");
        }
    }

    struct Fixture {
        handlers: HandlerRegistry,
        log: Arc<Mutex<Vec<&'static str>>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut handlers = HandlerRegistry::new();
            handlers.register_shared("failing", Arc::new(Failing));
            handlers.register_shared("panicking", Arc::new(Panicking));
            Self {
                handlers,
                log: Arc::new(Mutex::new(Vec::new())),
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn sleepy(mut self, id: &'static str, delay_ms: u64) -> Self {
            let handler = Sleepy {
                delay: Duration::from_millis(delay_ms),
                reply: id,
                log: Some(Arc::clone(&self.log)),
                active: Arc::clone(&self.active),
                peak: Arc::clone(&self.peak),
            };
            self.handlers.register_shared(id, Arc::new(handler));
            self
        }

        fn coordinator(&self, config: CoordinatorConfig) -> ExecutionCoordinator {
            ExecutionCoordinator::new(Arc::new(self.handlers.clone()), config)
        }
    }

    fn candidates(ids: &[&str]) -> Vec<Candidate> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Candidate::new(*id, 0.9 - i as f64 * 0.1))
            .collect()
    }

    async fn run(
        coordinator: &ExecutionCoordinator,
        ids: &[&str],
        mode: ExecutionMode,
    ) -> Vec<ExecutionResult> {
        let request = Request::new("test");
        let ctx = HandlerContext::detached(&request.id);
        coordinator.execute(&request, &candidates(ids), mode, &ctx).await
    }

    fn statuses(results: &[ExecutionResult]) -> Vec<ExecutionStatus> {
        results.iter().map(|r| r.status).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_timeout_bounds_wall_time() {
        let fixture = Fixture::new()
            .sleepy("a", 50)
            .sleepy("b", 80)
            .sleepy("stuck", 60_000)
            .sleepy("c", 20)
            .sleepy("d", 10);
        let coordinator = fixture.coordinator(
            CoordinatorConfig::new()
                .with_max_concurrency(8)
                .with_per_call_timeout(Duration::from_millis(100)),
        );

        let start = Instant::now();
        let results = run(
            &coordinator,
            &["a", "b", "stuck", "c", "d"],
            ExecutionMode::Parallel,
        )
        .await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 5);
        assert_eq!(
            statuses(&results),
            vec![
                ExecutionStatus::Success,
                ExecutionStatus::Success,
                ExecutionStatus::Timeout,
                ExecutionStatus::Success,
                ExecutionStatus::Success,
            ]
        );
        assert!(elapsed <= Duration::from_millis(110), "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_preserves_input_order() {
        let fixture = Fixture::new().sleepy("slow", 90).sleepy("fast", 5).sleepy("mid", 40);
        let coordinator = fixture.coordinator(CoordinatorConfig::new().with_max_concurrency(3));

        let results = run(&coordinator, &["slow", "fast", "mid"], ExecutionMode::Parallel).await;

        let ids: Vec<_> = results.iter().map(|r| r.capability_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast", "mid"]);
        assert_eq!(results[0].content, json!("slow"));
        assert_eq!(results[0].confidence, 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_respects_pool_size() {
        let fixture = Fixture::new()
            .sleepy("a", 100)
            .sleepy("b", 100)
            .sleepy("c", 100)
            .sleepy("d", 100);
        let coordinator = fixture.coordinator(CoordinatorConfig::new().with_max_concurrency(2));

        let start = Instant::now();
        let results = run(&coordinator, &["a", "b", "c", "d"], ExecutionMode::Parallel).await;

        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(fixture.peak.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_runs_in_order() {
        let fixture = Fixture::new().sleepy("first", 30).sleepy("second", 5).sleepy("third", 10);
        let coordinator = fixture.coordinator(CoordinatorConfig::default());

        let results = run(
            &coordinator,
            &["first", "second", "third"],
            ExecutionMode::Sequential,
        )
        .await;

        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(*fixture.log.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(fixture.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_abort_siblings() {
        let fixture = Fixture::new().sleepy("ok", 10);
        let coordinator = fixture.coordinator(CoordinatorConfig::default());

        for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
            let results = run(&coordinator, &["failing", "panicking", "missing", "ok"], mode).await;

            assert_eq!(
                statuses(&results),
                vec![
                    ExecutionStatus::Error,
                    ExecutionStatus::Error,
                    ExecutionStatus::Error,
                    ExecutionStatus::Success,
                ]
            );
            assert!(results[0].error.as_deref().unwrap().contains("boom"));
            assert_eq!(results[1].error.as_deref(), Some("handler panicked"));
            assert!(results[2]
                .error
                .as_deref()
                .unwrap()
                .starts_with("handler creation failed"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_pending_as_timeout() {
        let fixture = Fixture::new().sleepy("fast", 10).sleepy("slow", 5_000).sleepy("queued", 10);
        let coordinator = fixture.coordinator(
            CoordinatorConfig::new()
                .with_max_concurrency(2)
                .with_per_call_timeout(Duration::from_secs(10))
                .with_deadline(Duration::from_millis(150)),
        );

        let start = Instant::now();
        let results = run(&coordinator, &["slow", "fast", "queued"], ExecutionMode::Parallel).await;

        assert!(start.elapsed() <= Duration::from_millis(160));
        assert_eq!(results[0].status, ExecutionStatus::Timeout);
        assert_eq!(results[0].error.as_deref(), Some(DEADLINE_REASON));
        assert!(results[1].is_success());
        assert!(results[2].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_deadline_skips_remaining() {
        let fixture = Fixture::new().sleepy("slow", 5_000).sleepy("after", 10);
        let coordinator = fixture.coordinator(
            CoordinatorConfig::new().with_deadline(Duration::from_millis(100)),
        );

        let results = run(&coordinator, &["slow", "after"], ExecutionMode::Sequential).await;

        assert_eq!(statuses(&results), vec![ExecutionStatus::Timeout, ExecutionStatus::Timeout]);
        assert_eq!(results[1].error.as_deref(), Some(DEADLINE_REASON));
        assert_eq!(*fixture.log.lock().unwrap(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let coordinator = Fixture::new().coordinator(CoordinatorConfig::default());
        assert!(run(&coordinator, &[], ExecutionMode::Parallel).await.is_empty());
    }
}
