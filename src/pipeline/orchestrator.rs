//! Bounded worker pool running one pass per entity.
//!
//! - At most `min(max_workers, entities)` passes run at once, each in its own
//!   spawned task.
//! - A failing entity never aborts the others; retryable errors are retried
//!   with linear backoff, terminal ones fail the entity immediately.
//! - Cancellation is cooperative: it is checked before a task starts, before
//!   every retry and before every further page. Running fetches are never
//!   interrupted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{Entity, TaskOutcome};
use crate::pipeline::{RunContext, run_entity_pass};

/// Lifecycle of one entity task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    fn of(outcome: &TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Succeeded(_) => Self::Succeeded,
            TaskOutcome::Failed { .. } => Self::Failed,
            TaskOutcome::Cancelled { .. } => Self::Cancelled,
        }
    }
}

/// Aggregated run state. Only ever touched under the orchestrator's lock.
#[derive(Debug, Default)]
pub struct RunStats {
    submitted: usize,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    states: HashMap<String, TaskState>,
    results: Vec<TaskOutcome>,
}

impl RunStats {
    fn new(submitted: usize) -> Self {
        Self {
            submitted,
            ..Self::default()
        }
    }

    fn add_pending(&mut self, entity: &str) {
        self.states.insert(entity.to_string(), TaskState::Pending);
    }

    /// Move a pending task to running. Returns false if it already ended.
    fn start(&mut self, entity: &str) -> bool {
        match self.states.get_mut(entity) {
            Some(state) if *state == TaskState::Pending => {
                *state = TaskState::Running;
                true
            }
            _ => false,
        }
    }

    /// Record a terminal outcome. Outcomes for tasks already in a terminal
    /// state are dropped so nothing is counted twice.
    fn finish(&mut self, outcome: TaskOutcome) {
        let next = TaskState::of(&outcome);
        if let Some(state) = self.states.get_mut(outcome.entity()) {
            if state.is_terminal() {
                log::warn!(
                    "Ignoring {:?} for '{}': already {:?}",
                    next,
                    outcome.entity(),
                    state
                );
                return;
            }
            *state = next;
        }
        self.count(outcome);
    }

    fn count(&mut self, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Succeeded(_) => self.succeeded += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Cancelled { .. } => self.cancelled += 1,
        }
        self.results.push(outcome);
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            submitted: self.submitted,
            succeeded: self.succeeded,
            failed: self.failed,
            cancelled: self.cancelled,
            results: self.results.clone(),
        }
    }
}

/// Final report of a run; results are in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub results: Vec<TaskOutcome>,
}

impl RunSummary {
    /// Every submitted entity ended in exactly one terminal state.
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed + self.cancelled == self.submitted
    }

    pub fn outcome(&self, entity: &str) -> Option<&TaskOutcome> {
        self.results.iter().find(|outcome| outcome.entity() == entity)
    }
}

/// Dispatches entity passes over a bounded pool.
pub struct Orchestrator {
    ctx: Arc<RunContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Number of concurrent tasks for `entities` submitted entities.
    pub fn pool_size(&self, entities: usize) -> usize {
        self.ctx.config.workers.max_workers.min(entities).max(1)
    }

    /// Run one pass per entity and wait for all of them.
    pub async fn run(&self, entities: Vec<Entity>) -> RunSummary {
        let stats = Arc::new(Mutex::new(RunStats::new(entities.len())));
        let workers = self.pool_size(entities.len());
        log::info!(
            "Scanning {} entities with {} workers",
            entities.len(),
            workers
        );

        // One task per identity: a second task would race on the same document.
        let mut jobs = Vec::with_capacity(entities.len());
        {
            let mut seen = HashSet::new();
            let mut guard = stats.lock().await;
            for entity in entities {
                let key = entity.key();
                if seen.insert(key.clone()) {
                    guard.add_pending(&key);
                    jobs.push(entity);
                } else {
                    log::error!("Duplicate entity '{}' skipped", entity.name);
                    guard.count(TaskOutcome::Failed {
                        entity: key,
                        error: "duplicate entity in submission".to_string(),
                        attempts: 0,
                    });
                }
            }
        }

        stream::iter(jobs)
            .map(|entity| {
                let ctx = Arc::clone(&self.ctx);
                let stats = Arc::clone(&stats);
                let key = entity.key();
                let handle = tokio::spawn(run_task(ctx, Arc::clone(&stats), entity));
                async move { (key, stats, handle.await) }
            })
            .buffer_unordered(workers)
            .for_each(|(key, stats, joined)| async move {
                if let Err(e) = joined {
                    log::error!("Task for '{}' aborted: {}", key, e);
                    stats.lock().await.finish(TaskOutcome::Failed {
                        entity: key,
                        error: format!("task aborted: {e}"),
                        attempts: 0,
                    });
                }
            })
            .await;

        let summary = stats.lock().await.summary();
        log::info!(
            "Scan finished: {} succeeded, {} failed, {} cancelled of {}",
            summary.succeeded,
            summary.failed,
            summary.cancelled,
            summary.submitted
        );
        summary
    }
}

/// Drive one entity from pending to a terminal state.
async fn run_task(ctx: Arc<RunContext>, stats: Arc<Mutex<RunStats>>, entity: Entity) {
    let key = entity.key();

    if ctx.is_cancelled() {
        log::debug!("'{}': cancelled before start", key);
        stats
            .lock()
            .await
            .finish(TaskOutcome::Cancelled { entity: key });
        return;
    }
    if !stats.lock().await.start(&key) {
        return;
    }

    let outcome = run_with_retry(&ctx, &entity).await;
    if let TaskOutcome::Failed { error, attempts, .. } = &outcome {
        log::error!("'{}' failed after {} attempt(s): {}", key, attempts, error);
    }
    stats.lock().await.finish(outcome);
}

/// Linear backoff: the n-th retry (0-based `attempt`) waits `(n + 1) * base`.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.saturating_add(1))
}

/// Run passes until one succeeds, a terminal error occurs, retries run out or
/// the run is cancelled.
async fn run_with_retry(ctx: &RunContext, entity: &Entity) -> TaskOutcome {
    let key = entity.key();
    let max_retries = ctx.config.workers.max_retries;
    let base_delay = ctx.config.workers.retry_base_delay();
    let mut attempt: u32 = 0;

    loop {
        if ctx.is_cancelled() {
            return TaskOutcome::Cancelled { entity: key };
        }

        match run_entity_pass(ctx, entity).await {
            Ok(report) => return TaskOutcome::Succeeded(report),
            Err(AppError::Cancelled) => return TaskOutcome::Cancelled { entity: key },
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = retry_delay(base_delay, attempt);
                log::warn!(
                    "'{}': attempt {} failed ({}), retrying in {:?}",
                    key,
                    attempt + 1,
                    e,
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancellation().cancelled() => {}
                }
                attempt += 1;
            }
            Err(e) => {
                return TaskOutcome::Failed {
                    entity: key,
                    error: e.to_string(),
                    attempts: attempt + 1,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use crate::models::Config;
    use crate::services::testing::{FakeInventory, FakeScraper};
    use crate::storage::{CacheStorage, LocalStorage};

    fn config(workers: usize, retries: u32) -> Config {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        config.workers.max_workers = workers;
        config.workers.max_retries = retries;
        config.workers.retry_base_delay_ms = 1;
        config
    }

    fn entities(n: usize) -> Vec<Entity> {
        (0..n)
            .map(|i| Entity::new(format!("e{i}"), "https://example.com"))
            .collect()
    }

    /// Entity `ei` lists `i + 1` pages of two titles each.
    fn scraper_for(n: usize) -> FakeScraper {
        (0..n).fold(FakeScraper::new(), |scraper, i| {
            let name = format!("e{i}");
            let pages: Vec<Vec<String>> = (0..=i)
                .map(|p| vec![format!("{name} p{p} a"), format!("{name} p{p} b")])
                .collect();
            scraper.set_pages(
                &name,
                pages
                    .iter()
                    .map(|page| page.iter().map(String::as_str).collect())
                    .collect(),
            );
            scraper
        })
    }

    fn orchestrator(config: Config, storage: Arc<LocalStorage>, scraper: FakeScraper) -> Orchestrator {
        orchestrator_with(config, storage, Arc::new(scraper), CancellationToken::new())
    }

    fn orchestrator_with(
        config: Config,
        storage: Arc<LocalStorage>,
        scraper: Arc<FakeScraper>,
        cancel: CancellationToken,
    ) -> Orchestrator {
        let ctx = RunContext::new(
            Arc::new(config),
            storage,
            scraper,
            Arc::new(FakeInventory::new()),
        )
        .with_cancellation(cancel);
        Orchestrator::new(Arc::new(ctx))
    }

    #[test]
    fn terminal_states_are_final() {
        let mut stats = RunStats::new(1);
        stats.add_pending("e0");
        assert!(stats.start("e0"));
        stats.finish(TaskOutcome::Cancelled {
            entity: "e0".into(),
        });
        stats.finish(TaskOutcome::Failed {
            entity: "e0".into(),
            error: "late".into(),
            attempts: 1,
        });

        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failed, 0);
        assert!(!stats.start("e0"));
        assert!(stats.summary().is_complete());
    }

    #[test]
    fn pool_size_is_bounded_by_entities() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let orchestrator = orchestrator(config(4, 0), storage, FakeScraper::new());
        assert_eq!(orchestrator.pool_size(2), 2);
        assert_eq!(orchestrator.pool_size(10), 4);
        assert_eq!(orchestrator.pool_size(0), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_run_matches_sequential_run() {
        let n = 8;

        let seq_dir = TempDir::new().unwrap();
        let seq_storage = Arc::new(LocalStorage::new(seq_dir.path()));
        let sequential = orchestrator(config(1, 0), seq_storage.clone(), scraper_for(n))
            .run(entities(n))
            .await;

        let par_dir = TempDir::new().unwrap();
        let par_storage = Arc::new(LocalStorage::new(par_dir.path()));
        let parallel = orchestrator(config(3, 0), par_storage.clone(), scraper_for(n))
            .run(entities(n))
            .await;

        assert_eq!(sequential.succeeded, n);
        assert_eq!(parallel.succeeded, n);
        for i in 0..n {
            let key = format!("e{i}");
            let seq_doc = LocalStorage::new(seq_dir.path()).load(&key).await.unwrap();
            let par_doc = LocalStorage::new(par_dir.path()).load(&key).await.unwrap();
            assert_eq!(par_doc.discovered_items.len(), 2 * (i + 1));
            assert_eq!(seq_doc.all_titles(), par_doc.all_titles());
            assert!(par_doc.all_titles().iter().all(|t| t.starts_with(&format!("{key} "))));
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let scraper = scraper_for(1).with_transient_failures("e0", 2);

        let summary = orchestrator(config(2, 3), storage, scraper)
            .run(entities(1))
            .await;

        assert_eq!(summary.succeeded, 1);
        assert!(matches!(
            summary.outcome("e0"),
            Some(TaskOutcome::Succeeded(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_only_that_entity() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let scraper = scraper_for(3).with_transient_failures("e1", 10);

        let summary = orchestrator(config(2, 2), storage, scraper)
            .run(entities(3))
            .await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        match summary.outcome("e1") {
            Some(TaskOutcome::Failed { attempts, error, .. }) => {
                assert_eq!(*attempts, 3);
                assert!(error.contains("connection reset"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let scraper = Arc::new(scraper_for(1).with_terminal_failure("e0"));

        let summary = orchestrator_with(config(1, 5), storage, scraper.clone(), CancellationToken::new())
            .run(entities(1))
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(scraper.calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_entities_run_once() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let scraper = Arc::new(scraper_for(1));
        let mut batch = entities(1);
        batch.push(Entity::new("E0 ", "https://example.com"));

        let summary = orchestrator_with(config(2, 0), storage, scraper.clone(), CancellationToken::new())
            .run(batch)
            .await;

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(scraper.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_run_starts_nothing() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let scraper = Arc::new(scraper_for(4));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = orchestrator_with(config(2, 0), storage, scraper.clone(), cancel)
            .run(entities(4))
            .await;

        assert_eq!(summary.cancelled, 4);
        assert_eq!(scraper.calls(), 0);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn cancellation_mid_run_accounts_for_every_entity() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let cancel = CancellationToken::new();
        let n = 10;
        let scraper = Arc::new(
            scraper_for(n)
                .with_delay(Duration::from_millis(5))
                .cancel_on_call(3, cancel.clone()),
        );

        let summary = orchestrator_with(config(2, 0), storage, scraper.clone(), cancel)
            .run(entities(n))
            .await;

        assert!(summary.is_complete());
        assert_eq!(summary.submitted, n);
        assert!(summary.cancelled > 0);
        // Two workers: at most the two in-flight passes made further requests.
        assert!(scraper.calls() <= 4, "calls = {}", scraper.calls());
    }

    #[test]
    fn retry_delay_grows_linearly() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 0), base);
        assert_eq!(retry_delay(base, 1), base * 2);
        assert_eq!(retry_delay(base, 4), base * 5);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_ends_cancelled() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let cancel = CancellationToken::new();
        let scraper = Arc::new(
            scraper_for(1)
                .with_transient_failures("e0", 5)
                .cancel_on_call(1, cancel.clone()),
        );
        let mut config = config(1, 3);
        config.workers.retry_base_delay_ms = 60_000;

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            orchestrator_with(config, storage, scraper.clone(), cancel).run(entities(1)),
        )
        .await
        .expect("backoff sleep must wake on cancellation");

        assert!(matches!(
            summary.outcome("e0"),
            Some(TaskOutcome::Cancelled { .. })
        ));
        assert_eq!(scraper.calls(), 1);
        assert!(summary.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_linearly() {
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(tmp.path()));
        let scraper = Arc::new(scraper_for(1).with_transient_failures("e0", 3));
        let mut config = config(1, 3);
        config.workers.retry_base_delay_ms = 1000;

        let summary = orchestrator_with(config, storage, scraper.clone(), CancellationToken::new())
            .run(entities(1))
            .await;
        assert_eq!(summary.succeeded, 1);

        let times = scraper.call_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        for (gap, secs) in gaps.iter().zip([1, 2, 3]) {
            let expected = Duration::from_secs(secs);
            assert!(
                *gap >= expected && *gap < expected + Duration::from_millis(500),
                "gaps = {gaps:?}"
            );
        }
    }
}
