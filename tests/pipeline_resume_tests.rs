//! Integration tests for the resumable batch pipeline.
//!
//! These tests drive the full pipeline against scripted fake services to
//! verify retry bounds, partial-failure isolation, resume idempotence, and
//! crash safety of the checkpoint store.
//!
//! Run with: cargo test --test pipeline_resume_tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use harvest::batch::Batch;
use harvest::checkpoint::CheckpointManager;
use harvest::dlq::DeadLetterQueue;
use harvest::error::ServiceError;
use harvest::pipeline::{DriverState, Pipeline, PipelineOptions, PipelineReport};
use harvest::retry::{BatchFetcher, RetryPolicy, ServiceFetcher};
use harvest::service::{BatchService, ItemStatus, JsonLinesParser};
use harvest::source::LineFileSource;

/// Batch service scripted with transient failures per batch index.
///
/// Records every call so tests can assert attempt counts and which ids were
/// actually requested.
struct ScriptedService {
    /// Transient failures to inject before succeeding, keyed by batch index.
    failures: HashMap<usize, usize>,
    calls: AtomicUsize,
    attempts: Mutex<HashMap<usize, usize>>,
    seen_ids: Mutex<Vec<String>>,
}

impl ScriptedService {
    fn new(failures: HashMap<usize, usize>) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
            seen_ids: Mutex::new(Vec::new()),
        }
    }

    fn reliable() -> Self {
        Self::new(HashMap::new())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn attempts_for(&self, index: usize) -> usize {
        self.attempts.lock().await.get(&index).copied().unwrap_or(0)
    }

    fn body_for(batch: &Batch) -> String {
        batch
            .items
            .iter()
            .map(|item| {
                format!(
                    r#"{{"id":"{}","record":{{"title":"record for {}"}}}}"#,
                    item.id, item.id
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl BatchService for ScriptedService {
    async fn fetch(&self, batch: &Batch) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_ids.lock().await.extend(batch.ids());

        let attempt = {
            let mut attempts = self.attempts.lock().await;
            let entry = attempts.entry(batch.index).or_insert(0);
            *entry += 1;
            *entry
        };

        let budget = self.failures.get(&batch.index).copied().unwrap_or(0);
        if attempt <= budget {
            return Err(ServiceError::Transport {
                message: "connection reset".to_string(),
            });
        }

        Ok(Self::body_for(batch))
    }
}

/// Wrapper that cancels the shutdown token on its first call, simulating an
/// interrupt arriving while a batch is in flight.
struct CancelOnFirstCall {
    inner: Arc<ScriptedService>,
    token: CancellationToken,
}

#[async_trait]
impl BatchService for CancelOnFirstCall {
    async fn fetch(&self, batch: &Batch) -> Result<String, ServiceError> {
        self.token.cancel();
        self.inner.fetch(batch).await
    }
}

fn zero_delay_options(batch_size: usize, flush_interval: usize) -> PipelineOptions {
    PipelineOptions {
        batch_size,
        flush_interval_batches: flush_interval,
        policy: RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
        },
    }
}

fn write_input(dir: &Path, count: usize) {
    let contents: String = (0..count).map(|i| format!("pmid-{i:04}\n")).collect();
    std::fs::write(dir.join("pmids.txt"), contents).unwrap();
}

fn build_pipeline(
    dir: &Path,
    service: Arc<dyn BatchService>,
    options: PipelineOptions,
    shutdown: CancellationToken,
    dlq: Option<DeadLetterQueue>,
) -> Pipeline {
    let input = dir.join("pmids.txt");
    let fetcher: Arc<dyn BatchFetcher> =
        Arc::new(ServiceFetcher::new(service, Arc::new(JsonLinesParser)));
    Pipeline::new(
        Arc::new(LineFileSource::new(input)),
        fetcher,
        CheckpointManager::new(dir, "test"),
        dlq,
        options,
        shutdown,
    )
}

async fn run_to_report(pipeline: &mut Pipeline) -> PipelineReport {
    pipeline.run().await.unwrap()
}

/// Test: 120 items, batch size 50, batch 1 fails transiently twice.
///
/// Expected: 3 batches (50/50/20), 3 attempts on batch 1, empty failure set,
/// processed_count 120.
#[tokio::test]
async fn test_flaky_batch_recovers_within_bound() {
    let temp_dir = TempDir::new().unwrap();
    write_input(temp_dir.path(), 120);

    let service = Arc::new(ScriptedService::new(HashMap::from([(1, 2)])));
    let mut pipeline = build_pipeline(
        temp_dir.path(),
        service.clone(),
        zero_delay_options(50, 10),
        CancellationToken::new(),
        None,
    );

    let report = run_to_report(&mut pipeline).await;

    assert_eq!(report.summary.processed, 120);
    assert_eq!(report.summary.succeeded, 120);
    assert_eq!(report.summary.failed, 0);
    assert!(!report.interrupted);
    assert_eq!(pipeline.state(), DriverState::Completed);

    assert_eq!(service.attempts_for(0).await, 1);
    assert_eq!(service.attempts_for(1).await, 3);
    assert_eq!(service.attempts_for(2).await, 1);
    assert_eq!(service.calls(), 5);
}

/// Test: a completed run resumed with the same checkpoint makes zero
/// additional service calls and reports the same counts.
#[tokio::test]
async fn test_resume_after_completion_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    write_input(temp_dir.path(), 120);

    let service = Arc::new(ScriptedService::reliable());
    let mut pipeline = build_pipeline(
        temp_dir.path(),
        service.clone(),
        zero_delay_options(50, 10),
        CancellationToken::new(),
        None,
    );
    let first = run_to_report(&mut pipeline).await;

    let rerun_service = Arc::new(ScriptedService::reliable());
    let mut rerun = build_pipeline(
        temp_dir.path(),
        rerun_service.clone(),
        zero_delay_options(50, 10),
        CancellationToken::new(),
        None,
    );
    let second = run_to_report(&mut rerun).await;

    assert_eq!(rerun_service.calls(), 0);
    assert_eq!(second.summary, first.summary);
    assert_eq!(rerun.state(), DriverState::Completed);
}

/// Test: a batch that exhausts retries lands its ids (and only its ids) in
/// the failure set, and later batches are still processed.
#[tokio::test]
async fn test_exhausted_batch_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    write_input(temp_dir.path(), 120);

    let service = Arc::new(ScriptedService::new(HashMap::from([(1, usize::MAX)])));
    let dlq = DeadLetterQueue::new(temp_dir.path().join("dlq"));
    let dlq_path = dlq.path().to_path_buf();

    let mut pipeline = build_pipeline(
        temp_dir.path(),
        service.clone(),
        zero_delay_options(50, 10),
        CancellationToken::new(),
        Some(dlq),
    );
    let report = run_to_report(&mut pipeline).await;

    assert_eq!(report.summary.processed, 120);
    assert_eq!(report.summary.succeeded, 70);
    assert_eq!(report.summary.failed, 50);
    assert_eq!(service.attempts_for(1).await, 3);

    // Reload the checkpoint and check exactly batch 1's ids failed
    let mut manager = CheckpointManager::new(temp_dir.path(), "test");
    assert!(manager.load().await.unwrap());
    let failed = &manager.state().failed_ids;
    assert_eq!(failed.len(), 50);
    assert!(failed.contains(&"pmid-0050".to_string()));
    assert!(failed.contains(&"pmid-0099".to_string()));
    assert!(!failed.contains(&"pmid-0049".to_string()));
    assert!(!failed.contains(&"pmid-0100".to_string()));

    // Failure artifact holds one NDJSON record per failed id
    let contents = std::fs::read_to_string(&dlq_path).unwrap();
    assert_eq!(contents.lines().count(), 50);
}

/// Test: an interrupt mid-run flushes a resumable prefix; the next run picks
/// up where the first left off without refetching completed batches.
#[tokio::test]
async fn test_interrupt_then_resume() {
    let temp_dir = TempDir::new().unwrap();
    write_input(temp_dir.path(), 120);

    let shutdown = CancellationToken::new();
    let inner = Arc::new(ScriptedService::reliable());
    let cancelling = Arc::new(CancelOnFirstCall {
        inner: inner.clone(),
        token: shutdown.clone(),
    });

    let mut pipeline = build_pipeline(
        temp_dir.path(),
        cancelling,
        zero_delay_options(50, 10),
        shutdown,
        None,
    );
    let report = run_to_report(&mut pipeline).await;

    // The in-flight batch finished; everything after was abandoned
    assert!(report.interrupted);
    assert_eq!(report.summary.processed, 50);
    assert_eq!(inner.calls(), 1);

    let resume_service = Arc::new(ScriptedService::reliable());
    let mut resumed = build_pipeline(
        temp_dir.path(),
        resume_service.clone(),
        zero_delay_options(50, 10),
        CancellationToken::new(),
        None,
    );
    let final_report = run_to_report(&mut resumed).await;

    assert!(!final_report.interrupted);
    assert_eq!(final_report.summary.processed, 120);
    assert_eq!(final_report.summary.succeeded, 120);
    assert_eq!(resume_service.calls(), 2);

    // The resumed run never re-requested the completed prefix
    let seen = resume_service.seen_ids.lock().await.clone();
    assert!(!seen.contains(&"pmid-0000".to_string()));
    assert!(seen.contains(&"pmid-0050".to_string()));
    assert!(seen.contains(&"pmid-0119".to_string()));
}

/// Test: a crash immediately after a flush loses nothing; a crash during a
/// flush leaves the previous snapshot intact.
#[tokio::test]
async fn test_checkpoint_crash_safety() {
    let temp_dir = TempDir::new().unwrap();
    write_input(temp_dir.path(), 120);

    // Flush every batch so the simulated crash bound is one batch
    let service = Arc::new(ScriptedService::reliable());
    let shutdown = CancellationToken::new();
    let cancelling = Arc::new(CancelOnFirstCall {
        inner: service,
        token: shutdown.clone(),
    });
    let mut pipeline = build_pipeline(
        temp_dir.path(),
        cancelling,
        zero_delay_options(50, 1),
        shutdown,
        None,
    );
    run_to_report(&mut pipeline).await;

    // Simulate a crash partway through a later flush: partial temp file only
    let checkpoint_path = temp_dir.path().join("test_checkpoint.json");
    let tmp_path = checkpoint_path.with_extension("json.tmp");
    std::fs::write(&tmp_path, "{\"processed_count\": 99999").unwrap();

    let mut manager = CheckpointManager::new(temp_dir.path(), "test");
    assert!(manager.load().await.unwrap());
    assert_eq!(manager.state().processed_count, 50);
    assert!(
        manager
            .state()
            .results
            .iter()
            .all(|r| r.status == ItemStatus::Ok)
    );
}

/// Test: invalid options abort before any work or service calls.
#[tokio::test]
async fn test_invalid_options_abort_before_work() {
    let temp_dir = TempDir::new().unwrap();
    write_input(temp_dir.path(), 10);

    let service = Arc::new(ScriptedService::reliable());
    let mut options = zero_delay_options(50, 10);
    options.policy.max_attempts = 0;

    let mut pipeline = build_pipeline(
        temp_dir.path(),
        service.clone(),
        options,
        CancellationToken::new(),
        None,
    );

    assert!(pipeline.run().await.is_err());
    assert_eq!(pipeline.state(), DriverState::Aborted);
    assert_eq!(service.calls(), 0);
}

/// Test: an unreadable work source aborts the run.
#[tokio::test]
async fn test_missing_work_source_aborts() {
    let temp_dir = TempDir::new().unwrap();
    // No input file written

    let service = Arc::new(ScriptedService::reliable());
    let mut pipeline = build_pipeline(
        temp_dir.path(),
        service,
        zero_delay_options(50, 10),
        CancellationToken::new(),
        None,
    );

    assert!(pipeline.run().await.is_err());
    assert_eq!(pipeline.state(), DriverState::Aborted);
}
