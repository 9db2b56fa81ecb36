use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use imagepress::observability::Metrics;
use imagepress::pipeline::{
    Commit, Completion, DeadLetterRecord, ErrorKind, Fetch, FetchError, RecordDeadLetter,
    RetryPolicy, RetryingItemProcessor, SinkError, Store, StoreError, Task, TaskError,
    TaskExecutor, Transcode, TranscodeError, object_key,
};
use imagepress::worker::Transcoder;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Serves scripted responses per URL; unscripted URLs succeed
#[derive(Default)]
struct FakeFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<Bytes, FetchError>>>>,
    always_fail: Mutex<HashMap<String, FetchError>>,
    calls: Mutex<Vec<(String, Instant)>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel_on_call: Option<CancellationToken>,
}

impl FakeFetcher {
    fn failing(self, url: &str, error: FetchError) -> Self {
        self.always_fail.lock().unwrap().insert(url.to_string(), error);
        self
    }

    fn scripted(self, url: &str, responses: Vec<Result<Bytes, FetchError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    fn calls_for(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(cancel) = &self.cancel_on_call {
            cancel.cancel();
        }

        if let Some(error) = self.always_fail.lock().unwrap().get(url) {
            return Err(error.clone());
        }
        if let Some(script) = self.scripts.lock().unwrap().get_mut(url) {
            if let Some(response) = script.pop_front() {
                return response;
            }
        }
        Ok(Bytes::from(format!("image:{url}")))
    }
}

/// Passes bytes through untouched
struct PassthroughTranscoder;

#[async_trait]
impl Transcode for PassthroughTranscoder {
    async fn transcode(&self, raw: Bytes) -> Result<Bytes, TranscodeError> {
        Ok(raw)
    }
}

#[derive(Default)]
struct FakeStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

#[async_trait]
impl Store for FakeStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StoreError> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(format!("https://store/{key}"))
    }
}

/// Replace-semantics result sink that can be told to fail
#[derive(Default)]
struct RecordingCommit {
    records: Mutex<HashMap<String, Vec<String>>>,
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Commit for RecordingCommit {
    async fn commit(&self, task_id: &str, addresses: &[String]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("database is down".into());
        }
        self.records
            .lock()
            .unwrap()
            .insert(task_id.to_string(), addresses.to_vec());
        Ok(())
    }
}

impl RecordingCommit {
    fn committed(&self, task_id: &str) -> Option<Vec<String>> {
        self.records.lock().unwrap().get(task_id).cloned()
    }
}

/// Collects records, or rejects every write when `fail` is set
#[derive(Default)]
struct RecordingDeadLetters {
    records: Mutex<Vec<DeadLetterRecord>>,
    attempts: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl RecordDeadLetter for RecordingDeadLetters {
    async fn record(&self, record: &DeadLetterRecord) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("dead-letter channel unavailable".into());
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl RecordingDeadLetters {
    fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

struct Harness {
    fetcher: Arc<FakeFetcher>,
    results: Arc<RecordingCommit>,
    dead_letters: Arc<RecordingDeadLetters>,
    metrics: Arc<Metrics>,
    executor: TaskExecutor,
}

fn harness_with(
    fetcher: FakeFetcher,
    transcoder: Arc<dyn Transcode>,
    results: RecordingCommit,
    dead_letters: RecordingDeadLetters,
    concurrency: usize,
) -> Harness {
    let fetcher = Arc::new(fetcher);
    let results = Arc::new(results);
    let dead_letters = Arc::new(dead_letters);
    let metrics = Arc::new(Metrics::new());

    let processor = RetryingItemProcessor::builder()
        .fetcher(fetcher.clone())
        .transcoder(transcoder)
        .store(Arc::new(FakeStore::default()))
        .policy(RetryPolicy::default())
        .metrics(metrics.clone())
        .build();

    let executor = TaskExecutor::builder()
        .processor(Arc::new(processor))
        .results(results.clone())
        .dead_letters(dead_letters.clone())
        .item_concurrency(concurrency)
        .metrics(metrics.clone())
        .build();

    Harness {
        fetcher,
        results,
        dead_letters,
        metrics,
        executor,
    }
}

fn harness(fetcher: FakeFetcher) -> Harness {
    harness_with(
        fetcher,
        Arc::new(PassthroughTranscoder),
        RecordingCommit::default(),
        RecordingDeadLetters::default(),
        4,
    )
}

fn urls(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("http://x/{n}.jpg")).collect()
}

fn reset() -> FetchError {
    FetchError::Connection(io::ErrorKind::ConnectionReset)
}

// ---------------------------------------------------------------------------
// Task outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_all_succeed_commits_once_without_dead_letter() {
    let h = harness(FakeFetcher::default());
    let task = Task::new("p1", urls(&["a", "b", "c"]));

    let completion = h.executor.execute(&task, &CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::Committed { images: 3 });
    assert_eq!(h.results.calls.load(Ordering::SeqCst), 1);
    let committed = h.results.committed("p1").unwrap();
    assert_eq!(committed.len(), 3);
    assert!(h.dead_letters.records().is_empty());
    assert_eq!(h.metrics.snapshot().tasks_committed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_fail_dead_letters_once_without_commit() {
    let fetcher = FakeFetcher::default()
        .failing("http://x/a.jpg", FetchError::Status { status: 404 })
        .failing("http://x/b.jpg", FetchError::Status { status: 410 });
    let h = harness(fetcher);
    let task = Task::new("p2", urls(&["a", "b"]));

    let err = h
        .executor
        .execute(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::AllFailed { failures: 2, .. }));
    assert_eq!(h.results.calls.load(Ordering::SeqCst), 0);

    let records = h.dead_letters.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_id, "p2");
    assert_eq!(records[0].original_task, task);
    assert!(records[0].partial_results.is_none());
    assert_eq!(records[0].error_kind, ErrorKind::TerminalTransport);
    assert_eq!(records[0].failed_items.len(), 2);
    assert_eq!(h.metrics.snapshot().tasks_dead_lettered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_commits_exactly_the_successes() {
    let fetcher = FakeFetcher::default().failing("http://x/b.jpg", FetchError::Status { status: 404 });
    let h = harness(fetcher);
    let task = Task::new("p3", urls(&["a", "b", "c"]));

    let completion = h.executor.execute(&task, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        completion,
        Completion::PartiallyCommitted {
            images: 2,
            failed: 1
        }
    );
    let committed: HashSet<String> = h.results.committed("p3").unwrap().into_iter().collect();
    let expected: HashSet<String> = ["a", "c"]
        .iter()
        .map(|n| format!("https://store/{}", object_key("p3", &format!("http://x/{n}.jpg"))))
        .collect();
    assert_eq!(committed, expected);
    assert!(h.dead_letters.records().is_empty());
    assert_eq!(h.metrics.snapshot().tasks_partially_committed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_commit_failure_dead_letters_the_partial_results() {
    let fetcher = FakeFetcher::default().failing("http://x/b.jpg", FetchError::Status { status: 404 });
    let results = RecordingCommit {
        fail: true,
        ..RecordingCommit::default()
    };
    let h = harness_with(
        fetcher,
        Arc::new(PassthroughTranscoder),
        results,
        RecordingDeadLetters::default(),
        4,
    );
    let task = Task::new("p4", urls(&["a", "b"]));

    let err = h
        .executor
        .execute(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Persistence { committed: 1, .. }));
    let records = h.dead_letters.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind, ErrorKind::PersistenceFailure);
    assert_eq!(
        records[0].partial_results,
        Some(vec![format!(
            "https://store/{}",
            object_key("p4", "http://x/a.jpg")
        )])
    );
    assert_eq!(records[0].failed_items.len(), 1);
}

fn failing_dead_letters() -> RecordingDeadLetters {
    RecordingDeadLetters {
        fail: true,
        ..RecordingDeadLetters::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_failure_on_all_failed_keeps_task_error() {
    let fetcher = FakeFetcher::default().failing("http://x/a.jpg", FetchError::Status { status: 404 });
    let h = harness_with(
        fetcher,
        Arc::new(PassthroughTranscoder),
        RecordingCommit::default(),
        failing_dead_letters(),
        4,
    );
    let task = Task::new("p12", urls(&["a"]));

    let err = h
        .executor
        .execute(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::AllFailed { failures: 1, .. }));
    assert_eq!(h.dead_letters.attempts.load(Ordering::SeqCst), 1);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.dead_letter_failures, 1);
    assert_eq!(snapshot.tasks_dead_lettered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_failure_on_commit_failure_keeps_task_error() {
    let results = RecordingCommit {
        fail: true,
        ..RecordingCommit::default()
    };
    let h = harness_with(
        FakeFetcher::default(),
        Arc::new(PassthroughTranscoder),
        results,
        failing_dead_letters(),
        4,
    );
    let task = Task::new("p13", urls(&["a", "b"]));

    let err = h
        .executor
        .execute(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Persistence { committed: 2, .. }));
    assert_eq!(h.dead_letters.attempts.load(Ordering::SeqCst), 1);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.dead_letter_failures, 1);
    assert_eq!(snapshot.tasks_dead_lettered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_redelivery_converges_on_same_addresses() {
    let h = harness(FakeFetcher::default());
    let task = Task::new("p5", urls(&["a", "b"]));

    h.executor.execute(&task, &CancellationToken::new()).await.unwrap();
    let first = h.results.committed("p5").unwrap();

    h.executor.execute(&task, &CancellationToken::new()).await.unwrap();
    let second = h.results.committed("p5").unwrap();

    assert_eq!(first, second);
    assert_eq!(h.results.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_urls_is_a_silent_success() {
    let h = harness(FakeFetcher::default());
    let task = Task::new("p6", vec![]);

    let completion = h.executor.execute(&task, &CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::Empty);
    assert_eq!(h.results.calls.load(Ordering::SeqCst), 0);
    assert!(h.dead_letters.records().is_empty());
    assert_eq!(h.fetcher.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_p1_example_scenario() {
    let fetcher = FakeFetcher::default().failing("http://x/bad.jpg", FetchError::Status { status: 404 });
    let h = harness(fetcher);
    let task = Task::new("p1", vec!["http://x/a.jpg".into(), "http://x/bad.jpg".into()]);

    let completion = h.executor.execute(&task, &CancellationToken::new()).await.unwrap();

    assert!(matches!(completion, Completion::PartiallyCommitted { images: 1, failed: 1 }));
    assert_eq!(
        h.results.committed("p1").unwrap(),
        vec![format!("https://store/{}", object_key("p1", "http://x/a.jpg"))]
    );
    assert!(h.dead_letters.records().is_empty());
    // 404 is permanent: one attempt only
    assert_eq!(h.fetcher.calls_for("http://x/bad.jpg").len(), 1);
}

// ---------------------------------------------------------------------------
// Retry behaviour
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_persistent_reset_is_attempted_three_times_with_growing_waits() {
    let fetcher = FakeFetcher::default().failing("http://x/a.jpg", reset());
    let h = harness(fetcher);
    let task = Task::new("p7", urls(&["a"]));

    let err = h
        .executor
        .execute(&task, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::AllFailed { .. }));

    let calls = h.fetcher.calls_for("http://x/a.jpg");
    assert_eq!(calls.len(), 3);
    let first_wait = calls[1] - calls[0];
    let second_wait = calls[2] - calls[1];
    assert!(second_wait > first_wait);
    assert_eq!(first_wait, Duration::from_secs(5));
    assert_eq!(second_wait, Duration::from_secs(10));

    let record = &h.dead_letters.records()[0];
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.error_kind, ErrorKind::TransientTransport);
    assert_eq!(h.metrics.snapshot().item_retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let fetcher = FakeFetcher::default().scripted(
        "http://x/a.jpg",
        vec![Err(FetchError::Timeout), Ok(Bytes::from_static(b"jpeg"))],
    );
    let h = harness(fetcher);
    let task = Task::new("p8", urls(&["a"]));

    let completion = h.executor.execute(&task, &CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::Committed { images: 1 });
    assert_eq!(h.fetcher.calls_for("http://x/a.jpg").len(), 2);
}

#[tokio::test]
async fn test_malformed_image_fails_immediately() {
    let fetcher = FakeFetcher::default().scripted(
        "http://x/a.jpg",
        vec![Ok(Bytes::from_static(b"<html>not an image</html>"))],
    );
    let h = harness_with(
        fetcher,
        Arc::new(Transcoder::default()),
        RecordingCommit::default(),
        RecordingDeadLetters::default(),
        4,
    );
    let task = Task::new("p9", urls(&["a"]));

    let err = h
        .executor
        .execute(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::AllFailed { .. }));
    assert_eq!(h.fetcher.calls_for("http://x/a.jpg").len(), 1);
    let record = &h.dead_letters.records()[0];
    assert_eq!(record.error_kind, ErrorKind::TerminalContent);
    assert_eq!(record.failed_items[0].attempts, 1);
}

// ---------------------------------------------------------------------------
// Concurrency and shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_item_concurrency_is_bounded() {
    let fetcher = FakeFetcher {
        delay: Some(Duration::from_millis(50)),
        ..FakeFetcher::default()
    };
    let h = harness_with(
        fetcher,
        Arc::new(PassthroughTranscoder),
        RecordingCommit::default(),
        RecordingDeadLetters::default(),
        3,
    );
    let names: Vec<String> = (0..10).map(|i| format!("img{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let task = Task::new("p10", urls(&name_refs));

    let completion = h.executor.execute(&task, &CancellationToken::new()).await.unwrap();

    assert_eq!(completion, Completion::Committed { images: 10 });
    let peak = h.fetcher.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak > 1);

    // Committed list follows input order
    let committed = h.results.committed("p10").unwrap();
    assert_eq!(
        committed[0],
        format!("https://store/{}", object_key("p10", "http://x/img0.jpg"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_skips_backoff_and_sinks() {
    let cancel = CancellationToken::new();
    let fetcher = FakeFetcher {
        cancel_on_call: Some(cancel.clone()),
        ..FakeFetcher::default()
    }
    .failing("http://x/a.jpg", reset());
    let h = harness(fetcher);
    let task = Task::new("p11", urls(&["a"]));

    let started = Instant::now();
    let err = h.executor.execute(&task, &cancel).await.unwrap_err();

    assert!(matches!(err, TaskError::Interrupted { .. }));
    assert_eq!(h.fetcher.calls_for("http://x/a.jpg").len(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(h.results.calls.load(Ordering::SeqCst), 0);
    assert!(h.dead_letters.records().is_empty());
    assert_eq!(h.metrics.snapshot().tasks_interrupted, 1);
}
