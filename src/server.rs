use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use imagepress::config::Config;
use imagepress::ledger::FjallStore;
use imagepress::messaging::ChannelDeadLetterSink;
use imagepress::observability::Metrics;
use imagepress::pipeline::{DeadLetterRecord, RetryingItemProcessor, Task, TaskExecutor};
use imagepress::queue::{FjallQueue, Subscription};
use imagepress::status::{self, StatusState};
use imagepress::storage::StorageClient;
use imagepress::worker::{HttpFetcher, TranscodeConfig, Transcoder, Worker, WorkerConfig};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wire every collaborator and consume tasks until a shutdown signal
pub async fn run_worker(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    info!(path = %config.queue.path.display(), "Opening FjallQueue");
    let queue = Arc::new(FjallQueue::open(&config.queue.path)?);
    let ledger = Arc::new(FjallStore::open(&config.ledger.path)?);
    let storage = Arc::new(StorageClient::from_config(&config.storage)?);
    let fetcher = Arc::new(HttpFetcher::from_settings(&config.fetch)?);
    let transcoder = Arc::new(Transcoder::new(TranscodeConfig::from(&config.transcode)));

    let processor = RetryingItemProcessor::builder()
        .fetcher(fetcher)
        .transcoder(transcoder)
        .store(storage)
        .policy(config.retry.policy())
        .metrics(Arc::clone(&metrics))
        .build();

    let dead_letters = Arc::new(ChannelDeadLetterSink::new(
        queue.clone(),
        &config.queue.dead_letter_channel,
    ));

    let executor = TaskExecutor::builder()
        .processor(Arc::new(processor))
        .results(ledger.clone())
        .dead_letters(dead_letters)
        .item_concurrency(config.worker.item_concurrency)
        .metrics(Arc::clone(&metrics))
        .build();

    let subscription = Arc::new(Subscription::new(
        queue.clone(),
        &config.queue.task_channel,
        &config.queue.consumer_group,
    ));

    let worker = Worker::builder()
        .source(subscription.clone())
        .executor(Arc::new(executor))
        .config(WorkerConfig::from(&config.worker))
        .metrics(Arc::clone(&metrics))
        .build();

    let cancel = CancellationToken::new();

    let status_server = config.server.enabled.then(|| {
        let state = StatusState {
            queue: queue.clone(),
            ledger: ledger.clone(),
            subscription: subscription.clone(),
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(status::serve(config.server.bind_addr, state, cancel.clone()))
    });

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    info!(
        channel = %config.queue.task_channel,
        group = %config.queue.consumer_group,
        "Consuming image tasks"
    );
    worker.run(cancel.clone()).await;
    cancel.cancel();

    if let Some(handle) = status_server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Status endpoint failed"),
            Err(e) => error!(error = %e, "Status endpoint task panicked"),
        }
    }

    queue.flush()?;
    ledger.persist()?;
    info!(metrics = ?metrics.snapshot(), "Shutdown complete");

    Ok(())
}

pub fn enqueue(config: &Config, task_id: String, urls: Vec<String>) -> Result<(), AnyError> {
    let queue = FjallQueue::open(&config.queue.path)?;
    let task = Task::new(task_id, urls);

    let offset = queue.publish(&config.queue.task_channel, &task.encode()?)?;
    queue.flush()?;

    info!(task_id = %task.task_id, offset, "Task enqueued");
    println!("{offset}");
    Ok(())
}

pub fn dead_letters(config: &Config, from: u64, limit: usize) -> Result<(), AnyError> {
    let queue = FjallQueue::open(&config.queue.path)?;

    for (offset, payload) in queue.read(&config.queue.dead_letter_channel, from, limit)? {
        match DeadLetterRecord::from_payload(&payload) {
            Ok(record) => println!("{}", serde_json::to_string(&record)?),
            Err(e) => warn!(offset, error = %e, "Unreadable dead-letter record"),
        }
    }
    Ok(())
}

pub fn record(config: &Config, task_id: &str) -> Result<(), AnyError> {
    let ledger = FjallStore::open(&config.ledger.path)?;

    match ledger.get(task_id)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => return Err(format!("no record for task '{task_id}'").into()),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, finishing in-flight attempts");
}
