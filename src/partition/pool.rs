use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::partition::bucket::Bucket;
use crate::partition::config::PartitionConfig;
use crate::partition::constants::POOL_PROGRESS_INTERVAL_MS;
use crate::partition::error::{PartitionError, SubtreeFailure};
use crate::partition::partitioner::{PartitionStats, Partitioner};
use crate::partition::signal::StopSignal;
use crate::partition::tracker::CompletionTracker;

/// Aggregate of every bucket the pool processed in one run.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub stats: PartitionStats,
    pub failures: Vec<SubtreeFailure>,
    pub buckets_dispatched: usize,
}

/// Fixed-size set of workers pulling top-level buckets from a bounded queue.
pub struct WorkerPool {
    worker_count: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn from_config(config: &PartitionConfig) -> Self {
        Self::new(config.worker_count, config.queue_capacity)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Start partitioning `buckets` under `output_dir`.
    ///
    /// Must be called from within a tokio runtime. The returned handle is the
    /// only way to observe completion; it cancels through the partitioner's
    /// stop signal.
    pub fn start(&self, buckets: Vec<Bucket>, output_dir: PathBuf, partitioner: Arc<Partitioner>) -> PoolHandle {
        let tracker = Arc::clone(partitioner.tracker());
        let stop = partitioner.stop_signal().clone();
        let report = Arc::new(Mutex::new(PoolReport::default()));
        let (sender, receiver) = mpsc::channel::<Bucket>(self.queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        // Every bucket is pending from the moment it is accepted, not when a
        // worker picks it up.
        tracker.add(buckets.len());

        let producer = {
            let tracker = Arc::clone(&tracker);
            let report = Arc::clone(&report);
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut dispatched = 0;
                let mut remaining = buckets.into_iter();
                while let Some(bucket) = remaining.next() {
                    if stop.is_stopped() {
                        Self::retire_undispatched(1 + remaining.len(), &tracker, &report);
                        break;
                    }
                    if sender.send(bucket).await.is_err() {
                        // Every worker is gone; nothing will consume the rest.
                        Self::retire_undispatched(1 + remaining.len(), &tracker, &report);
                        break;
                    }
                    dispatched += 1;
                }
                report.lock().buckets_dispatched = dispatched;
                dispatched
            })
        };

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count {
            let receiver = Arc::clone(&receiver);
            let partitioner = Arc::clone(&partitioner);
            let report = Arc::clone(&report);
            let output_dir = output_dir.clone();

            workers.spawn(async move {
                Self::worker_task(worker_id, receiver, partitioner, report, output_dir).await
            });
        }

        PoolHandle {
            workers,
            producer,
            report,
            tracker,
            stop,
        }
    }

    /// Start and wait in one step.
    pub async fn run(
        &self,
        buckets: Vec<Bucket>,
        output_dir: PathBuf,
        partitioner: Arc<Partitioner>,
    ) -> PoolReport {
        self.start(buckets, output_dir, partitioner).wait().await
    }

    async fn worker_task(
        worker_id: usize,
        receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Bucket>>>,
        partitioner: Arc<Partitioner>,
        report: Arc<Mutex<PoolReport>>,
        output_dir: PathBuf,
    ) {
        loop {
            let next = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(bucket) = next else {
                break;
            };

            let prefix = bucket.prefix.clone();
            debug!("Worker {} took bucket {:?} ({} records)", worker_id, prefix, bucket.len());

            let partitioner = Arc::clone(&partitioner);
            let bucket_dir = output_dir.clone();
            let result = tokio::task::spawn_blocking(move || {
                partitioner.partition(bucket, &bucket_dir)
            })
            .await;

            match result {
                Ok(outcome) => {
                    let mut report = report.lock();
                    report.stats.merge(&outcome.stats);
                    report.failures.extend(outcome.failures);
                }
                // The tracker keeps the unfinished subtree pending.
                Err(e) => {
                    error!("Worker {} panicked on bucket {:?}: {}", worker_id, prefix, e);
                    let failure = SubtreeFailure::new(
                        prefix.clone(),
                        output_dir.join(&prefix),
                        PartitionError::Panicked {
                            prefix,
                            message: e.to_string(),
                        },
                    );
                    report.lock().failures.push(failure);
                }
            }
        }
        debug!("Worker {} finished", worker_id);
    }

    fn retire_undispatched(count: usize, tracker: &CompletionTracker, report: &Mutex<PoolReport>) {
        for _ in 0..count {
            tracker.done();
        }
        report.lock().stats.cancelled_buckets += count;
    }
}

/// Completion handle for one pool run.
pub struct PoolHandle {
    workers: JoinSet<()>,
    producer: JoinHandle<usize>,
    report: Arc<Mutex<PoolReport>>,
    tracker: Arc<CompletionTracker>,
    stop: StopSignal,
}

impl PoolHandle {
    /// Buckets not yet terminal, including ones spawned by splits.
    pub fn pending(&self) -> usize {
        self.tracker.pending()
    }

    /// Ask workers to stop before their next bucket. In-flight leaf writes finish.
    pub fn cancel(&self) {
        self.stop.stop();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Block until every dispatched bucket, and everything it spawned, is done.
    pub async fn wait(mut self) -> PoolReport {
        let progress_interval = Duration::from_millis(POOL_PROGRESS_INTERVAL_MS);

        loop {
            match tokio::time::timeout(progress_interval, self.workers.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(e))) => {
                    error!("Worker task failed: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    info!(
                        "⏳ {} buckets pending, {} retired",
                        self.tracker.pending(),
                        self.tracker.retired()
                    );
                }
            }
        }

        if let Err(e) = (&mut self.producer).await {
            error!("Bucket producer failed: {}", e);
        }

        let report = std::mem::take(&mut *self.report.lock());
        debug!(
            "Pool drained: {} buckets dispatched, {} still pending",
            report.buckets_dispatched,
            self.tracker.pending()
        );
        report
    }
}
