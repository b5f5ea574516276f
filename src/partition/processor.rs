use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::partition::bucket::Bucket;
use crate::partition::config::PartitionConfig;
use crate::partition::constants::{BYTES_PER_MB, MEMORY_WARNING_PERCENT};
use crate::partition::error::{PartitionError, SubtreeFailure};
use crate::partition::loader::{FileReport, Loader};
use crate::partition::partitioner::{PartitionStats, Partitioner};
use crate::partition::pool::WorkerPool;
use crate::partition::signal::StopSignal;
use crate::partition::tracker::CompletionTracker;

/// Everything observable about one run besides the tree itself.
#[derive(Debug, Default)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    /// Unreadable inputs and failed subtrees, ordered by prefix then path.
    pub failures: Vec<SubtreeFailure>,
    pub stats: PartitionStats,
    pub total_records: usize,
    pub top_level_buckets: usize,
    pub cancelled: bool,
    pub load_time_ms: u64,
    pub partition_time_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn already_sorted_files(&self) -> usize {
        self.files.iter().filter(|f| f.already_sorted).count()
    }
}

/// Drives partitioning runs: output root, load, worker pool, report.
///
/// `shutdown_flag` is external and only read. Each run gets its own
/// `StopSignal`, so `stop_on_error` never leaks into the next run.
pub struct PartitionEngine {
    config: PartitionConfig,
    shutdown_flag: Arc<AtomicBool>,
}

impl PartitionEngine {
    pub fn new(config: PartitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_shutdown_signal(mut self, shutdown_flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = shutdown_flag;
        self
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Partition the records of `input_files` into a tree under `output_dir`.
    ///
    /// Only a failure to prepare the output root or an unreadable input (when
    /// not skipping) is returned as `Err`. Subtree failures are collected in
    /// the report.
    pub async fn process(&self, input_files: &[PathBuf], output_dir: &Path) -> Result<RunReport> {
        let mut report = RunReport::default();

        self.prepare_output_root(output_dir)?;
        self.check_memory(input_files);

        info!(
            "🚀 Partitioning {} files into {} (threshold {}, {} workers)",
            input_files.len(),
            output_dir.display(),
            self.config.threshold,
            self.config.worker_count
        );

        let load_start = Instant::now();
        let loader = Loader::from_config(&self.config);
        let files = input_files.to_vec();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&files)).await??;
        report.load_time_ms = load_start.elapsed().as_millis() as u64;

        report.files = loaded.files;
        report.total_records = loaded.total_records;
        report.failures = loaded.failures;

        let buckets: Vec<Bucket> = loaded.buckets.into_values().collect();
        report.top_level_buckets = buckets.len();
        debug!("Dispatching {} top-level buckets", buckets.len());

        let partition_start = Instant::now();
        let stop = StopSignal::linked(Arc::clone(&self.shutdown_flag));
        let tracker = Arc::new(CompletionTracker::new());
        let partitioner = Arc::new(Partitioner::new(&self.config, stop.clone(), tracker)?);

        let pool = WorkerPool::from_config(&self.config);
        let pool_report = pool.run(buckets, output_dir.to_path_buf(), partitioner).await;
        report.partition_time_ms = partition_start.elapsed().as_millis() as u64;

        report.stats = pool_report.stats;
        report.failures.extend(pool_report.failures);
        report
            .failures
            .sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.path.cmp(&b.path)));
        report.cancelled = stop.is_stopped();

        if report.is_success() {
            info!(
                "✅ Wrote {} records into {} leaves and {} directories",
                report.stats.records_written,
                report.stats.leaves_written,
                report.stats.directories_created
            );
        } else {
            warn!(
                "Run finished with {} failures, {} cancelled buckets",
                report.failures.len(),
                report.stats.cancelled_buckets
            );
        }

        Ok(report)
    }

    fn prepare_output_root(&self, output_dir: &Path) -> Result<(), PartitionError> {
        let root_error = |source| PartitionError::OutputRoot {
            path: output_dir.to_path_buf(),
            source,
        };

        if self.config.clear_output && output_dir.exists() {
            info!("🧹 Clearing existing output tree {}", output_dir.display());
            std::fs::remove_dir_all(output_dir).map_err(root_error)?;
        }
        std::fs::create_dir_all(output_dir).map_err(root_error)
    }

    fn check_memory(&self, input_files: &[PathBuf]) {
        let total_bytes: u64 = input_files
            .iter()
            .filter_map(|f| std::fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();
        let available = self.config.available_memory_bytes();

        debug!(
            "Input size {:.1} MB, available memory {:.1} MB",
            total_bytes as f64 / BYTES_PER_MB as f64,
            available as f64 / BYTES_PER_MB as f64
        );

        if available > 0 && total_bytes as f64 > available as f64 * MEMORY_WARNING_PERCENT / 100.0 {
            warn!(
                "Input ({:.1} MB) exceeds {}% of available memory ({:.1} MB); records are held in memory",
                total_bytes as f64 / BYTES_PER_MB as f64,
                MEMORY_WARNING_PERCENT,
                available as f64 / BYTES_PER_MB as f64
            );
        }
    }
}
