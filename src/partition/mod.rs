pub mod bucket;
pub mod config;
pub mod constants;
pub mod error;
pub mod loader;
pub mod oracle;
pub mod partitioner;
pub mod pool;
pub mod processor;
pub mod record;
pub mod signal;
pub mod tracker;
pub mod verify;


pub use bucket::Bucket;
pub use config::PartitionConfig;
pub use error::{PartitionError, SubtreeFailure};
pub use loader::{FileReport, LoadOutcome, Loader};
pub use oracle::is_sorted;
pub use partitioner::{PartitionOutcome, PartitionStats, Partitioner};
pub use pool::{PoolHandle, PoolReport, WorkerPool};
pub use processor::{PartitionEngine, RunReport};
pub use signal::StopSignal;
pub use tracker::CompletionTracker;
pub use verify::{verify_tree, VerifyReport, Violation};

use anyhow::Result;
use std::path::Path;

/// Discover the inputs under `input_dir` and partition them into `output_dir`.
pub async fn partition_directory(
    input_dir: &Path,
    output_dir: &Path,
    config: PartitionConfig,
) -> Result<RunReport> {
    let input_files = crate::utils::discover_input_files(input_dir, &config.input_extension)?;
    let engine = PartitionEngine::new(config)?;
    engine.process(&input_files, output_dir).await
}
