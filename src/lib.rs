// Prefix partitioning engine
pub mod partition;

// Logging setup, input discovery and formatting helpers
pub mod utils;

// Re-export main types for convenience
pub use partition::{
    is_sorted, partition_directory, verify_tree, PartitionConfig, PartitionEngine, PartitionError,
    RunReport, SubtreeFailure, VerifyReport,
};
