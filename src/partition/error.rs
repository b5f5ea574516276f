use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading input or writing the partitioned tree.
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("Failed to read input file {path}: {source}")]
    InputRead { path: PathBuf, source: io::Error },

    #[error("Failed to prepare output root {path}: {source}")]
    OutputRoot { path: PathBuf, source: io::Error },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to write leaf file {path}: {source}")]
    WriteLeaf { path: PathBuf, source: io::Error },

    #[error("Prefix {prefix:?} cannot be used as a path component: {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    /// A bucket was created with no records. Always a defect.
    #[error("Bucket {prefix:?} has no records")]
    EmptyBucket { prefix: String },

    /// Partitioning a bucket panicked. Only observable when panics unwind.
    #[error("Partitioning {prefix:?} panicked: {message}")]
    Panicked { prefix: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A failure isolated to one bucket and everything below it.
#[derive(Debug)]
pub struct SubtreeFailure {
    /// Accumulated prefix of the failed bucket. For input files this is empty.
    pub prefix: String,
    pub path: PathBuf,
    pub error: PartitionError,
}

impl SubtreeFailure {
    pub fn new(prefix: impl Into<String>, path: impl Into<PathBuf>, error: PartitionError) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
            error,
        }
    }
}

impl fmt::Display for SubtreeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}: {}", self.path.display(), self.error)
        } else {
            write!(f, "[{}] {}: {}", self.prefix, self.path.display(), self.error)
        }
    }
}
