use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::partition::bucket::Bucket;
use crate::partition::config::PartitionConfig;
use crate::partition::error::{PartitionError, SubtreeFailure};
use crate::partition::oracle::is_sorted;

/// What the loader saw in one input file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub records: usize,
    pub blank_lines: usize,
    /// Whether the file's non-empty records were already in order.
    pub already_sorted: bool,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Depth-1 buckets keyed by first character. Iteration order is arbitrary.
    pub buckets: HashMap<char, Bucket>,
    pub files: Vec<FileReport>,
    /// Unreadable inputs, only populated when skipping is enabled.
    pub failures: Vec<SubtreeFailure>,
    pub total_records: usize,
}

pub struct Loader {
    io_buffer_size: usize,
    skip_unreadable: bool,
}

impl Loader {
    pub fn new(io_buffer_size: usize, skip_unreadable: bool) -> Self {
        Self {
            io_buffer_size,
            skip_unreadable,
        }
    }

    pub fn from_config(config: &PartitionConfig) -> Self {
        Self::new(config.io_buffer_size_bytes(), config.skip_unreadable_inputs)
    }

    /// Read every input and group the records into depth-1 buckets.
    ///
    /// Files are read in parallel but merged in `paths` order, so a bucket's
    /// record order does not depend on scheduling.
    pub fn load(&self, paths: &[PathBuf]) -> Result<LoadOutcome, PartitionError> {
        let results: Vec<_> = paths
            .par_iter()
            .map(|path| self.read_records(path))
            .collect();

        let mut outcome = LoadOutcome::default();
        let mut grouped: HashMap<char, Vec<String>> = HashMap::new();

        for (path, result) in paths.iter().zip(results) {
            let (records, blank_lines) = match result {
                Ok(read) => read,
                Err(e) if self.skip_unreadable => {
                    warn!("Skipping unreadable input {}: {}", path.display(), e);
                    outcome.failures.push(SubtreeFailure::new(String::new(), path.clone(), e));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let already_sorted = is_sorted(&records);
            info!(
                "{}: {} records, already sorted: {}",
                path.display(),
                records.len(),
                if already_sorted { "yes" } else { "no" }
            );

            outcome.files.push(FileReport {
                path: path.clone(),
                records: records.len(),
                blank_lines,
                already_sorted,
            });
            outcome.total_records += records.len();

            for record in records {
                // Blank records were dropped while reading, so there is always a first char.
                if let Some(first) = record.chars().next() {
                    grouped.entry(first).or_default().push(record);
                }
            }
        }

        outcome.buckets = grouped
            .into_iter()
            .map(|(first, records)| (first, Bucket::new(first.to_string(), records)))
            .collect();

        debug!(
            "Loaded {} records from {} files into {} buckets",
            outcome.total_records,
            outcome.files.len(),
            outcome.buckets.len()
        );

        Ok(outcome)
    }

    /// Non-empty lines of `path` and the number of blank lines dropped.
    pub fn read_records(&self, path: &Path) -> Result<(Vec<String>, usize), PartitionError> {
        let read_error = |source| PartitionError::InputRead {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(read_error)?;
        let reader = BufReader::with_capacity(self.io_buffer_size, file);

        let mut records = Vec::new();
        let mut blank_lines = 0;
        for line in reader.lines() {
            let line = line.map_err(read_error)?;
            if line.is_empty() {
                blank_lines += 1;
            } else {
                records.push(line);
            }
        }

        Ok((records, blank_lines))
    }
}
