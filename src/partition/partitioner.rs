use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use rayon::prelude::*;
use tracing::{debug, error, warn};

use crate::partition::bucket::Bucket;
use crate::partition::config::PartitionConfig;
use crate::partition::constants::{LEAF_FILE_EXTENSION, MAX_CHAR_BYTES, MAX_NAME_BYTES, MAX_PATH_BYTES};
use crate::partition::error::{PartitionError, SubtreeFailure};
use crate::partition::record::indistinguishable;
use crate::partition::signal::StopSignal;
use crate::partition::tracker::CompletionTracker;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub leaves_written: usize,
    pub directories_created: usize,
    pub records_written: usize,
    /// Leaves flushed at or above the threshold because they could not split.
    pub oversized_leaves: usize,
    pub cancelled_buckets: usize,
    pub deepest_level: usize,
}

impl PartitionStats {
    pub fn merge(&mut self, other: &PartitionStats) {
        self.leaves_written += other.leaves_written;
        self.directories_created += other.directories_created;
        self.records_written += other.records_written;
        self.oversized_leaves += other.oversized_leaves;
        self.cancelled_buckets += other.cancelled_buckets;
        self.deepest_level = self.deepest_level.max(other.deepest_level);
    }
}

/// Result of partitioning one bucket and everything below it.
#[derive(Debug, Default)]
pub struct PartitionOutcome {
    pub stats: PartitionStats,
    pub failures: Vec<SubtreeFailure>,
}

impl PartitionOutcome {
    pub fn merged(mut self, other: PartitionOutcome) -> Self {
        self.stats.merge(&other.stats);
        self.failures.extend(other.failures);
        self
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Step {
    Leaf { records: usize, oversized: bool },
    Split { directory: PathBuf, children: Vec<Bucket> },
}

/// Sorts a bucket into a leaf file or splits it into a directory of children.
pub struct Partitioner {
    threshold: usize,
    max_depth: usize,
    io_buffer_size: usize,
    stop_on_error: bool,
    stop: StopSignal,
    tracker: Arc<CompletionTracker>,
    subtree_pool: Option<rayon::ThreadPool>,
}

impl Partitioner {
    pub fn new(
        config: &PartitionConfig,
        stop: StopSignal,
        tracker: Arc<CompletionTracker>,
    ) -> Result<Self, PartitionError> {
        let subtree_pool = if config.parallel_subtrees {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_count)
                .thread_name(|i| format!("subtree-{}", i))
                .build()
                .map_err(|e| PartitionError::Config(format!("failed to build subtree pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            threshold: config.threshold,
            max_depth: config.max_depth,
            io_buffer_size: config.io_buffer_size_bytes(),
            stop_on_error: config.stop_on_error,
            stop,
            tracker,
            subtree_pool,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Partition `bucket` under `output_dir`.
    ///
    /// The bucket must already be counted in the tracker; it is retired here,
    /// and any children it spawns are added before that happens. Failures stay
    /// inside the returned outcome so siblings keep going.
    pub fn partition(&self, bucket: Bucket, output_dir: &Path) -> PartitionOutcome {
        let mut outcome = PartitionOutcome::default();

        if self.stop.is_stopped() {
            outcome.stats.cancelled_buckets = 1;
            self.tracker.done();
            return outcome;
        }

        let prefix = bucket.prefix.clone();
        let depth = bucket.depth;
        outcome.stats.deepest_level = depth;

        match self.step(bucket, output_dir) {
            Ok(Step::Leaf { records, oversized }) => {
                outcome.stats.leaves_written = 1;
                outcome.stats.records_written = records;
                if oversized {
                    outcome.stats.oversized_leaves = 1;
                }
                self.tracker.done();
                outcome
            }
            Ok(Step::Split { directory, children }) => {
                outcome.stats.directories_created = 1;
                self.tracker.add(children.len());
                self.tracker.done();
                outcome.merged(self.partition_children(children, &directory))
            }
            Err(failure) => {
                error!("Subtree {:?} failed: {}", prefix, failure.error);
                if self.stop_on_error {
                    self.stop.stop();
                }
                self.tracker.done();
                outcome.failures.push(failure);
                outcome
            }
        }
    }

    fn step(&self, bucket: Bucket, output_dir: &Path) -> Result<Step, SubtreeFailure> {
        if bucket.is_empty() {
            let prefix = bucket.prefix;
            return Err(SubtreeFailure::new(
                prefix.clone(),
                output_dir.join(&prefix),
                PartitionError::EmptyBucket { prefix },
            ));
        }
        debug_assert!(bucket.holds_invariant(), "bucket {:?} violates its prefix", bucket.prefix);

        if self.should_flush(&bucket, output_dir) {
            let path = leaf_path(output_dir, &bucket.prefix);
            let fail = |error| SubtreeFailure::new(bucket.prefix.clone(), path.clone(), error);

            validate_component(&bucket.prefix, false).map_err(fail)?;
            let oversized = bucket.len() >= self.threshold;
            if oversized {
                warn!(
                    "Flushing {:?} with {} records at depth {}: no further split possible",
                    bucket.prefix,
                    bucket.len(),
                    bucket.depth
                );
            }

            let records = self.write_leaf(&path, bucket.records).map_err(fail)?;
            debug!("Wrote leaf {} ({} records)", path.display(), records);
            return Ok(Step::Leaf { records, oversized });
        }

        let directory = output_dir.join(&bucket.prefix);
        let fail = |error| SubtreeFailure::new(bucket.prefix.clone(), directory.clone(), error);

        validate_component(&bucket.prefix, true).map_err(fail)?;
        fs::create_dir_all(&directory)
            .map_err(|source| fail(PartitionError::CreateDir { path: directory.clone(), source }))?;

        debug!(
            "Splitting {:?} ({} records) into {}",
            bucket.prefix,
            bucket.len(),
            directory.display()
        );
        Ok(Step::Split {
            directory: directory.clone(),
            children: bucket.split(),
        })
    }

    fn should_flush(&self, bucket: &Bucket, output_dir: &Path) -> bool {
        bucket.len() < self.threshold
            || bucket.depth >= self.max_depth
            || !split_fits(output_dir, &bucket.prefix)
            || indistinguishable(&bucket.records)
    }

    fn partition_children(&self, children: Vec<Bucket>, directory: &Path) -> PartitionOutcome {
        match &self.subtree_pool {
            Some(pool) => pool.install(|| {
                children
                    .into_par_iter()
                    .map(|child| self.partition(child, directory))
                    .reduce(PartitionOutcome::default, PartitionOutcome::merged)
            }),
            None => children
                .into_iter()
                .fold(PartitionOutcome::default(), |acc, child| {
                    acc.merged(self.partition(child, directory))
                }),
        }
    }

    fn write_leaf(&self, path: &Path, mut records: Vec<String>) -> Result<usize, PartitionError> {
        let leaf_error = |source| PartitionError::WriteLeaf {
            path: path.to_path_buf(),
            source,
        };

        records.par_sort();

        let file = File::create(path).map_err(leaf_error)?;
        let mut writer = BufWriter::with_capacity(self.io_buffer_size, file);
        for record in &records {
            writeln!(writer, "{}", record).map_err(leaf_error)?;
        }
        writer.flush().map_err(leaf_error)?;

        Ok(records.len())
    }
}

/// `<output_dir>/<prefix>.txt`. The prefix may itself contain dots, so the
/// extension is appended rather than set.
pub fn leaf_path(output_dir: &Path, prefix: &str) -> PathBuf {
    output_dir.join(format!("{}.{}", prefix, LEAF_FILE_EXTENSION))
}

/// Whether `<output_dir>/<prefix>/` can hold the leaf of any child.
///
/// Measured in bytes against the widest possible child name, so a bucket that
/// passes can always flush every child it splits into.
pub fn split_fits(output_dir: &Path, prefix: &str) -> bool {
    let child_name = prefix.len() + MAX_CHAR_BYTES + 1 + LEAF_FILE_EXTENSION.len();
    let child_path = output_dir.as_os_str().len() + 1 + prefix.len() + 1 + child_name;
    child_name <= MAX_NAME_BYTES && child_path <= MAX_PATH_BYTES
}

/// Reject prefixes that would not name exactly one entry inside the parent.
pub fn validate_component(prefix: &str, is_directory: bool) -> Result<(), PartitionError> {
    let invalid = |reason| PartitionError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason,
    };

    if prefix.chars().any(std::path::is_separator) {
        return Err(invalid("contains a path separator"));
    }
    if prefix.contains('\0') {
        return Err(invalid("contains a NUL character"));
    }
    if is_directory && (prefix == "." || prefix == "..") {
        return Err(invalid("is a relative path component"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn partitioner(threshold: usize) -> Partitioner {
        let config = PartitionConfig {
            threshold,
            ..PartitionConfig::default()
        };
        Partitioner::new(&config, StopSignal::new(), Arc::new(CompletionTracker::new()))
            .unwrap()
    }

    fn bucket(prefix: &str, items: &[&str]) -> Bucket {
        Bucket::new(prefix.to_string(), items.iter().map(|s| s.to_string()).collect())
    }

    fn run(partitioner: &Partitioner, bucket: Bucket, dir: &Path) -> PartitionOutcome {
        partitioner.tracker().add(1);
        partitioner.partition(bucket, dir)
    }

    #[test]
    fn test_small_bucket_becomes_sorted_leaf() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p = partitioner(3);

        let outcome = run(&p, bucket("a", &["avocado", "apple"]), dir.path());

        assert!(outcome.is_success());
        assert_eq!(outcome.stats.leaves_written, 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt"))?, "apple\navocado\n");
        assert!(p.tracker().is_idle());
        Ok(())
    }

    #[test]
    fn test_bucket_at_threshold_splits() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p = partitioner(2);

        let outcome = run(&p, bucket("a", &["avocado", "apple"]), dir.path());

        assert!(outcome.is_success());
        assert_eq!(outcome.stats.directories_created, 1);
        assert_eq!(outcome.stats.leaves_written, 2);
        assert!(dir.path().join("a").is_dir());
        assert_eq!(fs::read_to_string(dir.path().join("a").join("ap.txt"))?, "apple\n");
        assert_eq!(fs::read_to_string(dir.path().join("a").join("av.txt"))?, "avocado\n");
        assert!(!dir.path().join("a.txt").exists());
        assert!(p.tracker().is_idle());
        Ok(())
    }

    #[test]
    fn test_short_record_is_written_unpadded() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p = partitioner(2);

        run(&p, bucket("a", &["ab", "a", "ac"]), dir.path());

        let padded_leaf = dir.path().join("a").join("a .txt");
        assert_eq!(fs::read_to_string(padded_leaf)?, "a\n");
        assert_eq!(fs::read_to_string(dir.path().join("a").join("ab.txt"))?, "ab\n");
        Ok(())
    }

    #[test]
    fn test_identical_records_escape_recursion() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p = partitioner(2);

        let outcome = run(&p, bucket("z", &["zz", "zz", "zz", "zz"]), dir.path());

        assert_eq!(outcome.stats.oversized_leaves, 1);
        assert_eq!(fs::read_to_string(dir.path().join("z.txt"))?, "zz\nzz\nzz\nzz\n");
        Ok(())
    }

    #[test]
    fn test_max_depth_forces_flush() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = PartitionConfig {
            threshold: 2,
            max_depth: 2,
            ..PartitionConfig::default()
        };
        let p = Partitioner::new(&config, StopSignal::new(), Arc::new(CompletionTracker::new()))?;

        let outcome = run(&p, bucket("q", &["qqqa", "qqqb", "qqqc"]), dir.path());

        assert!(outcome.is_success());
        assert_eq!(outcome.stats.deepest_level, 2);
        assert_eq!(fs::read_to_string(dir.path().join("q").join("qq.txt"))?, "qqqa\nqqqb\nqqqc\n");
        Ok(())
    }

    #[test]
    fn test_empty_bucket_is_reported() {
        let dir = tempdir().unwrap();
        let p = partitioner(2);

        let outcome = run(&p, bucket("e", &[]), dir.path());

        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(outcome.failures[0].error, PartitionError::EmptyBucket { .. }));
    }

    #[test]
    fn test_separator_prefix_is_isolated() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p = partitioner(10);

        let bad = run(&p, bucket("/", &["/etc/passwd"]), dir.path());
        let good = run(&p, bucket("k", &["kiwi"]), dir.path());

        assert_eq!(bad.failures.len(), 1);
        assert_eq!(bad.failures[0].prefix, "/");
        assert!(good.is_success());
        assert!(dir.path().join("k.txt").exists());
        Ok(())
    }

    #[test]
    fn test_cancelled_bucket_is_skipped() {
        let dir = tempdir().unwrap();
        let stop = StopSignal::new();
        stop.stop();
        let p = Partitioner::new(&PartitionConfig::default(), stop, Arc::new(CompletionTracker::new()))
            .unwrap();

        let outcome = run(&p, bucket("a", &["apple"]), dir.path());

        assert_eq!(outcome.stats.cancelled_buckets, 1);
        assert!(!dir.path().join("a.txt").exists());
        assert!(p.tracker().is_idle());
    }

    #[test]
    fn test_parallel_subtrees_match_sequential() -> anyhow::Result<()> {
        let words: Vec<String> = (0..200).map(|i| format!("w{:03}", (i * 37) % 200)).collect();
        let sequential_dir = tempdir()?;
        let parallel_dir = tempdir()?;

        let sequential = partitioner(5);
        let config = PartitionConfig {
            threshold: 5,
            parallel_subtrees: true,
            worker_count: 3,
            ..PartitionConfig::default()
        };
        let parallel = Partitioner::new(&config, StopSignal::new(), Arc::new(CompletionTracker::new()))?;

        let a = run(&sequential, Bucket::new("w".to_string(), words.clone()), sequential_dir.path());
        let b = run(&parallel, Bucket::new("w".to_string(), words), parallel_dir.path());

        assert_eq!(a.stats, b.stats);
        assert!(parallel.tracker().is_idle());
        let leaf = Path::new("w").join("w1").join("w13").join("w137.txt");
        assert_eq!(
            fs::read_to_string(sequential_dir.path().join(&leaf))?,
            fs::read_to_string(parallel_dir.path().join(&leaf))?
        );
        Ok(())
    }

    #[test]
    fn test_long_multibyte_prefix_flushes_before_path_limit() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let p = partitioner(2);
        let stem = "😀".repeat(70);
        let records: Vec<String> = ["a", "b", "c"].iter().map(|tail| format!("{}{}", stem, tail)).collect();

        let outcome = run(&p, Bucket::new("😀".to_string(), records.clone()), dir.path());

        assert!(outcome.is_success(), "{:?}", outcome.failures);
        assert_eq!(outcome.stats.leaves_written, 1);
        assert_eq!(outcome.stats.oversized_leaves, 1);
        assert_eq!(outcome.stats.records_written, 3);
        assert!(outcome.stats.deepest_level < 70);
        assert!(p.tracker().is_idle());
        Ok(())
    }

    #[test]
    fn test_split_fits_counts_bytes() {
        let root = Path::new("/out");
        assert!(split_fits(root, "abc"));
        assert!(split_fits(root, &"a".repeat(247)));
        assert!(!split_fits(root, &"a".repeat(248)));
        // 62 four-byte characters are 248 bytes, past the name limit.
        assert!(!split_fits(root, &"😀".repeat(62)));
        assert!(split_fits(root, &"😀".repeat(61)));

        let deep_root = PathBuf::from(format!("/{}", "d".repeat(4080)));
        assert!(!split_fits(&deep_root, "abc"));
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component(".", false).is_ok());
        assert!(validate_component(".", true).is_err());
        assert!(validate_component("..", true).is_err());
        assert!(validate_component("a/b", false).is_err());
        assert!(validate_component("a b", true).is_ok());
    }
}
