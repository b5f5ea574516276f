use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use prefix_sift::partition::loader::Loader;
use prefix_sift::partition::verify::collect_records;
use prefix_sift::partition::{Bucket, CompletionTracker, Partitioner, StopSignal, WorkerPool};
use prefix_sift::{is_sorted, partition_directory, verify_tree, PartitionConfig};

/// Helper to create an input directory with a few unsorted word files
fn create_test_data(temp_dir: &TempDir) -> Result<()> {
    let input_dir = temp_dir.path().join("input");
    fs::create_dir_all(&input_dir)?;

    let words1 = "delta\nalpha\ncharlie\nalpha\n\nbravo\nalphabet\nal\n";
    let words2 = "echo\nfoxtrot\nalpine\nbravado\nbravo\ncharm\n";
    let words3 = "a\nab\nabc\nabcd\nabcde\n";

    fs::write(input_dir.join("words1.txt"), words1)?;
    fs::write(input_dir.join("words2.txt"), words2)?;
    fs::write(input_dir.join("words3.txt"), words3)?;
    fs::write(input_dir.join("notes.md"), "zulu\n")?;

    Ok(())
}

fn count_multiset(records: Vec<String>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record).or_insert(0) += 1;
    }
    counts
}

fn input_records(input_dir: &Path) -> Result<Vec<String>> {
    let mut records = Vec::new();
    for name in ["words1.txt", "words2.txt", "words3.txt"] {
        let content = fs::read_to_string(input_dir.join(name))?;
        records.extend(content.lines().filter(|l| !l.is_empty()).map(str::to_string));
    }
    Ok(records)
}

#[tokio::test]
async fn test_end_to_end_properties_hold() -> Result<()> {
    let temp_dir = TempDir::new()?;
    create_test_data(&temp_dir)?;
    let input_dir = temp_dir.path().join("input");

    for threshold in [1, 2, 3, 5, 100] {
        let output = temp_dir.path().join(format!("out_t{}", threshold));
        let config = PartitionConfig {
            threshold,
            worker_count: 3,
            ..PartitionConfig::default()
        };

        let report = partition_directory(&input_dir, &output, config).await?;
        assert!(report.is_success(), "threshold {}: {:?}", threshold, report.failures);
        assert_eq!(report.files.len(), 3);

        let verified = verify_tree(&output, threshold, 64)?;
        assert!(verified.is_valid(), "threshold {}: {:?}", threshold, verified.violations);

        let expected = count_multiset(input_records(&input_dir)?);
        let found = count_multiset(collect_records(&output)?);
        assert_eq!(found, expected, "threshold {}", threshold);
    }

    Ok(())
}

#[tokio::test]
async fn test_leaf_is_reachable_by_walking_prefix() -> Result<()> {
    let temp_dir = TempDir::new()?;
    create_test_data(&temp_dir)?;
    let output = temp_dir.path().join("out");

    let config = PartitionConfig {
        threshold: 2,
        ..PartitionConfig::default()
    };
    partition_directory(&temp_dir.path().join("input"), &output, config).await?;

    // Walk one character at a time until a leaf holding "alphabet" appears.
    let record = "alphabet";
    let mut dir = output.clone();
    let mut found = None;
    for depth in 1..=record.len() + 1 {
        let prefix: String = record.chars().chain(std::iter::repeat(' ')).take(depth).collect();
        let leaf = dir.join(format!("{}.txt", prefix));
        if leaf.is_file() {
            found = Some(leaf);
            break;
        }
        dir = dir.join(&prefix);
        assert!(dir.is_dir(), "missing node for {:?}", prefix);
    }

    let leaf = found.expect("leaf for alphabet");
    let content = fs::read_to_string(&leaf)?;
    assert!(content.lines().any(|l| l == record));
    Ok(())
}

#[tokio::test]
async fn test_input_sortedness_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    create_test_data(&temp_dir)?;
    let output = temp_dir.path().join("out");

    let report = partition_directory(&temp_dir.path().join("input"), &output, PartitionConfig::default()).await?;

    let verdicts: HashMap<String, bool> = report
        .files
        .iter()
        .map(|f| (f.path.file_name().unwrap().to_string_lossy().to_string(), f.already_sorted))
        .collect();
    assert!(!verdicts["words1.txt"]);
    assert!(!verdicts["words2.txt"]);
    assert!(verdicts["words3.txt"]);
    assert_eq!(report.already_sorted_files(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pool_handle_tracks_split_work() -> Result<()> {
    let temp_dir = TempDir::new()?;
    create_test_data(&temp_dir)?;
    let input_dir = temp_dir.path().join("input");
    let output = temp_dir.path().join("out");
    fs::create_dir_all(&output)?;

    let config = PartitionConfig {
        threshold: 2,
        worker_count: 2,
        parallel_subtrees: true,
        ..PartitionConfig::default()
    };
    let files = prefix_sift::utils::discover_input_files(&input_dir, "txt")?;
    let loaded = Loader::from_config(&config).load(&files)?;
    let buckets: Vec<Bucket> = loaded.buckets.into_values().collect();
    let top_level = buckets.len();

    let tracker = Arc::new(CompletionTracker::new());
    let partitioner = Arc::new(Partitioner::new(&config, StopSignal::new(), Arc::clone(&tracker))?);

    let handle = WorkerPool::from_config(&config).start(buckets, output.clone(), partitioner);
    let report = handle.wait().await;

    assert!(tracker.is_idle());
    assert_eq!(report.buckets_dispatched, top_level);
    assert!(report.failures.is_empty());
    // Every split parent and every leaf was retired exactly once.
    assert_eq!(
        tracker.retired(),
        report.stats.directories_created + report.stats.leaves_written
    );

    for leaf in walk_leaves(&output)? {
        let content = fs::read_to_string(&leaf)?;
        let lines: Vec<&str> = content.lines().collect();
        assert!(is_sorted(&lines), "{} is unsorted", leaf.display());
    }
    Ok(())
}

fn walk_leaves(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut leaves = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            leaves.extend(walk_leaves(&path)?);
        } else {
            leaves.push(path);
        }
    }
    Ok(leaves)
}
