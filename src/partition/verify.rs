//! Offline checks over a finished output tree.
//!
//! Walks the tree from the root, re-deriving each node's prefix from its name,
//! and reports every leaf that is unsorted, oversized without excuse, or holds
//! a record outside its prefix.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::partition::constants::LEAF_FILE_EXTENSION;
use crate::partition::oracle::is_sorted;
use crate::partition::partitioner::split_fits;
use crate::partition::record::{depth_of, has_padded_prefix, indistinguishable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    UnsortedLeaf { path: PathBuf },
    OversizedLeaf { path: PathBuf, records: usize },
    PrefixMismatch { path: PathBuf, record: String },
    EmptyLeaf { path: PathBuf },
    /// A file or directory whose name does not extend its parent's prefix by one character.
    UnexpectedEntry { path: PathBuf },
    /// Both `<prefix>.txt` and `<prefix>/` exist in the same directory.
    ConflictingNodes { prefix: String, directory: PathBuf },
    UnreadableLeaf { path: PathBuf, message: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnsortedLeaf { path } => write!(f, "{} is not sorted", path.display()),
            Violation::OversizedLeaf { path, records } => {
                write!(f, "{} holds {} records, at or above the threshold", path.display(), records)
            }
            Violation::PrefixMismatch { path, record } => {
                write!(f, "{} contains {:?}, which does not match its prefix", path.display(), record)
            }
            Violation::EmptyLeaf { path } => write!(f, "{} is empty", path.display()),
            Violation::UnexpectedEntry { path } => write!(f, "{} does not follow the prefix naming", path.display()),
            Violation::ConflictingNodes { prefix, directory } => {
                write!(f, "{:?} is both a leaf and a directory in {}", prefix, directory.display())
            }
            Violation::UnreadableLeaf { path, message } => write!(f, "{}: {}", path.display(), message),
        }
    }
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub leaves: usize,
    pub directories: usize,
    pub records: usize,
    pub deepest_level: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every leaf under `root` against `threshold` and the naming scheme.
///
/// Leaves at `max_depth`, whose records cannot be told apart, or whose split
/// would not fit the path byte limits may exceed the threshold. The last check
/// measures paths from `root`, so pass the same root the tree was written to.
pub fn verify_tree(root: &Path, threshold: usize, max_depth: usize) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    visit(root, "", threshold, max_depth, &mut report)?;
    debug!(
        "Verified {}: {} leaves, {} directories, {} violations",
        root.display(),
        report.leaves,
        report.directories,
        report.violations.len()
    );
    Ok(report)
}

/// Every record stored under `root`, in tree walk order.
pub fn collect_records(root: &Path) -> Result<Vec<String>> {
    let mut records = Vec::new();
    collect_into(root, &mut records)?;
    Ok(records)
}

fn collect_into(dir: &Path, records: &mut Vec<String>) -> Result<()> {
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            collect_into(&path, records)?;
        } else {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read leaf {}", path.display()))?;
            records.extend(content.lines().map(str::to_string));
        }
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

fn visit(
    dir: &Path,
    parent_prefix: &str,
    threshold: usize,
    max_depth: usize,
    report: &mut VerifyReport,
) -> Result<()> {
    let child_depth = depth_of(parent_prefix) + 1;
    let mut leaf_prefixes = BTreeSet::new();
    let mut dir_prefixes = BTreeSet::new();

    for path in sorted_entries(dir)? {
        let name = match path.file_name().and_then(|n| n.to_str()).map(str::to_string) {
            Some(name) => name,
            None => {
                report.violations.push(Violation::UnexpectedEntry { path });
                continue;
            }
        };

        if path.is_dir() {
            if !names_child(&name, parent_prefix, child_depth) {
                report.violations.push(Violation::UnexpectedEntry { path });
                continue;
            }
            report.directories += 1;
            dir_prefixes.insert(name.clone());
            visit(&path, &name, threshold, max_depth, report)?;
            continue;
        }

        let prefix = match name.strip_suffix(&format!(".{}", LEAF_FILE_EXTENSION)) {
            Some(prefix) if names_child(prefix, parent_prefix, child_depth) => prefix.to_string(),
            _ => {
                report.violations.push(Violation::UnexpectedEntry { path });
                continue;
            }
        };

        leaf_prefixes.insert(prefix.clone());
        check_leaf(&path, &prefix, child_depth, threshold, max_depth, report);
    }

    for prefix in leaf_prefixes.intersection(&dir_prefixes) {
        report.violations.push(Violation::ConflictingNodes {
            prefix: prefix.clone(),
            directory: dir.to_path_buf(),
        });
    }

    Ok(())
}

fn names_child(name: &str, parent_prefix: &str, child_depth: usize) -> bool {
    name.starts_with(parent_prefix) && depth_of(name) == child_depth
}

fn check_leaf(
    path: &Path,
    prefix: &str,
    depth: usize,
    threshold: usize,
    max_depth: usize,
    report: &mut VerifyReport,
) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            report.violations.push(Violation::UnreadableLeaf {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
            return;
        }
    };

    let records: Vec<String> = content.lines().map(str::to_string).collect();
    report.leaves += 1;
    report.records += records.len();
    report.deepest_level = report.deepest_level.max(depth);

    if records.is_empty() {
        report.violations.push(Violation::EmptyLeaf { path: path.to_path_buf() });
        return;
    }

    if !is_sorted(&records) {
        report.violations.push(Violation::UnsortedLeaf { path: path.to_path_buf() });
    }

    if let Some(record) = records.iter().find(|r| !has_padded_prefix(r, prefix)) {
        report.violations.push(Violation::PrefixMismatch {
            path: path.to_path_buf(),
            record: record.clone(),
        });
    }

    let could_split = depth < max_depth
        && path.parent().is_some_and(|dir| split_fits(dir, prefix))
        && !indistinguishable(&records);
    if records.len() >= threshold && could_split {
        report.violations.push(Violation::OversizedLeaf {
            path: path.to_path_buf(),
            records: records.len(),
        });
    }
}
