use std::collections::BTreeMap;
use crate::partition::record::{char_at, depth_of, has_padded_prefix};

/// Records known to share `prefix`, pending a sort-or-split decision.
///
/// `depth` is the number of characters in `prefix`. A bucket is consumed by
/// value when it is either flushed or split, so no two workers ever hold the
/// same one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub prefix: String,
    pub depth: usize,
    pub records: Vec<String>,
}

impl Bucket {
    pub fn new(prefix: String, records: Vec<String>) -> Self {
        let depth = depth_of(&prefix);
        Self { prefix, depth, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether every record, padded to `depth`, starts with `prefix`.
    pub fn holds_invariant(&self) -> bool {
        self.records.iter().all(|r| has_padded_prefix(r, &self.prefix))
    }

    /// Re-bucket the records by their padded character at position `depth`.
    ///
    /// Children come back ordered by that character. Each child is non-empty
    /// and one level deeper than `self`.
    pub fn split(self) -> Vec<Bucket> {
        let mut groups: BTreeMap<char, Vec<String>> = BTreeMap::new();
        for record in self.records {
            let key = char_at(&record, self.depth);
            groups.entry(key).or_default().push(record);
        }

        groups
            .into_iter()
            .map(|(key, records)| {
                let mut prefix = String::with_capacity(self.prefix.len() + key.len_utf8());
                prefix.push_str(&self.prefix);
                prefix.push(key);
                Bucket {
                    prefix,
                    depth: self.depth + 1,
                    records,
                }
            })
            .collect()
    }
}
