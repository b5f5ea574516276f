//! Prefix arithmetic over records.
//!
//! A record is one line of text. When a record is shorter than the depth
//! being examined it behaves as if right-padded with [`PAD_CHAR`]. The padding
//! only affects which bucket a record lands in; stored text is never padded.

use std::iter;
use crate::partition::constants::PAD_CHAR;

/// Character at `index` (zero based), or the pad character past the end.
pub fn char_at(record: &str, index: usize) -> char {
    record.chars().nth(index).unwrap_or(PAD_CHAR)
}

/// First `depth` characters of `record`, padded when the record is shorter.
pub fn padded_prefix(record: &str, depth: usize) -> String {
    record
        .chars()
        .chain(iter::repeat(PAD_CHAR))
        .take(depth)
        .collect()
}

/// Whether `record`, padded as needed, begins with `prefix`.
pub fn has_padded_prefix(record: &str, prefix: &str) -> bool {
    let mut chars = record.chars().chain(iter::repeat(PAD_CHAR));
    prefix.chars().all(|expected| chars.next() == Some(expected))
}

/// True when no depth can ever tell the records apart.
///
/// Two records are indistinguishable when they are equal once trailing pad
/// characters are ignored, e.g. `"a"` and `"a "`.
pub fn indistinguishable(records: &[String]) -> bool {
    match records.split_first() {
        None => true,
        Some((first, rest)) => {
            let anchor = first.trim_end_matches(PAD_CHAR);
            rest.iter().all(|r| r.trim_end_matches(PAD_CHAR) == anchor)
        }
    }
}

/// Number of characters in a prefix, which is its depth.
pub fn depth_of(prefix: &str) -> usize {
    prefix.chars().count()
}
