/// Whether `records` is in non-decreasing lexicographic order.
///
/// Uses the same ordering as the leaf sort, so a freshly written leaf always
/// satisfies it.
pub fn is_sorted<S: AsRef<str>>(records: &[S]) -> bool {
    records
        .windows(2)
        .all(|pair| pair[0].as_ref() <= pair[1].as_ref())
}
