use crate::types::AuthorHistogram;

/// Sums counts per author. An author missing from a histogram contributes 0.
pub fn merge<I>(histograms: I) -> AuthorHistogram
where
    I: IntoIterator<Item = AuthorHistogram>,
{
    let mut total = AuthorHistogram::new();
    for hist in histograms {
        merge_into(&mut total, hist);
    }
    total
}

/// Adds one file's histogram to a running total.
pub fn merge_into(total: &mut AuthorHistogram, hist: AuthorHistogram) {
    for (author, count) in hist {
        *total.entry(author).or_insert(0) += count;
    }
}

/// `until - since` per author. Authors only in `since` go negative, authors
/// only in `until` keep their count, and anyone who nets out to 0 is dropped.
pub fn delta(since: AuthorHistogram, until: AuthorHistogram) -> AuthorHistogram {
    let mut result = until;
    for (author, count) in since {
        *result.entry(author).or_insert(0) -= count;
    }
    result.retain(|_, v| *v != 0);
    result
}
