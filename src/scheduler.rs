use crate::error::{GuiltError, Result};
use crate::git::{blame_parser, process::GitRunner};
use crate::histogram::merge_into;
use crate::types::{AttributionOptions, AuthorHistogram, CancelToken, ProgressSink};
use rayon::prelude::*;
use std::path::Path;
use tracing::debug;

/// Produces one file's author histogram at a revision.
pub trait Attributor: Sync {
    fn attribute(&self, path: &str, rev: Option<&str>) -> Result<AuthorHistogram>;
}

/// [`Attributor`] backed by `git blame`.
pub struct GitBlame<'a> {
    pub runner: &'a GitRunner,
    pub repo: &'a Path,
    pub options: &'a AttributionOptions,
}

impl Attributor for GitBlame<'_> {
    fn attribute(&self, path: &str, rev: Option<&str>) -> Result<AuthorHistogram> {
        blame_parser::attribute(self.runner, self.repo, path, rev, self.options)
    }
}

/// Blames `paths` at `rev`, `concurrency` files at a time, and merges the
/// results.
///
/// Groups run strictly one after another; every file of a group is in flight
/// at once and the next group waits for the slowest. A file that can't be
/// blamed (usually deleted at `rev`) counts as an empty histogram.
pub fn run_batched<A: Attributor>(
    attributor: &A,
    paths: &[String],
    rev: Option<&str>,
    concurrency: usize,
    cancel: &CancelToken,
    progress: &dyn ProgressSink,
) -> Result<AuthorHistogram> {
    let group_size = concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(group_size)
        .thread_name(|i| format!("guilt-blame-{i}"))
        .build()
        .map_err(|e| GuiltError::ThreadPool(e.to_string()))?;

    let mut total = AuthorHistogram::new();
    for (idx, group) in paths.chunks(group_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(GuiltError::Cancelled);
        }
        debug!(group = idx, size = group.len(), rev = rev.unwrap_or("<working tree>"), "blame group");

        let results: Vec<AuthorHistogram> = pool.install(|| {
            group
                .par_iter()
                .map(|path| {
                    let hist = attributor.attribute(path, rev).unwrap_or_else(|e| {
                        debug!(path = %path, rev = ?rev, error = %e, "blame failed, counting as empty");
                        AuthorHistogram::new()
                    });
                    progress.on_file_done();
                    hist
                })
                .collect()
        });

        for hist in results {
            merge_into(&mut total, hist);
        }
    }

    if cancel.is_cancelled() {
        return Err(GuiltError::Cancelled);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fake blame: each path maps to a fixed histogram, unknown paths fail.
    struct FakeBlame {
        files: HashMap<String, AuthorHistogram>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        seen_revs: Mutex<Vec<Option<String>>>,
        delay: Duration,
    }

    impl FakeBlame {
        fn new() -> Self {
            FakeBlame {
                files: HashMap::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                seen_revs: Mutex::new(Vec::new()),
                delay: Duration::from_millis(5),
            }
        }

        fn with(mut self, path: &str, counts: &[(&str, i64)]) -> Self {
            let hist = counts.iter().map(|(a, n)| (a.to_string(), *n)).collect();
            self.files.insert(path.to_string(), hist);
            self
        }
    }

    impl Attributor for FakeBlame {
        fn attribute(&self, path: &str, rev: Option<&str>) -> Result<AuthorHistogram> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.seen_revs.lock().unwrap().push(rev.map(str::to_string));
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.files.get(path).cloned().ok_or_else(|| GuiltError::ProcessFailure {
                command: format!("git blame -- {path}"),
                code: Some(128),
                stderr: format!("fatal: no such path '{path}'"),
            })
        }
    }

    #[derive(Default)]
    struct CountingProgress(AtomicUsize);

    impl ProgressSink for CountingProgress {
        fn on_file_done(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn paths(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn test_merges_all_files() {
        let fake = FakeBlame::new()
            .with("a.rs", &[("alice", 3), ("bob", 1)])
            .with("b.rs", &[("bob", 2)])
            .with("c.rs", &[("carol", 5)]);
        let files = vec!["a.rs".to_string(), "b.rs".to_string(), "c.rs".to_string()];
        let hist = run_batched(&fake, &files, Some("HEAD"), 2, &CancelToken::new(), &()).unwrap();
        assert_eq!(hist.get("alice"), Some(&3));
        assert_eq!(hist.get("bob"), Some(&3));
        assert_eq!(hist.get("carol"), Some(&5));
        assert!(fake
            .seen_revs
            .lock()
            .unwrap()
            .iter()
            .all(|r| r.as_deref() == Some("HEAD")));
    }

    #[test]
    fn test_failed_file_counts_as_empty() {
        let fake = FakeBlame::new().with("kept.rs", &[("alice", 4)]);
        let files = vec!["deleted.rs".to_string(), "kept.rs".to_string()];
        let progress = CountingProgress::default();
        let hist = run_batched(&fake, &files, Some("abc"), 4, &CancelToken::new(), &progress).unwrap();
        assert_eq!(hist.len(), 1);
        assert_eq!(hist.get("alice"), Some(&4));
        assert_eq!(progress.0.load(Ordering::SeqCst), 2, "failures still report progress");
    }

    #[test]
    fn test_never_exceeds_concurrency() {
        let files = paths(23);
        for concurrency in [1, 2, 3, 8] {
            let fake = files
                .iter()
                .fold(FakeBlame::new(), |fake, p| fake.with(p, &[("alice", 1)]));
            let hist = run_batched(&fake, &files, None, concurrency, &CancelToken::new(), &()).unwrap();
            assert_eq!(hist.get("alice"), Some(&23));
            let max = fake.max_in_flight.load(Ordering::SeqCst);
            assert!(max <= concurrency, "concurrency {concurrency} exceeded: {max} in flight");
        }
    }

    #[test]
    fn test_zero_concurrency_treated_as_one() {
        let fake = FakeBlame::new().with("a", &[("alice", 1)]).with("b", &[("alice", 1)]);
        let files = vec!["a".to_string(), "b".to_string()];
        let hist = run_batched(&fake, &files, None, 0, &CancelToken::new(), &()).unwrap();
        assert_eq!(hist.get("alice"), Some(&2));
        assert_eq!(fake.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_path_list() {
        let fake = FakeBlame::new();
        let hist = run_batched(&fake, &[], Some("HEAD"), 4, &CancelToken::new(), &()).unwrap();
        assert!(hist.is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let fake = FakeBlame::new().with("a", &[("alice", 1)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_batched(&fake, &["a".to_string()], None, 2, &cancel, &()).unwrap_err();
        assert!(matches!(err, GuiltError::Cancelled));
        assert!(fake.seen_revs.lock().unwrap().is_empty(), "no file should be blamed");
    }
}
