use crate::error::{GuiltError, Result};
use crate::git::paths::{self, find_repo_root};
use crate::git::process::GitRunner;
use crate::histogram::delta;
use crate::scheduler::{run_batched, Attributor, GitBlame};
use crate::types::{AuthorHistogram, CancelToken, Guilt, GuiltRequest, ProgressSink, SelectionMode};
use tracing::info;

/// Computes guilt for one request.
///
/// `at` (or nothing) yields the absolute attribution of every file at that
/// revision. `since`/`until` yields the per-author net change over the files
/// that differ between them, with zero-change authors left out.
///
/// Option errors are reported before any git process starts. Failures of
/// root discovery, `ls-tree` or `diff` abort the run; failures of individual
/// `blame` calls do not.
pub fn guilt(request: &GuiltRequest, runner: &GitRunner, progress: &dyn ProgressSink) -> Result<Guilt> {
    let mode = SelectionMode::from_args(
        request.at.as_deref(),
        request.since.as_deref(),
        request.until.as_deref(),
    )
    .map_err(GuiltError::Config)?;
    let options = &request.options;
    if options.concurrency == 0 {
        return Err(GuiltError::Config("concurrency must be at least 1".to_string()));
    }

    let repo = find_repo_root(runner, request.repo_root.as_deref(), request.repo_subdir.as_deref())?;
    let blame = GitBlame { runner, repo: &repo, options };
    let cancel = runner.cancel_token();

    let (file_count, authors) = match &mode {
        SelectionMode::At { rev } => {
            let files = paths::list_at_revision(runner, &repo, rev)?;
            info!(files = files.len(), rev = %rev, "blaming tree");
            progress.on_file_count(files.len());
            let hist = run_batched(&blame, &files, Some(rev.as_str()), options.concurrency, cancel, progress)?;
            (files.len(), hist)
        }
        SelectionMode::Range { since, until } => {
            let files = paths::list_changed_between(
                runner,
                &repo,
                since,
                until.as_deref(),
                options.ignore_whitespace,
            )?;
            info!(files = files.len(), since = %since, until = ?until, "blaming changed files");
            progress.on_file_count(files.len() * 2);

            // The index can't be blamed directly; the staged side is read from
            // the working tree.
            let until_rev = if paths::is_staged_comparison(since, until.as_deref()) {
                None
            } else {
                until.as_deref()
            };
            let per_side = (options.concurrency / 2).max(1);
            let (since_hist, until_hist) =
                blame_both_sides(&blame, &files, since, until_rev, per_side, cancel, progress);
            (files.len(), delta(since_hist?, until_hist?))
        }
    };

    Ok(Guilt { mode, repo_root: repo, file_count, authors })
}

/// Blames `files` at `since` and at `until` at the same time, each side on its
/// own thread with its own pool of `per_side` workers.
fn blame_both_sides<A: Attributor>(
    attributor: &A,
    files: &[String],
    since: &str,
    until: Option<&str>,
    per_side: usize,
    cancel: &CancelToken,
    progress: &dyn ProgressSink,
) -> (Result<AuthorHistogram>, Result<AuthorHistogram>) {
    std::thread::scope(|s| {
        let since_side = s.spawn(|| run_batched(attributor, files, Some(since), per_side, cancel, progress));
        let until_hist = run_batched(attributor, files, until, per_side, cancel, progress);
        let since_hist = since_side
            .join()
            .unwrap_or_else(|_| Err(GuiltError::ThreadPool("blame thread panicked".to_string())));
        (since_hist, until_hist)
    })
}
