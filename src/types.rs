use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ─── Core Data ────────────────────────────────────────────────────────────────

/// Author identity (name or email) → attributed line count.
///
/// Snapshot histograms only hold positive counts. Delta histograms are signed
/// and never contain zero entries.
pub type AuthorHistogram = HashMap<String, i64>;

/// Knobs read by the blame parser and the batch scheduler. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionOptions {
    /// Pass `-w` to `git blame` and `git diff`.
    pub ignore_whitespace: bool,
    /// Identify authors by `<email>` (`git blame -e`) instead of display name.
    pub email: bool,
    /// Maximum number of blame processes in flight.
    pub concurrency: usize,
}

pub const DEFAULT_CONCURRENCY: usize = 4;

impl Default for AttributionOptions {
    fn default() -> Self {
        AttributionOptions {
            ignore_whitespace: true,
            email: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Which revisions a run compares. Chosen once, never mixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionMode {
    /// Absolute attribution of every file at `rev`.
    At { rev: String },
    /// Net change from `since` to `until`; `until: None` is the working tree.
    Range { since: String, until: Option<String> },
}

impl SelectionMode {
    /// Resolves the `at` / `since` / `until` trio into a mode.
    ///
    /// `at` can't be combined with a range, `until` needs `since`, and nothing
    /// at all means `HEAD`.
    pub fn from_args(
        at: Option<&str>,
        since: Option<&str>,
        until: Option<&str>,
    ) -> Result<SelectionMode, String> {
        match (at, since, until) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(
                "--at can't be used in conjunction with a since/until range".to_string(),
            ),
            (None, None, Some(_)) => Err("until can't be specified without since".to_string()),
            (Some(rev), None, None) => Ok(SelectionMode::At { rev: rev.to_string() }),
            (None, Some(since), until) => Ok(SelectionMode::Range {
                since: since.to_string(),
                until: until.map(str::to_string),
            }),
            (None, None, None) => Ok(SelectionMode::At { rev: "HEAD".to_string() }),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, SelectionMode::Range { .. })
    }

    /// Human-readable summary used in report headers.
    pub fn describe(&self) -> String {
        match self {
            SelectionMode::At { rev } => format!("at {rev}"),
            SelectionMode::Range { since, until: Some(until) } => format!("{since}..{until}"),
            SelectionMode::Range { since, until: None } => format!("{since}..working tree"),
        }
    }
}

// ─── Cancellation ─────────────────────────────────────────────────────────────

/// Shared flag that abandons a run. Running git processes are killed the next
/// time their output is polled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Progress ─────────────────────────────────────────────────────────────────

/// Observer for progress reporting. Never required for correctness.
pub trait ProgressSink: Sync {
    /// Number of blame jobs about to run. Called once, before batching.
    fn on_file_count(&self, _count: usize) {}
    /// One blame job finished, successfully or not.
    fn on_file_done(&self) {}
}

/// No-op progress.
impl ProgressSink for () {}

// ─── Request / Result ─────────────────────────────────────────────────────────

/// Everything a single guilt run needs.
#[derive(Debug, Clone, Default)]
pub struct GuiltRequest {
    pub at: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    /// Used verbatim when set; otherwise discovered with `git rev-parse`.
    pub repo_root: Option<PathBuf>,
    /// Directory to start root discovery from (defaults to the current dir).
    pub repo_subdir: Option<PathBuf>,
    pub options: AttributionOptions,
}

/// Outcome of a guilt run: a snapshot histogram for [`SelectionMode::At`], a
/// delta for [`SelectionMode::Range`].
#[derive(Debug, Clone, PartialEq)]
pub struct Guilt {
    pub mode: SelectionMode,
    pub repo_root: PathBuf,
    pub file_count: usize,
    pub authors: AuthorHistogram,
}

// ─── Report ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AuthorEntry {
    pub author: String,
    pub lines: i64,
}

#[derive(Debug, Serialize)]
pub struct ReportMeta {
    #[serde(flatten)]
    pub selection: SelectionMode,
    pub repo_path: String,
    pub file_count: usize,
    /// Sum of all entries: total lines for a snapshot, net change for a range.
    pub total: i64,
    pub analyzed_at: String,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub authors: Vec<AuthorEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Largest value first, ties by name.
    #[default]
    Guilt,
    Name,
}

impl Report {
    pub fn new(guilt: &Guilt, sort: SortOrder) -> Report {
        let mut authors: Vec<AuthorEntry> = guilt
            .authors
            .iter()
            .map(|(author, &lines)| AuthorEntry { author: author.clone(), lines })
            .collect();
        match sort {
            SortOrder::Guilt => {
                authors.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.author.cmp(&b.author)))
            }
            SortOrder::Name => authors.sort_by(|a, b| a.author.cmp(&b.author)),
        }

        Report {
            meta: ReportMeta {
                selection: guilt.mode.clone(),
                repo_path: guilt.repo_root.display().to_string(),
                file_count: guilt.file_count,
                total: authors.iter().map(|e| e.lines).sum(),
                analyzed_at: chrono::Utc::now().to_rfc3339(),
            },
            authors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_head() {
        let mode = SelectionMode::from_args(None, None, None).unwrap();
        assert_eq!(mode, SelectionMode::At { rev: "HEAD".to_string() });
    }

    #[test]
    fn test_at_with_range_rejected() {
        assert!(SelectionMode::from_args(Some("v1"), Some("v0"), None).is_err());
        assert!(SelectionMode::from_args(Some("v1"), None, Some("v2")).is_err());
    }

    #[test]
    fn test_until_without_since_rejected() {
        let err = SelectionMode::from_args(None, None, Some("v2")).unwrap_err();
        assert!(err.contains("since"), "error should mention since: {err}");
    }

    #[test]
    fn test_since_alone_compares_with_working_tree() {
        let mode = SelectionMode::from_args(None, Some("HEAD~3"), None).unwrap();
        assert_eq!(mode, SelectionMode::Range { since: "HEAD~3".to_string(), until: None });
        assert_eq!(mode.describe(), "HEAD~3..working tree");
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    fn sample_guilt() -> Guilt {
        Guilt {
            mode: SelectionMode::Range { since: "a".to_string(), until: Some("b".to_string()) },
            repo_root: PathBuf::from("/tmp/repo"),
            file_count: 2,
            authors: AuthorHistogram::from([
                ("Tim Pettersen".to_string(), 3),
                ("Peter Brownlow".to_string(), -3),
                ("Alice".to_string(), 3),
            ]),
        }
    }

    #[test]
    fn test_report_sorted_by_guilt_then_name() {
        let report = Report::new(&sample_guilt(), SortOrder::Guilt);
        let names: Vec<&str> = report.authors.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Tim Pettersen", "Peter Brownlow"]);
        assert_eq!(report.meta.total, 3);
    }

    #[test]
    fn test_report_sorted_by_name() {
        let report = Report::new(&sample_guilt(), SortOrder::Name);
        let names: Vec<&str> = report.authors.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Peter Brownlow", "Tim Pettersen"]);
    }

    #[test]
    fn test_report_meta_serializes_selection_inline() {
        let report = Report::new(&sample_guilt(), SortOrder::Guilt);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["meta"]["mode"], "range");
        assert_eq!(json["meta"]["since"], "a");
        assert_eq!(json["meta"]["until"], "b");
        assert_eq!(json["authors"][0]["author"], "Alice");
    }
}
