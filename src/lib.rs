//! Per-author blame deltas between two git revisions.
//!
//! Every line of every relevant file is attributed with `git blame`; the
//! per-file counts are merged per revision and, for a range, subtracted to
//! give each author's net change in attributed lines.

pub mod config;
pub mod error;
pub mod git;
pub mod guilt;
pub mod histogram;
pub mod reporters;
pub mod scheduler;
pub mod types;

pub use error::{GuiltError, Result};
pub use git::process::GitRunner;
pub use guilt::guilt;
pub use types::{
    AttributionOptions, AuthorHistogram, CancelToken, Guilt, GuiltRequest, ProgressSink,
    SelectionMode,
};
