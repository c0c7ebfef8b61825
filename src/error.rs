use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuiltError>;

/// Everything that can abort a guilt run.
///
/// Per-file blame failures and unparseable blame lines never surface here;
/// they are absorbed by the batch scheduler and the blame parser.
#[derive(Debug, Error)]
pub enum GuiltError {
    /// Invalid option combination or config value. Raised before any git
    /// process is started.
    #[error("{0}")]
    Config(String),

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    ProcessFailure {
        command: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed reading output of `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

impl GuiltError {
    pub fn is_config(&self) -> bool {
        matches!(self, GuiltError::Config(_))
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
