use super::process::GitRunner;
use crate::error::Result;
use crate::types::{AttributionOptions, AuthorHistogram};
use std::path::Path;
use tracing::warn;

/// Blames `path` at `rev` (working tree when `None`) and counts lines per
/// author.
///
/// Lines that don't look like blame output are logged and skipped. A failing
/// `git blame` (typically: file absent at `rev`) is returned as an error; the
/// batch scheduler decides what that means.
pub fn attribute(
    runner: &GitRunner,
    repo: &Path,
    path: &str,
    rev: Option<&str>,
    options: &AttributionOptions,
) -> Result<AuthorHistogram> {
    let mut histogram = AuthorHistogram::new();
    runner.run(&blame_args(path, rev, options), repo, |line| {
        tally_line(&mut histogram, path, &line, options.email)
    })?;
    Ok(histogram)
}

/// Counts one blame line towards its author; anything unrecognised is logged
/// and ignored.
fn tally_line(histogram: &mut AuthorHistogram, path: &str, line: &str, email: bool) {
    match parse_author(line, email) {
        Some(author) => *histogram.entry(author.to_string()).or_insert(0) += 1,
        None => warn!(path, line = %line, "blame output did not match"),
    }
}

/// `git blame [-w] [-e] [<rev>] -- <path>`
pub(crate) fn blame_args(path: &str, rev: Option<&str>, options: &AttributionOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["blame".into()];
    if options.ignore_whitespace {
        args.push("-w".into());
    }
    if options.email {
        args.push("-e".into());
    }
    if let Some(rev) = rev {
        args.push(rev.into());
    }
    args.push("--".into());
    args.push(path.into());
    args
}

/// Pulls the author out of one line of default-format `git blame` output:
///
/// ```text
/// 1a2b3c4d (Tim Pettersen 2014-03-02 12:00:00 +1100 12) code
/// 1a2b3c4d src/old.rs (<tim@example.com> 2014-03-02 12:00:00 +1100 12) code
/// ```
///
/// Everything before the first `(` is commit and path noise. The author runs
/// up to the first whitespace gap that is followed by a `YYYY-MM-DD` date.
/// With `email` the author must be wrapped in `<...>` and the brackets are
/// dropped.
pub fn parse_author(line: &str, email: bool) -> Option<&str> {
    let open = line.find('(')?;
    let rest = &line[open + 1..];

    if email {
        let inner = rest.strip_prefix('<')?;
        let mut from = 0;
        while let Some(rel) = inner[from..].find('>') {
            let close = from + rel;
            if followed_by_date(&inner[close + 1..]) {
                return Some(inner[..close].trim());
            }
            from = close + 1;
        }
        return None;
    }

    for (idx, ch) in rest.char_indices() {
        if ch.is_whitespace() && followed_by_date(&rest[idx..]) {
            return Some(rest[..idx].trim());
        }
    }
    None
}

/// True when `s` is one or more whitespace chars followed by `DDDD-DD-DD`.
fn followed_by_date(s: &str) -> bool {
    let after = s.trim_start();
    if after.len() == s.len() {
        return false;
    }
    is_date_prefix(after.as_bytes())
}

fn is_date_prefix(b: &[u8]) -> bool {
    const SHAPE: &[u8; 10] = b"dddd-dd-dd";
    b.len() >= SHAPE.len()
        && SHAPE.iter().zip(b).all(|(&want, &got)| match want {
            b'd' => got.is_ascii_digit(),
            _ => got == want,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_name() {
        let line = "^670f554 (Tim Pettersen   2014-03-02 12:00:00 +1100  1) package com.atlassian.jwt;";
        assert_eq!(parse_author(line, false), Some("Tim Pettersen"));
    }

    #[test]
    fn test_parses_line_with_original_path() {
        let line = "b0cfb627 src/main/Jwt.java (Peter Brownlow 2013-11-20 09:15:00 +1100 44)     }";
        assert_eq!(parse_author(line, false), Some("Peter Brownlow"));
    }

    #[test]
    fn test_parses_email() {
        let line = "b0cfb627 (<tpettersen@atlassian.com> 2014-03-02 12:00:00 +1100 7) x";
        assert_eq!(parse_author(line, true), Some("tpettersen@atlassian.com"));
    }

    #[test]
    fn test_email_mode_requires_brackets() {
        let line = "b0cfb627 (Tim Pettersen 2014-03-02 12:00:00 +1100 7) x";
        assert_eq!(parse_author(line, true), None);
    }

    #[test]
    fn test_parentheses_in_code_do_not_confuse_author() {
        let line = "00000000 (Not Committed Yet 2024-05-01 10:00:00 +0000 3) call(2020-01-01 x)";
        assert_eq!(parse_author(line, false), Some("Not Committed Yet"));
    }

    #[test]
    fn test_author_with_digits_and_dashes() {
        let line = "abc (R2-D2 1999 2021-07-04 00:00:00 +0000 1) beep";
        assert_eq!(parse_author(line, false), Some("R2-D2 1999"));
    }

    #[test]
    fn test_non_blame_line_rejected() {
        assert_eq!(parse_author("fatal: no such path 'x' in HEAD", false), None);
        assert_eq!(parse_author("abc (no date here) code", false), None);
        assert_eq!(parse_author("", true), None);
    }

    #[test]
    fn test_date_must_follow_whitespace() {
        assert_eq!(parse_author("abc (Someone2014-03-02 12:00:00 +1100 1) x", false), None);
    }

    #[test]
    fn test_unmatched_lines_leave_the_rest_counted() {
        let output = [
            "^670f554 (Tim Pettersen 2014-03-02 12:00:00 +1100 1) a",
            "garbage without a date",
            "b0cfb627 (Peter Brownlow 2013-11-20 09:15:00 +1100 2) b",
            "",
            "^670f554 (Tim Pettersen 2014-03-02 12:00:00 +1100 3) c",
        ];
        let mut hist = AuthorHistogram::new();
        for line in output {
            tally_line(&mut hist, "Jwt.java", line, false);
        }
        assert_eq!(hist.len(), 2);
        assert_eq!(hist.get("Tim Pettersen"), Some(&2));
        assert_eq!(hist.get("Peter Brownlow"), Some(&1));
    }

    #[test]
    fn test_blame_args_all_flags() {
        let opts = AttributionOptions { ignore_whitespace: true, email: true, concurrency: 4 };
        assert_eq!(
            blame_args("src/a.rs", Some("abc123"), &opts),
            vec!["blame", "-w", "-e", "abc123", "--", "src/a.rs"]
        );
    }

    #[test]
    fn test_blame_args_working_tree() {
        let opts = AttributionOptions { ignore_whitespace: false, email: false, concurrency: 1 };
        assert_eq!(blame_args("a b.txt", None, &opts), vec!["blame", "--", "a b.txt"]);
    }
}
