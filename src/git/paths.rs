use super::process::GitRunner;
use crate::error::{GuiltError, Result};
use std::path::{Path, PathBuf};

/// Returns the repository root.
///
/// An explicit `repo_root` is trusted as-is; otherwise asks
/// `git rev-parse --show-toplevel` from `repo_subdir` (or the current dir).
pub fn find_repo_root(
    runner: &GitRunner,
    repo_root: Option<&Path>,
    repo_subdir: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(root) = repo_root {
        return Ok(root.to_path_buf());
    }
    let cwd = match repo_subdir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(|e| {
            GuiltError::Config(format!("Failed to get current directory: {e}"))
        })?,
    };
    let lines = runner.lines(&["rev-parse", "--show-toplevel"], &cwd)?;
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .find(|l| !l.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            GuiltError::Config(format!("No repository root reported for '{}'", cwd.display()))
        })
}

/// Every file in the tree at `rev` (`git ls-tree -r --name-only <rev>`).
pub fn list_at_revision(runner: &GitRunner, repo: &Path, rev: &str) -> Result<Vec<String>> {
    collect_paths(runner, repo, &ls_tree_args(rev))
}

/// Every file that differs between `since` and `until` (working tree when
/// `until` is `None`).
pub fn list_changed_between(
    runner: &GitRunner,
    repo: &Path,
    since: &str,
    until: Option<&str>,
    ignore_whitespace: bool,
) -> Result<Vec<String>> {
    collect_paths(runner, repo, &diff_args(since, until, ignore_whitespace))
}

/// `HEAD..HEAD` means "what's staged", i.e. index against the last commit.
pub fn is_staged_comparison(since: &str, until: Option<&str>) -> bool {
    since == "HEAD" && until == Some("HEAD")
}

pub(crate) fn ls_tree_args(rev: &str) -> Vec<String> {
    vec!["ls-tree".into(), "-r".into(), "--name-only".into(), rev.into()]
}

pub(crate) fn diff_args(since: &str, until: Option<&str>, ignore_whitespace: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["diff".into()];
    if ignore_whitespace {
        args.push("-w".into());
    }
    let staged = is_staged_comparison(since, until);
    if staged {
        args.push("--staged".into());
    }
    args.push("--name-only".into());
    args.push(since.into());
    if let (Some(until), false) = (until, staged) {
        args.push(until.into());
    }
    args
}

fn collect_paths(runner: &GitRunner, repo: &Path, args: &[String]) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    runner.run(args, repo, |line| {
        if !line.is_empty() {
            paths.push(unquote_path(line));
        }
    })?;
    Ok(paths)
}

/// Undoes git's C-style quoting of unusual path names (`core.quotePath`),
/// e.g. `"caf\303\251.txt"` becomes `café.txt`. Unquoted lines pass through.
pub(crate) fn unquote_path(line: String) -> String {
    let inner = match line.strip_prefix('"').and_then(|l| l.strip_suffix('"')) {
        Some(inner) => inner,
        None => return line,
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut rest = inner.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        rest = tail;
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let Some((&esc, tail)) = rest.split_first() else {
            bytes.push(b'\\');
            break;
        };
        rest = tail;
        match esc {
            b'a' => bytes.push(0x07),
            b'b' => bytes.push(0x08),
            b't' => bytes.push(b'\t'),
            b'n' => bytes.push(b'\n'),
            b'v' => bytes.push(0x0b),
            b'f' => bytes.push(0x0c),
            b'r' => bytes.push(b'\r'),
            b'0'..=b'3' if rest.len() >= 2 && rest[..2].iter().all(|d| (b'0'..=b'7').contains(d)) => {
                bytes.push(((esc - b'0') << 6) | ((rest[0] - b'0') << 3) | (rest[1] - b'0'));
                rest = &rest[2..];
            }
            other => bytes.push(other),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
