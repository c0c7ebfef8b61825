use crate::error::{GuiltError, Result};
use crate::types::CancelToken;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use tracing::debug;

/// Shared settings for every git process spawned during one run.
#[derive(Debug, Clone)]
pub struct GitRunner {
    program: String,
    envs: Vec<(String, String)>,
    forward_stderr: bool,
    cancel: CancelToken,
}

impl Default for GitRunner {
    fn default() -> Self {
        GitRunner::new("git")
    }
}

impl GitRunner {
    pub fn new(program: impl Into<String>) -> Self {
        GitRunner {
            program: program.into(),
            envs: Vec::new(),
            forward_stderr: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Let git write its stderr straight to ours instead of capturing it.
    pub fn forward_stderr(mut self, forward: bool) -> Self {
        self.forward_stderr = forward;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Starts `git <args>` in `cwd` and streams its stdout line by line.
    pub fn spawn<S: AsRef<str>>(&self, args: &[S], cwd: &Path) -> Result<GitLines> {
        let command = self.command_line(args);
        if self.cancel.is_cancelled() {
            return Err(GuiltError::Cancelled);
        }
        debug!(command = %command, cwd = %cwd.display(), "spawning");

        let mut cmd = Command::new(&self.program);
        cmd.args(args.iter().map(|a| a.as_ref()))
            .current_dir(cwd)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.forward_stderr { Stdio::inherit() } else { Stdio::piped() });

        let mut child = cmd.spawn().map_err(|source| GuiltError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdout = match child.stdout.take() {
            Some(out) => BufReader::new(out),
            None => {
                reap(&mut child);
                return Err(GuiltError::Io {
                    command,
                    source: std::io::Error::other("stdout was not captured"),
                });
            }
        };

        // Drained on its own thread so a chatty stderr can't block stdout.
        let stderr_reader = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut text);
                text
            })
        });

        Ok(GitLines {
            command,
            child: Some(child),
            stdout,
            stderr_reader,
            cancel: self.cancel.clone(),
            buf: Vec::new(),
            exhausted: false,
        })
    }

    /// Runs `git <args>` to completion, handing every line to `on_line`.
    pub fn run<S, F>(&self, args: &[S], cwd: &Path, mut on_line: F) -> Result<()>
    where
        S: AsRef<str>,
        F: FnMut(String),
    {
        let mut lines = self.spawn(args, cwd)?;
        for line in lines.by_ref() {
            on_line(line?);
        }
        lines.finish()
    }

    /// Runs `git <args>` and collects every output line.
    pub fn lines<S: AsRef<str>>(&self, args: &[S], cwd: &Path) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.run(args, cwd, |line| out.push(line))?;
        Ok(out)
    }

    fn command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
        let mut s = self.program.clone();
        for a in args {
            s.push(' ');
            s.push_str(a.as_ref());
        }
        s
    }
}

/// Lazily-read stdout of one git process.
///
/// Iterating yields lines as git produces them (terminators stripped, a
/// trailing unterminated fragment included). Call [`GitLines::finish`] after
/// the last line to check the exit code. Dropping an unfinished stream kills
/// and reaps the child.
pub struct GitLines {
    command: String,
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    stderr_reader: Option<thread::JoinHandle<String>>,
    cancel: CancelToken,
    buf: Vec<u8>,
    exhausted: bool,
}

impl GitLines {
    /// Drains any unread output, waits for exit, and maps a nonzero code to
    /// [`GuiltError::ProcessFailure`].
    pub fn finish(mut self) -> Result<()> {
        while !self.exhausted {
            if let Some(Err(e)) = self.next() {
                return Err(e);
            }
        }

        let Some(mut child) = self.child.take() else {
            return Err(GuiltError::Cancelled);
        };
        let status = child.wait().map_err(|source| GuiltError::Io {
            command: self.command.clone(),
            source,
        })?;
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        debug!(command = %self.command, code = ?status.code(), "exited");
        if status.success() {
            Ok(())
        } else {
            Err(GuiltError::ProcessFailure {
                command: self.command.clone(),
                code: status.code(),
                stderr,
            })
        }
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            reap(&mut child);
        }
        self.exhausted = true;
    }
}

impl Iterator for GitLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.kill();
            return Some(Err(GuiltError::Cancelled));
        }

        self.buf.clear();
        match self.stdout.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.exhausted = true;
                None
            }
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                // Blamed files aren't guaranteed to be UTF-8.
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(source) => {
                self.kill();
                Some(Err(GuiltError::Io {
                    command: self.command.clone(),
                    source,
                }))
            }
        }
    }
}

impl Drop for GitLines {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => reap(&mut child),
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_command_line_joins_program_and_args() {
        let runner = GitRunner::default();
        assert_eq!(
            runner.command_line(&["blame", "-w", "--", "src/a.rs"]),
            "git blame -w -- src/a.rs"
        );
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let runner = GitRunner::new("definitely-not-a-real-git-binary");
        let err = runner.lines(&["status"], Path::new(".")).unwrap_err();
        assert!(matches!(err, GuiltError::Spawn { .. }), "got {err:?}");
    }

    #[test]
    fn test_cancelled_runner_does_not_spawn() {
        let runner = GitRunner::default();
        runner.cancel_token().cancel();
        let err = runner.lines(&["--version"], Path::new(".")).unwrap_err();
        assert!(matches!(err, GuiltError::Cancelled));
    }

    #[test]
    fn test_nonzero_exit_is_process_failure() {
        if !git_available() {
            eprintln!("Skipping: git not installed");
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let ceiling = tmp.path().parent().unwrap_or(tmp.path());
        let err = GitRunner::default()
            .env("GIT_CEILING_DIRECTORIES", ceiling.display().to_string())
            .lines(&["rev-parse", "--show-toplevel"], tmp.path())
            .unwrap_err();
        match err {
            GuiltError::ProcessFailure { command, code, .. } => {
                assert_eq!(command, "git rev-parse --show-toplevel");
                assert_ne!(code, Some(0));
            }
            other => panic!("expected ProcessFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_last_line_is_delivered() {
        if !git_available() {
            eprintln!("Skipping: git not installed");
            return;
        }
        let lines = GitRunner::default()
            .lines(&["-c", "alias.p=!printf 'x\\ny'", "p"], Path::new("."))
            .unwrap();
        assert_eq!(lines, vec!["x", "y"]);
    }

    #[test]
    fn test_streams_lines_and_succeeds() {
        if !git_available() {
            eprintln!("Skipping: git not installed");
            return;
        }
        let lines = GitRunner::default()
            .lines(&["--version"], Path::new("."))
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("git version"), "got {:?}", lines[0]);
    }
}
