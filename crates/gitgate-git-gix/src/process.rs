use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::{CommandOutput, Result};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs the `git` executable against one working directory.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    program: PathBuf,
    workdir: PathBuf,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C")
            .arg(&self.workdir)
            .arg("-c")
            .arg("color.ui=false")
            .arg("-c")
            .arg("core.quotepath=false")
            .args(args)
            // Diagnostics are matched on their English text.
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true");
        cmd
    }

    /// Runs `git args..`, failing with a classified error on a non-zero exit.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_accepting(args, None, &[0])
    }

    pub fn run_with_stdin(&self, args: &[&str], stdin: &[u8]) -> Result<CommandOutput> {
        self.run_accepting(args, Some(stdin), &[0])
    }

    /// Like [`run`](Self::run), returning stdout only.
    pub fn capture(&self, args: &[&str]) -> Result<String> {
        Ok(self.run(args)?.stdout)
    }

    pub fn capture_bytes(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::from(e).with_operation(label(args)))?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let captured = CommandOutput {
            command: label(args),
            stdout: String::new(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        Err(failure(args, &captured))
    }

    /// Runs with a set of exit codes that count as success, e.g. `git diff`
    /// reporting differences with 1.
    pub fn run_accepting(
        &self,
        args: &[&str],
        stdin: Option<&[u8]>,
        ok_codes: &[i32],
    ) -> Result<CommandOutput> {
        let command = label(args);
        tracing::debug!(%command, workdir = %self.workdir.display(), "running git");

        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let io_err = |e: std::io::Error| Error::from(e).with_operation(command.clone());
        let mut child = cmd.spawn().map_err(io_err)?;
        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input).map_err(io_err)?;
        }
        let output = child.wait_with_output().map_err(io_err)?;

        let captured = CommandOutput {
            command: command.clone(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        match output.status.code() {
            Some(code) if ok_codes.contains(&code) => Ok(captured),
            _ => {
                let err = failure(args, &captured);
                tracing::debug!(%command, kind = ?err.kind(), "git failed");
                Err(err)
            }
        }
    }
}

fn label(args: &[&str]) -> String {
    let mut out = String::from("git");
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}

fn failure(args: &[&str], output: &CommandOutput) -> Error {
    let text = output.combined();
    Error::new(classify_failure(args, &text))
        .with_operation(output.command.clone())
        .with_output(text)
        .with_args(args.iter().copied())
}

/// Maps git's diagnostic text onto an error kind.
pub fn classify_failure(args: &[&str], text: &str) -> ErrorKind {
    let lower = text.to_ascii_lowercase();
    let is_stash = args.first() == Some(&"stash");

    if lower.contains("patch does not apply")
        || lower.contains("while searching for")
        || lower.contains("corrupt patch")
    {
        ErrorKind::PatchDidNotApply
    } else if lower.contains("would be overwritten by")
        || lower.contains("please commit your changes or stash them")
    {
        ErrorKind::UncommittedChanges
    } else if is_stash && lower.contains("conflict") {
        ErrorKind::StashConflict
    } else if lower.contains("cannot delete branch")
        || lower.contains("checked out at")
        || lower.contains("used by worktree at")
    {
        ErrorKind::RefInUse
    } else if lower.contains("does not exist in")
        || lower.contains("exists on disk, but not in")
        || lower.contains("neither on disk nor in the index")
        || lower.contains("not a valid object name")
        || lower.contains("bad object")
        || lower.contains("bad revision")
    {
        ErrorKind::ObjectNotFound
    } else if lower.contains("did not match any file(s) known to git")
        || lower.contains("not a valid ref")
        || lower.contains("unknown revision")
        || lower.contains("no such remote")
        || lower.contains("is not a valid reference")
        || lower.contains("not a stash-like commit")
        || lower.contains("not found")
        || lower.contains("invalid reference")
    {
        ErrorKind::RefNotFound
    } else if lower.contains("permission denied") {
        ErrorKind::PermissionDenied
    } else if lower.contains("not a git repository") {
        ErrorKind::NotARepository
    } else {
        ErrorKind::GitCommandFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_failures() {
        assert_eq!(
            classify_failure(
                &["apply", "--cached", "-"],
                "error: patch failed: a.txt:1\nerror: a.txt: patch does not apply"
            ),
            ErrorKind::PatchDidNotApply
        );
        assert_eq!(
            classify_failure(
                &["checkout", "other"],
                "error: Your local changes to the following files would be overwritten by checkout:\n\ta.txt"
            ),
            ErrorKind::UncommittedChanges
        );
        assert_eq!(
            classify_failure(
                &["checkout", "nope"],
                "error: pathspec 'nope' did not match any file(s) known to git"
            ),
            ErrorKind::RefNotFound
        );
        assert_eq!(
            classify_failure(
                &["branch", "-d", "main"],
                "error: Cannot delete branch 'main' checked out at '/tmp/x'"
            ),
            ErrorKind::RefInUse
        );
        assert_eq!(
            classify_failure(
                &["branch", "-d", "main"],
                "error: cannot delete branch 'main' used by worktree at '/tmp/x'"
            ),
            ErrorKind::RefInUse
        );
        assert_eq!(
            classify_failure(
                &["show", "HEAD:missing.txt"],
                "fatal: path 'missing.txt' does not exist in 'HEAD'"
            ),
            ErrorKind::ObjectNotFound
        );
        assert_eq!(
            classify_failure(&["commit", "-m", "x"], "nothing to commit"),
            ErrorKind::GitCommandFailed
        );
    }

    #[test]
    fn conflicts_only_count_as_stash_conflicts_for_stash() {
        let text = "CONFLICT (content): Merge conflict in a.txt";
        assert_eq!(
            classify_failure(&["stash", "pop", "stash@{0}"], text),
            ErrorKind::StashConflict
        );
        assert_eq!(
            classify_failure(&["merge", "topic"], text),
            ErrorKind::GitCommandFailed
        );
    }

    #[test]
    fn label_joins_args() {
        assert_eq!(label(&["stash", "drop", "stash@{1}"]), "git stash drop stash@{1}");
    }
}
