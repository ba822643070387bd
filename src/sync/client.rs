//! Thin wrapper over the git command line.
//!
//! Every invocation takes an explicit working-directory path and returns a
//! [`GitRun`] whose [`GitOutcome`] classifies the failure mode instead of
//! exposing a raw exit status. The orchestrator branches on the outcome,
//! never on the process status itself.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Classified result of a single git invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOutcome {
    /// The command completed with a zero exit status.
    Success,
    /// A rebase or merge stopped on conflicting changes.
    Conflict,
    /// The remote refused a push.
    Rejected,
    /// Any other non-zero exit.
    Other,
}

/// Captured output of a git invocation.
#[derive(Debug, Clone)]
pub struct GitRun {
    /// The argument list that was run, joined for diagnostics.
    pub args: String,
    /// Classified outcome.
    pub outcome: GitOutcome,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl GitRun {
    /// Returns true if the invocation succeeded.
    pub fn succeeded(&self) -> bool {
        self.outcome == GitOutcome::Success
    }

    /// Combined stdout and stderr, for phrase matching and diagnostics.
    pub fn text(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Executes git commands in explicitly-named working directories.
#[derive(Debug, Clone, Default)]
pub struct GitClient;

impl GitClient {
    /// Creates a new client.
    pub fn new() -> Self {
        Self
    }

    /// Runs `git <args>` in `workdir` and classifies the result.
    ///
    /// Failure to launch the binary at all is an IO error; everything the
    /// tool itself reports comes back as a [`GitRun`].
    pub fn run(&self, workdir: &Path, args: &[&str]) -> Result<GitRun> {
        let output = Command::new("git")
            .current_dir(workdir)
            .args(args)
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let outcome = classify(output.status.success(), &stdout, &stderr);

        tracing::debug!(
            workdir = ?workdir,
            args = %args.join(" "),
            outcome = ?outcome,
            "ran git"
        );

        Ok(GitRun {
            args: args.join(" "),
            outcome,
            stdout,
            stderr,
        })
    }

    /// `git reset --hard` against the current HEAD.
    pub fn reset_hard(&self, workdir: &Path) -> Result<GitRun> {
        self.run(workdir, &["reset", "--hard"])
    }

    /// `git reset --hard <target>`.
    pub fn reset_hard_to(&self, workdir: &Path, target: &str) -> Result<GitRun> {
        self.run(workdir, &["reset", "--hard", target])
    }

    /// `git checkout <branch>`.
    pub fn checkout(&self, workdir: &Path, branch: &str) -> Result<GitRun> {
        self.run(workdir, &["checkout", branch])
    }

    /// `git checkout -f <branch>`.
    pub fn checkout_force(&self, workdir: &Path, branch: &str) -> Result<GitRun> {
        self.run(workdir, &["checkout", "-f", branch])
    }

    /// `git pull --rebase <remote> <branch>`.
    pub fn pull_rebase(&self, workdir: &Path, remote: &str, branch: &str) -> Result<GitRun> {
        self.run(workdir, &["pull", "--rebase", remote, branch])
    }

    /// `git rebase --abort`.
    pub fn rebase_abort(&self, workdir: &Path) -> Result<GitRun> {
        self.run(workdir, &["rebase", "--abort"])
    }

    /// `git push <remote> <branch>`.
    pub fn push(&self, workdir: &Path, remote: &str, branch: &str) -> Result<GitRun> {
        self.run(workdir, &["push", remote, branch])
    }

    /// `git submodule update --init --recursive`.
    pub fn submodule_update(&self, workdir: &Path) -> Result<GitRun> {
        self.run(workdir, &["submodule", "update", "--init", "--recursive"])
    }

    /// `git add --all`.
    pub fn add_all(&self, workdir: &Path) -> Result<GitRun> {
        self.run(workdir, &["add", "--all"])
    }

    /// `git add <pathspec>`.
    pub fn add_path(&self, workdir: &Path, pathspec: &str) -> Result<GitRun> {
        self.run(workdir, &["add", "--", pathspec])
    }

    /// `git commit <extra_args...>`.
    ///
    /// The caller supplies everything after `commit`; staging decisions are
    /// made by the orchestrator before this is called.
    pub fn commit(&self, workdir: &Path, extra_args: &[String]) -> Result<GitRun> {
        let mut args = vec!["commit"];
        args.extend(extra_args.iter().map(String::as_str));
        self.run(workdir, &args)
    }

    /// `git commit --dry-run`, used to detect an empty staged set.
    pub fn commit_dry_run(&self, workdir: &Path) -> Result<GitRun> {
        self.run(workdir, &["commit", "--dry-run"])
    }

    /// `git status --short`.
    pub fn status_short(&self, workdir: &Path) -> Result<GitRun> {
        self.run(workdir, &["status", "--short"])
    }

    /// `git rev-parse --show-toplevel`, returning the trimmed path.
    pub fn rev_parse_toplevel(&self, workdir: &Path) -> Result<String> {
        let run = self.run(workdir, &["rev-parse", "--show-toplevel"])?;
        if !run.succeeded() {
            return Err(Error::Git {
                args: run.args,
                path: workdir.to_path_buf(),
                detail: run.stderr.trim().to_string(),
            });
        }
        Ok(run.stdout.trim().to_string())
    }

    /// `git rev-parse HEAD`, returning the trimmed commit id.
    pub fn head(&self, workdir: &Path) -> Result<String> {
        let run = self.run(workdir, &["rev-parse", "HEAD"])?;
        if !run.succeeded() {
            return Err(Error::Git {
                args: run.args,
                path: workdir.to_path_buf(),
                detail: run.stderr.trim().to_string(),
            });
        }
        Ok(run.stdout.trim().to_string())
    }
}

fn classify(success: bool, stdout: &str, stderr: &str) -> GitOutcome {
    if success {
        return GitOutcome::Success;
    }

    let conflict_markers = ["CONFLICT", "could not apply", "Resolve all conflicts"];
    let reject_markers = ["[rejected]", "[remote rejected]", "failed to push some refs"];

    for text in [stdout, stderr] {
        if conflict_markers.iter().any(|m| text.contains(m)) {
            return GitOutcome::Conflict;
        }
        if reject_markers.iter().any(|m| text.contains(m)) {
            return GitOutcome::Rejected;
        }
    }

    GitOutcome::Other
}
