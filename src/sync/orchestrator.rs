//! The synchronization state machine.
//!
//! Keeps a [`Workspace`] aligned with a single remote branch using a strict
//! reset-pull-rebase-push discipline. Every operation leaves the checkout on
//! the tracked branch with a clean working tree on both success and failure
//! exit; conflicted rebases are aborted, and a push that did not land rolls
//! the local branch back before the error surfaces.

use std::path::Path;

use crate::error::{Error, Result};

use super::client::{GitClient, GitOutcome, GitRun};
use super::workspace::Workspace;

/// Message used for automatic subrepository pointer commits.
const SUBREPO_COMMIT_MESSAGE: &str = "Automatic commit of subrepository state";

/// Phrases the VCS prints when a dry-run commit has nothing staged.
const NO_CHANGE_PHRASES: [&str; 3] = ["no changes", "nothing to commit", "nothing added"];

/// What `commit_and_push` and `commit_subrepo_state` did with the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new commit was created and pushed.
    Committed,
    /// The tree (or staged set) was clean; no commit was made.
    NothingToCommit,
}

/// Drives pull, push and auto-commit operations against one remote branch.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    client: GitClient,
    remote: String,
    branch: String,
}

impl Orchestrator {
    /// Creates an orchestrator tracking `branch` on `remote`.
    pub fn new(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            client: GitClient::new(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    /// Returns the tracked remote name.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Returns the tracked branch name.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Returns the current commit id of `workspace`.
    pub fn head(&self, workspace: &Workspace) -> Result<String> {
        self.client.head(workspace.root())
    }

    /// Brings `workspace` to a byte-identical copy of the remote branch.
    ///
    /// Resets the checkout, force-checks-out the tracked branch, resets
    /// again to discard local divergence, then pulls with rebase. A rebase
    /// conflict aborts the rebase and fails the whole operation; conflicts
    /// are an environment fault, never resolved here. On success a root
    /// checkout also initializes and updates its subrepositories.
    pub fn pull(&self, workspace: &Workspace) -> Result<()> {
        let path = workspace.root();
        tracing::info!(path = ?path, branch = %self.branch, "pulling latest");

        self.require(path, self.client.reset_hard(path)?)?;
        self.require(path, self.client.checkout_force(path, &self.branch)?)?;
        self.require(path, self.client.reset_hard(path)?)?;

        let run = self
            .client
            .pull_rebase(path, &self.remote, &self.branch)?;
        match run.outcome {
            GitOutcome::Success => {}
            GitOutcome::Conflict => {
                self.abort_rebase(path);
                return Err(Error::RebaseConflict {
                    path: path.to_path_buf(),
                });
            }
            GitOutcome::Rejected | GitOutcome::Other => {
                return Err(self.git_error(path, run));
            }
        }

        if !workspace.is_subrepository() {
            self.require(path, self.client.submodule_update(path)?)?;
        }

        Ok(())
    }

    /// Pushes the tracked branch, rebasing against the remote first.
    ///
    /// The pre-push rebase narrows (but cannot eliminate) the window in
    /// which another agent's push lands between our rebase and our push; no
    /// locking or concurrency token is used. If either the rebase or the
    /// push fails, the branch is rolled back one commit so local history is
    /// never left ahead of a push that did not land.
    pub fn push(&self, workspace: &Workspace) -> Result<()> {
        let path = workspace.root();
        tracing::info!(path = ?path, branch = %self.branch, "pushing");

        let rebase = self
            .client
            .pull_rebase(path, &self.remote, &self.branch)?;
        if !rebase.succeeded() {
            self.abort_rebase(path);
            self.rollback(path)?;
            return Err(Error::PushRejected {
                path: path.to_path_buf(),
                detail: format!("pre-push rebase failed: {}", rebase.text().trim()),
            });
        }

        let push = self.client.push(path, &self.remote, &self.branch)?;
        if !push.succeeded() {
            self.rollback(path)?;
            return Err(Error::PushRejected {
                path: path.to_path_buf(),
                detail: push.stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    /// Records a subrepository's current pointer in its parent repository.
    ///
    /// Safe to call unconditionally: an unchanged pointer is a logged no-op.
    /// A real pointer change is committed with a fixed message and pushed.
    pub fn commit_subrepo_state(&self, subrepo: &Workspace) -> Result<SyncOutcome> {
        let parent = subrepo.parent(&self.client)?;
        let path = parent.root();

        self.require(path, self.client.checkout(path, &self.branch)?)?;

        let pointer = relative_pathspec(subrepo.root(), path)?;
        self.require(path, self.client.add_path(path, &pointer)?)?;

        let dry_run = self.client.commit_dry_run(path)?;
        if staged_set_is_empty(&dry_run) {
            tracing::info!(
                subrepo = ?subrepo.root(),
                "subrepository pointer unchanged, nothing to commit"
            );
            return Ok(SyncOutcome::NothingToCommit);
        }
        if !dry_run.succeeded() {
            return Err(self.git_error(path, dry_run));
        }

        let commit = self.client.commit(
            path,
            &["-m".to_string(), SUBREPO_COMMIT_MESSAGE.to_string()],
        )?;
        self.require(path, commit)?;

        tracing::info!(subrepo = ?subrepo.root(), parent = ?path, "committed subrepository pointer");
        self.push(&parent)?;

        Ok(SyncOutcome::Committed)
    }

    /// Stages all changes under `workspace`, commits them with the caller's
    /// extra arguments, and pushes.
    ///
    /// A clean working tree skips the commit (logged, not an error) but the
    /// push still runs so pending remote changes surface. Staging-all is
    /// unconditional; `extra_commit_args` is append-only. A subrepository
    /// additionally propagates its pointer into the parent after the push.
    pub fn commit_and_push(
        &self,
        workspace: &Workspace,
        extra_commit_args: &[String],
    ) -> Result<SyncOutcome> {
        let path = workspace.root();

        let status = self.require(path, self.client.status_short(path)?)?;
        let outcome = if status.stdout.trim().is_empty() {
            tracing::info!(path = ?path, "working tree clean, skipping commit");
            SyncOutcome::NothingToCommit
        } else {
            self.require(path, self.client.add_all(path)?)?;
            let commit = self.client.commit(path, extra_commit_args)?;
            self.require(path, commit)?;
            tracing::info!(path = ?path, "committed workspace changes");
            SyncOutcome::Committed
        };

        self.push(workspace)?;

        if workspace.is_subrepository() {
            self.commit_subrepo_state(workspace)?;
        }

        Ok(outcome)
    }

    /// Best-effort `rebase --abort`; the caller is already on an error path.
    fn abort_rebase(&self, path: &Path) {
        match self.client.rebase_abort(path) {
            Ok(run) if run.succeeded() => {
                tracing::warn!(path = ?path, "aborted conflicted rebase");
            }
            Ok(run) => {
                tracing::warn!(path = ?path, detail = %run.text().trim(), "rebase abort reported failure");
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "failed to run rebase abort");
            }
        }
    }

    /// Hard-resets the branch to the parent of HEAD, dropping the commit a
    /// failed push left behind.
    fn rollback(&self, path: &Path) -> Result<()> {
        let run = self.client.reset_hard_to(path, "HEAD^")?;
        if !run.succeeded() {
            return Err(self.git_error(path, run));
        }
        tracing::warn!(path = ?path, "rolled branch back one commit");
        Ok(())
    }

    fn require(&self, path: &Path, run: GitRun) -> Result<GitRun> {
        if run.succeeded() {
            Ok(run)
        } else {
            Err(self.git_error(path, run))
        }
    }

    fn git_error(&self, path: &Path, run: GitRun) -> Error {
        let detail = run.text().trim().to_string();
        Error::Git {
            args: run.args,
            path: path.to_path_buf(),
            detail,
        }
    }
}

/// True when a dry-run commit reported an empty staged set.
fn staged_set_is_empty(dry_run: &GitRun) -> bool {
    if dry_run.succeeded() {
        return false;
    }
    let text = dry_run.text();
    NO_CHANGE_PHRASES.iter().any(|phrase| text.contains(phrase))
}

/// Pathspec for `child` relative to the checkout at `root`.
fn relative_pathspec(child: &Path, root: &Path) -> Result<String> {
    let child_abs = std::fs::canonicalize(child)?;
    let root_abs = std::fs::canonicalize(root)?;
    let spec = child_abs
        .strip_prefix(&root_abs)
        .unwrap_or(&child_abs)
        .to_string_lossy()
        .into_owned();
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// Work checkout on branch `master` pushed to a local bare remote.
    fn create_synced_repo() -> (TempDir, PathBuf) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let remote = temp.path().join("remote.git");
        let work = temp.path().join("work");

        std::fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "--bare"]);

        std::fs::create_dir_all(&work).unwrap();
        git(&work, &["init"]);
        git(&work, &["config", "user.email", "test@test.com"]);
        git(&work, &["config", "user.name", "Test User"]);
        std::fs::write(work.join("build.txt"), "artifact v1\n").unwrap();
        git(&work, &["add", "."]);
        git(&work, &["commit", "-m", "Initial commit"]);
        git(&work, &["branch", "-M", "master"]);
        git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        git(&work, &["push", "origin", "master"]);

        (temp, work)
    }

    fn status_is_clean(path: &Path) -> bool {
        let output = Command::new("git")
            .current_dir(path)
            .args(["status", "--short"])
            .output()
            .unwrap();
        output.stdout.is_empty()
    }

    #[test]
    fn pull_on_synced_repo_leaves_clean_tree() {
        let (_temp, work) = create_synced_repo();
        let orchestrator = Orchestrator::new("origin", "master");
        let ws = Workspace::open(&work).unwrap();

        orchestrator.pull(&ws).expect("pull should succeed");
        assert!(status_is_clean(&work));
    }

    #[test]
    fn pull_discards_uncommitted_changes() {
        let (_temp, work) = create_synced_repo();
        let orchestrator = Orchestrator::new("origin", "master");
        let ws = Workspace::open(&work).unwrap();

        std::fs::write(work.join("build.txt"), "local scribble\n").unwrap();
        orchestrator.pull(&ws).expect("pull should succeed");

        let content = std::fs::read_to_string(work.join("build.txt")).unwrap();
        assert_eq!(content, "artifact v1\n");
        assert!(status_is_clean(&work));
    }

    #[test]
    fn commit_and_push_skips_commit_on_clean_tree() {
        let (_temp, work) = create_synced_repo();
        let orchestrator = Orchestrator::new("origin", "master");
        let ws = Workspace::open(&work).unwrap();

        let before = orchestrator.head(&ws).unwrap();
        let outcome = orchestrator
            .commit_and_push(&ws, &["-m".to_string(), "unused".to_string()])
            .expect("push of clean tree should succeed");

        assert_eq!(outcome, SyncOutcome::NothingToCommit);
        assert_eq!(orchestrator.head(&ws).unwrap(), before);
    }

    #[test]
    fn commit_and_push_creates_and_pushes_commit() {
        let (temp, work) = create_synced_repo();
        let orchestrator = Orchestrator::new("origin", "master");
        let ws = Workspace::open(&work).unwrap();

        let before = orchestrator.head(&ws).unwrap();
        std::fs::write(work.join("build.txt"), "artifact v2\n").unwrap();

        let outcome = orchestrator
            .commit_and_push(&ws, &["-m".to_string(), "test".to_string()])
            .expect("commit and push should succeed");

        assert_eq!(outcome, SyncOutcome::Committed);
        let after = orchestrator.head(&ws).unwrap();
        assert_ne!(after, before);

        // The remote must now be at the same commit.
        let remote = temp.path().join("remote.git");
        let output = Command::new("git")
            .current_dir(&remote)
            .args(["rev-parse", "master"])
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), after);
    }

    #[test]
    fn staged_set_is_empty_matches_expected_phrases() {
        let run = GitRun {
            args: "commit --dry-run".to_string(),
            outcome: GitOutcome::Other,
            stdout: "On branch master\nnothing to commit, working tree clean\n".to_string(),
            stderr: String::new(),
        };
        assert!(staged_set_is_empty(&run));

        let run = GitRun {
            args: "commit --dry-run".to_string(),
            outcome: GitOutcome::Other,
            stdout: "no changes added to commit\n".to_string(),
            stderr: String::new(),
        };
        assert!(staged_set_is_empty(&run));

        // A successful dry run means there is something to commit.
        let run = GitRun {
            args: "commit --dry-run".to_string(),
            outcome: GitOutcome::Success,
            stdout: "Changes to be committed:\n  modified: sub\n".to_string(),
            stderr: String::new(),
        };
        assert!(!staged_set_is_empty(&run));
    }
}
