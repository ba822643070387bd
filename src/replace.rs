//! Atomic directory replacement with deferred deletion.
//!
//! A replacement is two renames: the old tree is parked at a staging path,
//! the new tree is renamed into place, and the parked tree is queued on a
//! [`CleanupRegistry`] for deletion at process exit. Readers of the target
//! path see either the fully-old or fully-new tree, and deletion I/O never
//! delays the caller.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// Suffix appended to the target path to form the default staging path.
const STAGING_SUFFIX: &str = ".to-delete";

/// Process-owned queue of paths awaiting deferred deletion.
///
/// Paths are registered only after the corresponding swap has completed.
/// The queue drains exactly once; a second flush is a logged no-op.
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    pending: Mutex<Vec<PathBuf>>,
    flushed: AtomicBool,
}

impl CleanupRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `path` for deletion at flush time.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!(path = ?path, "queued for deferred deletion");
        self.pending
            .lock()
            .expect("pending queue mutex poisoned")
            .push(path);
    }

    /// Number of paths currently queued.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .expect("pending queue mutex poisoned")
            .len()
    }

    /// True once the queue has been drained.
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }

    /// Drains the queue, deleting each path in a detached child process.
    ///
    /// The children are fire-and-forget: they are not awaited and may
    /// outlive this process; their failures are not surfaced.
    pub fn flush_all(&self) {
        if self.flushed.swap(true, Ordering::SeqCst) {
            tracing::debug!("cleanup queue already flushed");
            return;
        }

        let pending = std::mem::take(
            &mut *self
                .pending
                .lock()
                .expect("pending queue mutex poisoned"),
        );

        for path in pending {
            tracing::info!(path = ?path, "deleting parked tree in background");
            let spawned = Command::new("rm").arg("-rf").arg(&path).spawn();
            if let Err(e) = spawned {
                tracing::warn!(path = ?path, error = %e, "failed to spawn background deletion");
            }
        }
    }

    /// Returns a scoped guard that flushes the queue when dropped.
    pub fn guard(&self) -> CleanupGuard<'_> {
        CleanupGuard { registry: self }
    }
}

/// Scoped-exit guard over a [`CleanupRegistry`].
///
/// Dropping it flushes the queue, which covers normal return and panic
/// unwind. Only one flush ever runs even if multiple guards exist.
#[derive(Debug)]
pub struct CleanupGuard<'a> {
    registry: &'a CleanupRegistry,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.registry.flush_all();
    }
}

/// Replaces directories via paired renames, deferring deletion of the old
/// tree to process exit.
#[derive(Debug)]
pub struct DirectoryReplacer<'a> {
    registry: &'a CleanupRegistry,
}

impl<'a> DirectoryReplacer<'a> {
    /// Creates a replacer that queues parked trees on `registry`.
    pub fn new(registry: &'a CleanupRegistry) -> Self {
        Self { registry }
    }

    /// Replaces the tree at `target` with the tree at `source`.
    ///
    /// Any stale staging directory from an interrupted earlier run is
    /// removed first, best-effort. If `target` exists it is renamed to the
    /// staging path, `source` is renamed onto `target`, and the parked old
    /// tree is queued for deferred deletion. If moving `source` into place
    /// fails after the old tree was parked, the old tree is renamed back to
    /// `target`; only when that restore also fails does it stay parked, and
    /// the error names the staging path.
    pub fn replace(
        &self,
        source: &Path,
        target: &Path,
        staging_override: Option<&Path>,
    ) -> Result<()> {
        let staging = match staging_override {
            Some(path) => path.to_path_buf(),
            None => default_staging_path(target),
        };

        remove_stale_staging(&staging);

        let had_old = target.exists();
        if had_old {
            std::fs::rename(target, &staging).map_err(|e| Error::Replace {
                path: target.to_path_buf(),
                reason: format!("failed to park old tree at {}: {}", staging.display(), e),
            })?;
        }

        if let Err(e) = std::fs::rename(source, target) {
            if had_old {
                match std::fs::rename(&staging, target) {
                    Ok(()) => {
                        return Err(Error::Replace {
                            path: target.to_path_buf(),
                            reason: format!(
                                "failed to move new tree into place (old tree restored): {}",
                                e
                            ),
                        });
                    }
                    Err(restore_err) => {
                        return Err(Error::Replace {
                            path: target.to_path_buf(),
                            reason: format!(
                                "failed to move new tree into place ({}); old tree parked at {} ({})",
                                e,
                                staging.display(),
                                restore_err
                            ),
                        });
                    }
                }
            }
            return Err(Error::Replace {
                path: target.to_path_buf(),
                reason: format!("failed to move new tree into place: {}", e),
            });
        }

        tracing::info!(source = ?source, target = ?target, "swapped directory into place");

        if had_old {
            self.registry.register(staging);
        }

        Ok(())
    }
}

/// Default staging path: the target path with `.to-delete` appended.
fn default_staging_path(target: &Path) -> PathBuf {
    let mut staged = target.as_os_str().to_os_string();
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

/// Best-effort synchronous removal of a leftover staging entry.
fn remove_stale_staging(staging: &Path) {
    if !staging.exists() {
        return;
    }
    tracing::warn!(path = ?staging, "removing stale staging entry from interrupted run");
    let result = if staging.is_dir() {
        std::fs::remove_dir_all(staging)
    } else {
        std::fs::remove_file(staging)
    };
    if let Err(e) = result {
        tracing::warn!(path = ?staging, error = %e, "failed to remove stale staging entry");
    }
}

/// Removes entries under `temp_root` whose modification time is older than
/// `retention`. Best-effort: failures are logged and never propagated.
pub fn prune_stale(temp_root: &Path, retention: Duration) {
    let entries = match std::fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(path = ?temp_root, error = %e, "temp root not readable, skipping prune");
            return;
        }
    };

    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        let modified = entry.metadata().and_then(|m| m.modified());
        let age = match modified {
            Ok(modified) => now.duration_since(modified).unwrap_or(Duration::ZERO),
            Err(_) => continue,
        };
        if age < retention {
            continue;
        }

        tracing::info!(path = ?path, age_secs = age.as_secs(), "pruning stale temp entry");
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = result {
            tracing::warn!(path = ?path, error = %e, "failed to prune stale temp entry");
        }
    }
}
