//! Error types for workspace synchronization.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The workspace root does not exist or is not a checkout.
    #[error("workspace missing at {0}")]
    WorkspaceMissing(PathBuf),

    /// A rebase hit a conflict during pull; the rebase was aborted.
    #[error("rebase conflict in {path}, aborted")]
    RebaseConflict { path: PathBuf },

    /// The remote rejected a push; the local branch was rolled back.
    #[error("push rejected for {path}, rolled back: {detail}")]
    PushRejected { path: PathBuf, detail: String },

    /// A git invocation failed for a reason other than conflict/rejection.
    #[error("git {args} failed in {path}: {detail}")]
    Git {
        args: String,
        path: PathBuf,
        detail: String,
    },

    /// A directory replacement could not complete.
    #[error("replace failed at {path}: {reason}")]
    Replace { path: PathBuf, reason: String },

    /// Sandbox provisioning failed.
    #[error("failed to provision sandbox: {0}")]
    Provision(String),

    /// Credential bundle decryption failed.
    #[error("failed to decrypt credential bundle: {0}")]
    Decrypt(String),

    /// Alert delivery failed.
    #[error("alert delivery failed: {0}")]
    Alert(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error during filesystem operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;
