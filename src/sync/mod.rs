//! Workspace synchronization against a single remote branch.
//!
//! This module provides the [`GitClient`] wrapper over the version-control
//! command line, the [`Workspace`] handle with its [`RepositoryKind`] tag,
//! and the [`Orchestrator`] that drives the reset-pull-rebase-push cycle.

mod client;
mod orchestrator;
mod workspace;

pub use client::{GitClient, GitOutcome, GitRun};
pub use orchestrator::{Orchestrator, SyncOutcome};
pub use workspace::{RepositoryKind, Workspace};
