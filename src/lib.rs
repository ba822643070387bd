//! Worksync - transactional CI workspace synchronization
//!
//! This library keeps a continuous-integration workspace aligned with a
//! remote branch under strict consistency rules: a reset-pull-rebase-push
//! discipline with rollback on failure, subrepository pointer propagation,
//! and atomic directory replacement with deletion deferred to process exit.
//! Around that core it provisions an isolated interpreter sandbox and
//! lazily materializes a credential bundle for operator alerting.

pub mod alert;
pub mod config;
pub mod error;
pub mod provision;
pub mod replace;
pub mod secrets;
pub mod sync;

pub use alert::{looks_like_html, AlertGateway, AlertPayload, AlertSink, CommandSink, Severity};
pub use config::{Config, Validate, ValidationResult};
pub use error::Error;
pub use provision::{InterpreterSandboxBuilder, Provisioner, SandboxBuilder};
pub use replace::{prune_stale, CleanupGuard, CleanupRegistry, DirectoryReplacer};
pub use secrets::{Decryptor, OpensslDecryptor, SecretsVault};
pub use sync::{
    GitClient, GitOutcome, GitRun, Orchestrator, RepositoryKind, SyncOutcome, Workspace,
};
