//! Interpreter sandbox provisioning.
//!
//! Ensures an isolated interpreter sandbox exists and is active in the
//! current process, exactly once per workspace. Activation mutates only this
//! process's environment: the sandbox `bin` directory is prepended to the
//! search-path variable and an isolation marker is set.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Default isolation marker variable set on activation.
pub const DEFAULT_MARKER_VAR: &str = "WORKSYNC_SANDBOX";

/// Creates an interpreter sandbox at a destination root.
pub trait SandboxBuilder {
    /// Builds a sandbox for `interpreter` rooted at `dest`.
    fn build(&self, interpreter: &Path, dest: &Path) -> Result<()>;
}

/// Builder that drives the interpreter's own sandbox tooling.
#[derive(Debug, Clone, Default)]
pub struct InterpreterSandboxBuilder;

impl SandboxBuilder for InterpreterSandboxBuilder {
    fn build(&self, interpreter: &Path, dest: &Path) -> Result<()> {
        let output = Command::new(interpreter)
            .args(["-m", "venv"])
            .arg(dest)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Provision(format!(
                "sandbox creation at {} failed: {}",
                dest.display(),
                stderr.trim()
            )));
        }

        tracing::info!(interpreter = ?interpreter, dest = ?dest, "created interpreter sandbox");
        Ok(())
    }
}

/// Idempotently provisions and activates an interpreter sandbox.
///
/// There is no locking: concurrent callers racing on the existence checks
/// is a known, accepted limitation.
pub struct Provisioner<B: SandboxBuilder> {
    builder: B,
    root: PathBuf,
    interpreter: PathBuf,
    debug_interpreter: Option<PathBuf>,
    search_path_var: String,
    marker_var: String,
}

impl<B: SandboxBuilder> Provisioner<B> {
    /// Creates a provisioner for a sandbox rooted at `root`.
    pub fn new(builder: B, root: impl Into<PathBuf>, interpreter: impl Into<PathBuf>) -> Self {
        Self {
            builder,
            root: root.into(),
            interpreter: interpreter.into(),
            debug_interpreter: None,
            search_path_var: "PATH".to_string(),
            marker_var: DEFAULT_MARKER_VAR.to_string(),
        }
    }

    /// Sets a debug-capable interpreter variant to probe for.
    pub fn with_debug_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.debug_interpreter = Some(interpreter.into());
        self
    }

    /// Overrides the search-path variable name.
    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    /// Overrides the isolation marker variable name.
    pub fn with_marker_var(mut self, var: impl Into<String>) -> Self {
        self.marker_var = var.into();
        self
    }

    /// Ensures a usable sandbox exists and is active in this process.
    ///
    /// No-op when already inside a sandbox. An existing root is activated
    /// directly; otherwise the sandbox is created first. When a debug
    /// interpreter is present on the system, a parallel debug sandbox is
    /// built and the primary name becomes a symlink to the standard one, so
    /// an operator can retarget it by hand.
    pub fn ensure(&self) -> Result<()> {
        if std::env::var_os(&self.marker_var).is_some() {
            tracing::info!(marker = %self.marker_var, "already inside a sandbox");
            return Ok(());
        }

        if self.root.exists() {
            tracing::info!(root = ?self.root, "sandbox root already present, activating");
            return self.activate();
        }

        self.create()?;
        self.activate()
    }

    fn create(&self) -> Result<()> {
        let debug = self
            .debug_interpreter
            .as_deref()
            .filter(|path| path.exists());

        match debug {
            Some(debug_interpreter) => {
                let standard = self.variant_path("-standard");
                let debug_root = self.variant_path("-debug");

                self.builder.build(&self.interpreter, &standard)?;
                self.builder.build(debug_interpreter, &debug_root)?;

                std::os::unix::fs::symlink(&standard, &self.root).map_err(|e| {
                    Error::Provision(format!(
                        "failed to link {} to {}: {}",
                        self.root.display(),
                        standard.display(),
                        e
                    ))
                })?;
                tracing::info!(
                    root = ?self.root,
                    standard = ?standard,
                    debug = ?debug_root,
                    "created standard and debug sandboxes"
                );
            }
            None => {
                self.builder.build(&self.interpreter, &self.root)?;
            }
        }

        Ok(())
    }

    fn activate(&self) -> Result<()> {
        let bin = self.root.join("bin");
        let current = std::env::var_os(&self.search_path_var).unwrap_or_default();

        let mut paths = vec![bin.clone()];
        paths.extend(std::env::split_paths(&current));
        let joined = std::env::join_paths(paths)
            .map_err(|e| Error::Provision(format!("unusable search path entry: {}", e)))?;

        std::env::set_var(&self.search_path_var, &joined);
        std::env::set_var(&self.marker_var, &self.root);

        tracing::info!(root = ?self.root, bin = ?bin, "activated sandbox");
        Ok(())
    }

    fn variant_path(&self, suffix: &str) -> PathBuf {
        let mut path = self.root.as_os_str().to_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }
}
