//! Configuration for sync runs.
//!
//! Everything is environment-driven with defaults, with an optional TOML
//! override file. Validation distinguishes fatal errors (a missing
//! workspace root) from suspicious-but-legal values, which become warnings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ENV_WORKSPACE: &str = "WORKSYNC_WORKSPACE";
const ENV_REMOTE: &str = "WORKSYNC_REMOTE";
const ENV_BRANCH: &str = "WORKSYNC_BRANCH";
const ENV_TEMP_ROOT: &str = "WORKSYNC_TEMP_ROOT";
const ENV_SANDBOX_ROOT: &str = "WORKSYNC_SANDBOX_ROOT";
const ENV_INTERPRETER: &str = "WORKSYNC_INTERPRETER";
const ENV_DEBUG_INTERPRETER: &str = "WORKSYNC_DEBUG_INTERPRETER";
const ENV_SECRETS_DIR: &str = "WORKSYNC_SECRETS_DIR";
const ENV_SECRETS_BUNDLE: &str = "WORKSYNC_SECRETS_BUNDLE";
const ENV_SECRETS_PASSWORD: &str = "WORKSYNC_SECRETS_PASSWORD";
const ENV_NOTIFIER: &str = "WORKSYNC_NOTIFIER";
const ENV_ALERT_CHANNEL: &str = "WORKSYNC_ALERT_CHANNEL";
const ENV_ALERT_SENDER: &str = "WORKSYNC_ALERT_SENDER";
const ENV_RETENTION_HOURS: &str = "WORKSYNC_TEMP_RETENTION_HOURS";

/// Configuration for a sync invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the version-controlled workspace.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Remote name the tracked branch lives on.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Tracked branch name.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Root for scratch space; stale entries are pruned at startup.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,

    /// Root of the interpreter sandbox.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,

    /// Interpreter used to create the sandbox.
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,

    /// Debug-capable interpreter variant, if one should be probed for.
    #[serde(default)]
    pub debug_interpreter: Option<PathBuf>,

    /// Fixed directory the decrypted credential bundle lives in.
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,

    /// Encrypted credential bundle.
    #[serde(default = "default_secrets_bundle")]
    pub secrets_bundle: PathBuf,

    /// Password file for the bundle.
    #[serde(default = "default_secrets_password")]
    pub secrets_password: PathBuf,

    /// Notifier command alerts are dispatched through.
    #[serde(default = "default_notifier")]
    pub notifier: PathBuf,

    /// Chat channel identifier for alerts.
    #[serde(default = "default_alert_channel")]
    pub alert_channel: String,

    /// Sender identity for alerts.
    #[serde(default = "default_alert_sender")]
    pub alert_sender: String,

    /// Retention window for temp entries, in hours.
    #[serde(default = "default_retention_hours")]
    pub temp_retention_hours: u64,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("worksync")
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from("/var/lib/worksync/sandbox")
}

fn default_interpreter() -> PathBuf {
    PathBuf::from("/usr/bin/python3")
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/var/lib/worksync/secrets")
}

fn default_secrets_bundle() -> PathBuf {
    PathBuf::from("/var/lib/worksync/bundle.enc")
}

fn default_secrets_password() -> PathBuf {
    PathBuf::from("/var/lib/worksync/bundle.pass")
}

fn default_notifier() -> PathBuf {
    PathBuf::from("worksync-notify")
}

fn default_alert_channel() -> String {
    "ci".to_string()
}

fn default_alert_sender() -> String {
    "worksync".to_string()
}

fn default_retention_hours() -> u64 {
    48
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            remote: default_remote(),
            branch: default_branch(),
            temp_root: default_temp_root(),
            sandbox_root: default_sandbox_root(),
            interpreter: default_interpreter(),
            debug_interpreter: None,
            secrets_dir: default_secrets_dir(),
            secrets_bundle: default_secrets_bundle(),
            secrets_password: default_secrets_password(),
            notifier: default_notifier(),
            alert_channel: default_alert_channel(),
            alert_sender: default_alert_sender(),
            temp_retention_hours: default_retention_hours(),
        }
    }
}

impl Config {
    /// Loads configuration from `WORKSYNC_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(value) = std::env::var(ENV_WORKSPACE) {
            config.workspace_root = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_REMOTE) {
            config.remote = value;
        }
        if let Ok(value) = std::env::var(ENV_BRANCH) {
            config.branch = value;
        }
        if let Ok(value) = std::env::var(ENV_TEMP_ROOT) {
            config.temp_root = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_SANDBOX_ROOT) {
            config.sandbox_root = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_INTERPRETER) {
            config.interpreter = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_DEBUG_INTERPRETER) {
            config.debug_interpreter = Some(PathBuf::from(value));
        }
        if let Ok(value) = std::env::var(ENV_SECRETS_DIR) {
            config.secrets_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_SECRETS_BUNDLE) {
            config.secrets_bundle = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_SECRETS_PASSWORD) {
            config.secrets_password = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_NOTIFIER) {
            config.notifier = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_ALERT_CHANNEL) {
            config.alert_channel = value;
        }
        if let Ok(value) = std::env::var(ENV_ALERT_SENDER) {
            config.alert_sender = value;
        }
        if let Ok(value) = std::env::var(ENV_RETENTION_HOURS) {
            config.temp_retention_hours = value.parse().map_err(|_| {
                Error::Config(format!("{} must be a whole number of hours", ENV_RETENTION_HOURS))
            })?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file; unset fields take defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Retention window as a duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.temp_retention_hours * 3600)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        // A missing workspace root is fatal at startup.
        if !self.workspace_root.is_dir() {
            result.add_error(format!(
                "workspace root '{}' does not exist",
                self.workspace_root.display()
            ));
        }

        if self.temp_retention_hours == 0 {
            result.add_warning("zero retention prunes every temp entry at startup");
        }

        if self.sandbox_root.is_relative() {
            result.add_warning(format!(
                "sandbox root '{}' is relative and depends on the invocation directory",
                self.sandbox_root.display()
            ));
        }

        if let Some(debug) = &self.debug_interpreter {
            if !debug.exists() {
                result.add_warning(format!(
                    "debug interpreter '{}' not found, debug sandbox will be skipped",
                    debug.display()
                ));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // from_env reads fixed variable names, so env-touching tests serialize.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();

        assert_eq!(config.remote, "origin");
        assert_eq!(config.branch, "master");
        assert_eq!(config.temp_retention_hours, 48);
        assert_eq!(config.retention(), Duration::from_secs(48 * 3600));
        assert!(config.debug_interpreter.is_none());
    }

    #[test]
    fn from_env_overrides_fields() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var(ENV_WORKSPACE, "/srv/build");
        std::env::set_var(ENV_BRANCH, "release");
        std::env::set_var(ENV_RETENTION_HOURS, "6");

        let config = Config::from_env().expect("from_env should succeed");
        assert_eq!(config.workspace_root, PathBuf::from("/srv/build"));
        assert_eq!(config.branch, "release");
        assert_eq!(config.temp_retention_hours, 6);
        // Untouched fields keep their defaults.
        assert_eq!(config.remote, "origin");

        std::env::remove_var(ENV_WORKSPACE);
        std::env::remove_var(ENV_BRANCH);
        std::env::remove_var(ENV_RETENTION_HOURS);
    }

    #[test]
    fn from_env_rejects_non_numeric_retention() {
        let _guard = ENV_LOCK.lock().unwrap();

        std::env::set_var(ENV_RETENTION_HOURS, "soon");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        std::env::remove_var(ENV_RETENTION_HOURS);
    }

    #[test]
    fn from_file_fills_missing_fields_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worksync.toml");
        std::fs::write(
            &path,
            "workspace_root = \"/srv/build\"\nbranch = \"release\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).expect("from_file should succeed");
        assert_eq!(config.workspace_root, PathBuf::from("/srv/build"));
        assert_eq!(config.branch, "release");
        assert_eq!(config.remote, "origin");
        assert_eq!(config.temp_retention_hours, 48);
    }

    #[test]
    fn validate_flags_missing_workspace_as_error() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            workspace_root: temp.path().join("not-there"),
            ..Default::default()
        };

        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("workspace root")));
    }

    #[test]
    fn validate_warns_on_zero_retention() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            workspace_root: temp.path().to_path_buf(),
            temp_retention_hours: 0,
            ..Default::default()
        };

        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("retention")));
    }

    #[test]
    fn validation_result_into_result_err_on_invalid() {
        let mut result = ValidationResult::default();
        result.add_error("fatal problem");
        result.add_warning("minor problem");
        assert!(result.into_result().is_err());
    }

    #[test]
    fn validation_result_into_result_ok_carries_warnings() {
        let mut result = ValidationResult::default();
        result.add_warning("just a warning");
        let warnings = result.into_result().expect("should be valid");
        assert_eq!(warnings, vec!["just a warning"]);
    }
}
