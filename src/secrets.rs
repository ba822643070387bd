//! Credential bundle materialization.
//!
//! Secrets live as an encrypted bundle until first needed. On first use the
//! bundle is copied into a fixed secrets directory outside the workspace,
//! decrypted with a co-located password file, locked down to owner-only
//! permissions and prepended to the interpreter's module search path. A
//! second request is a no-op, detected by the search path already
//! referencing the secrets directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Default module search-path variable the secrets directory is added to.
pub const DEFAULT_SEARCH_PATH_VAR: &str = "PYTHONPATH";

/// Decrypts an encrypted input into a plaintext output file.
pub trait Decryptor {
    /// Decrypts `input` using `password_file`, writing `output`.
    fn decrypt(&self, input: &Path, password_file: &Path, output: &Path) -> Result<()>;
}

/// Decryptor driving the `openssl` command line.
#[derive(Debug, Clone, Default)]
pub struct OpensslDecryptor;

impl Decryptor for OpensslDecryptor {
    fn decrypt(&self, input: &Path, password_file: &Path, output: &Path) -> Result<()> {
        let result = Command::new("openssl")
            .args(["enc", "-d", "-aes-256-cbc", "-pbkdf2"])
            .arg("-in")
            .arg(input)
            .arg("-out")
            .arg(output)
            .arg("-pass")
            .arg(format!("file:{}", password_file.display()))
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Decrypt(stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Lazily materializes the credential bundle, exactly once per process.
pub struct SecretsVault<D: Decryptor> {
    decryptor: D,
    secrets_dir: PathBuf,
    bundle: PathBuf,
    password_file: PathBuf,
    search_path_var: String,
}

impl SecretsVault<OpensslDecryptor> {
    /// Creates a vault using the openssl command-line decryptor.
    pub fn new(
        secrets_dir: impl Into<PathBuf>,
        bundle: impl Into<PathBuf>,
        password_file: impl Into<PathBuf>,
    ) -> Self {
        Self::with_decryptor(
            OpensslDecryptor,
            secrets_dir,
            bundle,
            password_file,
        )
    }
}

impl<D: Decryptor> SecretsVault<D> {
    /// Creates a vault with an explicit decryptor.
    pub fn with_decryptor(
        decryptor: D,
        secrets_dir: impl Into<PathBuf>,
        bundle: impl Into<PathBuf>,
        password_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            decryptor,
            secrets_dir: secrets_dir.into(),
            bundle: bundle.into(),
            password_file: password_file.into(),
            search_path_var: DEFAULT_SEARCH_PATH_VAR.to_string(),
        }
    }

    /// Overrides the search-path variable name.
    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    /// Returns the secrets directory.
    pub fn secrets_dir(&self) -> &Path {
        &self.secrets_dir
    }

    /// Materializes the credential bundle if it is not already active.
    ///
    /// Idempotent: when the search path already references the secrets
    /// directory nothing is copied or decrypted. Decryption failure is
    /// fatal and propagated. Returns the plaintext path.
    pub fn ensure(&self) -> Result<PathBuf> {
        let staged = self.staged_bundle_path();
        let plaintext = staged.with_extension("");

        if self.already_on_search_path() {
            tracing::debug!(dir = ?self.secrets_dir, "secrets already materialized");
            return Ok(plaintext);
        }

        std::fs::create_dir_all(&self.secrets_dir)?;
        std::fs::copy(&self.bundle, &staged)?;

        self.decryptor
            .decrypt(&staged, &self.password_file, &plaintext)?;
        restrict_to_owner(&plaintext)?;

        self.prepend_to_search_path();
        tracing::info!(dir = ?self.secrets_dir, "materialized credential bundle");

        Ok(plaintext)
    }

    fn staged_bundle_path(&self) -> PathBuf {
        let name = self
            .bundle
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "bundle.enc".into());
        self.secrets_dir.join(name)
    }

    fn already_on_search_path(&self) -> bool {
        match std::env::var_os(&self.search_path_var) {
            Some(value) => std::env::split_paths(&value).any(|p| p == self.secrets_dir),
            None => false,
        }
    }

    fn prepend_to_search_path(&self) {
        let current = std::env::var_os(&self.search_path_var).unwrap_or_default();
        let mut paths = vec![self.secrets_dir.clone()];
        paths.extend(std::env::split_paths(&current));
        if let Ok(joined) = std::env::join_paths(paths) {
            std::env::set_var(&self.search_path_var, joined);
        }
    }
}

fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Decryptor that records calls and writes a fixed plaintext.
    #[derive(Clone, Default)]
    struct MockDecryptor {
        calls: Arc<Mutex<u32>>,
    }

    impl MockDecryptor {
        fn call_count(&self) -> u32 {
            *self.calls.lock().expect("calls mutex poisoned")
        }
    }

    impl Decryptor for MockDecryptor {
        fn decrypt(&self, _input: &Path, _password_file: &Path, output: &Path) -> Result<()> {
            *self.calls.lock().expect("calls mutex poisoned") += 1;
            std::fs::write(output, "decrypted")?;
            Ok(())
        }
    }

    struct FailingDecryptor;

    impl Decryptor for FailingDecryptor {
        fn decrypt(&self, _input: &Path, _password_file: &Path, _output: &Path) -> Result<()> {
            Err(Error::Decrypt("bad decrypt".to_string()))
        }
    }

    fn fixture(temp: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
        let secrets_dir = temp.path().join("secrets");
        let bundle = temp.path().join("bundle.enc");
        let password = temp.path().join("bundle.pass");
        std::fs::write(&bundle, "ciphertext").unwrap();
        std::fs::write(&password, "hunter2").unwrap();
        (secrets_dir, bundle, password)
    }

    #[test]
    fn ensure_materializes_bundle_and_prepends_search_path() {
        let temp = TempDir::new().unwrap();
        let (secrets_dir, bundle, password) = fixture(&temp);

        let decryptor = MockDecryptor::default();
        let vault = SecretsVault::with_decryptor(decryptor.clone(), &secrets_dir, &bundle, &password)
            .with_search_path_var("WS_TEST_SECRETS_MATERIALIZE");

        let plaintext = vault.ensure().expect("ensure should succeed");

        assert_eq!(std::fs::read_to_string(&plaintext).unwrap(), "decrypted");
        assert_eq!(plaintext, secrets_dir.join("bundle"));
        assert_eq!(decryptor.call_count(), 1);

        let search = std::env::var("WS_TEST_SECRETS_MATERIALIZE").unwrap();
        assert!(search.starts_with(secrets_dir.to_str().unwrap()));

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&plaintext).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        std::env::remove_var("WS_TEST_SECRETS_MATERIALIZE");
    }

    #[test]
    fn ensure_twice_decrypts_once() {
        let temp = TempDir::new().unwrap();
        let (secrets_dir, bundle, password) = fixture(&temp);

        let decryptor = MockDecryptor::default();
        let vault = SecretsVault::with_decryptor(decryptor.clone(), &secrets_dir, &bundle, &password)
            .with_search_path_var("WS_TEST_SECRETS_TWICE");

        vault.ensure().expect("first ensure should succeed");
        vault.ensure().expect("second ensure should succeed");

        assert_eq!(decryptor.call_count(), 1);

        std::env::remove_var("WS_TEST_SECRETS_TWICE");
    }

    #[test]
    fn ensure_propagates_decryption_failure() {
        let temp = TempDir::new().unwrap();
        let (secrets_dir, bundle, password) = fixture(&temp);

        let vault =
            SecretsVault::with_decryptor(FailingDecryptor, &secrets_dir, &bundle, &password)
                .with_search_path_var("WS_TEST_SECRETS_FAIL");

        let err = vault.ensure().unwrap_err();
        assert!(matches!(err, Error::Decrypt(_)));

        // A failed materialization never marks the path as active.
        assert!(std::env::var_os("WS_TEST_SECRETS_FAIL").is_none());
    }

    #[test]
    fn openssl_round_trip() {
        // Exercises the real command-line decryptor when openssl is around.
        if Command::new("openssl").arg("version").output().is_err() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let plain_src = temp.path().join("plain.txt");
        let encrypted = temp.path().join("bundle.enc");
        let password = temp.path().join("bundle.pass");
        std::fs::write(&plain_src, "top secret\n").unwrap();
        std::fs::write(&password, "hunter2").unwrap();

        let status = Command::new("openssl")
            .args(["enc", "-aes-256-cbc", "-pbkdf2"])
            .arg("-in")
            .arg(&plain_src)
            .arg("-out")
            .arg(&encrypted)
            .arg("-pass")
            .arg(format!("file:{}", password.display()))
            .status()
            .expect("openssl should run");
        assert!(status.success());

        let output = temp.path().join("bundle");
        OpensslDecryptor
            .decrypt(&encrypted, &password, &output)
            .expect("decrypt should succeed");

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "top secret\n");
    }
}
