//! Operator alert delivery.
//!
//! Alerts go to a chat channel through a configured notifier command and
//! are mirrored to the process log. Delivery is a side effect: a failed
//! dispatch is logged and swallowed, while the secrets materialization it
//! depends on stays fatal.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::secrets::{Decryptor, SecretsVault};

/// Severity attached to an operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Payload handed to an [`AlertSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Alert severity.
    pub severity: Severity,
    /// Whether the message body carries HTML markup.
    pub html: bool,
    /// Destination channel identifier.
    pub channel: String,
    /// Sender identity shown in the channel.
    pub sender: String,
    /// Message body.
    pub message: String,
    /// Whether the sink should also mirror the alert to its own log.
    pub mirror_to_log: bool,
}

/// Destination for operator alerts.
pub trait AlertSink {
    /// Delivers one alert.
    fn deliver(&self, payload: &AlertPayload) -> Result<()>;
}

/// Sink that feeds the payload as JSON to a notifier command's stdin.
#[derive(Debug, Clone)]
pub struct CommandSink {
    notifier: PathBuf,
}

impl CommandSink {
    /// Creates a sink around the notifier binary at `notifier`.
    pub fn new(notifier: impl Into<PathBuf>) -> Self {
        Self {
            notifier: notifier.into(),
        }
    }
}

impl AlertSink for CommandSink {
    fn deliver(&self, payload: &AlertPayload) -> Result<()> {
        let json = serde_json::to_string(payload)
            .map_err(|e| Error::Alert(format!("failed to serialize payload: {}", e)))?;

        let mut child = Command::new(&self.notifier)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Alert(format!("failed to launch notifier: {}", e)))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(json.as_bytes())
                .map_err(|e| Error::Alert(format!("failed to write payload: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Alert(format!("notifier did not finish: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Alert(stderr.trim().to_string()));
        }

        Ok(())
    }
}

/// Formats and dispatches operator alerts, materializing secrets first.
pub struct AlertGateway<S: AlertSink, D: Decryptor> {
    sink: S,
    vault: SecretsVault<D>,
    channel: String,
    sender: String,
}

impl<S: AlertSink, D: Decryptor> AlertGateway<S, D> {
    /// Creates a gateway posting as `sender` into `channel`.
    pub fn new(
        sink: S,
        vault: SecretsVault<D>,
        channel: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            vault,
            channel: channel.into(),
            sender: sender.into(),
        }
    }

    /// Sends `message` at `severity` to the channel and the process log.
    ///
    /// Secrets are ensured first; their failure propagates. Delivery
    /// failure is logged and does not affect the caller's control flow.
    pub fn alert(&self, severity: Severity, message: &str) -> Result<()> {
        self.vault.ensure()?;

        let payload = AlertPayload {
            severity,
            html: looks_like_html(message),
            channel: self.channel.clone(),
            sender: self.sender.clone(),
            message: message.to_string(),
            mirror_to_log: true,
        };

        mirror_to_log(&payload);

        if let Err(e) = self.sink.deliver(&payload) {
            tracing::warn!(channel = %self.channel, error = %e, "alert delivery failed");
        }

        Ok(())
    }
}

/// HTML heuristic: a `<` immediately followed by a non-space character.
pub fn looks_like_html(message: &str) -> bool {
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            if let Some(next) = chars.peek() {
                if !next.is_whitespace() {
                    return true;
                }
            }
        }
    }
    false
}

fn mirror_to_log(payload: &AlertPayload) {
    match payload.severity {
        Severity::Info => {
            tracing::info!(channel = %payload.channel, "{}", payload.message);
        }
        Severity::Warning => {
            tracing::warn!(channel = %payload.channel, "{}", payload.message);
        }
        Severity::Error | Severity::Critical => {
            tracing::error!(channel = %payload.channel, "{}", payload.message);
        }
    }
}
