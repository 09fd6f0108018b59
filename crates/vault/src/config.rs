//! Configuration loading and validation for the vault service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::{KeyRing, KeyRingError};

/// Validated vault service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Active field-encryption key, base64url (32 bytes). **Required.**
    pub pii_encryption_key: String,

    /// Retired keys, comma separated, newest first. Kept for decryption only.
    #[serde(default)]
    pub pii_retired_encryption_keys: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Path of the JSON-lines audit log.
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,

    /// Days of audit history to keep.
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: u32,

    /// How often (seconds) to prune expired audit entries.
    #[serde(default = "default_audit_retention_interval")]
    pub audit_retention_interval_secs: u64,

    /// Return decoded data even when the audit entry could not be written.
    #[serde(default)]
    pub audit_fail_open: bool,

    /// Country code assumed for phone numbers given without one.
    #[serde(default = "default_phone_country_code")]
    pub default_phone_country_code: String,

    /// OTLP/gRPC collector endpoint. Span export is disabled when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Key strings must never reach a log line.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("pii_encryption_key", &"[REDACTED]")
            .field("pii_retired_encryption_keys", &"[REDACTED]")
            .field("listen_port", &self.listen_port)
            .field("audit_log_path", &self.audit_log_path)
            .field("audit_retention_days", &self.audit_retention_days)
            .field("audit_retention_interval_secs", &self.audit_retention_interval_secs)
            .field("audit_fail_open", &self.audit_fail_open)
            .field("default_phone_country_code", &self.default_phone_country_code)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn default_listen_port() -> u16 {
    8080
}
fn default_audit_log_path() -> String {
    "audit.jsonl".into()
}
fn default_audit_retention_days() -> u32 {
    365
}
fn default_audit_retention_interval() -> u64 {
    86_400
}
fn default_phone_country_code() -> String {
    "1".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.pii_encryption_key, "PII_ENCRYPTION_KEY")?;
        ensure_non_empty(&self.audit_log_path, "AUDIT_LOG_PATH")?;

        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be > 0");
        }
        if self.audit_retention_interval_secs == 0 {
            anyhow::bail!("AUDIT_RETENTION_INTERVAL_SECS must be > 0");
        }
        let cc = &self.default_phone_country_code;
        if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("DEFAULT_PHONE_COUNTRY_CODE must be 1 to 3 digits");
        }
        if self
            .otel_exporter_otlp_endpoint
            .as_deref()
            .is_some_and(|e| e.trim().is_empty())
        {
            anyhow::bail!("OTEL_EXPORTER_OTLP_ENDPOINT must not be blank when set");
        }
        Ok(())
    }

    /// Retired key entries in the order they were configured. Blank entries
    /// are kept so key errors report the entry's place in the list.
    pub fn retired_keys(&self) -> Vec<&str> {
        self.pii_retired_encryption_keys.split(',').map(str::trim).collect()
    }

    /// Build the key ring from the configured keys.
    ///
    /// # Errors
    ///
    /// Returns [`KeyRingError`] if any key is not valid base64url or not 32 bytes.
    pub fn key_ring(&self) -> Result<KeyRing, KeyRingError> {
        KeyRing::from_encoded(self.pii_encryption_key.trim(), self.retired_keys().as_slice())
    }

    pub fn audit_retention_interval(&self) -> Duration {
        Duration::from_secs(self.audit_retention_interval_secs)
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
