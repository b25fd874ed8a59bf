//! Configuration management for the Commvault exporter.
//!
//! Supports loading configuration from:
//! - TOML configuration files
//! - Environment variables (with `COMMVAULT_EXPORTER_` prefix)
//! - The flat `COMMVAULT_REQUEST_*` / `REQUEST_*` variables used by existing deployments
//! - Command-line arguments

use crate::error::{CommvaultError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Commvault server connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct CommvaultConfig {
    /// Commvault web server URL (e.g., "https://commvault.example.com/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API user name
    #[serde(default = "default_username")]
    pub username: String,

    /// API user password
    #[serde(default = "default_password")]
    pub password: String,

    /// Verify TLS certificates (set to false for self-signed certs)
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Seconds between two polls of the Commvault API
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl std::fmt::Debug for CommvaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommvaultConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("verify_tls", &self.verify_tls)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .finish()
    }
}

impl CommvaultConfig {
    /// Network location of the configured server (`host[:port]`), used as the
    /// `host` label on every exported metric.
    pub fn host_label(&self) -> String {
        match Url::parse(&self.base_url) {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    /// Resolve an API path against the base URL.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Append the trailing slash API paths are joined onto.
    fn normalize(&mut self) {
        let trimmed = self.base_url.trim();
        if trimmed.len() != self.base_url.len() {
            self.base_url = trimmed.to_string();
        }
        if !self.base_url.is_empty() && !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
    }
}

impl Default for CommvaultConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: default_username(),
            password: default_password(),
            verify_tls: default_verify_tls(),
            timeout_seconds: default_timeout(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

/// Exporter specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address to listen on for metrics endpoint
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Main configuration structure for the Commvault exporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Commvault server configuration
    #[serde(default)]
    pub commvault: CommvaultConfig,

    /// Exporter server configuration
    #[serde(default)]
    pub exporter: ExporterConfig,
}

fn default_base_url() -> String {
    "http://commvaultsrv.sample.com/".to_string()
}

fn default_username() -> String {
    "api".to_string()
}

fn default_password() -> String {
    "api".to_string()
}

fn default_verify_tls() -> bool {
    false
}

fn default_timeout() -> u64 {
    15
}

fn default_poll_interval() -> u64 {
    30
}

fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How a flat environment variable is interpreted.
#[derive(Debug, Clone, Copy)]
enum LegacyKind {
    Text,
    Flag,
    Seconds,
}

/// Flat variable names accepted on top of the prefixed ones.
const LEGACY_VARIABLES: &[(&str, &str, LegacyKind)] = &[
    ("COMMVAULT_REQUEST_URI", "commvault.base_url", LegacyKind::Text),
    ("COMMVAULT_REQUEST_USER", "commvault.username", LegacyKind::Text),
    ("COMMVAULT_REQUEST_PASSWORD", "commvault.password", LegacyKind::Text),
    ("COMMVAULT_REQUEST_TLS_VERIFY", "commvault.verify_tls", LegacyKind::Flag),
    ("REQUEST_TIMEOUT", "commvault.timeout_seconds", LegacyKind::Seconds),
    ("REQUEST_INTERVAL", "commvault.poll_interval_seconds", LegacyKind::Seconds),
];

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Optional path to configuration file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use commvault_exporter::config::Settings;
    ///
    /// let settings = Settings::load(Some("config/default.toml")).unwrap();
    /// ```
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    /// Same as [`Settings::load`], reading the flat variables through `lookup`.
    pub fn load_with<F>(config_path: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder();

        // Add config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        // Add environment variables with COMMVAULT_EXPORTER_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("COMMVAULT_EXPORTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for &(variable, key, kind) in LEGACY_VARIABLES {
            let Some(raw) = lookup(variable) else {
                continue;
            };
            builder = match kind {
                LegacyKind::Text => builder.set_override(key, raw)?,
                LegacyKind::Flag => builder.set_override(key, parse_flag(variable, &raw)?)?,
                LegacyKind::Seconds => builder.set_override(key, parse_seconds(variable, &raw)?)?,
            };
        }

        let config = builder.build()?;
        let mut settings: Settings = config.try_deserialize()?;

        settings.commvault.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration settings.
    fn validate(&self) -> Result<()> {
        if self.commvault.base_url.is_empty() {
            return Err(invalid("Commvault base URL cannot be empty"));
        }

        let url = Url::parse(&self.commvault.base_url)
            .map_err(|e| invalid(&format!("Invalid Commvault base URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid(
                "Commvault base URL must be an absolute http(s) URL with a host",
            ));
        }

        if self.commvault.username.is_empty() || self.commvault.password.is_empty() {
            return Err(invalid("Commvault credentials are required"));
        }

        if self.commvault.timeout_seconds == 0 {
            return Err(invalid("Request timeout must be greater than zero"));
        }

        if self.commvault.poll_interval_seconds == 0 {
            return Err(invalid("Poll interval must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> CommvaultError {
    CommvaultError::Config(config::ConfigError::Message(message.to_string()))
}

fn parse_flag(variable: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        other => Err(invalid(&format!(
            "{} must be a boolean, got '{}'",
            variable, other
        ))),
    }
}

fn parse_seconds(variable: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs >= 0)
        .ok_or_else(|| {
            invalid(&format!(
                "{} must be a whole number of seconds, got '{}'",
                variable, raw
            ))
        })
}
