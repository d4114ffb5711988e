//! Configuration types for the healthwatch service

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, ExpectedStatus};
use crate::HealthwatchError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Process-wide values that endpoints inherit unless they override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_suppression_window")]
    pub suppression_window_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_seconds: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            suppression_window_seconds: default_suppression_window(),
            probe_timeout_seconds: default_probe_timeout(),
            notify_timeout_seconds: default_notify_timeout(),
        }
    }
}

impl DefaultsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }
}

/// A single endpoint to monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub expect: ExpectedStatus,
    #[serde(default)]
    pub check_interval_seconds: Option<u64>,
    #[serde(default)]
    pub suppression_window_seconds: Option<u64>,
}

impl EndpointConfig {
    /// Apply process-wide defaults to produce a resolved endpoint
    pub fn resolve(&self, defaults: &DefaultsConfig) -> Endpoint {
        Endpoint {
            name: self.name.clone(),
            url: self.url.clone(),
            expect: self.expect,
            check_interval: Duration::from_secs(
                self.check_interval_seconds
                    .unwrap_or(defaults.check_interval_seconds),
            ),
            suppression_window: Duration::from_secs(
                self.suppression_window_seconds
                    .unwrap_or(defaults.suppression_window_seconds),
            ),
        }
    }
}

/// Notifier configuration with tagged enum for extensibility
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifierConfig {
    #[serde(rename = "pushover")]
    Pushover {
        api_token: String,
        user_key: String,
        #[serde(default = "default_pushover_title")]
        title_prefix: String,
        #[serde(default = "default_failure_priority")]
        failure_priority: i8,
        #[serde(default)]
        recovery_priority: i8,
        #[serde(default)]
        sound: Option<String>,
    },
    #[serde(rename = "email")]
    Email {
        smtp_server: String,
        #[serde(default = "default_smtp_port")]
        smtp_port: u16,
        username: String,
        password: String,
        /// Sender address; the login is used when absent
        #[serde(default)]
        from: Option<String>,
        recipients: Vec<String>,
    },
    #[serde(rename = "webhook")]
    Webhook { url: String },
    #[serde(rename = "log")]
    Log,
}

impl NotifierConfig {
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Pushover { .. } => "pushover",
            NotifierConfig::Email { .. } => "email",
            NotifierConfig::Webhook { .. } => "webhook",
            NotifierConfig::Log => "log",
        }
    }
}

/// HTTP server configuration for metrics and the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_server_port(),
            history_size: default_history_size(),
        }
    }
}

fn default_check_interval() -> u64 {
    60
}

fn default_suppression_window() -> u64 {
    3600
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_notify_timeout() -> u64 {
    10
}

fn default_pushover_title() -> String {
    "Healthwatch".to_string()
}

fn default_failure_priority() -> i8 {
    1
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_server_port() -> u16 {
    9464
}

fn default_history_size() -> usize {
    100
}

impl Config {
    /// Check the configuration for mistakes that would make monitoring meaningless
    pub fn validate(&self) -> crate::Result<()> {
        let defaults = &self.defaults;
        if defaults.check_interval_seconds == 0 {
            return Err(config_error("defaults.check_interval_seconds must be > 0"));
        }
        if defaults.probe_timeout_seconds == 0 {
            return Err(config_error("defaults.probe_timeout_seconds must be > 0"));
        }
        if defaults.notify_timeout_seconds == 0 {
            return Err(config_error("defaults.notify_timeout_seconds must be > 0"));
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                return Err(config_error("endpoint name must not be empty"));
            }
            if !names.insert(endpoint.name.as_str()) {
                return Err(config_error(&format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }

            let url = reqwest::Url::parse(&endpoint.url).map_err(|e| {
                config_error(&format!(
                    "endpoint '{}' has invalid url '{}': {}",
                    endpoint.name, endpoint.url, e
                ))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(config_error(&format!(
                    "endpoint '{}' url must be http or https, got '{}'",
                    endpoint.name,
                    url.scheme()
                )));
            }

            if endpoint.check_interval_seconds == Some(0) {
                return Err(config_error(&format!(
                    "endpoint '{}' check_interval_seconds must be > 0",
                    endpoint.name
                )));
            }
            if let ExpectedStatus::Range { min, max } = endpoint.expect {
                if min > max {
                    return Err(config_error(&format!(
                        "endpoint '{}' expected status range {}-{} is inverted",
                        endpoint.name, min, max
                    )));
                }
            }
        }

        for notifier in &self.notifiers {
            match notifier {
                NotifierConfig::Pushover {
                    api_token,
                    user_key,
                    ..
                } => {
                    if api_token.is_empty() || user_key.is_empty() {
                        return Err(config_error(
                            "pushover notifier requires api_token and user_key",
                        ));
                    }
                }
                NotifierConfig::Email {
                    smtp_server,
                    username,
                    from,
                    recipients,
                    ..
                } => {
                    if smtp_server.trim().is_empty() {
                        return Err(config_error("email notifier requires smtp_server"));
                    }
                    if recipients.is_empty() {
                        return Err(config_error(
                            "email notifier requires at least one recipient",
                        ));
                    }
                    crate::email::parse_mailbox(from.as_deref().unwrap_or(username))?;
                    for recipient in recipients {
                        crate::email::parse_mailbox(recipient)?;
                    }
                }
                NotifierConfig::Webhook { url } => {
                    reqwest::Url::parse(url).map_err(|e| {
                        config_error(&format!("webhook url '{}' is invalid: {}", url, e))
                    })?;
                }
                NotifierConfig::Log => {}
            }
        }

        Ok(())
    }

    /// All configured endpoints with defaults applied, in configuration order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .map(|e| e.resolve(&self.defaults))
            .collect()
    }
}

fn config_error(msg: &str) -> HealthwatchError {
    HealthwatchError::Config(msg.to_string())
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        HealthwatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
