mod loader;
mod prompt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use loader::load_config;
pub use prompt::DEFAULT_SYSTEM_PROMPT;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Path the chat handler is mounted on
    #[serde(default = "default_route")]
    pub route: String,
}

fn default_port() -> u16 {
    8066
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_route() -> String {
    "/api/chat".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            route: default_route(),
        }
    }
}

/// Upstream provider configuration
#[derive(Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Provider base URL (e.g., "https://api.openai.com")
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Longest wait for upstream data (headers or the next stream chunk), in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// TLS configuration options
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inline API key, used when the environment variable is unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_moderation_path")]
    pub moderation_path: String,
    #[serde(default = "default_completion_path")]
    pub completion_path: String,
}

/// TLS configuration for upstream connections
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
}

fn default_upstream_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_api_key_env() -> String {
    "OPENAI_KEY".to_string()
}

fn default_moderation_path() -> String {
    "/v1/moderations".to_string()
}

fn default_completion_path() -> String {
    "/v1/chat/completions".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_seconds: default_timeout(),
            tls: None,
            api_key_env: default_api_key_env(),
            api_key: None,
            moderation_path: default_moderation_path(),
            completion_path: default_completion_path(),
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("tls", &self.tls)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("moderation_path", &self.moderation_path)
            .field("completion_path", &self.completion_path)
            .finish()
    }
}

impl UpstreamConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }

    pub fn moderation_url(&self) -> String {
        format!("{}{}", self.base_url(), self.moderation_path)
    }

    pub fn completion_url(&self) -> String {
        format!("{}{}", self.base_url(), self.completion_path)
    }

    /// Resolve the API key from the process environment, falling back to the inline key
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        self.resolve_api_key_from(std::env::var(&self.api_key_env).ok())
    }

    fn resolve_api_key_from(&self, env_value: Option<String>) -> Option<SecretString> {
        env_value
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                self.api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
            })
            .map(SecretString::from)
    }
}

/// Completion policy applied to every request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Requests whose token count reaches this value are rejected
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_token_limit() -> usize {
    4000
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            token_limit: default_token_limit(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration from the given path, or the first default location that exists
    ///
    /// With no path and no file at any default location, the built-in defaults are used.
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                tracing::debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        let upstream = url::Url::parse(&self.upstream.url).map_err(|e| {
            ConfigError::Validation(format!("invalid upstream url {:?}: {}", self.upstream.url, e))
        })?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "upstream url must be http or https, got {:?}",
                upstream.scheme()
            )));
        }

        for (name, path) in [
            ("server.route", &self.server.route),
            ("upstream.moderation_path", &self.upstream.moderation_path),
            ("upstream.completion_path", &self.upstream.completion_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "{} must start with '/', got {:?}",
                    name, path
                )));
            }
        }

        if self.policy.model.trim().is_empty() {
            return Err(ConfigError::Validation("policy.model must not be empty".to_string()));
        }
        if self.policy.token_limit == 0 {
            return Err(ConfigError::Validation("policy.token_limit must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.policy.temperature) {
            return Err(ConfigError::Validation(format!(
                "policy.temperature must be within 0.0..=2.0, got {}",
                self.policy.temperature
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
