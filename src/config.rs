//! Configuration loader and validator for the package editor.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub api: Api,
    pub auth: Auth,
    #[serde(default)]
    pub editor: Editor,
}

/// Backend location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Admin credentials and token lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auth {
    pub username: String,
    pub password: String,
    pub token_validity_minutes: i64,
    pub renew_before_minutes: i64,
}

/// Draft editor behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Editor {
    #[serde(default)]
    pub remove_existing: RemovalPolicy,
}

/// What happens when an item that already exists on the server is removed
/// from a draft.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Send the delete as soon as the item leaves the draft.
    #[default]
    Immediate,
    /// Leave the delete to the save-time delete phase.
    Deferred,
}

fn default_timeout_seconds() -> u64 {
    15
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with_base_url(path, None)
}

/// Like [`load`], with `base_url` (e.g. from `API_BASE_URL`) replacing
/// `api.base_url` before validation.
pub fn load_with_base_url(path: Option<&Path>, base_url: Option<String>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Some(base_url) = base_url {
        cfg.api.base_url = base_url;
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let base = cfg.api.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    if reqwest::Url::parse(base).is_err() {
        return Err(ConfigError::Invalid("api.base_url must be an absolute URL"));
    }
    if cfg.api.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("api.timeout_seconds must be > 0"));
    }

    if cfg.auth.username.trim().is_empty() {
        return Err(ConfigError::Invalid("auth.username must be non-empty"));
    }
    if cfg.auth.password.is_empty() {
        return Err(ConfigError::Invalid("auth.password must be non-empty"));
    }
    if cfg.auth.token_validity_minutes <= 0 {
        return Err(ConfigError::Invalid("auth.token_validity_minutes must be > 0"));
    }
    if cfg.auth.renew_before_minutes < 0
        || cfg.auth.renew_before_minutes >= cfg.auth.token_validity_minutes
    {
        return Err(ConfigError::Invalid(
            "auth.renew_before_minutes must be >= 0 and below token_validity_minutes",
        ));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"api:
  base_url: "http://localhost:8000/"
  timeout_seconds: 15

auth:
  username: "admin"
  password: "CHANGE_ME"
  token_validity_minutes: 30
  renew_before_minutes: 5

editor:
  remove_existing: immediate
"#
}
