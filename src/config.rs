//! Server configuration.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file,
//! a `.env` file in the working directory, and process environment variables. The result is validated once at startup and
//! handed to the components that need it; nothing re-reads it later.

use crate::sandbox::e2b::{DEFAULT_TEMPLATE, E2B_API_BASE, E2B_DOMAIN};
use crate::sandbox::registry::{
    DEFAULT_MAX_SANDBOXES, DEFAULT_SANDBOX_TIMEOUT_MS, MAX_SANDBOX_TIMEOUT_MS,
    MIN_SANDBOX_TIMEOUT_MS,
};
use crate::sandbox::SandboxLimits;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_API_KEY: &str = "E2B_API_KEY";
pub const ENV_API_BASE: &str = "E2B_API_BASE";
pub const ENV_DOMAIN: &str = "E2B_DOMAIN";
pub const ENV_TEMPLATE: &str = "E2B_TEMPLATE";
pub const ENV_MAX_SANDBOXES: &str = "MAX_ACTIVE_SANDBOXES";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

pub const DOTENV_FILE: &str = ".env";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read env file {path}: {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("invalid value {value:?} for {name}")]
    Env { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is not set (e.g. `info`, `debug`).
    pub log_level: String,
    pub e2b: E2bConfig,
    pub sandbox: SandboxConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            e2b: E2bConfig::default(),
            sandbox: SandboxConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Connection settings for the E2B API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct E2bConfig {
    /// API key. Prefer the `E2B_API_KEY` environment variable.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub api_base: String,
    /// Domain under which sandbox hosts are exposed.
    pub domain: String,
    /// Sandbox template to boot.
    pub template: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for E2bConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: E2B_API_BASE.into(),
            domain: E2B_DOMAIN.into(),
            template: DEFAULT_TEMPLATE.into(),
            request_timeout_secs: 120,
        }
    }
}

/// Capacity and lifetime limits for tracked sandboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum number of concurrently tracked sandboxes.
    pub max_sandboxes: usize,
    /// Lifetime used when a client does not request one, in milliseconds.
    pub default_timeout_ms: u64,
    /// Upper bound on any requested lifetime, in milliseconds.
    pub max_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_sandboxes: DEFAULT_MAX_SANDBOXES,
            default_timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
            max_timeout_ms: MAX_SANDBOX_TIMEOUT_MS,
        }
    }
}

impl SandboxConfig {
    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            max_sandboxes: self.max_sandboxes,
            default_timeout_ms: self.default_timeout_ms,
            max_timeout_ms: self.max_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ServerConfig {
    /// How long shutdown waits for in-flight tool calls before cleanup.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location when it
    /// exists), then apply environment overrides and validate.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(raw) => Self::from_file(Path::new(shellexpand::tilde(raw).as_ref()))?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        let dotenv = read_dotenv(Path::new(DOTENV_FILE))?;
        config.apply_env(|name| std::env::var(name).ok().or_else(|| dotenv.get(name).cloned()))?;
        config.validate()?;
        Ok(config)
    }

    /// `<platform config dir>/e2b-mcp/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "e2b", "e2b-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Parse TOML, warning about keys that are not part of the schema.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let value: toml::Value = toml::from_str(raw)?;
        serde_ignored::deserialize(value, |path| {
            tracing::warn!(key = %path, "ignoring unknown config key");
        })
    }

    /// Apply environment overrides; `lookup` returns the value of a variable.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.e2b.api_key = key;
        }
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.is_empty()) {
            self.e2b.api_base = base;
        }
        if let Some(domain) = lookup(ENV_DOMAIN).filter(|v| !v.is_empty()) {
            self.e2b.domain = domain;
        }
        if let Some(template) = lookup(ENV_TEMPLATE).filter(|v| !v.is_empty()) {
            self.e2b.template = template;
        }
        if let Some(raw) = lookup(ENV_MAX_SANDBOXES) {
            self.sandbox.max_sandboxes = raw.trim().parse().map_err(|_| ConfigError::Env {
                name: ENV_MAX_SANDBOXES,
                value: raw.clone(),
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sandbox = &self.sandbox;
        if sandbox.max_sandboxes == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.max_sandboxes must be greater than zero".into(),
            ));
        }
        if sandbox.max_timeout_ms < MIN_SANDBOX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "sandbox.max_timeout_ms must be at least {MIN_SANDBOX_TIMEOUT_MS}"
            )));
        }
        if sandbox.default_timeout_ms < MIN_SANDBOX_TIMEOUT_MS
            || sandbox.default_timeout_ms > sandbox.max_timeout_ms
        {
            return Err(ConfigError::Invalid(format!(
                "sandbox.default_timeout_ms must be between {MIN_SANDBOX_TIMEOUT_MS} and sandbox.max_timeout_ms"
            )));
        }
        if self.e2b.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "e2b.request_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// JSON Schema of the configuration file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }
}

/// Variables from a dotenv file; empty when the file does not exist.
/// Process environment variables take precedence over these.
pub fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let to_error = |source| ConfigError::Dotenv {
        path: path.to_path_buf(),
        source,
    };
    let vars = dotenvy::from_path_iter(path)
        .map_err(to_error)?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(to_error)?;
    tracing::debug!(path = %path.display(), count = vars.len(), "loaded env file");
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.sandbox.max_sandboxes, 10);
        assert_eq!(config.sandbox.default_timeout_ms, 300_000);
        assert_eq!(config.sandbox.max_timeout_ms, 3_600_000);
        assert_eq!(config.e2b.api_base, "https://api.e2b.dev");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            log_level = "debug"

            [sandbox]
            max_sandboxes = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.sandbox.max_sandboxes, 3);
        assert_eq!(config.sandbox.default_timeout_ms, 300_000);
        assert_eq!(config.e2b.template, "code-interpreter-v1");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::from_toml_str("[sandbox]\nmax_sandbox = 4\n").unwrap();
        assert_eq!(config.sandbox.max_sandboxes, 10);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("E2B_API_KEY", "e2b_test"),
                ("MAX_ACTIVE_SANDBOXES", " 4 "),
                ("LOG_LEVEL", "warn"),
            ]))
            .unwrap();
        assert_eq!(config.e2b.api_key, "e2b_test");
        assert_eq!(config.sandbox.max_sandboxes, 4);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("MAX_ACTIVE_SANDBOXES", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "MAX_ACTIVE_SANDBOXES", .. }));
    }

    #[test]
    fn validate_rejects_inconsistent_limits() {
        let mut config = Config::default();
        config.sandbox.max_sandboxes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sandbox.default_timeout_ms = config.sandbox.max_timeout_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_explicit_file_and_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[e2b]\ntemplate = \"base\"\n[server]\nshutdown_grace_secs = 2").unwrap();

        std::env::set_var(ENV_TEMPLATE, "custom-template");
        scopeguard::defer! {
            std::env::remove_var(ENV_TEMPLATE);
        }

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.e2b.template, "custom-template");
        assert_eq!(config.server.shutdown_grace_secs, 2);
    }

    #[test]
    fn load_fails_for_missing_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = Config::load(missing.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn dotenv_file_supplies_missing_variables() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "E2B_API_KEY=e2b_from_file\nMAX_ACTIVE_SANDBOXES=3\n").unwrap();

        let dotenv = read_dotenv(&path).unwrap();
        let process = env(&[("MAX_ACTIVE_SANDBOXES", "5")]);
        let mut config = Config::default();
        config
            .apply_env(|name| process(name).or_else(|| dotenv.get(name).cloned()))
            .unwrap();
        assert_eq!(config.e2b.api_key, "e2b_from_file");
        assert_eq!(config.sandbox.max_sandboxes, 5);
    }

    #[test]
    fn missing_dotenv_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(read_dotenv(&dir.path().join(".env")).unwrap().is_empty());
    }

    #[test]
    fn malformed_dotenv_file_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NOT A VALID LINE\n").unwrap();
        assert!(matches!(read_dotenv(&path), Err(ConfigError::Dotenv { .. })));
    }

    #[test]
    fn schema_describes_sections() {
        let schema = Config::json_schema();
        let text = schema.to_string();
        assert!(text.contains("max_sandboxes"));
        assert!(text.contains("shutdown_grace_secs"));
    }
}
