//! Configuration management
//!
//! Settings are resolved in this order (later wins):
//! 1. Defaults
//! 2. `bmsg.toml` (or the file given with `--config`)
//! 3. Environment variables (`BMSG_*`)
//!
//! `${VAR_NAME}` inside the TOML file is replaced by the environment value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "bmsg.toml";

/// Shipped placeholder secret; the server warns when it is still in use
pub const DEFAULT_ADMIN_SECRET: &str = "change-this-secret";

/// Main configuration for bmsg
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// HTTP gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret for operator endpoints
    #[serde(default = "default_admin_secret", skip_serializing)]
    pub admin_secret: String,

    /// Allowed CORS origins; `None` allows any origin
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_secret: default_admin_secret(),
            allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (`:memory:` for a throwaway database)
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Only the N most recent broadcasts are delivered to late joiners.
    /// Unset keeps every broadcast open.
    #[serde(default)]
    pub open_broadcasts: Option<usize>,

    /// Default size of the operator's recent-messages listing
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            open_broadcasts: None,
            recent_limit: default_recent_limit(),
        }
    }
}

/// Telegram bridge settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; the bridge is disabled without one
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Chats allowed to issue operator commands
    #[serde(default)]
    pub admin_chat_ids: Vec<i64>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_admin_secret() -> String {
    DEFAULT_ADMIN_SECRET.to_string()
}

fn default_db_path() -> String {
    "bmsg.db".to_string()
}

fn default_recent_limit() -> usize {
    10
}

impl Config {
    /// Replace `${VAR_NAME}` with the environment value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse TOML content, expanding environment references first
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML file and apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from `path`, else `./bmsg.toml` if present, else the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("BMSG_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BMSG_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("Invalid BMSG_PORT: {}", port)))?;
        }
        if let Ok(secret) = std::env::var("BMSG_ADMIN_SECRET") {
            self.server.admin_secret = secret;
        }
        if let Ok(origins) = std::env::var("BMSG_ALLOWED_ORIGINS") {
            self.server.allowed_origins = Some(split_list(&origins));
        }

        if let Ok(path) = std::env::var("BMSG_DB") {
            self.storage.db_path = path;
        }

        if let Ok(open) = std::env::var("BMSG_OPEN_BROADCASTS") {
            self.dispatch.open_broadcasts = if open.trim().is_empty() {
                None
            } else {
                Some(open.trim().parse().map_err(|_| {
                    Error::Config(format!("Invalid BMSG_OPEN_BROADCASTS: {}", open))
                })?)
            };
        }

        if let Ok(token) = std::env::var("BMSG_TG_TOKEN") {
            if !token.is_empty() {
                self.telegram.token = Some(token);
            }
        }
        if let Ok(ids) = std::env::var("BMSG_TG_ADMIN_IDS") {
            self.telegram.admin_chat_ids = split_list(&ids)
                .iter()
                .map(|id| {
                    id.parse()
                        .map_err(|_| Error::Config(format!("Invalid chat id: {}", id)))
                })
                .collect::<Result<Vec<i64>>>()?;
        }

        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.admin_secret.trim().is_empty() {
            return Err(Error::Config("admin secret must not be empty".to_string()));
        }
        if self.storage.db_path.trim().is_empty() {
            return Err(Error::Config("database path must not be empty".to_string()));
        }
        if self.dispatch.recent_limit == 0 {
            return Err(Error::Config("recent_limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Whether the shipped placeholder secret is still configured
    pub fn uses_default_secret(&self) -> bool {
        self.server.admin_secret == DEFAULT_ADMIN_SECRET
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert!(config.uses_default_secret());
        assert_eq!(config.storage.db_path, "bmsg.db");
        assert!(config.dispatch.open_broadcasts.is_none());
        assert_eq!(config.dispatch.recent_limit, 10);
        assert!(config.telegram.token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8080
admin_secret = "hunter2"

[storage]
db_path = "/var/lib/bmsg/bmsg.db"

[dispatch]
open_broadcasts = 50

[telegram]
token = "123:abc"
admin_chat_ids = [1001, -2002]
"#;
        let config = Config::from_toml_str(toml_content).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.admin_secret, "hunter2");
        assert_eq!(config.storage.db_path, "/var/lib/bmsg/bmsg.db");
        assert_eq!(config.dispatch.open_broadcasts, Some(50));
        assert_eq!(config.dispatch.recent_limit, 10);
        assert_eq!(config.telegram.token.as_deref(), Some("123:abc"));
        assert_eq!(config.telegram.admin_chat_ids, vec![1001, -2002]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.db_path, "bmsg.db");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[server\nport = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("BMSG_CONFIG_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${BMSG_CONFIG_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${BMSG_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("${}_content"), "_content");

        unsafe {
            std::env::remove_var("BMSG_CONFIG_TEST_VAR");
        }
    }

    #[test]
    fn test_secret_from_env_reference() {
        unsafe {
            std::env::set_var("BMSG_CONFIG_TEST_SECRET", "from-env");
        }
        let config =
            Config::from_toml_str("[server]\nadmin_secret = \"${BMSG_CONFIG_TEST_SECRET}\"\n")
                .unwrap();
        assert_eq!(config.server.admin_secret, "from-env");
        unsafe {
            std::env::remove_var("BMSG_CONFIG_TEST_SECRET");
        }
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\ndb_path = \"data/test.db\"").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert!(config.storage.db_path.ends_with(".db"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_toml_file("/nonexistent/bmsg.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = Config::default();
        config.server.admin_secret = "  ".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
