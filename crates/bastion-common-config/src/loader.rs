//! Configuration file loading and parsing.

use crate::env::{vars, EnvError, Environment};
use crate::types::{BastionConfig, StorageBackend};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up in the config directory.
pub const CONFIG_FILE: &str = "bastion.yaml";

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given configuration directory.
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: config_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the configuration file this loader reads.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(CONFIG_FILE)
    }

    /// Load `bastion.yaml`, apply `BASTION_*` overrides and validate.
    pub fn load(&self) -> Result<BastionConfig, ConfigError> {
        let config_path = self.config_path();

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let expanded = self.expand_env_vars(&contents)?;
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        } else {
            BastionConfig::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").map_err(|e| {
            ConfigError::ValidationError {
                message: e.to_string(),
            }
        })?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        return Err(ConfigError::EnvVarNotFound {
                            var: var_name.to_string(),
                        })
                    }
                },
            };

            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// Save configuration to the config directory.
    pub fn save(&self, config: &BastionConfig) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.base_path)?;

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(self.config_path(), yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        match Environment::get(vars::BASTION_CONFIG_DIR) {
            Some(dir) => Self::new(dir),
            None => Self::new(std::env::current_dir().unwrap_or_default()),
        }
    }
}

/// Apply `BASTION_*` environment overrides on top of file values.
pub fn apply_env_overrides(config: &mut BastionConfig) -> Result<(), ConfigError> {
    if let Some(v) = Environment::get_int(vars::BASTION_AUDIT_QUEUE_CAPACITY)? {
        config.audit.queue_capacity = v;
    }
    if let Some(v) = Environment::get_int(vars::BASTION_AUDIT_BATCH_SIZE)? {
        config.audit.batch_size = v;
    }
    if let Some(v) = Environment::get_int(vars::BASTION_AUDIT_FLUSH_INTERVAL_MS)? {
        config.audit.flush_interval_ms = v;
    }
    if let Some(v) = Environment::get_int(vars::BASTION_AUDIT_MAX_RETRIES)? {
        config.audit.max_retries = v;
    }
    if let Some(backend) = Environment::get(vars::BASTION_STORAGE_BACKEND) {
        config.storage.backend = match backend.to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "sqlite" => StorageBackend::Sqlite,
            other => {
                return Err(EnvError::InvalidValue {
                    var: vars::BASTION_STORAGE_BACKEND.to_string(),
                    message: format!("unknown backend '{}'", other),
                }
                .into())
            }
        };
    }
    if let Some(path) = Environment::get(vars::BASTION_DATABASE_PATH) {
        config.storage.database_path = path;
    }
    if let Some(level) = Environment::get(vars::BASTION_LOG_LEVEL) {
        config.logging.level = level;
    }
    if let Some(format) = Environment::get(vars::BASTION_LOG_FORMAT) {
        config.logging.format = format;
    }
    Ok(())
}

/// Validate configuration values.
pub fn validate(config: &BastionConfig) -> Result<(), ConfigError> {
    let fail = |message: &str| {
        Err(ConfigError::ValidationError {
            message: message.to_string(),
        })
    };

    if config.audit.queue_capacity == 0 {
        return fail("audit.queue_capacity must be greater than 0");
    }
    if config.audit.batch_size == 0 {
        return fail("audit.batch_size must be greater than 0");
    }
    if config.audit.flush_interval_ms == 0 {
        return fail("audit.flush_interval_ms must be greater than 0");
    }
    if config.audit.backoff_base_ms > config.audit.backoff_max_ms {
        return fail("audit.backoff_base_ms cannot exceed audit.backoff_max_ms");
    }
    if config.audit.metadata_limit_bytes < 1024 {
        return fail("audit.metadata_limit_bytes must be at least 1024");
    }
    if config.storage.max_connections == 0 {
        return fail("storage.max_connections must be at least 1");
    }
    if config.storage.page_size == 0 {
        return fail("storage.page_size must be greater than 0");
    }
    if config.storage.backend == StorageBackend::Sqlite && config.storage.database_path.is_empty() {
        return fail("storage.database_path is required for the sqlite backend");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults_when_no_file() {
        let dir = tempdir().unwrap();
        let config = ConfigLoader::new(dir.path()).load().unwrap();
        assert_eq!(config.audit.batch_size, BastionConfig::default().audit.batch_size);
    }

    #[test]
    fn test_load_config_from_yaml_file() {
        let dir = tempdir().unwrap();
        let config_content = r#"
audit:
  queue_capacity: 500
  flush_interval_ms: 20
  max_retries: 2
storage:
  backend: sqlite
  database_path: audit.db
  page_size: 32
logging:
  format: json
"#;
        fs::write(dir.path().join(CONFIG_FILE), config_content).unwrap();

        let config = ConfigLoader::new(dir.path()).load().unwrap();

        assert_eq!(config.audit.queue_capacity, 500);
        assert_eq!(config.audit.flush_interval_ms, 20);
        assert_eq!(config.audit.max_retries, 2);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.page_size, 32);
        assert_eq!(config.logging.format, "json");

        assert_eq!(config.audit.batch_size, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("BASTION_TEST_EXPAND", "expanded");
        let loader = ConfigLoader::new(".");
        let result = loader.expand_env_vars("key: ${BASTION_TEST_EXPAND}").unwrap();
        assert_eq!(result, "key: expanded");
        std::env::remove_var("BASTION_TEST_EXPAND");
    }

    #[test]
    fn test_env_var_default() {
        let loader = ConfigLoader::new(".");
        let result = loader
            .expand_env_vars("key: ${BASTION_TEST_NONEXISTENT:-fallback}")
            .unwrap();
        assert_eq!(result, "key: fallback");
    }

    #[test]
    fn test_env_var_missing_error() {
        let loader = ConfigLoader::new(".");
        match loader.expand_env_vars("key: ${BASTION_TEST_MISSING}") {
            Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "BASTION_TEST_MISSING"),
            other => panic!("Expected EnvVarNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BastionConfig::default();
        config.audit.queue_capacity = 0;
        match validate(&config) {
            Err(ConfigError::ValidationError { message }) => {
                assert!(message.contains("queue_capacity"))
            }
            other => panic!("Expected ValidationError, got {:?}", other),
        }

        let mut config = BastionConfig::default();
        config.audit.backoff_base_ms = 10_000;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = BastionConfig::default();
        config.audit.metadata_limit_bytes = 10;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = BastionConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_path.clear();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_parse_error_with_line_number() {
        let dir = tempdir().unwrap();
        let bad_yaml = r#"
audit:
  batch_size: 10
  invalid_yaml: [unclosed
"#;
        fs::write(dir.path().join(CONFIG_FILE), bad_yaml).unwrap();

        match ConfigLoader::new(dir.path()).load() {
            Err(ConfigError::ParseError { line, .. }) => assert!(line.is_some()),
            other => panic!("Expected ParseError with line number, got {:?}", other),
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("nested"));

        let mut config = BastionConfig::default();
        config.audit.batch_size = 7;
        config.storage.page_size = 3;
        loader.save(&config).unwrap();

        let loaded = loader.load().unwrap();
        assert_eq!(loaded.audit.batch_size, 7);
        assert_eq!(loaded.storage.page_size, 3);
    }
}
