//! Environment variable handling.

use std::env;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Configuration
    pub const BASTION_CONFIG_DIR: &str = "BASTION_CONFIG_DIR";
    pub const BASTION_ENV: &str = "BASTION_ENV";

    // Audit pipeline
    pub const BASTION_AUDIT_QUEUE_CAPACITY: &str = "BASTION_AUDIT_QUEUE_CAPACITY";
    pub const BASTION_AUDIT_BATCH_SIZE: &str = "BASTION_AUDIT_BATCH_SIZE";
    pub const BASTION_AUDIT_FLUSH_INTERVAL_MS: &str = "BASTION_AUDIT_FLUSH_INTERVAL_MS";
    pub const BASTION_AUDIT_MAX_RETRIES: &str = "BASTION_AUDIT_MAX_RETRIES";

    // Storage
    pub const BASTION_STORAGE_BACKEND: &str = "BASTION_STORAGE_BACKEND";
    pub const BASTION_DATABASE_PATH: &str = "BASTION_DATABASE_PATH";

    // Logging
    pub const BASTION_LOG_LEVEL: &str = "BASTION_LOG_LEVEL";
    pub const BASTION_LOG_FORMAT: &str = "BASTION_LOG_FORMAT";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files.
    pub fn init() -> Result<Self, EnvError> {
        // Later files override earlier ones
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.local");

        if let Ok(env) = env::var(vars::BASTION_ENV) {
            let _ = dotenvy::from_filename(format!(".env.{}", env));
        }

        Ok(Self { _guard: () })
    }

    /// Get a required string variable.
    pub fn require(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotSet {
            var: var.to_string(),
        })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a variable with a default value.
    pub fn get_or(var: &str, default: &str) -> String {
        env::var(var).unwrap_or_else(|_| default.to_string())
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Get an integer variable.
    pub fn get_int<T: std::str::FromStr>(var: &str) -> Result<Option<T>, EnvError> {
        match env::var(var) {
            Ok(v) => v.parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: "expected integer".to_string(),
            }),
            Err(_) => Ok(None),
        }
    }

    /// Check if running in production mode.
    pub fn is_production() -> bool {
        env::var(vars::BASTION_ENV)
            .map(|v| v == "production")
            .unwrap_or(false)
    }
}
