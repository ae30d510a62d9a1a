//! Shared configuration types for Tollgate services
//!
//! Every service reads its settings from the process environment. This crate
//! holds the pieces that are not specific to one binary: the deployment
//! mode, the Postgres connection settings used by the session store, and the
//! Redis settings used by the rate-limit counter store.

mod database;
mod error;
mod redis;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ConfigResult};
pub use redis::RedisConfig;

use std::env;

use serde::{Deserialize, Serialize};

/// Configuration shared by every Tollgate service
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Session store database
    pub database: DatabaseConfig,

    /// Rate-limit counter store
    pub redis: RedisConfig,

    /// Deployment mode
    pub environment: Environment,

    /// Log filter (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Load the mode from `ENVIRONMENT`, defaulting to development
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            environment: Environment::from_env(),
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Read a variable that has no sensible default
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

/// Read a variable, falling back to `default` when unset
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parse a variable into `T`, falling back to `default` when unset
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Stage".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!(
            "anything".parse::<Environment>().unwrap(),
            Environment::Development
        );
    }

    #[test]
    fn test_environment_from_env() {
        temp_env::with_var("ENVIRONMENT", Some("production"), || {
            assert!(Environment::from_env().is_production());
        });
        temp_env::with_var_unset("ENVIRONMENT", || {
            assert!(Environment::from_env().is_development());
        });
    }

    #[test]
    fn test_parse_env_reports_variable_name() {
        temp_env::with_var("TOLLGATE_TEST_PORT", Some("not-a-number"), || {
            let err = parse_env::<u16>("TOLLGATE_TEST_PORT", 80).unwrap_err();
            assert!(err.to_string().contains("TOLLGATE_TEST_PORT"));
        });
        temp_env::with_var_unset("TOLLGATE_TEST_PORT", || {
            assert_eq!(parse_env::<u16>("TOLLGATE_TEST_PORT", 80).unwrap(), 80);
        });
    }

    #[test]
    fn test_required_env_rejects_blank() {
        temp_env::with_var("TOLLGATE_TEST_REQUIRED", Some("  "), || {
            assert!(matches!(
                get_required_env("TOLLGATE_TEST_REQUIRED"),
                Err(ConfigError::MissingEnvVar(_))
            ));
        });
    }
}
