//! Redis settings for the rate-limit counter store

use crate::{get_env_or_default, parse_env, ConfigResult};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL without credentials
    pub url: String,

    /// Optional password, spliced into the URL at connect time
    pub password: Option<String>,

    /// Seconds to wait when opening a connection
    pub connect_timeout_secs: u64,
}

impl RedisConfig {
    /// Load Redis configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: get_env_or_default("REDIS_URL", "redis://localhost:6379"),
            password: std::env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
            connect_timeout_secs: parse_env("REDIS_CONNECT_TIMEOUT", 5)?,
        })
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Full connection URL, with the password in the userinfo part when set
    pub fn connection_url(&self) -> String {
        match (&self.password, self.url.split_once("://")) {
            (Some(password), Some((scheme, rest))) if !rest.contains('@') => {
                format!("{}://:{}@{}", scheme, password, rest)
            }
            _ => self.url.clone(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            password: None,
            connect_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_without_password() {
        assert_eq!(
            RedisConfig::default().connection_url(),
            "redis://localhost:6379"
        );
    }

    #[test]
    fn test_connection_url_with_password() {
        let config = RedisConfig {
            password: Some("hunter2".to_string()),
            ..RedisConfig::with_url("redis://cache:6380/1")
        };
        assert_eq!(config.connection_url(), "redis://:hunter2@cache:6380/1");
    }

    #[test]
    fn test_connection_url_keeps_existing_credentials() {
        let config = RedisConfig {
            password: Some("ignored".to_string()),
            ..RedisConfig::with_url("redis://user:pw@cache:6379")
        };
        assert_eq!(config.connection_url(), "redis://user:pw@cache:6379");
    }
}
