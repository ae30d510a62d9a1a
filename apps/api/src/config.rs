//! API server configuration

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tollgate_shared_config::{
    get_env_or_default, parse_env, CommonConfig, DatabaseConfig, Environment, RedisConfig,
};

use crate::middleware::TrustedProxies;
use crate::services::auth::parse_duration_string;
use crate::services::keys::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use crate::services::{AuthConfig, BucketStrategy, PolicyTable};

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// Access token lifetime (default: 2d)
    pub access_token_expiry: String,

    /// Refresh token lifetime (default: 3d)
    pub refresh_token_expiry: String,

    /// RSA modulus size for signing keys (default: 4096)
    pub token_key_bits: usize,

    /// How rate limit counters are bucketed in time (default: minute)
    pub rate_limit_bucket: BucketStrategy,

    /// Fall back to per-instance counters when Redis fails (default: false)
    pub rate_limit_fallback: bool,

    /// JSON file replacing the built-in rate limit policy
    pub rate_limit_policy_file: Option<PathBuf>,

    /// How long revoked refresh tokens are kept (default: refresh lifetime)
    pub revoked_token_retention: Option<String>,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,

    /// Reverse proxies whose X-Forwarded-For is believed (default: none)
    pub trusted_proxies: TrustedProxies,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Token lifetimes are validated up front: access must be strictly
    /// shorter than refresh. In production `DATABASE_URL` must be set.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();
        if environment.is_production() {
            Self::validate_database_url()?;
        }

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        let config = Self {
            common,

            port: parse_env("PORT", 8080u16)?,

            access_token_expiry: get_env_or_default("ACCESS_TOKEN_EXPIRY", "2d"),

            refresh_token_expiry: get_env_or_default("REFRESH_TOKEN_EXPIRY", "3d"),

            token_key_bits: parse_env("TOKEN_KEY_BITS", DEFAULT_KEY_BITS)?,

            rate_limit_bucket: env::var("RATE_LIMIT_BUCKET")
                .ok()
                .map(|value| value.parse::<BucketStrategy>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid RATE_LIMIT_BUCKET: {}", e))?
                .unwrap_or_default(),

            rate_limit_fallback: parse_env("RATE_LIMIT_FALLBACK", false)?,

            rate_limit_policy_file: env::var("RATE_LIMIT_POLICY_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            revoked_token_retention: env::var("REVOKED_TOKEN_RETENTION")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),

            trusted_proxies: env::var("TRUSTED_PROXIES")
                .ok()
                .map(|value| value.parse::<TrustedProxies>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid TRUSTED_PROXIES: {}", e))?
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.token_key_bits < MIN_KEY_BITS {
            bail!(
                "TOKEN_KEY_BITS must be at least {} (got {})",
                MIN_KEY_BITS,
                self.token_key_bits
            );
        }
        self.auth_config()?;
        Ok(())
    }

    /// Validate that DATABASE_URL is explicitly set in production
    fn validate_database_url() -> Result<()> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(()),
            _ => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please set your PostgreSQL connection string."
                );
            }
        }
    }

    /// Token lifetimes and revoked trail retention
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let config =
            AuthConfig::with_expiry_strings(&self.access_token_expiry, &self.refresh_token_expiry)
                .context("Invalid token expiry configuration")?;

        match &self.revoked_token_retention {
            Some(raw) => {
                let retention = parse_duration_string(raw).with_context(|| {
                    format!("Invalid REVOKED_TOKEN_RETENTION value '{}'", raw)
                })?;
                Ok(config.with_revoked_retention(retention))
            }
            None => Ok(config),
        }
    }

    /// Built-in policy, or the file named by RATE_LIMIT_POLICY_FILE
    pub fn policy_table(&self) -> Result<PolicyTable> {
        match &self.rate_limit_policy_file {
            Some(path) => PolicyTable::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display())),
            None => Ok(PolicyTable::default_auth()),
        }
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
