//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.
//! Every secret, lifetime and policy switch lives here and is handed to the
//! components that need it at construction time.

use std::str::FromStr;

use chrono::FixedOffset;
use jsonwebtoken::Algorithm;

use crate::core::auth::jwt::{
    ACCESS_TOKEN_EXPIRATION_MINUTES, JwtConfig, REFRESH_TOKEN_EXPIRATION_DAYS,
};
use crate::core::auth::session::SessionPolicy;
use crate::core::db::pool::DbConfig;

/// Default listen address
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Signature dates are computed in Japan Standard Time unless overridden
const DEFAULT_SIGNATURE_UTC_OFFSET: &str = "+09:00";

/// Scheme assumed for the canonical URL when the request carries none
const DEFAULT_SIGNATURE_SCHEME: &str = "http";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("access token lifetime must be shorter than refresh token lifetime")]
    LifetimeOrder,

    #[error("access and refresh tokens must be signed with different secrets")]
    SharedTokenSecret,
}

/// Backing store for principals and shelves
#[derive(Debug, Clone)]
pub enum Storage {
    Postgres(DbConfig),
    /// Process-local maps, lost on restart
    Memory,
}

/// Request signature settings
#[derive(Clone)]
pub struct SignatureConfig {
    /// Shared secret every client signs requests with
    pub api_key: String,
    /// Offset whose calendar date scopes each signature
    pub utc_offset: FixedOffset,
    /// Scheme used when neither the URI nor `X-Forwarded-Proto` carries one
    pub default_scheme: String,
}

impl std::fmt::Debug for SignatureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureConfig")
            .field("api_key", &"<redacted>")
            .field("utc_offset", &self.utc_offset)
            .field("default_scheme", &self.default_scheme)
            .finish()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Where principals and shelves are kept
    pub storage: Storage,
    /// Request signature settings
    pub signature: SignatureConfig,
    /// Token secrets, algorithm and lifetimes
    pub jwt: JwtConfig,
    /// Refresh session policy switches
    pub session: SessionPolicy,
    /// bcrypt cost for passwords and refresh digests
    pub bcrypt_cost: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let storage = match lookup("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("postgres") => Storage::Postgres(
                DbConfig::new(required("DATABASE_URL")?)
                    .pool_size(1, parse_or(&lookup, "DB_MAX_CONNECTIONS", "10")?),
            ),
            Some("memory") => Storage::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let signature = SignatureConfig {
            api_key: required("API_KEY")?,
            utc_offset: parse_or(&lookup, "SIGNATURE_UTC_OFFSET", DEFAULT_SIGNATURE_UTC_OFFSET)?,
            default_scheme: lookup("SIGNATURE_DEFAULT_SCHEME")
                .unwrap_or_else(|| DEFAULT_SIGNATURE_SCHEME.to_string()),
        };

        let algorithm: Algorithm = parse_or(&lookup, "JWT_ALGORITHM", "HS256")?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::Invalid {
                key: "JWT_ALGORITHM",
                value: format!("{algorithm:?}"),
            });
        }

        let jwt = JwtConfig::new(
            required("JWT_SECRET_ACCESS_KEY")?,
            required("JWT_SECRET_REFRESH_KEY")?,
        )
        .algorithm(algorithm)
        .access_token_expiration(parse_or(
            &lookup,
            "JWT_ACCESS_TOKEN_EXPIRE_MINUTES",
            &ACCESS_TOKEN_EXPIRATION_MINUTES.to_string(),
        )?)
        .refresh_token_expiration(parse_or(
            &lookup,
            "JWT_REFRESH_TOKEN_EXPIRE_DAYS",
            &REFRESH_TOKEN_EXPIRATION_DAYS.to_string(),
        )?);

        let session = SessionPolicy {
            require_existing: parse_or(&lookup, "SESSION_REQUIRE_EXISTING", "false")?,
            atomic_rotation: parse_or(&lookup, "SESSION_ATOMIC_ROTATION", "false")?,
        };

        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            storage,
            signature,
            jwt,
            session,
            bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that span several settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return Err(ConfigError::SharedTokenSecret);
        }

        if self.jwt.access_lifetime() >= self.jwt.refresh_lifetime() {
            return Err(ConfigError::LifetimeOrder);
        }

        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: self.bcrypt_cost.to_string(),
            });
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}
