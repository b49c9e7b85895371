//! JWT utilities for token generation, validation and issuing
//!
//! Access and refresh tokens are signed with two independent secrets, so a leaked
//! access secret cannot be used to forge refresh tokens and vice versa.
//! `TokenIssuer` ties token generation to the session store: a pair is only handed
//! out once the new refresh digest has been committed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::session::{SessionError, SessionStore};
use crate::core::db::repositories::PrincipalRepository;

/// Default access token expiration time (30 minutes)
pub const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 30;

/// Default refresh token expiration time (30 days)
pub const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 30;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing access tokens
    pub access_secret: String,
    /// Secret key for signing refresh tokens
    pub refresh_secret: String,
    /// HMAC algorithm used for both token kinds
    pub algorithm: Algorithm,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
}

impl JwtConfig {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            algorithm: Algorithm::HS256,
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
        }
    }

    /// Set signing algorithm
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Override the access lifetime, in minutes
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Override the refresh lifetime, in days
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    pub fn access_lifetime(&self) -> Duration {
        Duration::minutes(self.access_token_expiration_minutes)
    }

    pub fn refresh_lifetime(&self) -> Duration {
        Duration::days(self.refresh_token_expiration_days)
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field(
                "access_token_expiration_minutes",
                &self.access_token_expiration_minutes,
            )
            .field(
                "refresh_token_expiration_days",
                &self.refresh_token_expiration_days,
            )
            .finish()
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::InvalidToken,
        }
    }
}

/// Token kind, selecting secret and lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    /// JWT ID, unique per token so two pairs minted in the same second differ
    #[serde(default)]
    pub jti: String,
}

impl Claims {
    /// Get the subject as a principal ID
    pub fn principal_id(&self) -> Result<Uuid, JwtError> {
        self.sub
            .as_deref()
            .and_then(|sub| Uuid::parse_str(sub).ok())
            .ok_or(JwtError::InvalidToken)
    }
}

/// Freshly minted credentials; expiry fields are Unix seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and checks both token kinds
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    access_keys: KeyPair,
    refresh_keys: KeyPair,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let access_keys = KeyPair::from_secret(&config.access_secret);
        let refresh_keys = KeyPair::from_secret(&config.refresh_secret);

        Self {
            config,
            access_keys,
            refresh_keys,
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }

    fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.config.access_lifetime(),
            TokenKind::Refresh => self.config.refresh_lifetime(),
        }
    }

    /// Generate a token of the given kind, issued at `now`
    pub fn generate_token(
        &self,
        kind: TokenKind,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(String, i64), JwtError> {
        let exp = now + self.lifetime(kind);

        let claims = Claims {
            sub: Some(principal_id.to_string()),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(self.config.algorithm),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok((token, exp.timestamp()))
    }

    /// Mint an access/refresh pair sharing one `iat`
    pub fn generate_token_pair(&self, principal_id: Uuid) -> Result<TokenPair, JwtError> {
        let now = Utc::now();
        let (access_token, access_expires_at) =
            self.generate_token(TokenKind::Access, principal_id, now)?;
        let (refresh_token, refresh_expires_at) =
            self.generate_token(TokenKind::Refresh, principal_id, now)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate and decode a token of the given kind
    pub fn validate_token(&self, kind: TokenKind, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.config.algorithm);
        // Strict expiration, no grace period
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;

        Ok(token_data.claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_token(TokenKind::Access, token)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_token(TokenKind::Refresh, token)
    }
}

/// Errors while minting a token pair
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Refresh session was rotated concurrently")]
    RotationConflict,
}

/// Mints token pairs and commits the refresh digest before releasing them
#[derive(Clone)]
pub struct TokenIssuer<R> {
    jwt: JwtService,
    sessions: SessionStore<R>,
}

impl<R: PrincipalRepository> TokenIssuer<R> {
    pub fn new(jwt: JwtService, sessions: SessionStore<R>) -> Self {
        Self { jwt, sessions }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn sessions(&self) -> &SessionStore<R> {
        &self.sessions
    }

    pub fn decode_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.jwt.validate_access_token(token)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.jwt.validate_refresh_token(token)
    }

    /// Mint a fresh pair, unconditionally rotating the principal's refresh digest.
    ///
    /// Nothing is returned unless the digest was committed.
    pub async fn mint(&self, principal_id: Uuid) -> Result<TokenPair, IssueError> {
        let pair = self.jwt.generate_token_pair(principal_id)?;

        self.sessions
            .set_refresh_hash(principal_id, &pair.refresh_token)
            .await?;

        tracing::debug!(%principal_id, "Refresh session rotated");
        Ok(pair)
    }

    /// Mint a fresh pair only if the stored digest still equals `expected`.
    ///
    /// The comparison and the write happen in one statement, so of two requests
    /// that read the same digest only the first one wins.
    pub async fn mint_replacing(
        &self,
        principal_id: Uuid,
        expected: Option<&str>,
    ) -> Result<TokenPair, IssueError> {
        let pair = self.jwt.generate_token_pair(principal_id)?;

        let replaced = self
            .sessions
            .replace_refresh_hash(principal_id, expected, &pair.refresh_token)
            .await?;

        if !replaced {
            tracing::warn!(%principal_id, "Refresh rotation lost a concurrent race");
            return Err(IssueError::RotationConflict);
        }

        tracing::debug!(%principal_id, "Refresh session rotated (compare-and-set)");
        Ok(pair)
    }
}
