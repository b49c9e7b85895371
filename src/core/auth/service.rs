//! Authentication gateway
//!
//! Turns a decoded grant into a fresh token pair. The password grant checks the
//! stored bcrypt password digest; the refresh grant decodes the presented token
//! with the refresh secret and checks it against the stored refresh digest.
//! Either way the pair comes from `TokenIssuer`, which rotates the session.

use serde::Deserialize;
use uuid::Uuid;

use crate::core::auth::hashing::{CredentialHasher, HashingError};
use crate::core::auth::jwt::{IssueError, JwtError, TokenIssuer, TokenPair};
use crate::core::auth::session::SessionError;
use crate::core::db::models::Principal;
use crate::core::db::repositories::{PrincipalRepository, RepositoryError};

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    MissingParameter(&'static str),

    #[error("Unknown grant_type")]
    UnsupportedGrantType,

    #[error("Incorrect id or password")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::EmailAlreadyExists => AuthError::EmailAlreadyExists,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<HashingError> for AuthError {
    fn from(err: HashingError) -> Self {
        AuthError::InternalError(err.to_string())
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken => AuthError::InvalidToken,
            JwtError::EncodingError(_) => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            // The token named a principal that no longer exists
            SessionError::UnknownPrincipal => AuthError::InvalidToken,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<IssueError> for AuthError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Jwt(e) => e.into(),
            IssueError::Session(e) => e.into(),
            IssueError::RotationConflict => AuthError::InvalidToken,
        }
    }
}

/// Token endpoint request body as sent by clients
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub id: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub grant_type: Option<String>,
}

/// A validated grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Password { id: String, password: String },
    RefreshToken { refresh_token: String },
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<TokenRequest> for Grant {
    type Error = AuthError;

    fn try_from(request: TokenRequest) -> Result<Self, Self::Error> {
        match request.grant_type.as_deref() {
            Some("password") => match (present(request.id), present(request.password)) {
                (Some(id), Some(password)) => Ok(Grant::Password { id, password }),
                _ => Err(AuthError::MissingParameter("id and password are required")),
            },
            Some("refresh_token") => match present(request.refresh_token) {
                Some(refresh_token) => Ok(Grant::RefreshToken { refresh_token }),
                None => Err(AuthError::MissingParameter("refresh_token is required")),
            },
            _ => Err(AuthError::UnsupportedGrantType),
        }
    }
}

/// Authentication gateway
#[derive(Clone)]
pub struct AuthGateway<R> {
    principals: R,
    issuer: TokenIssuer<R>,
    hasher: CredentialHasher,
}

impl<R: PrincipalRepository> AuthGateway<R> {
    /// Create a new gateway
    pub fn new(principals: R, issuer: TokenIssuer<R>, hasher: CredentialHasher) -> Self {
        Self {
            principals,
            issuer,
            hasher,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer<R> {
        &self.issuer
    }

    /// Exchange a grant for a fresh token pair
    pub async fn grant(&self, grant: Grant) -> Result<TokenPair, AuthError> {
        match grant {
            Grant::Password { id, password } => self.password_grant(&id, &password).await,
            Grant::RefreshToken { refresh_token } => self.refresh_grant(&refresh_token).await,
        }
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let principal = self
            .principals
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.hasher.verify(password, &principal.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.issuer.mint(principal.id).await?)
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.decode_refresh(refresh_token)?;
        let principal_id = claims.principal_id()?;

        let sessions = self.issuer.sessions();
        let check = sessions.check(principal_id, refresh_token).await?;
        if !check.valid {
            tracing::warn!(%principal_id, "Refresh token does not match the stored session");
            return Err(AuthError::InvalidToken);
        }

        let pair = if sessions.policy().atomic_rotation {
            self.issuer
                .mint_replacing(principal_id, check.observed_digest.as_deref())
                .await?
        } else {
            self.issuer.mint(principal_id).await?
        };

        Ok(pair)
    }

    /// Register a new principal with no refresh session
    pub async fn register(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let password_hash = self.hasher.hash(password)?;
        let principal = self.principals.create(email, &password_hash).await?;

        Ok(principal)
    }

    /// Replace the password and revoke the live refresh token
    pub async fn change_password(
        &self,
        principal_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let principal = self
            .principals
            .find_by_id(principal_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !self
            .hasher
            .verify(current_password, &principal.password_hash)?
        {
            return Err(AuthError::IncorrectPassword);
        }

        let password_hash = self.hasher.hash(new_password)?;
        if !self
            .principals
            .update_password_hash(principal_id, &password_hash)
            .await?
        {
            return Err(AuthError::InvalidToken);
        }

        self.issuer.sessions().revoke(principal_id).await?;
        Ok(())
    }

    /// Resolve a bearer access token to its principal id
    pub fn authenticate_access(&self, access_token: &str) -> Result<Uuid, AuthError> {
        let claims = self.issuer.decode_access(access_token)?;
        Ok(claims.principal_id()?)
    }
}
