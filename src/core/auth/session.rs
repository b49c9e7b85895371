//! Refresh session storage
//!
//! Each principal has at most one live refresh token, kept only as a salted
//! digest. Tokens are first reduced to their SHA-256 hex form and then bcrypt'd:
//! bcrypt reads at most 72 bytes, and two JWTs signed with the same header would
//! otherwise share that prefix.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::auth::hashing::{CredentialHasher, HashingError};
use crate::core::db::repositories::{PrincipalRepository, RepositoryError};

/// Policy switches for refresh sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPolicy {
    /// Reject refresh tokens for principals that have no stored digest
    pub require_existing: bool,
    /// Rotate with compare-and-set instead of read-verify-write
    pub atomic_rotation: bool,
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Principal not found")]
    UnknownPrincipal,

    #[error(transparent)]
    Hashing(#[from] HashingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of checking a presented refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCheck {
    pub valid: bool,
    /// The digest the check was made against, for a later compare-and-set
    pub observed_digest: Option<String>,
}

/// Refresh-digest store over a principal repository
#[derive(Clone)]
pub struct SessionStore<R> {
    repo: R,
    hasher: CredentialHasher,
    policy: SessionPolicy,
}

impl<R: PrincipalRepository> SessionStore<R> {
    pub fn new(repo: R, hasher: CredentialHasher, policy: SessionPolicy) -> Self {
        Self {
            repo,
            hasher,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn digest(&self, refresh_token: &str) -> Result<String, SessionError> {
        Ok(self.hasher.hash(&Self::hash_token(refresh_token))?)
    }

    /// The digest currently stored for a principal
    pub async fn stored_digest(&self, principal_id: Uuid) -> Result<Option<String>, SessionError> {
        let principal = self
            .repo
            .find_by_id(principal_id)
            .await?
            .ok_or(SessionError::UnknownPrincipal)?;

        Ok(principal.refresh_token_hash)
    }

    /// Replace whatever digest is stored with the digest of `refresh_token`
    pub async fn set_refresh_hash(
        &self,
        principal_id: Uuid,
        refresh_token: &str,
    ) -> Result<(), SessionError> {
        let digest = self.digest(refresh_token)?;

        if !self
            .repo
            .update_refresh_hash(principal_id, Some(&digest))
            .await?
        {
            return Err(SessionError::UnknownPrincipal);
        }

        Ok(())
    }

    /// Check a presented refresh token against the stored digest.
    ///
    /// With no stored digest the token passes unless `require_existing` is set.
    pub async fn check(
        &self,
        principal_id: Uuid,
        refresh_token: &str,
    ) -> Result<SessionCheck, SessionError> {
        let observed_digest = self.stored_digest(principal_id).await?;

        let valid = match observed_digest.as_deref() {
            None => !self.policy.require_existing,
            Some(digest) => self.hasher.verify(&Self::hash_token(refresh_token), digest)?,
        };

        Ok(SessionCheck {
            valid,
            observed_digest,
        })
    }

    pub async fn verify(&self, principal_id: Uuid, refresh_token: &str) -> Result<bool, SessionError> {
        Ok(self.check(principal_id, refresh_token).await?.valid)
    }

    /// Store the digest of `refresh_token` only if the stored digest is still `expected`.
    ///
    /// Returns `false` when another rotation got there first.
    pub async fn replace_refresh_hash(
        &self,
        principal_id: Uuid,
        expected: Option<&str>,
        refresh_token: &str,
    ) -> Result<bool, SessionError> {
        let digest = self.digest(refresh_token)?;

        Ok(self
            .repo
            .compare_and_set_refresh_hash(principal_id, expected, Some(&digest))
            .await?)
    }

    /// Invalidate every refresh token issued so far.
    ///
    /// The digest is overwritten rather than dropped: an absent digest is
    /// permissive under the default policy and would accept stale tokens again.
    pub async fn revoke(&self, principal_id: Uuid) -> Result<(), SessionError> {
        let unissued = format!("revoked:{}", Uuid::new_v4());
        self.set_refresh_hash(principal_id, &unissued).await
    }
}
