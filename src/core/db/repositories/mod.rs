//! Database repositories for novelshelf
//!
//! Handlers and services talk to storage only through the two traits below.
//! `PgPrincipalRepository` / `PgShelfRepository` back them with PostgreSQL; the
//! in-memory versions in `core::db::memory` back them with dashmap.

use std::future::Future;

use uuid::Uuid;

use crate::core::db::models::{FollowedBook, Principal};

pub mod principal;
pub mod shelf;

pub use principal::PgPrincipalRepository;
pub use shelf::PgShelfRepository;

/// Repository error types
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Storage for principals and their single refresh-token digest
pub trait PrincipalRepository: Clone + Send + Sync + 'static {
    /// Insert a principal with no refresh digest.
    ///
    /// Fails with `EmailAlreadyExists` when the email is taken.
    fn create(
        &self,
        email: &str,
        password_hash: &str,
    ) -> impl Future<Output = Result<Principal, RepositoryError>> + Send;

    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Principal>, RepositoryError>> + Send;

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<Principal>, RepositoryError>> + Send;

    /// Returns `false` when no principal has this id
    fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Unconditionally overwrite (or clear) the refresh digest.
    ///
    /// Returns `false` when no principal has this id.
    fn update_refresh_hash(
        &self,
        id: Uuid,
        refresh_token_hash: Option<&str>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Overwrite the refresh digest only if it still equals `expected`.
    ///
    /// `None` on either side means "no digest". Returns `false` when the stored
    /// digest changed or the principal does not exist.
    fn compare_and_set_refresh_hash(
        &self,
        id: Uuid,
        expected: Option<&str>,
        refresh_token_hash: Option<&str>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Storage for followed novels and reading progress
pub trait ShelfRepository: Clone + Send + Sync + 'static {
    /// Return the id of the book with this ncode, creating it on first reference
    fn ensure_book(&self, ncode: &str)
    -> impl Future<Output = Result<Uuid, RepositoryError>> + Send;

    fn find_book(
        &self,
        ncode: &str,
    ) -> impl Future<Output = Result<Option<Uuid>, RepositoryError>> + Send;

    /// Returns `true` when the follow was newly created
    fn follow(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Returns `true` when a follow was removed
    fn unfollow(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Followed novels in follow order, with the latest read episode if any
    fn list_follows(
        &self,
        principal_id: Uuid,
    ) -> impl Future<Output = Result<Vec<FollowedBook>, RepositoryError>> + Send;

    fn upsert_read_episode(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
        episode: i32,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn read_episode(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
    ) -> impl Future<Output = Result<Option<i32>, RepositoryError>> + Send;
}
