//! PostgreSQL principal repository
//!
//! Owns the `users` table, including the `refresh_token_hash` column that holds
//! the single live refresh-token digest of each principal.

use sqlx::PgPool;
use uuid::Uuid;

use super::{PrincipalRepository, RepositoryError};
use crate::core::db::models::Principal;

const PRINCIPAL_COLUMNS: &str =
    "id, email, password_hash, refresh_token_hash, created_at, updated_at";

/// Principal repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgPrincipalRepository {
    pool: PgPool,
}

impl PgPrincipalRepository {
    /// Create a new principal repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PrincipalRepository for PgPrincipalRepository {
    async fn create(&self, email: &str, password_hash: &str) -> Result<Principal, RepositoryError> {
        // ON CONFLICT keeps concurrent registrations of one email from racing
        let principal = sqlx::query_as::<_, Principal>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        principal.ok_or(RepositoryError::EmailAlreadyExists)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, RepositoryError> {
        let principal = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(principal)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, RepositoryError> {
        let principal = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(principal)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_refresh_hash(
        &self,
        id: Uuid,
        refresh_token_hash: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(refresh_token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_refresh_hash(
        &self,
        id: Uuid,
        expected: Option<&str>,
        refresh_token_hash: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $3, updated_at = NOW()
            WHERE id = $1 AND refresh_token_hash IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(refresh_token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    async fn create_test_repo() -> PgPrincipalRepository {
        let config = DbConfig::new(
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests"),
        );
        let pool = create_pool_with_migrations(&config)
            .await
            .expect("Failed to create test pool");
        PgPrincipalRepository::new(pool)
    }

    fn unique_email() -> String {
        format!("principal_test_{}@example.com", Uuid::new_v4())
    }

    async fn cleanup(repo: &PgPrincipalRepository, id: Uuid) {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&repo.pool)
            .await
            .expect("Failed to cleanup test principal");
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_and_find() {
        let repo = create_test_repo().await;
        let email = unique_email();

        let principal = repo.create(&email, "digest").await.unwrap();
        assert_eq!(principal.email, email);
        assert!(principal.refresh_token_hash.is_none());

        let by_id = repo.find_by_id(principal.id).await.unwrap().unwrap();
        let by_email = repo.find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(by_id.id, principal.id);
        assert_eq!(by_email.id, principal.id);

        cleanup(&repo, principal.id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_duplicate_email() {
        let repo = create_test_repo().await;
        let email = unique_email();

        let principal = repo.create(&email, "digest").await.unwrap();
        let result = repo.create(&email, "other").await;
        assert!(matches!(result, Err(RepositoryError::EmailAlreadyExists)));

        cleanup(&repo, principal.id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_update_refresh_hash_unknown_principal() {
        let repo = create_test_repo().await;

        let updated = repo
            .update_refresh_hash(Uuid::new_v4(), Some("digest"))
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_compare_and_set_refresh_hash() {
        let repo = create_test_repo().await;
        let principal = repo.create(&unique_email(), "digest").await.unwrap();

        // Absent digest matches an expected None
        assert!(
            repo.compare_and_set_refresh_hash(principal.id, None, Some("first"))
                .await
                .unwrap()
        );
        // Stale expectation loses
        assert!(
            !repo
                .compare_and_set_refresh_hash(principal.id, None, Some("second"))
                .await
                .unwrap()
        );
        assert!(
            repo.compare_and_set_refresh_hash(principal.id, Some("first"), Some("second"))
                .await
                .unwrap()
        );

        let stored = repo.find_by_id(principal.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("second"));

        cleanup(&repo, principal.id).await;
    }
}
