//! PostgreSQL shelf repository: books, follows and read history

use sqlx::PgPool;
use uuid::Uuid;

use super::{RepositoryError, ShelfRepository};
use crate::core::db::models::FollowedBook;

/// Shelf repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgShelfRepository {
    pool: PgPool,
}

impl PgShelfRepository {
    /// Create a new shelf repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ShelfRepository for PgShelfRepository {
    async fn ensure_book(&self, ncode: &str) -> Result<Uuid, RepositoryError> {
        // The no-op update makes RETURNING yield the id on conflict too
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO books (ncode)
            VALUES ($1)
            ON CONFLICT (ncode) DO UPDATE SET ncode = EXCLUDED.ncode
            RETURNING id
            "#,
        )
        .bind(ncode)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_book(&self, ncode: &str) -> Result<Option<Uuid>, RepositoryError> {
        let id = sqlx::query_scalar("SELECT id FROM books WHERE ncode = $1")
            .bind(ncode)
            .fetch_optional(&self.pool)
            .await?;

        Ok(id)
    }

    async fn follow(&self, principal_id: Uuid, book_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (principal_id, book_id)
            VALUES ($1, $2)
            ON CONFLICT (principal_id, book_id) DO NOTHING
            "#,
        )
        .bind(principal_id)
        .bind(book_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, principal_id: Uuid, book_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM follows WHERE principal_id = $1 AND book_id = $2")
            .bind(principal_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_follows(&self, principal_id: Uuid) -> Result<Vec<FollowedBook>, RepositoryError> {
        let follows = sqlx::query_as::<_, FollowedBook>(
            r#"
            SELECT b.ncode, r.read_episode
            FROM follows f
            JOIN books b ON b.id = f.book_id
            LEFT JOIN read_history r
                ON r.principal_id = f.principal_id AND r.book_id = f.book_id
            WHERE f.principal_id = $1
            ORDER BY f.created_at ASC
            "#,
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    async fn upsert_read_episode(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
        episode: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO read_history (principal_id, book_id, read_episode)
            VALUES ($1, $2, $3)
            ON CONFLICT (principal_id, book_id)
            DO UPDATE SET read_episode = EXCLUDED.read_episode, updated_at = NOW()
            "#,
        )
        .bind(principal_id)
        .bind(book_id)
        .bind(episode)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_episode(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<i32>, RepositoryError> {
        let episode = sqlx::query_scalar(
            "SELECT read_episode FROM read_history WHERE principal_id = $1 AND book_id = $2",
        )
        .bind(principal_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    async fn setup_test_principal() -> (PgShelfRepository, Uuid) {
        let config = DbConfig::new(
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests"),
        );
        let pool = create_pool_with_migrations(&config)
            .await
            .expect("Failed to create test pool");

        let principal_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, 'test_hash')
            "#,
        )
        .bind(principal_id)
        .bind(format!("shelf_test_{}@example.com", principal_id))
        .execute(&pool)
        .await
        .expect("Failed to create test principal");

        (PgShelfRepository::new(pool), principal_id)
    }

    async fn cleanup_test_principal(repo: &PgShelfRepository, principal_id: Uuid) {
        // Follows and read history go with it via CASCADE
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(principal_id)
            .execute(&repo.pool)
            .await
            .expect("Failed to cleanup test principal");
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_ensure_book_is_idempotent() {
        let (repo, principal_id) = setup_test_principal().await;
        let ncode = format!("n{}", &Uuid::new_v4().simple().to_string()[..8]);

        let first = repo.ensure_book(&ncode).await.unwrap();
        let second = repo.ensure_book(&ncode).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.find_book(&ncode).await.unwrap(), Some(first));

        cleanup_test_principal(&repo, principal_id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_follow_unfollow_and_progress() {
        let (repo, principal_id) = setup_test_principal().await;
        let ncode = format!("n{}", &Uuid::new_v4().simple().to_string()[..8]);
        let book_id = repo.ensure_book(&ncode).await.unwrap();

        assert!(repo.follow(principal_id, book_id).await.unwrap());
        assert!(!repo.follow(principal_id, book_id).await.unwrap());

        let follows = repo.list_follows(principal_id).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].read_episode, None);

        repo.upsert_read_episode(principal_id, book_id, 3).await.unwrap();
        repo.upsert_read_episode(principal_id, book_id, 7).await.unwrap();
        assert_eq!(repo.read_episode(principal_id, book_id).await.unwrap(), Some(7));

        assert!(repo.unfollow(principal_id, book_id).await.unwrap());
        assert!(!repo.unfollow(principal_id, book_id).await.unwrap());

        cleanup_test_principal(&repo, principal_id).await;
    }
}
