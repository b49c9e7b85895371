//! Database module for novelshelf
//!
//! Connection pool, entity models, the repository traits with their PostgreSQL
//! implementations, and dashmap-backed in-memory implementations.

pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use memory::{MemoryPrincipalRepository, MemoryShelfRepository};
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations};
pub use repositories::{
    PgPrincipalRepository, PgShelfRepository, PrincipalRepository, RepositoryError,
    ShelfRepository,
};

pub use sqlx::PgPool;
