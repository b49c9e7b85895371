//! Database models for novelshelf
//!
//! Entity structs mapping to the PostgreSQL tables created by the migrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Principal Model
// ============================================================================

/// A registered reader account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// bcrypt digest of the single live refresh token, if any
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Shelf Models
// ============================================================================

/// A novel on the third-party site, keyed by its ncode
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub ncode: String,
}

/// A followed novel together with the reader's progress on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FollowedBook {
    pub ncode: String,
    /// `None` when the reader follows the novel but never opened an episode
    pub read_episode: Option<i32>,
}
