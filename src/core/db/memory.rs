//! In-memory repositories backed by dashmap
//!
//! Used by the test suites and by `STORAGE_BACKEND=memory` local runs.
//! Each method touches one shard entry at a time, so compare-and-set on the
//! refresh digest is atomic with respect to other callers.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::models::{FollowedBook, Principal};
use super::repositories::{PrincipalRepository, RepositoryError, ShelfRepository};

/// Principal storage keyed by id, with a unique email index
#[derive(Clone, Default)]
pub struct MemoryPrincipalRepository {
    principals: Arc<DashMap<Uuid, Principal>>,
    emails: Arc<DashMap<String, Uuid>>,
}

impl MemoryPrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrincipalRepository for MemoryPrincipalRepository {
    async fn create(&self, email: &str, password_hash: &str) -> Result<Principal, RepositoryError> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(_) => Err(RepositoryError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let principal = Principal {
                    id: Uuid::new_v4(),
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                    refresh_token_hash: None,
                    created_at: now,
                    updated_at: now,
                };
                self.principals.insert(principal.id, principal.clone());
                slot.insert(principal.id);
                Ok(principal)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, RepositoryError> {
        Ok(self.principals.get(&id).map(|p| p.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, RepositoryError> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.principals.get(&id).map(|p| p.value().clone()))
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(match self.principals.get_mut(&id) {
            Some(mut principal) => {
                principal.password_hash = password_hash.to_string();
                principal.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_refresh_hash(
        &self,
        id: Uuid,
        refresh_token_hash: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        Ok(match self.principals.get_mut(&id) {
            Some(mut principal) => {
                principal.refresh_token_hash = refresh_token_hash.map(str::to_string);
                principal.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn compare_and_set_refresh_hash(
        &self,
        id: Uuid,
        expected: Option<&str>,
        refresh_token_hash: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        // The shard write lock is held from comparison through assignment
        let Some(mut principal) = self.principals.get_mut(&id) else {
            return Ok(false);
        };

        if principal.refresh_token_hash.as_deref() != expected {
            return Ok(false);
        }

        principal.refresh_token_hash = refresh_token_hash.map(str::to_string);
        principal.updated_at = Utc::now();
        Ok(true)
    }
}

/// Shelf storage: books by ncode, follows in insertion order, read progress
#[derive(Clone, Default)]
pub struct MemoryShelfRepository {
    books: Arc<DashMap<String, Uuid>>,
    ncodes: Arc<DashMap<Uuid, String>>,
    follows: Arc<DashMap<Uuid, Vec<Uuid>>>,
    read_history: Arc<DashMap<(Uuid, Uuid), i32>>,
}

impl MemoryShelfRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShelfRepository for MemoryShelfRepository {
    async fn ensure_book(&self, ncode: &str) -> Result<Uuid, RepositoryError> {
        let id = *self
            .books
            .entry(ncode.to_string())
            .or_insert_with(|| {
                let id = Uuid::new_v4();
                self.ncodes.insert(id, ncode.to_string());
                id
            })
            .value();
        Ok(id)
    }

    async fn find_book(&self, ncode: &str) -> Result<Option<Uuid>, RepositoryError> {
        Ok(self.books.get(ncode).map(|id| *id))
    }

    async fn follow(&self, principal_id: Uuid, book_id: Uuid) -> Result<bool, RepositoryError> {
        let mut followed = self.follows.entry(principal_id).or_default();
        if followed.contains(&book_id) {
            return Ok(false);
        }
        followed.push(book_id);
        Ok(true)
    }

    async fn unfollow(&self, principal_id: Uuid, book_id: Uuid) -> Result<bool, RepositoryError> {
        let Some(mut followed) = self.follows.get_mut(&principal_id) else {
            return Ok(false);
        };
        let before = followed.len();
        followed.retain(|id| *id != book_id);
        Ok(followed.len() < before)
    }

    async fn list_follows(&self, principal_id: Uuid) -> Result<Vec<FollowedBook>, RepositoryError> {
        let Some(followed) = self.follows.get(&principal_id) else {
            return Ok(Vec::new());
        };

        Ok(followed
            .iter()
            .filter_map(|book_id| {
                let ncode = self.ncodes.get(book_id)?.value().clone();
                let read_episode = self
                    .read_history
                    .get(&(principal_id, *book_id))
                    .map(|episode| *episode);
                Some(FollowedBook {
                    ncode,
                    read_episode,
                })
            })
            .collect())
    }

    async fn upsert_read_episode(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
        episode: i32,
    ) -> Result<(), RepositoryError> {
        self.read_history.insert((principal_id, book_id), episode);
        Ok(())
    }

    async fn read_episode(
        &self,
        principal_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<i32>, RepositoryError> {
        Ok(self
            .read_history
            .get(&(principal_id, book_id))
            .map(|episode| *episode))
    }
}
