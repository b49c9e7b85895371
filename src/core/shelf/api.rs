//! Shelf API endpoints
//!
//! Provides REST API endpoints for a reader's shelf (all require a bearer token):
//! - GET /api/follow - List followed novels with reading progress
//! - POST /api/follow - Follow a novel by ncode
//! - DELETE /api/follow - Unfollow a novel by ncode
//! - PUT /api/readhistory - Record the latest read episode
//! - GET /api/readhistory?ncode= - Latest read episode (0 when none)

use axum::{
    Json, Router,
    extract::{
        FromRef, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auth::extract::BearerPrincipal;
use crate::core::auth::jwt::JwtService;
use crate::core::db::repositories::{RepositoryError, ShelfRepository};
use crate::core::error::ApiError;

/// Episode reported for a followed novel that was never opened
const UNREAD_FOLLOW_EPISODE: i32 = 1;

/// Episode reported by the read-history lookup when nothing was recorded
const UNREAD_HISTORY_EPISODE: i32 = 0;

/// Shelf API state containing the shelf repository and JWT service
pub struct ShelfApiState<S> {
    pub shelf: S,
    pub jwt_service: JwtService,
}

impl<S> FromRef<Arc<ShelfApiState<S>>> for JwtService {
    fn from_ref(state: &Arc<ShelfApiState<S>>) -> Self {
        state.jwt_service.clone()
    }
}

/// Shelf API error types
#[derive(Debug, thiserror::Error)]
pub enum ShelfError {
    #[error("ncode is required")]
    MissingNcode,

    #[error("episode must not be negative")]
    NegativeEpisode,

    #[error("Database error: {0}")]
    DatabaseError(#[from] RepositoryError),
}

impl From<ShelfError> for ApiError {
    fn from(err: ShelfError) -> Self {
        match err {
            ShelfError::MissingNcode | ShelfError::NegativeEpisode => {
                ApiError::invalid_parameter(err.to_string())
            }
            ShelfError::DatabaseError(e) => {
                tracing::error!("Shelf database error: {}", e);
                ApiError::server_error()
            }
        }
    }
}

fn require_ncode(ncode: &str) -> Result<&str, ShelfError> {
    let ncode = ncode.trim();
    if ncode.is_empty() {
        return Err(ShelfError::MissingNcode);
    }
    Ok(ncode)
}

/// Body of follow / unfollow requests
#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub ncode: String,
}

/// Follow / unfollow outcome
#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub is_success: bool,
}

/// One entry of the follow list
#[derive(Debug, Serialize, Deserialize)]
pub struct FollowEntry {
    pub ncode: String,
    pub read_episode: i32,
}

/// Body of a read-history update
#[derive(Debug, Deserialize)]
pub struct ReadHistoryRequest {
    pub ncode: String,
    pub episode: i32,
}

/// Read-history lookup parameters
#[derive(Debug, Deserialize)]
pub struct ReadHistoryQuery {
    pub ncode: String,
}

/// Reading progress on one novel
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadHistoryResponse {
    pub ncode: String,
    pub read_episode: i32,
}

/// Create the shelf API router
pub fn shelf_api_router<S: ShelfRepository>(state: ShelfApiState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route(
            "/api/follow",
            get(list_follows_handler::<S>)
                .post(follow_handler::<S>)
                .delete(unfollow_handler::<S>),
        )
        .route(
            "/api/readhistory",
            get(read_history_handler::<S>).put(update_read_history_handler::<S>),
        )
        .with_state(state)
}

/// GET /api/follow
async fn list_follows_handler<S: ShelfRepository>(
    State(state): State<Arc<ShelfApiState<S>>>,
    BearerPrincipal(principal_id): BearerPrincipal,
) -> Result<Json<Vec<FollowEntry>>, ApiError> {
    let follows = state
        .shelf
        .list_follows(principal_id)
        .await
        .map_err(ShelfError::from)?;

    Ok(Json(
        follows
            .into_iter()
            .map(|book| FollowEntry {
                ncode: book.ncode,
                read_episode: book.read_episode.unwrap_or(UNREAD_FOLLOW_EPISODE),
            })
            .collect(),
    ))
}

/// POST /api/follow
async fn follow_handler<S: ShelfRepository>(
    State(state): State<Arc<ShelfApiState<S>>>,
    BearerPrincipal(principal_id): BearerPrincipal,
    payload: Result<Json<FollowRequest>, JsonRejection>,
) -> Result<Json<FollowResponse>, ApiError> {
    let Json(request) = payload?;
    let ncode = require_ncode(&request.ncode)?;

    let book_id = state
        .shelf
        .ensure_book(ncode)
        .await
        .map_err(ShelfError::from)?;
    let is_success = state
        .shelf
        .follow(principal_id, book_id)
        .await
        .map_err(ShelfError::from)?;

    tracing::info!(%principal_id, ncode, is_success, "Follow requested");

    Ok(Json(FollowResponse { is_success }))
}

/// DELETE /api/follow
async fn unfollow_handler<S: ShelfRepository>(
    State(state): State<Arc<ShelfApiState<S>>>,
    BearerPrincipal(principal_id): BearerPrincipal,
    payload: Result<Json<FollowRequest>, JsonRejection>,
) -> Result<Json<FollowResponse>, ApiError> {
    let Json(request) = payload?;
    let ncode = require_ncode(&request.ncode)?;

    let is_success = match state
        .shelf
        .find_book(ncode)
        .await
        .map_err(ShelfError::from)?
    {
        Some(book_id) => state
            .shelf
            .unfollow(principal_id, book_id)
            .await
            .map_err(ShelfError::from)?,
        None => false,
    };

    tracing::info!(%principal_id, ncode, is_success, "Unfollow requested");

    Ok(Json(FollowResponse { is_success }))
}

/// PUT /api/readhistory
async fn update_read_history_handler<S: ShelfRepository>(
    State(state): State<Arc<ShelfApiState<S>>>,
    BearerPrincipal(principal_id): BearerPrincipal,
    payload: Result<Json<ReadHistoryRequest>, JsonRejection>,
) -> Result<Json<ReadHistoryResponse>, ApiError> {
    let Json(request) = payload?;
    let ncode = require_ncode(&request.ncode)?;
    if request.episode < 0 {
        return Err(ShelfError::NegativeEpisode.into());
    }

    let book_id = state
        .shelf
        .ensure_book(ncode)
        .await
        .map_err(ShelfError::from)?;
    state
        .shelf
        .upsert_read_episode(principal_id, book_id, request.episode)
        .await
        .map_err(ShelfError::from)?;

    Ok(Json(ReadHistoryResponse {
        ncode: ncode.to_string(),
        read_episode: request.episode,
    }))
}

/// GET /api/readhistory?ncode=
async fn read_history_handler<S: ShelfRepository>(
    State(state): State<Arc<ShelfApiState<S>>>,
    BearerPrincipal(principal_id): BearerPrincipal,
    query: Result<Query<ReadHistoryQuery>, QueryRejection>,
) -> Result<Json<ReadHistoryResponse>, ApiError> {
    let Query(query) = query?;
    let ncode = require_ncode(&query.ncode)?;

    let read_episode = match state
        .shelf
        .find_book(ncode)
        .await
        .map_err(ShelfError::from)?
    {
        Some(book_id) => state
            .shelf
            .read_episode(principal_id, book_id)
            .await
            .map_err(ShelfError::from)?,
        None => None,
    };

    Ok(Json(ReadHistoryResponse {
        ncode: ncode.to_string(),
        read_episode: read_episode.unwrap_or(UNREAD_HISTORY_EPISODE),
    }))
}
