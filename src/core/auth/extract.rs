//! Bearer access-token extractor
//!
//! Any router whose state can produce a `JwtService` (via `FromRef`) can take
//! `BearerPrincipal` as a handler argument. Access tokens are checked statelessly:
//! signature and expiry only, no database round trip.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService};
use crate::core::error::ApiError;

/// The principal named by a valid `Authorization: Bearer <access token>` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerPrincipal(pub Uuid);

impl<S> FromRequestParts<S> for BearerPrincipal
where
    JwtService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::invalid_token("A bearer access token is required"))?;

        let jwt = JwtService::from_ref(state);
        let principal_id = jwt
            .validate_access_token(bearer.token())
            .and_then(|claims| claims.principal_id())
            .map_err(|err| {
                tracing::debug!("Rejected access token: {}", err);
                match err {
                    JwtError::Expired => ApiError::invalid_token("The access token has expired"),
                    _ => ApiError::invalid_token("The access token is invalid"),
                }
            })?;

        Ok(Self(principal_id))
    }
}
