//! Auth API endpoints
//!
//! - POST /api/token - Exchange a password or refresh-token grant for a token pair
//! - POST /api/user - Register a new reader
//! - PUT /api/user/password - Change password (bearer), revoking the refresh session
//!
//! The signature middleware is applied by `app::build_router`, not here.

use axum::{
    Json, Router,
    extract::{FromRef, State, rejection::JsonRejection},
    routing::{post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auth::extract::BearerPrincipal;
use crate::core::auth::jwt::JwtService;
use crate::core::auth::service::{AuthError, AuthGateway, Grant, TokenRequest};
use crate::core::db::repositories::PrincipalRepository;
use crate::core::error::ApiError;

/// Auth API state containing the gateway
pub struct AuthApiState<R> {
    pub gateway: AuthGateway<R>,
}

impl<R: PrincipalRepository> FromRef<Arc<AuthApiState<R>>> for JwtService {
    fn from_ref(state: &Arc<AuthApiState<R>>) -> Self {
        state.gateway.issuer().jwt().clone()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingParameter(_)
            | AuthError::UnsupportedGrantType
            | AuthError::InvalidCredentials
            | AuthError::IncorrectPassword => ApiError::invalid_parameter(err.to_string()),
            AuthError::InvalidToken => ApiError::invalid_token("The token is invalid"),
            AuthError::TokenExpired => ApiError::invalid_token("The token has expired"),
            AuthError::EmailAlreadyExists => {
                ApiError::validation_error("This email address is already registered")
            }
            AuthError::InternalError(detail) => {
                tracing::error!("Auth internal error: {}", detail);
                ApiError::server_error()
            }
        }
    }
}

/// Successful token grant
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request for changing password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub is_success: bool,
}

/// Create the auth API router
pub fn auth_api_router<R: PrincipalRepository>(state: AuthApiState<R>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/token", post(token_handler::<R>))
        .route("/api/user", post(register_handler::<R>))
        .route("/api/user/password", put(change_password_handler::<R>))
        .with_state(state)
}

/// POST /api/token
async fn token_handler<R: PrincipalRepository>(
    State(state): State<Arc<AuthApiState<R>>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let grant = Grant::try_from(request)?;

    match &grant {
        Grant::Password { .. } => tracing::info!("Token request with password grant"),
        Grant::RefreshToken { .. } => tracing::info!("Token request with refresh_token grant"),
    }

    let pair = state.gateway.grant(grant).await.inspect_err(|err| {
        tracing::debug!("Token grant rejected: {}", err);
    })?;

    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// POST /api/user
async fn register_handler<R: PrincipalRepository>(
    State(state): State<Arc<AuthApiState<R>>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload?;

    let principal = state
        .gateway
        .register(&request.email, &request.password)
        .await?;

    tracing::info!(principal_id = %principal.id, "Principal registered");

    Ok(Json(SuccessResponse { is_success: true }))
}

/// PUT /api/user/password
async fn change_password_handler<R: PrincipalRepository>(
    State(state): State<Arc<AuthApiState<R>>>,
    BearerPrincipal(principal_id): BearerPrincipal,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload?;

    state
        .gateway
        .change_password(principal_id, &request.current_password, &request.new_password)
        .await?;

    tracing::info!(%principal_id, "Password changed, refresh session revoked");

    Ok(Json(SuccessResponse { is_success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::hashing::CredentialHasher;
    use crate::core::auth::jwt::{JwtConfig, TokenIssuer};
    use crate::core::auth::session::{SessionPolicy, SessionStore};
    use crate::core::db::memory::MemoryPrincipalRepository;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn create_test_router() -> Router {
        let repo = MemoryPrincipalRepository::new();
        let hasher = CredentialHasher::new(4);
        let sessions = SessionStore::new(repo.clone(), hasher, SessionPolicy::default());
        let jwt = JwtService::new(JwtConfig::new("access-secret", "refresh-secret"));
        let gateway = AuthGateway::new(repo, TokenIssuer::new(jwt, sessions), hasher);

        auth_api_router(AuthApiState { gateway })
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(
        router: &Router,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn register_and_login(router: &Router) -> TokenResponse {
        let (status, _) = send(
            router,
            json_request(
                "POST",
                "/api/user",
                serde_json::json!({"email": "reader@example.com", "password": "Password1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            router,
            json_request(
                "POST",
                "/api/token",
                serde_json::json!({
                    "id": "reader@example.com",
                    "password": "Password1",
                    "grant_type": "password",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    // ========================================================================
    // Error Mapping Tests
    // ========================================================================

    #[test]
    fn test_auth_error_mapping() {
        let cases = [
            (AuthError::UnsupportedGrantType, "invalid_parameter"),
            (AuthError::MissingParameter("x"), "invalid_parameter"),
            (AuthError::InvalidCredentials, "invalid_parameter"),
            (AuthError::IncorrectPassword, "invalid_parameter"),
            (AuthError::InvalidToken, "invalid_token"),
            (AuthError::TokenExpired, "invalid_token"),
            (AuthError::EmailAlreadyExists, "validation_error"),
            (AuthError::InternalError("db down".to_string()), "server_error"),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).error, expected);
        }
    }

    #[test]
    fn test_internal_error_detail_not_exposed() {
        let api_error = ApiError::from(AuthError::InternalError("connection refused".to_string()));
        assert!(!api_error.error_description.contains("connection refused"));
    }

    // ========================================================================
    // Endpoint Tests
    // ========================================================================

    #[tokio::test]
    async fn test_password_then_refresh_flow() {
        let router = create_test_router();
        let tokens = register_and_login(&router).await;

        let (status, body) = send(
            &router,
            json_request(
                "POST",
                "/api/token",
                serde_json::json!({
                    "refresh_token": tokens.refresh_token,
                    "grant_type": "refresh_token",
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());
        assert_ne!(body["refresh_token"], tokens.refresh_token.as_str());
    }

    #[tokio::test]
    async fn test_unknown_grant_type() {
        let router = create_test_router();

        let (status, body) = send(
            &router,
            json_request("POST", "/api/token", serde_json::json!({"grant_type": "magic"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_parameter() {
        let router = create_test_router();
        let request = Request::builder()
            .method("POST")
            .uri("/api/token")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let router = create_test_router();
        register_and_login(&router).await;

        let (status, body) = send(
            &router,
            json_request(
                "POST",
                "/api/token",
                serde_json::json!({
                    "id": "reader@example.com",
                    "password": "wrong",
                    "grant_type": "password",
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_invalid_refresh_token() {
        let router = create_test_router();

        let (status, body) = send(
            &router,
            json_request(
                "POST",
                "/api/token",
                serde_json::json!({"refresh_token": "garbage", "grant_type": "refresh_token"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let router = create_test_router();
        register_and_login(&router).await;

        let (status, body) = send(
            &router,
            json_request(
                "POST",
                "/api/user",
                serde_json::json!({"email": "reader@example.com", "password": "Other1"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_change_password_requires_bearer() {
        let router = create_test_router();

        let (status, body) = send(
            &router,
            json_request(
                "PUT",
                "/api/user/password",
                serde_json::json!({"current_password": "a", "new_password": "b"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_change_password_success() {
        let router = create_test_router();
        let tokens = register_and_login(&router).await;

        let mut request = json_request(
            "PUT",
            "/api/user/password",
            serde_json::json!({"current_password": "Password1", "new_password": "Password2"}),
        );
        request.headers_mut().insert(
            "authorization",
            format!("Bearer {}", tokens.access_token).parse().unwrap(),
        );

        let (status, body) = send(&router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_success"], true);
    }
}
