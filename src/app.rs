//! Router assembly
//!
//! Wires configuration and repositories into the auth and shelf routers, puts the
//! signature middleware in front of both, and mounts `/health` outside it.

use axum::{
    Json, Router,
    http::{HeaderName, Method, header},
    middleware,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::core::auth::{
    AuthApiState, AuthGateway, CredentialHasher, JwtService, SessionStore, SignatureVerifier,
    TokenIssuer, auth_api_router, require_signature, signature::SIGNATURE_HEADER,
};
use crate::core::config::Config;
use crate::core::db::repositories::{PrincipalRepository, ShelfRepository};
use crate::core::shelf::{ShelfApiState, shelf_api_router};

/// Build the complete application router
pub fn build_router<P, S>(config: &Config, principals: P, shelf: S) -> Router
where
    P: PrincipalRepository,
    S: ShelfRepository,
{
    let hasher = CredentialHasher::new(config.bcrypt_cost);
    let jwt_service = JwtService::new(config.jwt.clone());
    let sessions = SessionStore::new(principals.clone(), hasher, config.session);
    let issuer = TokenIssuer::new(jwt_service.clone(), sessions);
    let gateway = AuthGateway::new(principals, issuer, hasher);
    let verifier = SignatureVerifier::from_config(&config.signature);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(SIGNATURE_HEADER),
        ])
        .allow_origin(Any);

    Router::new()
        .merge(auth_api_router(AuthApiState { gateway }))
        .merge(shelf_api_router(ShelfApiState { shelf, jwt_service }))
        .layer(middleware::from_fn_with_state(verifier, require_signature))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::memory::{MemoryPrincipalRepository, MemoryShelfRepository};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::collections::HashMap;
    use tower::ServiceExt;

    const HOST: &str = "localhost:3000";

    struct TestApp {
        router: Router,
        verifier: SignatureVerifier,
    }

    fn create_test_app() -> TestApp {
        let vars = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/unused"),
            ("API_KEY", "s3cr3t"),
            ("JWT_SECRET_ACCESS_KEY", "access-secret"),
            ("JWT_SECRET_REFRESH_KEY", "refresh-secret"),
            ("BCRYPT_COST", "4"),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        TestApp {
            router: build_router(
                &config,
                MemoryPrincipalRepository::new(),
                MemoryShelfRepository::new(),
            ),
            verifier: SignatureVerifier::from_config(&config.signature),
        }
    }

    impl TestApp {
        fn signature(&self, method: &str, path: &str) -> String {
            self.verifier
                .sign(method, &format!("http://{HOST}{path}"), self.verifier.today())
        }

        async fn send(
            &self,
            method: &str,
            path: &str,
            bearer: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(path)
                .header("host", HOST)
                .header("signature", self.signature(method, path));
            if let Some(token) = bearer {
                builder = builder.header("authorization", format!("Bearer {token}"));
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_health_needs_no_signature() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsigned_request_rejected() {
        let app = create_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/token")
            .header("host", HOST)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"grant_type": "password"}"#))
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid_signature");
    }

    #[tokio::test]
    async fn test_signature_for_other_path_rejected() {
        let app = create_test_app();
        let request = Request::builder()
            .uri("/api/follow")
            .header("host", HOST)
            .header("signature", app.signature("GET", "/api/readhistory"))
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_end_to_end_reader_session() {
        let app = create_test_app();
        let credentials = json!({"email": "reader@example.com", "password": "Password1"});

        let (status, body) = app.send("POST", "/api/user", None, Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_success"], true);

        let (status, tokens) = app
            .send(
                "POST",
                "/api/token",
                None,
                Some(json!({
                    "id": "reader@example.com",
                    "password": "Password1",
                    "grant_type": "password",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let access_token = tokens["access_token"].as_str().unwrap().to_string();
        let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

        let (status, body) = app
            .send(
                "POST",
                "/api/follow",
                Some(&access_token),
                Some(json!({"ncode": "n9669bk"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_success"], true);

        let (_, list) = app.send("GET", "/api/follow", Some(&access_token), None).await;
        assert_eq!(list, json!([{"ncode": "n9669bk", "read_episode": 1}]));

        // Rotate, then replay the consumed refresh token
        let refresh = json!({"refresh_token": refresh_token, "grant_type": "refresh_token"});
        let (status, _) = app.send("POST", "/api/token", None, Some(refresh.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.send("POST", "/api/token", None, Some(refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_protected_route_requires_bearer_after_signature() {
        let app = create_test_app();

        let (status, body) = app.send("GET", "/api/follow", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }
}
