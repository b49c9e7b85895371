//! Authentication module for novelshelf
//!
//! This module provides:
//! - Date-scoped HMAC request signatures and the middleware enforcing them
//! - Access/refresh JWT pairs signed with independent secrets
//! - Refresh sessions stored as a single salted digest per principal
//! - Password and refresh-token grants, registration and password change
//! - REST API endpoints and the bearer extractor

pub mod api;
pub mod extract;
pub mod hashing;
pub mod jwt;
pub mod service;
pub mod session;
pub mod signature;

pub use api::{AuthApiState, auth_api_router};
pub use extract::BearerPrincipal;
pub use hashing::{CredentialHasher, HashingError};
pub use jwt::{
    Claims, IssueError, JwtConfig, JwtError, JwtService, TokenIssuer, TokenKind, TokenPair,
};
pub use service::{AuthError, AuthGateway, Grant, TokenRequest};
pub use session::{SessionCheck, SessionError, SessionPolicy, SessionStore};
pub use signature::{SignatureVerifier, require_signature};
