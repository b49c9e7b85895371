//! Date-scoped HMAC request signatures
//!
//! Every client signs `METHOD\nscheme://host/path\nYYYY-MM-DD` with the shared API key:
//! the canonical string is hashed with SHA-256 and the raw digest is then HMAC'd.
//! The date is the calendar day at a fixed UTC offset, so a signature is good
//! from local midnight to local midnight and not a second longer. Query strings
//! and bodies are not covered.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{FixedOffset, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::core::config::SignatureConfig;
use crate::core::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "signature";

/// Header set by TLS-terminating proxies
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Recomputes and checks request signatures
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    offset: FixedOffset,
    default_scheme: String,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("offset", &self.offset)
            .field("default_scheme", &self.default_scheme)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>, offset: FixedOffset) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            offset,
            default_scheme: "http".to_string(),
        }
    }

    pub fn from_config(config: &SignatureConfig) -> Self {
        Self::new(&config.api_key, config.utc_offset).default_scheme(&config.default_scheme)
    }

    /// Scheme to assume when the request does not reveal one
    pub fn default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    /// Current calendar date at the reference offset
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// The exact string a signature covers
    pub fn canonical_request(method: &str, url: &str, date: NaiveDate) -> String {
        format!("{}\n{}\n{}", method, url, date.format("%Y-%m-%d"))
    }

    /// Hex signature for `method` and `url` on `date`
    pub fn sign(&self, method: &str, url: &str, date: NaiveDate) -> String {
        let digest = Sha256::digest(Self::canonical_request(method, url, date).as_bytes());

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(&digest);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check a supplied signature in constant time
    pub fn verify(
        &self,
        method: &str,
        scheme: &str,
        host: &str,
        path: &str,
        supplied_signature: &str,
        today: NaiveDate,
    ) -> bool {
        let url = format!("{scheme}://{host}{path}");
        let expected = self.sign(method, &url, today);

        supplied_signature
            .as_bytes()
            .ct_eq(expected.as_bytes())
            .into()
    }

    fn scheme_for<'a>(&'a self, uri: &'a Uri, headers: &'a HeaderMap) -> &'a str {
        headers
            .get(FORWARDED_PROTO_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| uri.scheme_str())
            .unwrap_or(&self.default_scheme)
    }

    fn host_for<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
        uri.authority()
            .map(|authority| authority.as_str())
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
            })
    }

    /// Check the signature of an inbound request against today's date
    pub fn verify_request(&self, request: &Request) -> bool {
        let headers = request.headers();
        let uri = request.uri();

        let Some(supplied) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return false;
        };

        let Some(host) = Self::host_for(uri, headers) else {
            return false;
        };

        self.verify(
            request.method().as_str(),
            self.scheme_for(uri, headers),
            host,
            uri.path(),
            supplied,
            self.today(),
        )
    }
}

/// Middleware rejecting requests without a valid `Signature` header
pub async fn require_signature(
    State(verifier): State<SignatureVerifier>,
    request: Request,
    next: Next,
) -> Response {
    if !verifier.verify_request(&request) {
        tracing::debug!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request with missing or invalid signature"
        );
        return ApiError::invalid_signature().into_response();
    }

    next.run(request).await
}
