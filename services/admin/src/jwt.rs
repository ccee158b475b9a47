//! Bearer token issuing, parsing and refresh
//!
//! Tokens are HS256 JWTs signed with the process-wide `jwt.key`. Claims carry
//! the admin id and a JSON snapshot of the admin; the snapshot is a hint only
//! and is never trusted for status or role decisions.

use axum::http::{HeaderMap, Method, Uri};
use axum_extra::{
    extract::cookie::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TokenError;
use crate::i18n::query_param;
use crate::models::Admin;

/// JWT configuration (`jwt.*`)
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Realm advertised in `WWW-Authenticate`
    pub realm: String,
    /// HMAC secret
    pub key: String,
    /// Token lifetime in hours
    pub timeout: u64,
    /// Refresh window beyond expiry, in hours
    pub max_refresh: u64,
    /// Only accept the `Authorization` header on non-idempotent methods
    #[serde(default)]
    pub strict_token_lookup: bool,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            realm: "admin-gate".to_string(),
            key: "admin-gate-secret".to_string(),
            timeout: 24,
            max_refresh: 24,
            strict_token_lookup: false,
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Admin id
    pub identity: i64,
    /// JSON-encoded admin snapshot
    pub user: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Issue time of the first token in a refresh chain
    pub orig_iat: i64,
}

impl Claims {
    pub fn admin(&self) -> Result<Admin, TokenError> {
        Admin::from_snapshot(&self.user).map_err(|_| TokenError::Malformed)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly minted token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expire: DateTime<Utc>,
}

/// Mints and validates bearer tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    timeout: Duration,
    max_refresh: Duration,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an injectable clock below
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        TokenIssuer {
            encoding_key: EncodingKey::from_secret(config.key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.key.as_bytes()),
            validation,
            timeout: Duration::hours(config.timeout as i64),
            max_refresh: Duration::hours(config.max_refresh as i64),
        }
    }

    /// Override lifetimes with finer granularity than hours
    pub fn with_lifetimes(mut self, timeout: Duration, max_refresh: Duration) -> Self {
        self.timeout = timeout;
        self.max_refresh = max_refresh;
        self
    }

    pub fn issue(&self, admin: &Admin) -> Result<IssuedToken, TokenError> {
        self.issue_at(admin, Utc::now())
    }

    pub fn issue_at(&self, admin: &Admin, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let snapshot = admin
            .snapshot()
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        self.mint(admin.id, snapshot, now.timestamp(), now)
    }

    fn mint(
        &self,
        identity: i64,
        user: String,
        orig_iat: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expire = now + self.timeout;
        let claims = Claims {
            identity,
            user,
            iat: now.timestamp(),
            exp: expire.timestamp(),
            orig_iat,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(IssuedToken { token, expire })
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Failed to decode token: {}", e);
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::Signature,
                    _ => TokenError::Malformed,
                }
            })
    }

    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        self.parse_at(token, Utc::now())
    }

    /// Verify signature and expiry as of `now`
    pub fn parse_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn refresh(&self, token: &str) -> Result<IssuedToken, TokenError> {
        self.refresh_at(token, Utc::now())
    }

    /// Mint a successor while `now <= exp + max_refresh`
    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let claims = self.decode(token)?;
        if now.timestamp() > claims.exp + self.max_refresh.num_seconds() {
            return Err(TokenError::RefreshWindowClosed);
        }
        self.mint(claims.identity, claims.user, claims.orig_iat, now)
    }
}

/// Find the bearer token of a request
///
/// Searches the `Authorization: Bearer` header, then `?token=`, then the
/// `jwt` cookie; the first non-empty value wins. With `strict` set, methods
/// other than GET/HEAD/OPTIONS only look at the header.
pub fn find_token(headers: &HeaderMap, uri: &Uri, method: &Method, strict: bool) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    if strict && !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return None;
    }

    let from_query = query_param(uri, "token").filter(|value| !value.is_empty());
    if from_query.is_some() {
        return from_query;
    }

    CookieJar::from_headers(headers)
        .get("jwt")
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
