//! Session authentication: signed cookie-bound tokens and the principal
//! extractor gating every non-auth endpoint.

pub mod oauth;

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::User;
use crate::services::AppState;

pub const SESSION_COOKIE: &str = "scholarfeed_session";
pub const STATE_COOKIE: &str = "scholarfeed_oauth_state";

/// Login-state cookies only need to survive the provider round-trip.
const STATE_TTL_SECS: i64 = 600;

/// Claims carried by the session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id (OAuth subject).
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by the short-lived OAuth state cookie.
#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    state: String,
    iat: i64,
    exp: i64,
}

/// Signs and validates the opaque session tokens bound to cookies.
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            picture: user.picture_url.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign session: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthenticated)
    }

    pub fn issue_state(&self, state: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = StateClaims {
            state: state.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + STATE_TTL_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign login state: {e}")))
    }

    pub fn verify_state(&self, token: &str) -> Result<String, AppError> {
        decode::<StateClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims.state)
            .map_err(|_| AppError::validation("login state is missing or expired"))
    }
}

/// Session cookie attributes: cookie-bound, script-inaccessible, same-site.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

pub fn state_cookie(token: &str) -> String {
    format!("{STATE_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={STATE_TTL_SECS}")
}

pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Pull one cookie's value out of the Cookie header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// The authenticated principal, resolved from the session cookie. Absence
/// or an invalid signature rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            cookie_value(&parts.headers, SESSION_COOKIE).ok_or(AppError::Unauthenticated)?;
        let claims = state.sessions.verify(&token)?;
        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
            display_name: claims.name,
            picture_url: claims.picture,
        })
    }
}

/// Random state nonce for the authorization round-trip.
pub fn random_state() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            user_id: "sub-123".into(),
            email: "user@example.com".into(),
            display_name: Some("User".into()),
            picture_url: None,
            created_at: now,
            last_login_at: now,
        }
    }

    #[test]
    fn session_round_trip() {
        let manager = SessionManager::new("test-secret", 30);
        let token = manager.issue(&test_user()).unwrap();
        let claims = manager.verify(&token).unwrap();
        assert_eq!(claims.sub, "sub-123");
        assert_eq!(claims.email, "user@example.com");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let manager = SessionManager::new("test-secret", 30);
        let other = SessionManager::new("other-secret", 30);
        let token = other.issue(&test_user()).unwrap();
        assert!(matches!(
            manager.verify(&token),
            Err(AppError::Unauthenticated)
        ));
    }

    #[test]
    fn state_round_trip() {
        let manager = SessionManager::new("test-secret", 30);
        let token = manager.issue_state("nonce-1").unwrap();
        assert_eq!(manager.verify_state(&token).unwrap(), "nonce-1");
    }

    #[test]
    fn cookie_parsing_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("a=1; scholarfeed_session=tok; b=2"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("tok")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }
}
