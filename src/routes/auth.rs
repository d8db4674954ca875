//! Login, OAuth callback, logout, and session introspection.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::{
    clear_cookie, cookie_value, random_state, session_cookie, state_cookie, SESSION_COOKIE,
    STATE_COOKIE,
};
use crate::errors::AppError;
use crate::services::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/status", get(status))
        .route("/me", get(me))
}

fn redirect_uri(state: &AppState) -> String {
    format!(
        "{}/api/auth/callback",
        state.config.auth.base_url.trim_end_matches('/')
    )
}

#[instrument(skip(state))]
async fn login(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let oauth = state
        .oauth
        .clone()
        .ok_or_else(|| AppError::internal("OAuth client is not configured"))?;

    let nonce = random_state();
    let state_token = state.sessions.issue_state(&nonce)?;
    let url = oauth.authorize_url(&redirect_uri(&state), &nonce);

    Ok((
        AppendHeaders([(header::SET_COOKIE, state_cookie(&state_token))]),
        Redirect::to(&url),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[instrument(skip(state, headers, params))]
async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, AppError> {
    let oauth = state
        .oauth
        .clone()
        .ok_or_else(|| AppError::internal("OAuth client is not configured"))?;

    if let Some(error) = params.error {
        warn!(%error, "Provider rejected the authorization request");
        return Err(AppError::validation(format!("authorization failed: {error}")));
    }
    let code = params
        .code
        .ok_or_else(|| AppError::validation("missing authorization code"))?;
    let returned_state = params
        .state
        .ok_or_else(|| AppError::validation("missing state parameter"))?;

    let state_token = cookie_value(&headers, STATE_COOKIE)
        .ok_or_else(|| AppError::validation("login state is missing or expired"))?;
    let expected_state = state.sessions.verify_state(&state_token)?;
    if expected_state != returned_state {
        return Err(AppError::validation("state parameter mismatch"));
    }

    let info = oauth.authenticate(&code, &redirect_uri(&state)).await?;
    let user = state
        .users
        .upsert_user(&info.sub, &info.email, info.name.clone(), info.picture.clone())
        .await?;
    info!(user_id = %user.user_id, email = %user.email, "User logged in");

    let token = state.sessions.issue(&user)?;
    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                session_cookie(&token, state.sessions.session_ttl_secs()),
            ),
            (header::SET_COOKIE, clear_cookie(STATE_COOKIE)),
        ]),
        Redirect::to(&state.config.auth.frontend_url),
    ))
}

#[instrument(skip(state, headers))]
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        if let Ok(claims) = state.sessions.verify(&token) {
            info!(email = %claims.email, "User logged out");
        }
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie(SESSION_COOKIE))]),
        Redirect::to(&state.config.auth.frontend_url),
    )
}

#[instrument(skip(state, headers))]
async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let claims = cookie_value(&headers, SESSION_COOKIE)
        .and_then(|token| state.sessions.verify(&token).ok());

    match claims {
        Some(claims) => Json(json!({
            "authenticated": true,
            "user": {
                "id": claims.sub,
                "email": claims.email,
                "name": claims.name,
                "picture": claims.picture,
            }
        })),
        None => Json(json!({"authenticated": false, "user": null})),
    }
}

#[instrument(skip(state, headers))]
async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let claims = cookie_value(&headers, SESSION_COOKIE)
        .and_then(|token| state.sessions.verify(&token).ok());

    let Some(claims) = claims else {
        return Ok(Json(json!(null)));
    };

    let doc = state.users.read(&claims.sub).await?;
    match doc.user {
        Some(user) => Ok(Json(serde_json::to_value(user)?)),
        None => Ok(Json(json!(null))),
    }
}
