//! Authorization-code flow against the Google identity provider.

use serde::Deserialize;
use std::time::Duration;

use crate::errors::AppError;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const SCOPE: &str = "openid email profile";

/// Identity claims fetched after the code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GoogleOAuth {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("default TLS backend is available"),
            client_id,
            client_secret,
        }
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{AUTH_ENDPOINT}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
        )
    }

    /// Exchange the authorization code, then resolve the userinfo claims.
    pub async fn authenticate(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<UserInfo, AppError> {
        let token = self.exchange_code(code, redirect_uri).await?;
        self.fetch_userinfo(&token.access_token).await
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::internal(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::internal(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("unreadable token response: {e}")))
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, AppError> {
        let response = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::internal(format!("userinfo fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::internal(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("unreadable userinfo response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_required_params() {
        let oauth = GoogleOAuth::new("client-1".into(), "secret".into());
        let url = oauth.authorize_url("http://localhost:8000/api/auth/callback", "nonce");
        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("state=nonce"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains(&urlencoding::encode("http://localhost:8000/api/auth/callback").into_owned()));
    }
}
