use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openalex: OpenAlexConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub parser: ParserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    /// Per-request deadline.
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAlexConfig {
    pub base_url: String,
    /// Identity advertised to the upstream for polite-pool quota.
    pub mailto: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub requests_per_second: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub session_secret: String,
    pub session_ttl_days: i64,
    /// Public base URL of this service, used for the OAuth redirect URI.
    pub base_url: String,
    /// Where the SPA lives; login round-trips land here.
    pub frontend_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Optional snapshot file for the per-user store; in-memory only when unset.
    pub users_path: Option<String>,
    /// Optional snapshot file for the paper cache.
    pub papers_path: Option<String>,
    pub paper_fresh_ttl_hours: u64,
    pub request_cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    /// OpenAI-compatible chat-completions endpoint.
    pub api_url: String,
    /// Rule-based parsing only when unset.
    pub api_key: Option<String>,
    pub model: String,
}

impl AppConfig {
    pub fn build() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.rust_log", "info,scholarfeed=debug")?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.max_concurrent_requests", 100)?
            .set_default("openalex.base_url", "https://api.openalex.org")?
            .set_default("openalex.timeout_secs", 15)?
            .set_default("openalex.max_retries", 3)?
            .set_default("openalex.requests_per_second", 10)?
            .set_default("auth.session_secret", "dev-session-secret")?
            .set_default("auth.session_ttl_days", 30)?
            .set_default("auth.base_url", "http://localhost:8000")?
            .set_default("auth.frontend_url", "http://localhost:5173")?
            .set_default("store.paper_fresh_ttl_hours", 24)?
            .set_default("store.request_cache_ttl_secs", 300)?
            .set_default("parser.api_url", "https://api.openai.com/v1/chat/completions")?
            .set_default("parser.model", "gpt-4o-mini")?
            // Add in settings from files (optional)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables (with a prefix of APP)
            // E.g. `APP_AUTH__SESSION_SECRET=...` sets `auth.session_secret`
            .add_source(Environment::default().separator("__").prefix("APP"));

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_bare_env();
        Ok(config)
    }

    /// Unprefixed variable names common in deployment environments take
    /// effect when the prefixed form left a field unset.
    fn apply_bare_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if self.openalex.mailto.is_none() {
            self.openalex.mailto = var("OPENALEX_EMAIL");
        }
        if self.auth.google_client_id.is_none() {
            self.auth.google_client_id = var("GOOGLE_CLIENT_ID");
        }
        if self.auth.google_client_secret.is_none() {
            self.auth.google_client_secret = var("GOOGLE_CLIENT_SECRET");
        }
        if self.auth.session_secret == "dev-session-secret" {
            if let Some(secret) = var("SESSION_SECRET") {
                self.auth.session_secret = secret;
            }
        }
        if self.parser.api_key.is_none() {
            self.parser.api_key = var("OPENAI_API_KEY");
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.openalex.timeout_secs)
    }

    pub fn paper_fresh_ttl(&self) -> Duration {
        Duration::from_secs(self.store.paper_fresh_ttl_hours * 3600)
    }

    pub fn request_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.store.request_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = AppConfig::build().expect("defaults should satisfy the schema");
        assert_eq!(config.openalex.max_retries, 3);
        assert_eq!(config.store.paper_fresh_ttl_hours, 24);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
