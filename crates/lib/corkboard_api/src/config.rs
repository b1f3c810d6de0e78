//! API server configuration.

use std::time::Duration;

use chrono_tz::Tz;
use corkboard_core::calendar::SyncSettings;
use corkboard_core::calendar::google::GoogleOAuthConfig;
use corkboard_core::calendar::sync::DEFAULT_PROVIDER_TIMEOUT;
use tracing::warn;

use crate::services::auth::resolve_jwt_secret;

const DEV_TOKEN_ENCRYPTION_KEY: &str = "corkboard-dev-token-key-change-in-production";

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT verification secret (HS256).
    pub jwt_secret: String,
    /// Passphrase the board token codec derives its key from.
    pub token_encryption_key: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    /// Bound on each call to Google.
    pub provider_timeout: Duration,
    /// Zone used in synced event names.
    pub display_tz: Tz,
    /// Frontend origin the OAuth callback redirects back to.
    pub public_app_url: String,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                          | Default                                    |
    /// |-----------------------------------|--------------------------------------------|
    /// | `BIND_ADDR`                       | `127.0.0.1:3100`                           |
    /// | `DATABASE_URL`                    | `postgres://localhost:5432/corkboard`      |
    /// | `JWT_SECRET`                      | random per process (logged as a warning)   |
    /// | `TOKEN_ENCRYPTION_KEY`            | development key (logged as a warning)      |
    /// | `GOOGLE_CALENDAR_CLIENT_ID`       | empty                                      |
    /// | `GOOGLE_CALENDAR_CLIENT_SECRET`   | empty                                      |
    /// | `GOOGLE_CALENDAR_REDIRECT_URI`    | `http://localhost:3100/auth/google/callback` |
    /// | `CALENDAR_PROVIDER_TIMEOUT_SECS`  | `20`                                       |
    /// | `CALENDAR_DISPLAY_TZ`             | `UTC`                                      |
    /// | `PUBLIC_APP_URL`                  | `http://localhost:3000`                    |
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:3100"),
            pg_connection_url: env_or("DATABASE_URL", "postgres://localhost:5432/corkboard"),
            jwt_secret: resolve_jwt_secret(),
            token_encryption_key: secret_or_dev("TOKEN_ENCRYPTION_KEY", DEV_TOKEN_ENCRYPTION_KEY),
            google_client_id: env_or("GOOGLE_CALENDAR_CLIENT_ID", ""),
            google_client_secret: env_or("GOOGLE_CALENDAR_CLIENT_SECRET", ""),
            google_redirect_uri: env_or(
                "GOOGLE_CALENDAR_REDIRECT_URI",
                "http://localhost:3100/auth/google/callback",
            ),
            provider_timeout: std::env::var("CALENDAR_PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| parse_timeout(&v))
                .unwrap_or(DEFAULT_PROVIDER_TIMEOUT),
            display_tz: std::env::var("CALENDAR_DISPLAY_TZ")
                .ok()
                .map(|v| parse_tz(&v))
                .unwrap_or(Tz::UTC),
            public_app_url: env_or("PUBLIC_APP_URL", "http://localhost:3000"),
        }
    }

    /// Whether Google OAuth client credentials are present.
    pub fn google_configured(&self) -> bool {
        self.google_oauth_config().is_configured()
    }

    pub fn google_oauth_config(&self) -> GoogleOAuthConfig {
        GoogleOAuthConfig::new(
            self.google_client_id.clone(),
            self.google_client_secret.clone(),
            self.google_redirect_uri.clone(),
        )
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            provider_timeout: self.provider_timeout,
            display_tz: self.display_tz,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("google_client_id", &self.google_client_id)
            .field("google_redirect_uri", &self.google_redirect_uri)
            .field("provider_timeout", &self.provider_timeout)
            .field("display_tz", &self.display_tz)
            .field("public_app_url", &self.public_app_url)
            .finish_non_exhaustive()
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn secret_or_dev(name: &str, dev_default: &str) -> String {
    if let Ok(value) = std::env::var(name)
        && !value.is_empty()
    {
        return value;
    }
    warn!(variable = name, "not set, using development default");
    dev_default.to_string()
}

fn parse_timeout(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!(value, "invalid CALENDAR_PROVIDER_TIMEOUT_SECS, using default");
            None
        }
    }
}

fn parse_tz(value: &str) -> Tz {
    value.trim().parse::<Tz>().unwrap_or_else(|_| {
        warn!(value, "unknown CALENDAR_DISPLAY_TZ, using UTC");
        Tz::UTC
    })
}
