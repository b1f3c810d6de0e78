//! Google Calendar gateway.
//!
//! Implements the provider, refresher, and authorizer traits over the
//! Google OAuth and Calendar v3 REST endpoints.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::CalendarError;
use super::provider::{CalendarAuthorizer, CalendarProvider, TokenRefresher};
use super::token::{RefreshResponse, token_expiry};
use crate::models::calendar::{CalendarSummary, ExternalEvent, OAuthTokens};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Events beyond this many in one window are not fetched.
pub const MAX_EVENTS_PER_FETCH: u32 = 250;

const UNTITLED_EVENT: &str = "(No title)";

/// OAuth client settings and endpoint locations.
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl GoogleOAuthConfig {
    /// Config pointing at Google's production endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    #[serde(rename = "summaryOverride")]
    summary_override: Option<String>,
    description: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    html_link: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventTime {
    /// Instant for this time; date-only values map to UTC midnight.
    fn instant(&self) -> Option<DateTime<Utc>> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .ok()
                .map(|t| t.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }

    fn is_date_only(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }
}

impl GoogleEvent {
    fn into_external(self) -> Option<ExternalEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        let id = self.id.filter(|id| !id.is_empty())?;
        let start_time = self.start?;
        let start = start_time.instant()?;
        let end = self.end.and_then(|e| e.instant()).unwrap_or(start);

        Some(ExternalEvent {
            id,
            title: self
                .summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
            start,
            end,
            description: self.description,
            location: self.location,
            html_link: self.html_link.unwrap_or_default(),
            is_all_day: start_time.is_date_only(),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for Google OAuth and Calendar.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleCalendarClient {
    /// Build a client whose requests time out after `timeout`.
    pub fn new(config: GoogleOAuthConfig, timeout: Duration) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CalendarError::Provider(format!("HTTP client init failed: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GoogleOAuthConfig {
        &self.config
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| CalendarError::Provider(format!("Invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::Provider("API base URL cannot take a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CalendarError> {
        let resp = request
            .send()
            .await
            .map_err(|e| CalendarError::Provider(format!("Request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Provider(format!("HTTP {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| CalendarError::Provider(format!("Response parse error: {e}")))
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
    ) -> Result<GoogleTokenResponse, String> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| format!("Token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Token endpoint HTTP {status}: {body}"));
        }

        resp.json::<GoogleTokenResponse>()
            .await
            .map_err(|e| format!("Token response parse error: {e}"))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarSummary>, CalendarError> {
        let url = self.api_url(&["users", "me", "calendarList"])?;
        let body: CalendarListResponse = self
            .get_json(self.http.get(url).bearer_auth(access_token))
            .await?;

        Ok(body
            .items
            .into_iter()
            .map(|c| CalendarSummary {
                name: c
                    .summary_override
                    .or(c.summary)
                    .unwrap_or_else(|| c.id.clone()),
                id: c.id,
                description: c.description,
                is_primary: c.primary,
            })
            .collect())
    }

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        days_forward: i32,
    ) -> Result<Vec<ExternalEvent>, CalendarError> {
        let url = self.api_url(&["calendars", calendar_id, "events"])?;
        let now = Utc::now();
        let until = now + TimeDelta::days(i64::from(days_forward));

        let query = [
            ("timeMin", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("timeMax", until.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", MAX_EVENTS_PER_FETCH.to_string()),
        ];

        let body: EventsResponse = self
            .get_json(self.http.get(url).bearer_auth(access_token).query(&query))
            .await?;

        if body.next_page_token.is_some() {
            warn!(
                calendar_id,
                limit = MAX_EVENTS_PER_FETCH,
                "calendar has more events in the sync window than one page; the rest are not synced"
            );
        }

        let fetched = body.items.len();
        let events: Vec<ExternalEvent> = body
            .items
            .into_iter()
            .filter_map(GoogleEvent::into_external)
            .collect();
        debug!(calendar_id, fetched, kept = events.len(), "fetched calendar events");
        Ok(events)
    }
}

#[async_trait]
impl TokenRefresher for GoogleCalendarClient {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshResponse, CalendarError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let token = self
            .post_token_form(&params)
            .await
            .map_err(CalendarError::TokenRefreshFailed)?;

        Ok(RefreshResponse {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}

#[async_trait]
impl CalendarAuthorizer for GoogleCalendarClient {
    fn authorization_url(&self, state: &str) -> Result<String, CalendarError> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| CalendarError::OAuth(format!("Invalid auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", CALENDAR_READONLY_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, CalendarError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let token = self
            .post_token_form(&params)
            .await
            .map_err(CalendarError::OAuth)?;

        let (Some(access_token), Some(refresh_token)) = (token.access_token, token.refresh_token)
        else {
            return Err(CalendarError::OAuth(
                "Failed to obtain tokens from Google".into(),
            ));
        };

        let expires_at = token_expiry(Utc::now(), token.expires_in).ok_or_else(|| {
            CalendarError::OAuth(format!(
                "Google returned unusable expires_in: {:?}",
                token.expires_in
            ))
        })?;

        Ok(OAuthTokens {
            access_token,
            refresh_token,
            expires_at,
            scope: token.scope,
        })
    }
}
