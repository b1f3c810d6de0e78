//! Calendar provider seams.
//!
//! The sync service only talks to the calendar provider through these
//! traits; `GoogleCalendarClient` is the production implementation.

use async_trait::async_trait;

use super::CalendarError;
use super::token::RefreshResponse;
use crate::models::calendar::{CalendarSummary, ExternalEvent, OAuthTokens};

/// Read access to calendars and events for a valid access token.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_calendars(&self, access_token: &str)
    -> Result<Vec<CalendarSummary>, CalendarError>;

    /// Event occurrences from now to now + `days_forward`, recurring events
    /// expanded, ordered by start time.
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        days_forward: i32,
    ) -> Result<Vec<ExternalEvent>, CalendarError>;
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshResponse, CalendarError>;
}

/// The authorization-code half of the OAuth flow.
#[async_trait]
pub trait CalendarAuthorizer: Send + Sync {
    /// Consent URL carrying `state` back to the callback.
    fn authorization_url(&self, state: &str) -> Result<String, CalendarError>;

    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, CalendarError>;
}
