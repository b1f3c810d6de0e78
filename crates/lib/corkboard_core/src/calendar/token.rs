//! Access token lifecycle.
//!
//! Decides whether a board's access token is still usable and refreshes it
//! when not. Persisting a refreshed token is the caller's job.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::CalendarError;
use super::provider::TokenRefresher;
use crate::models::calendar::CalendarCredential;

/// Tokens are treated as expired this long before their stated expiry.
pub const EXPIRY_SAFETY_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Lifetime assumed when a refresh response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Token endpoint reply to a refresh request.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RefreshResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// An access token that is usable right now.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub was_refreshed: bool,
}

impl std::fmt::Debug for ValidToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidToken")
            .field("expires_at", &self.expires_at)
            .field("was_refreshed", &self.was_refreshed)
            .finish_non_exhaustive()
    }
}

/// Expiry of a token issued at `now` that lives `expires_in` seconds.
///
/// A missing lifetime means one hour. Negative lifetimes and lifetimes past
/// the representable range give `None`.
pub fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    let secs = expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    if secs < 0 {
        return None;
    }
    TimeDelta::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

pub fn is_token_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at - EXPIRY_SAFETY_MARGIN
}

/// Return a usable access token for `credential`, refreshing it if needed.
///
/// The refresh call is bounded by `timeout`. Any refresh failure, including
/// a reply without an access token, is `TokenRefreshFailed`.
pub async fn ensure_valid_token(
    credential: &CalendarCredential,
    refresher: &dyn TokenRefresher,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<ValidToken, CalendarError> {
    if !is_token_expired(credential.expires_at, now) {
        return Ok(ValidToken {
            access_token: credential.access_token.clone(),
            expires_at: credential.expires_at,
            was_refreshed: false,
        });
    }

    debug!(expires_at = %credential.expires_at, "access token expired, refreshing");

    let response = tokio::time::timeout(
        timeout,
        refresher.refresh_access_token(&credential.refresh_token),
    )
    .await
    .map_err(|_| CalendarError::TokenRefreshFailed("refresh request timed out".into()))?
    .map_err(|e| match e {
        CalendarError::TokenRefreshFailed(msg) => CalendarError::TokenRefreshFailed(msg),
        other => CalendarError::TokenRefreshFailed(other.to_string()),
    })?;

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            CalendarError::TokenRefreshFailed("refresh response had no access token".into())
        })?;

    let expires_at = token_expiry(now, response.expires_in).ok_or_else(|| {
        CalendarError::TokenRefreshFailed(format!(
            "refresh response had unusable expires_in: {:?}",
            response.expires_in
        ))
    })?;

    Ok(ValidToken {
        access_token,
        expires_at,
        was_refreshed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRefresher {
        reply: Result<RefreshResponse, String>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedRefresher {
        fn replying(access_token: Option<&str>, expires_in: Option<i64>) -> Self {
            Self {
                reply: Ok(RefreshResponse {
                    access_token: access_token.map(str::to_string),
                    expires_in,
                }),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn failing(msg: &str) -> Self {
            Self {
                reply: Err(msg.to_string()),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for ScriptedRefresher {
        async fn refresh_access_token(
            &self,
            _refresh_token: &str,
        ) -> Result<RefreshResponse, CalendarError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone().map_err(CalendarError::Provider)
        }
    }

    fn credential(expires_at: DateTime<Utc>) -> CalendarCredential {
        CalendarCredential {
            access_token: "old-access".into(),
            refresh_token: "refresh".into(),
            expires_at,
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn expiry_margin_boundaries() {
        let now = Utc::now();
        assert!(is_token_expired(now + TimeDelta::minutes(4), now));
        assert!(is_token_expired(now + TimeDelta::minutes(5), now));
        assert!(!is_token_expired(now + TimeDelta::minutes(6), now));
        assert!(is_token_expired(now - TimeDelta::minutes(1), now));
    }

    #[tokio::test]
    async fn token_expiring_in_four_minutes_is_refreshed() {
        let now = Utc::now();
        let refresher = ScriptedRefresher::replying(Some("new-access"), Some(3599));

        let token = ensure_valid_token(
            &credential(now + TimeDelta::minutes(4)),
            &refresher,
            now,
            TIMEOUT,
        )
        .await
        .unwrap();

        assert!(token.was_refreshed);
        assert_eq!(token.access_token, "new-access");
        assert_eq!(token.expires_at, now + TimeDelta::seconds(3599));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_expiring_in_six_minutes_is_kept() {
        let now = Utc::now();
        let refresher = ScriptedRefresher::replying(Some("new-access"), Some(3599));
        let expires_at = now + TimeDelta::minutes(6);

        let token = ensure_valid_token(&credential(expires_at), &refresher, now, TIMEOUT)
            .await
            .unwrap();

        assert!(!token.was_refreshed);
        assert_eq!(token.access_token, "old-access");
        assert_eq!(token.expires_at, expires_at);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_expires_in_defaults_to_one_hour() {
        let now = Utc::now();
        let refresher = ScriptedRefresher::replying(Some("new-access"), None);

        let token = ensure_valid_token(&credential(now), &refresher, now, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(token.expires_at, now + TimeDelta::hours(1));
    }

    #[tokio::test]
    async fn out_of_range_expires_in_fails_refresh() {
        let now = Utc::now();
        for expires_in in [i64::MAX, i64::MIN, -1] {
            let refresher = ScriptedRefresher::replying(Some("new-access"), Some(expires_in));

            let err = ensure_valid_token(&credential(now), &refresher, now, TIMEOUT)
                .await
                .unwrap_err();

            assert!(matches!(err, CalendarError::TokenRefreshFailed(_)), "{expires_in}");
        }
    }

    #[test]
    fn token_expiry_bounds() {
        let now = Utc::now();
        assert_eq!(token_expiry(now, None), Some(now + TimeDelta::hours(1)));
        assert_eq!(token_expiry(now, Some(0)), Some(now));
        assert_eq!(token_expiry(now, Some(120)), Some(now + TimeDelta::minutes(2)));
        assert_eq!(token_expiry(now, Some(i64::MAX)), None);
        assert_eq!(token_expiry(now, Some(-5)), None);
    }

    #[tokio::test]
    async fn reply_without_access_token_fails() {
        let now = Utc::now();
        let refresher = ScriptedRefresher::replying(None, Some(3600));

        let err = ensure_valid_token(&credential(now), &refresher, now, TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::TokenRefreshFailed(_)));
    }

    #[tokio::test]
    async fn refresher_error_becomes_refresh_failure() {
        let now = Utc::now();
        let refresher = ScriptedRefresher::failing("invalid_grant");

        let err = ensure_valid_token(&credential(now), &refresher, now, TIMEOUT)
            .await
            .unwrap_err();

        match err {
            CalendarError::TokenRefreshFailed(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_refresh_times_out() {
        let now = Utc::now();
        let mut refresher = ScriptedRefresher::replying(Some("late"), Some(3600));
        refresher.delay = Some(Duration::from_secs(60));

        let err = ensure_valid_token(&credential(now), &refresher, now, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::TokenRefreshFailed(_)));
    }
}
