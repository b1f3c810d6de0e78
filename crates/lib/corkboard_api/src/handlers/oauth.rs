//! Google Calendar OAuth connect and callback handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{ConnectResponse, OAuthCallbackParams};
use crate::services::permissions::{BoardAccess, require_board_access};

/// `POST /api/boards/{board_id}/calendar/connect`: start the consent flow.
pub async fn connect_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(board_id): Path<Uuid>,
) -> AppResult<Json<ConnectResponse>> {
    let user_id = user.user_id;
    require_board_access(&state, board_id, user_id, BoardAccess::Manage).await?;

    if !state.config.google_configured() {
        return Err(AppError::Internal(
            "Google Calendar OAuth client is not configured".into(),
        ));
    }

    let oauth_state = state.oauth_states.begin(board_id, user_id);
    let auth_url = state.sync.authorization_url(board_id, &oauth_state).await?;
    info!(%board_id, %user_id, "calendar connection started");
    Ok(Json(ConnectResponse { auth_url }))
}

/// `GET /auth/google/callback`: finish the consent flow and send the browser back to the app.
pub async fn google_callback_handler(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> Redirect {
    let base = state.config.public_app_url.as_str();

    if let Some(error) = params.error {
        warn!(error = %error, "calendar authorization declined");
        return app_redirect(base, "/", Some(("calendar_error", &error)));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return app_redirect(base, "/", Some(("calendar_error", "missing_params")));
    };

    let Some(pending) = state.oauth_states.take(&oauth_state) else {
        warn!("calendar callback with unknown or expired state");
        return app_redirect(base, "/", Some(("calendar_error", "invalid_state")));
    };

    // Membership may have changed during the consent round-trip.
    if let Err(e) = require_board_access(
        &state,
        pending.board_id,
        pending.user_id,
        BoardAccess::Manage,
    )
    .await
    {
        warn!(board_id = %pending.board_id, error = %e, "calendar callback rejected");
        return app_redirect(base, "/", Some(("calendar_error", "permission_denied")));
    }

    match state
        .sync
        .complete_connection(pending.board_id, &code, pending.user_id)
        .await
    {
        Ok(()) => app_redirect(
            base,
            &format!("/boards/{}", pending.board_id),
            Some(("calendar_connected", "true")),
        ),
        Err(e) => {
            warn!(board_id = %pending.board_id, error = %e, "calendar connection failed");
            app_redirect(base, "/", Some(("calendar_error", "connection_failed")))
        }
    }
}

fn app_redirect(base: &str, path: &str, query: Option<(&str, &str)>) -> Redirect {
    let target = match Url::parse(base) {
        Ok(mut url) => {
            url.set_path(path);
            if let Some((key, value)) = query {
                url.query_pairs_mut().append_pair(key, value);
            }
            url.to_string()
        }
        Err(_) => {
            let mut target = path.to_string();
            if let Some((key, value)) = query {
                let encoded: String = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair(key, value)
                    .finish();
                target.push('?');
                target.push_str(&encoded);
            }
            target
        }
    };
    Redirect::to(&target)
}
