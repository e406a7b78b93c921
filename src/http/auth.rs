//! `/api/auth/*` routes: sign-in URL, code exchange, refresh, sign-out

use super::AppState;
use super::response::AppError;
use crate::model::{
    AuthCallbackRequest, AuthRefreshRequest, AuthUrlRequest, AuthUrlResponse, SessionRecord,
    SignOutRequest, SignOutResponse,
};
use crate::provider::AuthorizationUrlRequest;
use crate::session::TokenRefresher;
use crate::RelayError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};

type HandlerResult<T> = std::result::Result<Json<T>, AppError>;

/// Unwrap a JSON body, turning a malformed one into a 400
pub(super) fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        AppError::new(
            "Invalid request body",
            RelayError::validation(rejection.body_text()),
        )
    })
}

pub async fn authorization_url(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AuthUrlRequest>, JsonRejection>,
) -> HandlerResult<AuthUrlResponse> {
    let request = body(payload)?;

    let redirect_uri = request
        .redirect_uri
        .filter(|uri| !uri.is_empty())
        .unwrap_or_else(|| state.default_redirect_uri.to_string());

    let authorization_url = state
        .provider
        .authorization_url(&AuthorizationUrlRequest {
            redirect_uri,
            state: request.state,
            organization_id: request.organization_id.filter(|org| !org.is_empty()),
        })
        .map_err(AppError::titled("Failed to generate authorization URL"))?;

    tracing::info!("Generated authorization URL");
    Ok(Json(AuthUrlResponse { authorization_url }))
}

pub async fn callback(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AuthCallbackRequest>, JsonRejection>,
) -> HandlerResult<SessionRecord> {
    let code = body(payload)?
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            AppError::new(
                "Missing authorization code",
                RelayError::validation("Authorization code is required"),
            )
        })?;

    let auth = state
        .provider
        .authenticate_with_code(&code)
        .await
        .map_err(AppError::titled("Authentication failed"))?;

    tracing::info!("Authentication successful for user: {}", auth.user.email);
    Ok(Json(auth.into_session_record()))
}

pub async fn refresh(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AuthRefreshRequest>, JsonRejection>,
) -> HandlerResult<SessionRecord> {
    let refresh_token = body(payload)?
        .refresh_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::new(
                "Missing refresh token",
                RelayError::validation("Refresh token is required"),
            )
        })?;

    // Keyed by the token itself: concurrent requests presenting the same
    // single-use token share one upstream exchange.
    let refresher = state.refresher.clone();
    let token = refresh_token.clone();
    let record = state
        .coordinator
        .refresh(&refresh_token, move || async move {
            refresher.refresh(&token).await
        })
        .await
        .map_err(AppError::titled("Token refresh failed"))?;

    Ok(Json(record))
}

pub async fn sign_out(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SignOutRequest>, JsonRejection>,
) -> HandlerResult<SignOutResponse> {
    let Some(session_id) = body(payload)?.session_id.filter(|sid| !sid.is_empty()) else {
        // Nothing to revoke; the client clears its own storage
        return Ok(Json(SignOutResponse {
            success: true,
            logout_url: None,
        }));
    };

    let logout_url = state
        .provider
        .logout_url(&session_id)
        .map_err(AppError::titled("Sign out failed"))?;

    tracing::info!("Logout URL generated for session {}", session_id);
    Ok(Json(SignOutResponse {
        success: true,
        logout_url: Some(logout_url),
    }))
}
