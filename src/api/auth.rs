use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse, validation};
use crate::services::{Principal, Registration};

/// Sessions persist nothing but the principal id under this key; the full
/// record is re-resolved from the store on every request.
const SESSION_USER_KEY: &str = "user_id";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Requires a session resolving to a live user. A session pointing at a
/// since-deleted account counts as unauthenticated, not as an error.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    current_principal(&state, &session).await?;
    Ok(next.run(request).await)
}

/// Requires an authenticated admin. Non-admins get 403; no session gets 401.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = current_principal(&state, &session).await?;
    if !principal.role.is_admin() {
        return Err(ApiError::forbidden());
    }
    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/login
/// Authenticate with username and password, establishes the session cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<Principal>>, ApiError> {
    validation::validate_login(&payload.username, &payload.password)?;

    let principal = state.auth().login(&payload.username, &payload.password).await?;

    establish_session(&session, &principal).await?;

    Ok(Json(ApiResponse::success(principal)))
}

/// POST /api/register
/// Create a member account and log it in immediately.
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Principal>>), ApiError> {
    validation::validate_registration(
        &payload.name,
        &payload.username,
        &payload.email,
        &payload.password,
        &payload.confirm_password,
    )?;

    let principal = state
        .auth()
        .register(Registration {
            username: payload.username,
            email: payload.email,
            name: payload.name,
            password: payload.password,
        })
        .await?;

    establish_session(&session, &principal).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(principal))))
}

/// POST /api/logout
/// Destroy the current session.
pub async fn logout(session: Session) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to destroy session: {e}")))?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Logged out successfully",
    ))))
}

/// GET /api/user
/// Current principal from the session, or 401.
pub async fn current_user(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<Principal>>, ApiError> {
    let principal = current_principal(&state, &session).await?;
    Ok(Json(ApiResponse::success(principal)))
}

/// POST /api/change-password
/// Requires authentication; a wrong current password is a 400, not a 401,
/// since the caller is already authenticated.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let principal = current_principal(&state, &session).await?;

    validation::validate_change_password(
        &payload.current_password,
        &payload.new_password,
        &payload.confirm_new_password,
    )?;

    state
        .auth()
        .change_password(principal.id, &payload.current_password, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated successfully",
    ))))
}

/// POST /api/forgot-password
/// Issues a one-hour reset token and mails the reset link. An unknown email
/// is a 404; that mirrors the contract the frontend expects.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    let reset = state.auth().start_password_reset(&payload.email).await?;

    let (public_url, subject) = {
        let config = state.config.read().await;
        (
            config.server.public_url.clone(),
            config.mail.reset_subject.clone(),
        )
    };

    let reset_link = format!("{}/reset-password?token={}", public_url, reset.token);
    let body = format!(
        "<p>Hello {},</p>\
         <p>A password reset was requested for your account. \
         The link below is valid for a limited time and can be used once.</p>\
         <p><a href=\"{reset_link}\">Reset your password</a></p>\
         <p>If you did not request this, you can ignore this message.</p>",
        reset.user.name
    );

    if let Err(e) = state.mailer().send(&reset.user.email, &subject, &body).await {
        // The token is already stored; a delivery failure should not leave
        // the caller with a success message.
        return Err(ApiError::internal(format!("Failed to send reset mail: {e}")));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password recovery instructions have been sent to your email",
    ))))
}

/// POST /api/reset-password
/// Redeems a reset token. Unknown, expired and already-used tokens are all
/// the same 400.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validation::validate_reset_password(
        &payload.token,
        &payload.new_password,
        &payload.confirm_new_password,
    )?;

    state
        .auth()
        .complete_password_reset(&payload.token, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password reset successfully",
    ))))
}

// ============================================================================
// Helpers
// ============================================================================

async fn establish_session(session: &Session, principal: &Principal) -> Result<(), ApiError> {
    session
        .insert(SESSION_USER_KEY, principal.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))
}

/// Deserialize the session back into a principal. Both "no session" and
/// "user no longer exists" resolve to 401.
pub(super) async fn current_principal(
    state: &AppState,
    session: &Session,
) -> Result<Principal, ApiError> {
    let user_id: Option<i32> = session
        .get(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let Some(user_id) = user_id else {
        return Err(ApiError::unauthorized());
    };

    state
        .auth()
        .principal_by_id(user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)
}
