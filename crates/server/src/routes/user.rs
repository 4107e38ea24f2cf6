use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use shared::{UserCountRequest, UserCountResponse, UserInfoRequest, UserInfoResponse};

use super::cookie;
use crate::error::ApiError;
use crate::users::UserStore;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session_id";

/// Register or refresh a user and open a session
pub async fn info(
    State(state): State<AppState>,
    Json(request): Json<UserInfoRequest>,
) -> Result<Response, ApiError> {
    let user_id = request.user_id.trim();
    let email = request.email.trim();
    let name = request.name.trim();
    if user_id.is_empty() || email.is_empty() || name.is_empty() {
        return Err(ApiError::invalid("Missing required user information"));
    }
    tracing::info!("User info request for: {} ({})", user_id, email);

    let user = state.users.create_or_update_user(user_id, email, Some(name)).await?;
    let session_id = state.users.create_session(user_id).await;

    let set_cookie = format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Max-Age={}; Path=/",
        SESSION_COOKIE,
        session_id,
        UserStore::session_max_age_secs()
    );
    let body = UserInfoResponse {
        success: true,
        user_id: user_id.to_string(),
        model_count: user.model_count,
        max_models: state.users.max_models(),
    };
    Ok(([(header::SET_COOKIE, set_cookie)], Json(body)).into_response())
}

/// Count one model against the session's user
pub async fn increment_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UserCountRequest>,
) -> Result<Json<UserCountResponse>, ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::invalid_field("User ID is required", "user_id"));
    }
    let session_id = cookie(&headers, SESSION_COOKIE)
        .ok_or_else(|| ApiError::Unauthorized("No session found".into()))?;
    let session_user = state
        .users
        .session_user(session_id)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".into()))?;
    if session_user != request.user_id {
        tracing::warn!("Session of {} tried to count for {}", session_user, request.user_id);
        return Err(ApiError::Forbidden("Session does not belong to this user".into()));
    }

    let model_count = state.users.increment_model_count(&request.user_id).await?;
    tracing::info!("User {} count incremented to {}", request.user_id, model_count);
    Ok(Json(UserCountResponse { success: true, model_count }))
}
