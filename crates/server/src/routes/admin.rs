use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Json,
};
use serde_json::{json, Value};
use shared::AdminSummaryResponse;

use crate::error::ApiError;
use crate::AppState;

/// Bearer check, enforced only when auth is on and an admin key is set
fn verify_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let settings = &state.settings;
    let Some(expected) = settings.admin_api_key.as_deref().filter(|_| settings.enable_auth) else {
        return Ok(());
    };
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match token {
        Some(token) if token == expected => Ok(()),
        Some(_) => {
            tracing::warn!("Rejected admin request with a wrong token");
            Err(ApiError::Unauthorized("Admin authentication required".into()))
        }
        None => Err(ApiError::Unauthorized("Admin authentication required".into())),
    }
}

pub async fn collected_emails(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminSummaryResponse>, ApiError> {
    verify_admin(&state, &headers)?;
    tracing::info!("Admin data summary requested");
    Ok(Json(state.users.summary().await))
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    verify_admin(&state, &headers)?;
    tracing::warn!("Admin deletion request for user: {}", user_id);
    state.users.delete_user(&user_id).await?;
    Ok(Json(json!({ "success": true, "message": format!("User {} deleted", user_id) })))
}

pub async fn reset_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    verify_admin(&state, &headers)?;
    tracing::warn!("Admin count reset request for user: {}", user_id);
    state.users.reset_count(&user_id).await?;
    Ok(Json(json!({ "success": true, "message": format!("User {} count reset to 0", user_id) })))
}
