use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};

use crate::config::{API_TITLE, API_VERSION};
use crate::error::ApiError;
use crate::AppState;

mod admin;
mod cad;
mod download;
mod generation;
mod user;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/generate", post(generation::generate))
        .route("/api/execute", post(generation::execute))
        .route("/api/cad/script", post(cad::script))
        .route("/api/cad/build", post(cad::build))
        .route("/api/cad/inspect", post(cad::inspect))
        .route("/api/download/{model_id}", get(download::download))
        .route("/api/models/{model_id}/preview", get(download::preview))
        .route("/api/user/info", post(user::info))
        .route("/api/user/increment-count", post(user::increment_count))
        .route("/api/admin/collected-emails", get(admin::collected_emails))
        .route("/api/admin/user/{user_id}", delete(admin::delete_user))
        .route("/api/admin/user/{user_id}/reset-count", post(admin::reset_count))
}

/// API info and endpoint map
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": format!("{} v{}", API_TITLE, API_VERSION),
        "health": "/health",
        "endpoints": {
            "generation": "/api/generate",
            "execution": "/api/execute",
            "script": "/api/cad/script",
            "build": "/api/cad/build",
            "inspect": "/api/cad/inspect",
            "download": "/api/download/{model_id}",
            "preview": "/api/models/{model_id}/preview",
            "user_info": "/api/user/info",
            "increment_count": "/api/user/increment-count",
            "admin": "/api/admin/collected-emails",
        },
    }))
}

/// Health check
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let environment = state.executor.environment().await;
    Json(json!({
        "status": "healthy",
        "api_title": API_TITLE,
        "version": API_VERSION,
        "services": {
            "ai_generation": if state.ai.is_available() { "available" } else { "template_fallback" },
            "dsl_executor": if state.executor.is_available() { "available" } else { "placeholder_only" },
            "analytics": if state.analytics.is_enabled() { "enabled" } else { "disabled" },
            "storage": if environment.temp_dir_writable { "available" } else { "unavailable" },
        },
        "models_stored": state.storage.len().await,
        "environment": environment,
    }))
}

/// Value of one cookie from the request headers
pub(crate) fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Shared user bookkeeping for the model-producing endpoints.
///
/// Takes a generation slot for `user_id` (creating the user on first sight)
/// and records the request. The slot must be given back with
/// [`release_slot`] if the model never gets produced.
pub(crate) async fn take_slot(
    state: &AppState,
    user_id: Option<&str>,
    text: &str,
    kind: shared::PromptType,
) -> Result<(), ApiError> {
    let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
        return Ok(());
    };
    state.users.ensure_user(user_id).await?;
    let count = state.users.reserve_generation(user_id).await?;
    if let Err(e) = state.users.record_prompt(user_id, text, kind).await {
        tracing::warn!("Could not record prompt for {}: {}", user_id, e);
    }
    tracing::info!("User {} now at {} models", user_id, count);
    Ok(())
}

pub(crate) async fn release_slot(state: &AppState, user_id: Option<&str>) {
    if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
        if let Err(e) = state.users.release_generation(user_id).await {
            tracing::warn!("Could not release generation slot for {}: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session_id=abc-123"));
        assert_eq!(cookie(&headers, "session_id"), Some("abc-123"));
        assert_eq!(cookie(&headers, "theme"), Some("dark"));
        assert_eq!(cookie(&headers, "missing"), None);
        assert_eq!(cookie(&HeaderMap::new(), "session_id"), None);
    }
}
