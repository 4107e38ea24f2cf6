use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use shared::{camera, stl, ModelPreview};

use crate::error::ApiError;
use crate::AppState;

/// Shortest id accepted; real ids are UUIDs
const MIN_MODEL_ID_LEN: usize = 10;

fn not_found() -> ApiError {
    ApiError::NotFound("Model not found".into())
}

/// Path of a stored, non-empty model file
async fn stored_model(state: &AppState, model_id: &str) -> Result<PathBuf, ApiError> {
    if model_id.len() < MIN_MODEL_ID_LEN {
        return Err(not_found());
    }
    let path = state.storage.model_path(model_id).await.ok_or_else(|| {
        tracing::warn!("Model not found in storage: {}", model_id);
        not_found()
    })?;
    let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        tracing::error!("Model file is empty or unreadable: {}", path.display());
        return Err(not_found());
    }
    Ok(path)
}

async fn read_model(state: &AppState, model_id: &str) -> Result<Vec<u8>, ApiError> {
    let path = stored_model(state, model_id).await?;
    tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Storage(format!("Could not read {}: {}", path.display(), e)))
}

/// STL attachment
pub async fn download(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Response, ApiError> {
    tracing::info!("Download requested for model: {}", model_id);
    let bytes = read_model(&state, &model_id).await?;
    tracing::info!("Serving model {} ({} bytes)", model_id, bytes.len());
    state.analytics.track_download(&model_id);

    let disposition = format!("attachment; filename=model_{}.stl", model_id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Triangle count, bounds and camera framing of a stored model
pub async fn preview(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelPreview>, ApiError> {
    let bytes = read_model(&state, &model_id).await?;
    let mesh = stl::decode(&bytes)
        .map_err(|e| ApiError::Storage(format!("Stored model {} is not valid STL: {}", model_id, e)))?;
    let bounds = mesh
        .bounds()
        .ok_or_else(|| ApiError::Storage(format!("Stored model {} has no vertices", model_id)))?;

    Ok(Json(ModelPreview {
        triangle_count: mesh.triangle_count(),
        bounds,
        camera: camera::frame(&bounds),
        truncated: mesh.truncated,
    }))
}
