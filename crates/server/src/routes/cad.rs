use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{camera, ModelPreview, PromptType, SceneDescription, ScriptRequest, ScriptResponse};

use super::{release_slot, take_slot};
use crate::cad::{build, script};
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BuildQuery {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExportFormat {
    Glb,
    Stl,
}

impl ExportFormat {
    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            None | Some("glb") => Ok(ExportFormat::Glb),
            Some("stl") => Ok(ExportFormat::Stl),
            Some(other) => Err(ApiError::invalid_field(
                format!("Unsupported format '{}', expected glb or stl", other),
                "format",
            )),
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("geometry task failed: {}", e)))?
}

/// Scene → GLB (default) or binary STL
pub async fn build(
    Query(query): Query<BuildQuery>,
    Json(scene): Json<SceneDescription>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(query.format.as_deref())?;

    let bytes = blocking(move || {
        let id = build::result_id(&scene)?;
        let part = build::build_part(&scene, Some(&id))?;
        let bytes = match format {
            ExportFormat::Glb => build::to_glb(&part)?,
            ExportFormat::Stl => build::to_stl_bytes(&part, &id)?,
        };
        Ok(bytes)
    })
    .await
    .inspect_err(|e| tracing::warn!("Build error: {}", e))?;

    let (content_type, disposition) = match format {
        ExportFormat::Glb => ("model/gltf-binary", "inline; filename=\"scene.glb\""),
        ExportFormat::Stl => ("model/stl", "attachment; filename=\"scene.stl\""),
    };
    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}

/// Scene → JSON metrics
pub async fn inspect(Json(scene): Json<SceneDescription>) -> Result<Json<Value>, ApiError> {
    let info = blocking(move || {
        let id = build::result_id(&scene)?;
        let part = build::build_part(&scene, Some(&id))?;
        Ok(build::inspect(&part, &id)?)
    })
    .await
    .inspect_err(|e| tracing::warn!("Inspect error: {}", e))?;

    Ok(Json(info))
}

/// Sandbox script → scene → stored STL
pub async fn script(
    State(state): State<AppState>,
    Json(request): Json<ScriptRequest>,
) -> Result<Json<ScriptResponse>, ApiError> {
    if request.script.trim().is_empty() {
        return Err(ApiError::invalid_field("No script provided", "script"));
    }
    let user_id = request.user_id.as_deref();
    take_slot(&state, user_id, &request.script, PromptType::Script).await?;

    let source = request.script.clone();
    let run = match blocking(move || Ok(script::run(&source)?)).await {
        Ok(run) => run,
        Err(e) => {
            release_slot(&state, user_id).await;
            return Err(e);
        }
    };

    let model_id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = state.storage.write_model(&model_id, &run.stl).await {
        release_slot(&state, user_id).await;
        return Err(e.into());
    }

    state.analytics.track_cad_event(
        "script",
        user_id,
        json!({
            "model_id": model_id,
            "operations": run.compiled.scene.operations.len(),
            "triangles": run.triangle_count,
        }),
    );

    let mut message = format!(
        "Script executed successfully ({} triangles)",
        run.triangle_count
    );
    for warning in &run.compiled.warnings {
        message.push_str("; ");
        message.push_str(warning);
    }

    Ok(Json(ScriptResponse {
        success: true,
        model_id,
        message,
        preview: ModelPreview {
            triangle_count: run.triangle_count,
            bounds: run.bounds,
            camera: camera::frame(&run.bounds),
            truncated: false,
        },
        scene: run.compiled.scene,
    }))
}
