use axum::{extract::State, response::Json};
use serde_json::json;
use shared::{CodeRequest, ExecuteResponse, GenerateResponse, GenerationStatus, PromptRequest, PromptType};

use super::{release_slot, take_slot};
use crate::error::ApiError;
use crate::AppState;

/// Prompt → DSL program (AI or template) → STL
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::invalid_field("No prompt provided", "prompt"));
    }
    let user_id = request.user_id.as_deref();
    take_slot(&state, user_id, prompt, PromptType::Generate).await?;

    let result = async {
        let generated = state.ai.generate(prompt).await?;
        let model_id = uuid::Uuid::new_v4().to_string();
        let execution = state
            .executor
            .execute_and_export(&generated.code, &model_id, true)
            .await?;
        Ok::<_, ApiError>((generated, model_id, execution))
    }
    .await;

    let (generated, model_id, execution) = match result {
        Ok(v) => v,
        Err(e) => {
            release_slot(&state, user_id).await;
            return Err(e);
        }
    };

    let mut message = match generated.status {
        GenerationStatus::AiGenerated => format!("Generated model for: \"{}\"", prompt),
        _ => format!(
            "Generated fallback model for: \"{}\" (AI service temporarily unavailable)",
            prompt
        ),
    };
    if execution.fallback {
        message = format!("{}. {}", message, execution.message);
    }

    state.analytics.track_cad_event(
        "generate",
        user_id,
        json!({ "model_id": model_id, "generation_status": generated.status, "fallback": execution.fallback }),
    );
    state.analytics.store_model(&model_id, user_id, &generated.code, Some(prompt));

    Ok(Json(GenerateResponse {
        success: true,
        model_id,
        badcad_code: generated.code,
        message,
        generation_status: Some(generated.status),
    }))
}

/// User-supplied DSL program → STL
pub async fn execute(
    State(state): State<AppState>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    if request.code.trim().is_empty() {
        return Err(ApiError::invalid_field("No code provided", "code"));
    }
    let user_id = request.user_id.as_deref();
    take_slot(&state, user_id, &request.code, PromptType::ExecuteCode).await?;

    let model_id = uuid::Uuid::new_v4().to_string();
    let execution = match state.executor.execute_and_export(&request.code, &model_id, true).await {
        Ok(execution) => execution,
        Err(e) => {
            release_slot(&state, user_id).await;
            return Err(e.into());
        }
    };

    state.analytics.track_cad_event(
        "execute_code",
        user_id,
        json!({ "model_id": model_id, "fallback": execution.fallback }),
    );
    state.analytics.store_model(&model_id, user_id, &request.code, None);

    let message = if execution.fallback {
        execution.message
    } else {
        "BadCAD code executed successfully".to_string()
    };
    Ok(Json(ExecuteResponse { success: true, model_id, message }))
}
