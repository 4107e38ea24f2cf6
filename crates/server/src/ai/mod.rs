use serde_json::{json, Value};
use shared::prompt::{dsl_template, ShapeKind};
use shared::GenerationStatus;

use crate::code::{clean_code, extract_code, validate_dsl_code};
use crate::config::Settings;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

const SYSTEM_PROMPT: &str = r#"
You are an expert at generating BadCAD code for 3D CAD modeling. BadCAD is a Python library for creating 3D models using constructive solid geometry.

2D shapes (return Shape objects):
- square(x, y, center=False) - rectangle
- circle(r=None, d=None, fn=0) - circle
- polygon(points) - custom polygon

3D primitives (return Solid objects):
- cube(x, y, z, center=False) - box
- cylinder(h, r=None, d=None, center=False, fn=0) - cylinder
- sphere(r=None, d=None, fn=0) - sphere
- conic(h, r1, r2, center=False, fn=0) - truncated cone (for cones, use r2=0.001 not 0)

Shape operations:
- .extrude(height, center=False) - 2D to 3D
- .revolve(z=360, fn=0) - revolve around Z axis
- .extrude_to(other_shape, height) - morph between shapes
- .offset(delta, join_type='miter') - inset/outset

Transformations:
- .move(x=0, y=0, z=0) - translate
- .rotate(x=0, y=0, z=0) - rotate
- .scale(x=1, y=1, z=1) - scale
- .mirror(x=0, y=0, z=0) - mirror

Boolean operations: + (union), - (subtract), & (intersect)

Special functions:
- threads(d, h, pitch, starts=1) - screw threads
- text(string, size=10, font='Helvetica') - text to 2D shape
- hull(*objects) - convex hull

Rules:
1. Always end with a variable named 'model' that holds the final result
2. Start with: from badcad import *
3. Use .move() for positioning, not .translate()
4. Shapes are 2D and Solids are 3D; use .extrude() to turn a Shape into a Solid
5. Use center=True when available
6. Prefer parametric designs with named variables

Respond with ONLY the BadCAD code in a single ```python block, no explanations.
"#;

/// (prompt, program) pairs sent ahead of the user's request
const EXAMPLES: &[(&str, &str)] = &[
    (
        "Create a cross shape",
        "from badcad import *\n\
         # Cross shape\n\
         plus = square(30, 10, center=True) + square(10, 30, center=True)\n\
         model = plus.extrude(5)",
    ),
    (
        "Create a simple cone",
        "from badcad import *\n\
         base_radius = 10\n\
         height = 15\n\
         base = circle(r=base_radius)\n\
         tip = circle(r=0.001)\n\
         model = base.extrude_to(tip, height)",
    ),
    (
        "Create a washer or ring",
        "from badcad import *\n\
         outer = circle(r=15)\n\
         inner = circle(r=5)\n\
         ring = outer - inner\n\
         model = ring.extrude(3)",
    ),
    (
        "Make a hexagonal nut",
        "from badcad import *\n\
         hex_shape = circle(r=10, fn=6)\n\
         nut = hex_shape.extrude(10)\n\
         hole = circle(d=12).extrude(10)\n\
         model = nut - hole",
    ),
    (
        "Create a bolt with threads",
        "from badcad import *\n\
         shaft = threads(d=8, h=16, pitch=1.25)\n\
         hex_head = circle(r=12, fn=6).extrude(5).move(z=16)\n\
         model = shaft + hex_head",
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    #[error("AI API key not set")]
    MissingKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no code in response")]
    EmptyResponse,

    #[error("generated code rejected: {0}")]
    Invalid(String),
}

/// Generated program and where it came from
#[derive(Debug, Clone)]
pub struct Generated {
    pub code: String,
    pub status: GenerationStatus,
}

pub struct AiGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl AiGenerator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: settings.ai_api_key.clone(),
            model: settings.ai_model.clone(),
            endpoint: settings.ai_endpoint.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Program for `prompt`. Any model failure falls back to the keyword
    /// template, so only an empty prompt is an error.
    pub async fn generate(&self, prompt: &str) -> Result<Generated, AiError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AiError::EmptyPrompt);
        }
        tracing::info!("Generating code for prompt: {:?}", truncate(prompt, 100));

        match self.complete(prompt).await {
            Ok(code) => {
                tracing::info!("AI generated {} chars of code", code.len());
                Ok(Generated { code, status: GenerationStatus::AiGenerated })
            }
            Err(e) => {
                tracing::warn!("AI generation failed, using template: {}", e);
                Ok(fallback(prompt))
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = self.api_key.as_ref().ok_or(AiError::MissingKey)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body(&self.model, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status { status: status.as_u16(), body: truncate(&body, 500).to_string() });
        }

        let body: Value = response.json().await?;
        let text = response_text(&body);
        let code = clean_code(&extract_code(&text));
        if code.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        validate_dsl_code(&code).map_err(AiError::Invalid)?;
        Ok(code)
    }
}

/// Template program picked by keyword
pub fn fallback(prompt: &str) -> Generated {
    let kind = ShapeKind::from_prompt(prompt);
    tracing::info!("Using {} template", kind.label());
    Generated {
        code: dsl_template(kind).to_string(),
        status: GenerationStatus::FallbackGenerated,
    }
}

fn request_body(model: &str, prompt: &str) -> Value {
    let mut messages = Vec::with_capacity(EXAMPLES.len() * 2 + 1);
    for (example_prompt, code) in EXAMPLES {
        messages.push(json!({ "role": "user", "content": *example_prompt }));
        messages.push(json!({ "role": "assistant", "content": format!("```python\n{}\n```", code) }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));

    json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "system": SYSTEM_PROMPT.trim(),
        "messages": messages,
    })
}

/// Concatenated text blocks of a messages-API response
fn response_text(body: &Value) -> String {
    body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
