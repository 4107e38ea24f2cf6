use serde::{Deserialize, Serialize};

pub mod camera;
pub mod prompt;
pub mod stl;

pub use camera::{Bounds, CameraFraming, OrbitCamera};

/// Уникальный идентификатор объекта в сцене
pub type ObjectId = String;

/// Тип примитива
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    Cube {
        width: f64,
        height: f64,
        depth: f64,
    },
    Cylinder {
        radius: f64,
        height: f64,
    },
    Sphere {
        radius: f64,
    },
    Cone {
        radius: f64,
        height: f64,
    },
    /// Тор в плоскости XZ, ось вращения — Y
    Torus {
        major_radius: f64,
        minor_radius: f64,
    },
}

impl Primitive {
    /// Имя примитива для логов и сообщений об ошибках
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Cube { .. } => "cube",
            Primitive::Cylinder { .. } => "cylinder",
            Primitive::Sphere { .. } => "sphere",
            Primitive::Cone { .. } => "cone",
            Primitive::Torus { .. } => "torus",
        }
    }

    /// Все размеры положительны и конечны
    pub fn is_valid(&self) -> bool {
        let dims: &[f64] = match self {
            Primitive::Cube { width, height, depth } => &[*width, *height, *depth],
            Primitive::Cylinder { radius, height } => &[*radius, *height],
            Primitive::Sphere { radius } => &[*radius],
            Primitive::Cone { radius, height } => &[*radius, *height],
            Primitive::Torus { major_radius, minor_radius } => {
                if minor_radius >= major_radius {
                    return false;
                }
                &[*major_radius, *minor_radius]
            }
        };
        dims.iter().all(|d| d.is_finite() && *d > 0.0)
    }
}

/// Тип CSG-операции
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOp {
    Union,
    Difference,
    Intersection,
}

/// Трансформация объекта (углы в градусах)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub position: [f64; 3],
    #[serde(default)]
    pub rotation: [f64; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f64; 3],
}

fn unit_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    pub fn new() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }

    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: [x, y, z],
            ..Self::new()
        }
    }

    pub fn rotation(x: f64, y: f64, z: f64) -> Self {
        Self {
            rotation: [x, y, z],
            ..Self::new()
        }
    }

    pub fn scaling(x: f64, y: f64, z: f64) -> Self {
        Self {
            scale: [x, y, z],
            ..Self::new()
        }
    }

    pub fn is_identity(&self) -> bool {
        self == &Self::new()
    }
}

/// Операция в дереве конструирования
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneOperation {
    /// Создание примитива
    CreatePrimitive {
        id: ObjectId,
        primitive: Primitive,
        #[serde(default)]
        transform: Transform,
    },
    /// CSG-операция над двумя объектами
    Boolean {
        id: ObjectId,
        op: BooleanOp,
        left: ObjectId,
        right: ObjectId,
    },
    /// Копия объекта с дополнительной трансформацией
    Transform {
        id: ObjectId,
        source: ObjectId,
        transform: Transform,
    },
}

impl SceneOperation {
    /// ID объекта, который создаёт операция
    pub fn id(&self) -> &ObjectId {
        match self {
            SceneOperation::CreatePrimitive { id, .. } => id,
            SceneOperation::Boolean { id, .. } => id,
            SceneOperation::Transform { id, .. } => id,
        }
    }
}

/// Описание сцены — последовательность операций
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneDescription {
    pub operations: Vec<SceneOperation>,
    /// Итоговый объект; если не задан — последний созданный
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ObjectId>,
}

// ============================================================================
// HTTP API
// ============================================================================

/// Тип сохранённого запроса пользователя
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Generate,
    ExecuteCode,
    Script,
}

/// Каким образом получен код модели
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    AiGenerated,
    FallbackGenerated,
    UserProvided,
}

/// Запрос генерации модели по текстовому описанию
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Запрос выполнения пользовательского DSL-кода
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRequest {
    pub code: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Запрос выполнения скрипта над примитивами
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub script: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub model_id: String,
    pub badcad_code: String,
    pub message: String,
    pub generation_status: Option<GenerationStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub model_id: String,
    pub message: String,
}

/// Ответ на выполнение скрипта: модель сохранена, сцена и превью прилагаются
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub success: bool,
    pub model_id: String,
    pub message: String,
    pub scene: SceneDescription,
    pub preview: ModelPreview,
}

/// Сводка по сохранённой модели для вьюпорта
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPreview {
    pub triangle_count: usize,
    pub bounds: Bounds,
    pub camera: CameraFraming,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoRequest {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub success: bool,
    pub user_id: String,
    pub model_count: u32,
    pub max_models: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCountRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCountResponse {
    pub success: bool,
    pub model_count: u32,
}

/// Один сохранённый запрос пользователя
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPrompt {
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: PromptType,
    pub timestamp: String,
}

/// Данные пользователя, хранимые сервером
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prompts: Vec<UserPrompt>,
    #[serde(default)]
    pub model_count: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_activity: String,
}

/// Сводка по одному пользователю для админки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub model_count: u32,
    pub total_prompts: usize,
    pub created_at: String,
    pub last_activity: String,
    pub recent_prompts: Vec<UserPrompt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSummaryResponse {
    pub total_users: usize,
    pub total_prompts: usize,
    pub total_models_generated: u64,
    pub users: Vec<UserSummary>,
}

/// Описание ошибки в ответе API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Serialize + for<'de> Deserialize<'de> + PartialEq + std::fmt::Debug>(val: &T) {
        let json = serde_json::to_string(val).expect("serialize");
        let back: T = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(*val, back);
    }

    // --- Primitive ---

    #[test]
    fn test_primitive_tagging() {
        let p = Primitive::Cube { width: 2.0, height: 3.0, depth: 1.5 };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""type":"cube""#));

        let t = Primitive::Torus { major_radius: 5.0, minor_radius: 1.0 };
        roundtrip(&t);
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains(r#""type":"torus""#));
    }

    #[test]
    fn test_primitive_validity() {
        assert!(Primitive::Sphere { radius: 1.0 }.is_valid());
        assert!(!Primitive::Sphere { radius: 0.0 }.is_valid());
        assert!(!Primitive::Cylinder { radius: f64::NAN, height: 1.0 }.is_valid());
        assert!(!Primitive::Torus { major_radius: 1.0, minor_radius: 2.0 }.is_valid());
    }

    // --- Transform ---

    #[test]
    fn test_transform_defaults_when_missing() {
        let t: Transform = serde_json::from_str(r#"{"position":[1,2,3]}"#).unwrap();
        assert_eq!(t.position, [1.0, 2.0, 3.0]);
        assert_eq!(t.scale, [1.0, 1.0, 1.0]);
        assert!(!t.is_identity());
        assert!(Transform::default().is_identity());
    }

    // --- SceneOperation ---

    #[test]
    fn test_scene_from_json() {
        let json = r#"{
            "operations": [
                {"type": "create_primitive", "id": "base",
                 "primitive": {"type": "cube", "width": 10, "height": 10, "depth": 10}},
                {"type": "create_primitive", "id": "hole",
                 "primitive": {"type": "cylinder", "radius": 3, "height": 20}},
                {"type": "boolean", "id": "result", "op": "difference", "left": "base", "right": "hole"}
            ]
        }"#;
        let scene: SceneDescription = serde_json::from_str(json).unwrap();
        assert_eq!(scene.operations.len(), 3);
        assert_eq!(scene.operations[2].id(), "result");
        assert!(scene.result.is_none());
        roundtrip(&scene);
    }

    #[test]
    fn test_boolean_op_serde() {
        assert_eq!(serde_json::to_string(&BooleanOp::Intersection).unwrap(), r#""intersection""#);
    }

    // --- API ---

    #[test]
    fn test_prompt_request_user_optional() {
        let req: PromptRequest = serde_json::from_str(r#"{"prompt":"a cube"}"#).unwrap();
        assert!(req.user_id.is_none());
        let req: PromptRequest =
            serde_json::from_str(r#"{"prompt":"a cube","user_id":null,"extra":1}"#).unwrap();
        assert!(req.user_id.is_none());
    }

    #[test]
    fn test_generation_status_names() {
        assert_eq!(
            serde_json::to_string(&GenerationStatus::FallbackGenerated).unwrap(),
            r#""fallback_generated""#
        );
        assert_eq!(serde_json::to_string(&PromptType::ExecuteCode).unwrap(), r#""execute_code""#);
    }

    #[test]
    fn test_user_data_tolerates_missing_fields() {
        let data: UserData = serde_json::from_str(r#"{"email":"a@b.c"}"#).unwrap();
        assert_eq!(data.model_count, 0);
        assert!(data.prompts.is_empty());
        assert!(data.name.is_none());
    }

    #[test]
    fn test_user_prompt_type_field() {
        let p = UserPrompt {
            prompt: "cube".into(),
            kind: PromptType::Generate,
            timestamp: "2024-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""type":"generate""#));
        roundtrip(&p);
    }

    #[test]
    fn test_error_response_shape() {
        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                message: "Model not found: x".into(),
                kind: "MODEL_NOT_FOUND".into(),
                details: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["type"], "MODEL_NOT_FOUND");
        assert!(json["error"].get("details").is_none());
    }
}
