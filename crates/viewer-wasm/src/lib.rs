use js_sys::Float32Array;
use wasm_bindgen::prelude::*;

use shared::camera::{self, Bounds, OrbitCamera};
use shared::prompt::{script_template, ShapeKind};
use shared::stl::{self, StlMesh};

/// Декодированный STL: буферы для BufferGeometry
#[wasm_bindgen]
pub struct DecodedMesh {
    mesh: StlMesh,
}

#[wasm_bindgen]
impl DecodedMesh {
    #[wasm_bindgen(getter)]
    pub fn positions(&self) -> Float32Array {
        Float32Array::from(self.mesh.positions.as_slice())
    }

    #[wasm_bindgen(getter)]
    pub fn normals(&self) -> Float32Array {
        Float32Array::from(self.mesh.normals.as_slice())
    }

    #[wasm_bindgen(getter, js_name = triangleCount)]
    pub fn triangle_count(&self) -> usize {
        self.mesh.triangle_count()
    }

    #[wasm_bindgen(getter)]
    pub fn truncated(&self) -> bool {
        self.mesh.truncated
    }

    /// JSON: { triangle_count, bounds, camera }
    pub fn summary(&self) -> String {
        summarize(&self.mesh).to_string()
    }
}

fn summarize(mesh: &StlMesh) -> serde_json::Value {
    let bounds = mesh.bounds();
    serde_json::json!({
        "name": mesh.name,
        "triangle_count": mesh.triangle_count(),
        "truncated": mesh.truncated,
        "bounds": bounds,
        "camera": bounds.as_ref().map(camera::frame),
    })
}

/// Разбирает ASCII или бинарный STL
#[wasm_bindgen(js_name = decodeStl)]
pub fn decode_stl(bytes: &[u8]) -> Result<DecodedMesh, JsError> {
    let mesh = stl::decode(bytes).map_err(|e| JsError::new(&e.to_string()))?;
    if mesh.truncated {
        web_sys::console::warn_1(
            &format!("STL truncated: decoded {} complete triangles", mesh.triangle_count()).into(),
        );
    }
    Ok(DecodedMesh { mesh })
}

/// Камера вьюпорта: вращение, панорамирование, зум, автокадрирование
#[wasm_bindgen]
pub struct Viewport {
    camera: OrbitCamera,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl Viewport {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            camera: OrbitCamera::new(),
        }
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.camera.rotate(dx, dy);
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        // pan speed follows the orbit distance
        let k = self.camera.distance * 0.002;
        self.camera.pan(-dx * k, dy * k);
    }

    pub fn zoom(&mut self, delta: f32) {
        self.camera.zoom(delta);
    }

    /// Кадрирование по габаритам модели
    #[wasm_bindgen(js_name = frameMesh)]
    pub fn frame_mesh(&mut self, mesh: &DecodedMesh) {
        if let Some(bounds) = mesh.mesh.bounds() {
            self.camera.frame_bounds(&bounds);
        }
    }

    #[wasm_bindgen(js_name = frameBox)]
    pub fn frame_box(&mut self, min_x: f32, min_y: f32, min_z: f32, max_x: f32, max_y: f32, max_z: f32) {
        self.camera.frame_bounds(&Bounds {
            min: [min_x, min_y, min_z],
            max: [max_x, max_y, max_z],
        });
    }

    /// Column-major view-projection matrix
    #[wasm_bindgen(js_name = viewProjection)]
    pub fn view_projection(&self, aspect: f32) -> Vec<f32> {
        self.camera.view_projection(aspect).to_cols_array().to_vec()
    }

    #[wasm_bindgen(js_name = eyePosition)]
    pub fn eye_position(&self) -> Vec<f32> {
        self.camera.eye_position().to_array().to_vec()
    }

    /// JSON CameraFraming
    pub fn framing(&self) -> String {
        serde_json::to_string(&self.camera.framing()).unwrap_or_default()
    }
}

/// Текст запроса → скрипт для редактора примитивов
#[wasm_bindgen(js_name = promptToScript)]
pub fn prompt_to_script(prompt: &str) -> String {
    script_template(ShapeKind::from_prompt(prompt)).to_string()
}

#[wasm_bindgen(js_name = promptShape)]
pub fn prompt_shape(prompt: &str) -> String {
    ShapeKind::from_prompt(prompt).label().to_string()
}

/// Заглушка-куб для превью, когда сервер недоступен
#[wasm_bindgen(js_name = fallbackStl)]
pub fn fallback_stl() -> String {
    stl::fallback_cube()
}
