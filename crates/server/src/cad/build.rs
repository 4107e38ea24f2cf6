//! Scene evaluation on top of the vcad CSG kernel.

use std::collections::HashMap;

use manifold_rs::Manifold;
use shared::stl::{self, StlMesh};
use shared::{camera, BooleanOp, Bounds, Primitive, SceneDescription, SceneOperation, Transform};
use vcad::export::gltf_export::to_glb_bytes;
use vcad::export::Material;
use vcad::{centered_cube, Part};

pub const DEFAULT_SEGMENTS: u32 = 32;
/// Most operations one scene may hold, from JSON or from a script
pub const MAX_OPERATIONS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Scene is empty")]
    EmptyScene,

    #[error("Object '{0}' not found")]
    UnknownObject(String),

    #[error("Object '{0}' is defined twice")]
    DuplicateObject(String),

    #[error("Invalid {kind} '{id}': dimensions must be positive")]
    InvalidPrimitive { id: String, kind: &'static str },

    #[error("Object '{0}' has no geometry")]
    EmptyGeometry(String),

    #[error("Scene has too many operations ({count}, max {max})")]
    TooManyOperations { count: usize, max: usize },

    #[error("Export failed: {0}")]
    Export(String),
}

pub fn create_primitive(id: &str, primitive: &Primitive) -> Result<Part, BuildError> {
    if !primitive.is_valid() {
        return Err(BuildError::InvalidPrimitive {
            id: id.to_string(),
            kind: primitive.kind(),
        });
    }
    let part = match primitive {
        Primitive::Cube { width, height, depth } => centered_cube(id, *width, *height, *depth),
        Primitive::Cylinder { radius, height } => Part::cylinder(id, *radius, *height, DEFAULT_SEGMENTS),
        Primitive::Sphere { radius } => Part::sphere(id, *radius, DEFAULT_SEGMENTS),
        Primitive::Cone { radius, height } => Part::cone(id, *radius, 0.0, *height, DEFAULT_SEGMENTS),
        Primitive::Torus { major_radius, minor_radius } => torus(id, *major_radius, *minor_radius),
    };
    Ok(part)
}

/// Circular profile revolved into a ring lying in the XZ plane
fn torus(id: &str, major_radius: f64, minor_radius: f64) -> Part {
    let profile: Vec<f64> = (0..DEFAULT_SEGMENTS)
        .flat_map(|i| {
            let a = std::f64::consts::TAU * f64::from(i) / f64::from(DEFAULT_SEGMENTS);
            [major_radius + minor_radius * a.cos(), minor_radius * a.sin()]
        })
        .collect();

    // revolve works around Z; tip it over so the axis becomes Y
    let manifold = Manifold::revolve(&[profile.as_slice()], DEFAULT_SEGMENTS, 360.0).rotate(-90.0, 0.0, 0.0);
    Part::new(id, manifold)
}

/// Scale, then rotate (degrees), then translate
fn transformed(part: &Part, transform: &Transform) -> Part {
    let [tx, ty, tz] = transform.position;
    let [rx, ry, rz] = transform.rotation;
    let [sx, sy, sz] = transform.scale;
    part.scale(sx, sy, sz).rotate(rx, ry, rz).translate(tx, ty, tz)
}

pub fn apply_transform(part: Part, transform: &Transform) -> Part {
    if transform.is_identity() {
        part
    } else {
        transformed(&part, transform)
    }
}

/// Evaluate the operations in order and return the requested part.
///
/// `result` falls back to the scene's own `result`, then to the last object
/// created.
pub fn build_part(scene: &SceneDescription, result: Option<&str>) -> Result<Part, BuildError> {
    let count = scene.operations.len();
    if count > MAX_OPERATIONS {
        return Err(BuildError::TooManyOperations { count, max: MAX_OPERATIONS });
    }
    let mut parts: HashMap<&str, Part> = HashMap::new();
    let mut last_id: Option<&str> = None;

    for op in &scene.operations {
        let id = op.id().as_str();
        if parts.contains_key(id) {
            return Err(BuildError::DuplicateObject(id.to_string()));
        }

        let part = match op {
            SceneOperation::CreatePrimitive { id, primitive, transform } => {
                apply_transform(create_primitive(id, primitive)?, transform)
            }
            SceneOperation::Boolean { op: bool_op, left, right, .. } => {
                let left_part = lookup(&parts, left)?;
                let right_part = lookup(&parts, right)?;
                match bool_op {
                    BooleanOp::Union => left_part.union(right_part),
                    BooleanOp::Difference => left_part.difference(right_part),
                    BooleanOp::Intersection => left_part.intersection(right_part),
                }
            }
            SceneOperation::Transform { source, transform, .. } => {
                transformed(lookup(&parts, source)?, transform)
            }
        };

        parts.insert(id, part);
        last_id = Some(id);
    }

    let wanted = result
        .or(scene.result.as_deref())
        .or(last_id)
        .ok_or(BuildError::EmptyScene)?;
    parts
        .remove(wanted)
        .ok_or_else(|| BuildError::UnknownObject(wanted.to_string()))
}

fn lookup<'a>(parts: &'a HashMap<&str, Part>, id: &str) -> Result<&'a Part, BuildError> {
    parts.get(id).ok_or_else(|| BuildError::UnknownObject(id.to_string()))
}

/// Triangle soup of a part, failing when the part is empty
pub fn to_mesh(part: &Part, id: &str) -> Result<StlMesh, BuildError> {
    let mesh = part.to_mesh();
    let positions = mesh.vertices();
    let indices = mesh.indices();
    if positions.is_empty() || indices.is_empty() {
        return Err(BuildError::EmptyGeometry(id.to_string()));
    }
    let mut stl_mesh =
        StlMesh::from_indexed(&positions, &indices).map_err(|e| BuildError::Export(e.to_string()))?;
    stl_mesh.name = Some(id.to_string());
    Ok(stl_mesh)
}

pub fn to_stl_bytes(part: &Part, id: &str) -> Result<Vec<u8>, BuildError> {
    Ok(stl::encode_binary(&to_mesh(part, id)?))
}

pub fn to_glb(part: &Part) -> Result<Vec<u8>, BuildError> {
    let material = Material::default();
    to_glb_bytes(part, &material).map_err(|e| BuildError::Export(format!("GLB export error: {}", e)))
}

/// Volume, area, extents and a suggested camera for the part
pub fn inspect(part: &Part, id: &str) -> Result<serde_json::Value, BuildError> {
    let mesh = to_mesh(part, id)?;
    let bounds = mesh.bounds().ok_or_else(|| BuildError::EmptyGeometry(id.to_string()))?;
    let bbox = part.bounding_box();
    let com = part.center_of_mass();

    Ok(serde_json::json!({
        "id": id,
        "volume": part.volume(),
        "surface_area": part.surface_area(),
        "bounding_box": { "min": bbox.0, "max": bbox.1 },
        "center_of_mass": com,
        "triangle_count": mesh.triangle_count(),
        "camera": camera::frame(&bounds),
    }))
}

/// Build and export in one step; the scene's final object id is returned too
pub fn build_stl(scene: &SceneDescription) -> Result<(Vec<u8>, Bounds, usize), BuildError> {
    let id = result_id(scene)?;
    let part = build_part(scene, Some(&id))?;
    let mesh = to_mesh(&part, &id)?;
    let bounds = mesh.bounds().ok_or(BuildError::EmptyGeometry(id))?;
    Ok((stl::encode_binary(&mesh), bounds, mesh.triangle_count()))
}

/// Id of the object a scene evaluates to
pub fn result_id(scene: &SceneDescription) -> Result<String, BuildError> {
    scene
        .result
        .clone()
        .or_else(|| scene.operations.last().map(|op| op.id().clone()))
        .ok_or(BuildError::EmptyScene)
}
