//! STL reading and writing.
//!
//! Binary layout:
//!
//! | bytes  | content                                   |
//! |--------|-------------------------------------------|
//! | 0-79   | header                                    |
//! | 80-83  | triangle count (u32, little endian)        |
//! | 84-    | 50 bytes per triangle: normal, 3 vertices (12 × f32), u16 attribute |
//!
//! ASCII files start with `solid` and list `facet normal` / `vertex` lines.
//! Both decode into flat per-vertex position and normal buffers.

use std::fmt::{self, Write as _};

use glam::Vec3;

use crate::camera::Bounds;

pub const HEADER_LEN: usize = 80;
pub const BINARY_PREFIX_LEN: usize = 84;
pub const TRIANGLE_RECORD_LEN: usize = 50;

/// Triangle soup decoded from an STL file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StlMesh {
    /// `solid` name (ASCII) or trimmed header text (binary)
    pub name: Option<String>,
    /// 9 floats per triangle: 3 vertices × xyz
    pub positions: Vec<f32>,
    /// Same layout as `positions`; the facet normal repeated per vertex
    pub normals: Vec<f32>,
    /// Binary body was shorter than the declared triangle count
    pub truncated: bool,
}

impl StlMesh {
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 9
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_flat(&self.positions)
    }

    /// Append a triangle; a zero or non-finite normal is recomputed from the winding
    pub fn push_triangle(&mut self, normal: [f32; 3], vertices: [[f32; 3]; 3]) {
        let normal = facet_normal(normal, &vertices);
        for v in vertices {
            self.positions.extend_from_slice(&v);
            self.normals.extend_from_slice(&normal);
        }
    }

    /// Build from an indexed mesh (flat xyz positions + triangle indices)
    pub fn from_indexed(positions: &[f32], indices: &[u32]) -> Result<Self, StlError> {
        let vertex_count = positions.len() / 3;
        let mut mesh = StlMesh::default();
        for (tri, idx) in indices.chunks_exact(3).enumerate() {
            let mut vertices = [[0.0_f32; 3]; 3];
            for (slot, &i) in vertices.iter_mut().zip(idx) {
                let i = i as usize;
                if i >= vertex_count {
                    return Err(StlError::IndexOutOfRange { triangle: tri, index: i });
                }
                *slot = [positions[i * 3], positions[i * 3 + 1], positions[i * 3 + 2]];
            }
            mesh.push_triangle([0.0; 3], vertices);
        }
        Ok(mesh)
    }

    fn triangle(&self, tri: usize) -> ([f32; 3], [[f32; 3]; 3]) {
        let p = &self.positions[tri * 9..tri * 9 + 9];
        let n = &self.normals[tri * 9..tri * 9 + 3];
        (
            [n[0], n[1], n[2]],
            [[p[0], p[1], p[2]], [p[3], p[4], p[5]], [p[6], p[7], p[8]]],
        )
    }
}

/// STL decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum StlError {
    /// Shorter than the 84-byte binary prefix and not ASCII
    TooShort(usize),
    /// Declared or parsed triangle count is zero
    Empty,
    /// Malformed ASCII content
    Syntax { line: usize, message: String },
    /// Index buffer refers past the end of the vertex buffer
    IndexOutOfRange { triangle: usize, index: usize },
}

impl fmt::Display for StlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StlError::TooShort(len) => {
                write!(f, "STL data too short: {} bytes (need at least {})", len, BINARY_PREFIX_LEN)
            }
            StlError::Empty => write!(f, "STL contains no triangles"),
            StlError::Syntax { line, message } => write!(f, "STL syntax error on line {}: {}", line, message),
            StlError::IndexOutOfRange { triangle, index } => {
                write!(f, "Triangle {} references missing vertex {}", triangle, index)
            }
        }
    }
}

impl std::error::Error for StlError {}

/// Encoding detected from the raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Binary,
}

/// Some binary exporters put `solid` at the start of the header, so a
/// size that matches the declared count exactly wins over the text prefix.
pub fn detect(bytes: &[u8]) -> Encoding {
    if bytes.len() >= BINARY_PREFIX_LEN {
        let count = declared_count(bytes) as usize;
        let expected = count
            .checked_mul(TRIANGLE_RECORD_LEN)
            .and_then(|body| body.checked_add(BINARY_PREFIX_LEN));
        if expected == Some(bytes.len()) {
            return Encoding::Binary;
        }
    }

    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    if bytes[start..].starts_with(b"solid") {
        Encoding::Ascii
    } else {
        Encoding::Binary
    }
}

pub fn decode(bytes: &[u8]) -> Result<StlMesh, StlError> {
    match detect(bytes) {
        Encoding::Ascii => decode_ascii(&String::from_utf8_lossy(bytes)),
        Encoding::Binary => decode_binary(bytes),
    }
}

fn declared_count(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]])
}

fn read_vec3(record: &[u8], offset: usize) -> [f32; 3] {
    let f = |i: usize| {
        let at = offset + i * 4;
        f32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
    };
    [f(0), f(1), f(2)]
}

pub fn decode_binary(bytes: &[u8]) -> Result<StlMesh, StlError> {
    if bytes.len() < BINARY_PREFIX_LEN {
        return Err(StlError::TooShort(bytes.len()));
    }

    let declared = declared_count(bytes) as usize;
    let body = &bytes[BINARY_PREFIX_LEN..];
    let available = body.len() / TRIANGLE_RECORD_LEN;
    let count = declared.min(available);
    if count == 0 {
        return Err(StlError::Empty);
    }

    let header = String::from_utf8_lossy(&bytes[..HEADER_LEN]);
    let name = header.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    let mut mesh = StlMesh {
        name: (!name.is_empty()).then(|| name.to_string()),
        positions: Vec::with_capacity(count * 9),
        normals: Vec::with_capacity(count * 9),
        truncated: available < declared,
    };

    for record in body.chunks_exact(TRIANGLE_RECORD_LEN).take(count) {
        let normal = read_vec3(record, 0);
        let vertices = [read_vec3(record, 12), read_vec3(record, 24), read_vec3(record, 36)];
        mesh.push_triangle(normal, vertices);
    }

    Ok(mesh)
}

fn parse_floats<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    line: usize,
    what: &str,
) -> Result<[f32; 3], StlError> {
    let mut out = [0.0_f32; 3];
    for slot in &mut out {
        let token = parts.next().ok_or_else(|| StlError::Syntax {
            line,
            message: format!("{} needs 3 components", what),
        })?;
        *slot = token.parse().map_err(|_| StlError::Syntax {
            line,
            message: format!("invalid number '{}' in {}", token, what),
        })?;
    }
    Ok(out)
}

pub fn decode_ascii(text: &str) -> Result<StlMesh, StlError> {
    let mut mesh = StlMesh::default();
    let mut normal: Option<[f32; 3]> = None;
    let mut vertices: Vec<[f32; 3]> = Vec::with_capacity(3);

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let mut parts = raw.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword {
            "solid" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                if mesh.name.is_none() && !name.is_empty() {
                    mesh.name = Some(name);
                }
            }
            "facet" => {
                if normal.is_some() {
                    return Err(StlError::Syntax {
                        line,
                        message: "facet started before previous endfacet".into(),
                    });
                }
                let n = match parts.next() {
                    Some("normal") => parse_floats(parts, line, "facet normal")?,
                    _ => [0.0; 3],
                };
                normal = Some(n);
                vertices.clear();
            }
            "vertex" => {
                if normal.is_none() {
                    return Err(StlError::Syntax {
                        line,
                        message: "vertex outside facet".into(),
                    });
                }
                vertices.push(parse_floats(parts, line, "vertex")?);
            }
            "endfacet" => {
                let n = normal.take().ok_or_else(|| StlError::Syntax {
                    line,
                    message: "endfacet without facet".into(),
                })?;
                if vertices.len() != 3 {
                    return Err(StlError::Syntax {
                        line,
                        message: format!("facet has {} vertices, expected 3", vertices.len()),
                    });
                }
                mesh.push_triangle(n, [vertices[0], vertices[1], vertices[2]]);
                vertices.clear();
            }
            "outer" | "endloop" | "endsolid" => {}
            other => {
                return Err(StlError::Syntax {
                    line,
                    message: format!("unexpected keyword '{}'", other),
                });
            }
        }
    }

    if mesh.triangle_count() == 0 {
        return Err(StlError::Empty);
    }
    Ok(mesh)
}

fn facet_normal(normal: [f32; 3], vertices: &[[f32; 3]; 3]) -> [f32; 3] {
    let n = Vec3::from(normal);
    if n.is_finite() && n.length_squared() > 1e-12 {
        return normal;
    }
    let [a, b, c] = vertices.map(Vec3::from);
    (b - a).cross(c - a).normalize_or_zero().into()
}

pub fn encode_binary(mesh: &StlMesh) -> Vec<u8> {
    let count = mesh.triangle_count();
    let mut out = Vec::with_capacity(BINARY_PREFIX_LEN + count * TRIANGLE_RECORD_LEN);

    let mut header = [0u8; HEADER_LEN];
    let name = mesh.name.as_deref().unwrap_or("binary stl");
    let len = name.len().min(HEADER_LEN);
    header[..len].copy_from_slice(&name.as_bytes()[..len]);
    out.extend_from_slice(&header);
    out.extend_from_slice(&(count as u32).to_le_bytes());

    for tri in 0..count {
        let (normal, vertices) = mesh.triangle(tri);
        for v in std::iter::once(normal).chain(vertices) {
            for c in v {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }
    out
}

pub fn encode_ascii(mesh: &StlMesh) -> String {
    let name = mesh.name.as_deref().unwrap_or("mesh");
    let mut out = String::new();
    let _ = writeln!(out, "solid {}", name);
    for tri in 0..mesh.triangle_count() {
        let (n, vertices) = mesh.triangle(tri);
        let _ = writeln!(out, "  facet normal {:?} {:?} {:?}", n[0], n[1], n[2]);
        out.push_str("    outer loop\n");
        for v in vertices {
            let _ = writeln!(out, "      vertex {:?} {:?} {:?}", v[0], v[1], v[2]);
        }
        out.push_str("    endloop\n");
        out.push_str("  endfacet\n");
    }
    let _ = write!(out, "endsolid {}", name);
    out
}

/// ±1 cube, used as the placeholder model when an interpreter run fails
pub fn fallback_cube() -> String {
    const FACES: [([f32; 3], [[f32; 3]; 3]); 12] = [
        ([0.0, 0.0, 1.0], [[1.0, 1.0, 1.0], [-1.0, 1.0, 1.0], [-1.0, -1.0, 1.0]]),
        ([0.0, 0.0, 1.0], [[1.0, 1.0, 1.0], [-1.0, -1.0, 1.0], [1.0, -1.0, 1.0]]),
        ([0.0, 0.0, -1.0], [[1.0, -1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0]]),
        ([0.0, 0.0, -1.0], [[1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [1.0, 1.0, -1.0]]),
        ([0.0, 1.0, 0.0], [[1.0, 1.0, 1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0]]),
        ([0.0, 1.0, 0.0], [[1.0, 1.0, 1.0], [-1.0, 1.0, -1.0], [-1.0, 1.0, 1.0]]),
        ([0.0, -1.0, 0.0], [[1.0, -1.0, 1.0], [-1.0, -1.0, 1.0], [-1.0, -1.0, -1.0]]),
        ([0.0, -1.0, 0.0], [[1.0, -1.0, 1.0], [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0]]),
        ([1.0, 0.0, 0.0], [[1.0, 1.0, 1.0], [1.0, -1.0, 1.0], [1.0, -1.0, -1.0]]),
        ([1.0, 0.0, 0.0], [[1.0, 1.0, 1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0]]),
        ([-1.0, 0.0, 0.0], [[-1.0, 1.0, 1.0], [-1.0, 1.0, -1.0], [-1.0, -1.0, -1.0]]),
        ([-1.0, 0.0, 0.0], [[-1.0, 1.0, 1.0], [-1.0, -1.0, -1.0], [-1.0, -1.0, 1.0]]),
    ];

    let mut mesh = StlMesh {
        name: Some("cube".into()),
        ..Default::default()
    };
    for (normal, vertices) in FACES {
        mesh.push_triangle(normal, vertices);
    }
    encode_ascii(&mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_triangle() -> StlMesh {
        let mut mesh = StlMesh::default();
        mesh.push_triangle(
            [0.0, 0.0, 1.0],
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        );
        mesh
    }

    #[test]
    fn binary_layout_is_fixed() {
        let bytes = encode_binary(&one_triangle());
        assert_eq!(bytes.len(), BINARY_PREFIX_LEN + TRIANGLE_RECORD_LEN);
        assert_eq!(&bytes[80..84], &1u32.to_le_bytes());
        assert_eq!(detect(&bytes), Encoding::Binary);
    }

    #[test]
    fn binary_with_solid_header_is_still_binary() {
        let mut mesh = one_triangle();
        mesh.name = Some("solid exported by some tool".into());
        let bytes = encode_binary(&mesh);
        assert!(bytes.starts_with(b"solid"));
        assert_eq!(detect(&bytes), Encoding::Binary);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.triangle_count(), 1);
        assert_eq!(decoded.name.as_deref(), Some("solid exported by some tool"));
    }

    #[test]
    fn truncated_binary_keeps_complete_records() {
        let mut mesh = one_triangle();
        mesh.push_triangle([0.0; 3], [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let mut bytes = encode_binary(&mesh);
        bytes.truncate(bytes.len() - 10);

        let decoded = decode_binary(&bytes).unwrap();
        assert!(decoded.truncated);
        assert_eq!(decoded.triangle_count(), 1);
    }

    #[test]
    fn binary_errors() {
        assert_eq!(decode_binary(&[0u8; 40]), Err(StlError::TooShort(40)));
        assert_eq!(decode_binary(&[0u8; 84]), Err(StlError::Empty));

        // declares 5 triangles but carries no records
        let mut bytes = vec![0u8; 84];
        bytes[80] = 5;
        assert_eq!(decode(&bytes), Err(StlError::Empty));
    }

    #[test]
    fn zero_normal_recomputed_from_winding() {
        let mut mesh = StlMesh::default();
        mesh.push_triangle([0.0; 3], [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(&mesh.normals[..3], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn ascii_decode() {
        let text = "solid tri\n\
                    facet normal 0 0 1\n\
                      outer loop\n\
                        vertex 0 0 0\n\
                        vertex 2 0 0\n\
                        vertex 0 3 0\n\
                      endloop\n\
                    endfacet\n\
                    endsolid tri\n";
        let mesh = decode(text.as_bytes()).unwrap();
        assert_eq!(mesh.name.as_deref(), Some("tri"));
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.normals.len(), 9);
        let b = mesh.bounds().unwrap();
        assert_eq!(b.max, [2.0, 3.0, 0.0]);
    }

    #[test]
    fn ascii_without_endsolid_is_accepted() {
        let text = "  solid\nfacet normal 0 0 0\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\n";
        let mesh = decode(text.as_bytes()).unwrap();
        assert!(mesh.name.is_none());
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn ascii_errors_report_line() {
        let bad = "solid x\nfacet normal 0 0 1\nouter loop\nvertex 0 0 zero\n";
        match decode(bad.as_bytes()) {
            Err(StlError::Syntax { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected: {:?}", other),
        }

        let two = "solid x\nfacet normal 0 0 1\nvertex 0 0 0\nvertex 1 0 0\nendfacet\n";
        assert!(matches!(decode(two.as_bytes()), Err(StlError::Syntax { line: 5, .. })));

        assert_eq!(decode(b"solid empty\nendsolid empty\n"), Err(StlError::Empty));
    }

    #[test]
    fn fallback_cube_decodes() {
        let text = fallback_cube();
        assert!(text.starts_with("solid cube"));
        let mesh = decode(text.as_bytes()).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        let b = mesh.bounds().unwrap();
        assert_eq!(b.min, [-1.0, -1.0, -1.0]);
        assert_eq!(b.max, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn from_indexed_checks_range() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let mesh = StlMesh::from_indexed(&positions, &[0, 1, 2]).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(
            StlMesh::from_indexed(&positions, &[0, 1, 7]),
            Err(StlError::IndexOutOfRange { triangle: 0, index: 7 })
        );
    }

    #[test]
    fn binary_and_ascii_agree() {
        let text = fallback_cube();
        let ascii = decode(text.as_bytes()).unwrap();
        let binary = decode(&encode_binary(&ascii)).unwrap();
        assert_eq!(ascii.positions, binary.positions);
        assert_eq!(ascii.normals, binary.normals);
    }
}
