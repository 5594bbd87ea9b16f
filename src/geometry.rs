//! Canonical per-primitive geometry for USD emission.

use thiserror::Error;

use crate::scene::{DrawMode, Primitive};

/// Reasons a primitive produces no mesh block.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeometryError {
    #[error("draw mode {0:?} is not a triangle list")]
    NotTriangles(DrawMode),

    #[error("primitive has no positions")]
    MissingPositions,

    #[error("primitive has no complete triangles")]
    NoTriangles,
}

/// Geometry of one triangle-list primitive in USD conventions.
///
/// `points`, `normals` and `tex_coords` always have the same length and every
/// index is below that length.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveGeometry {
    pub indices: Vec<u32>,
    pub points: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// UVs with a bottom-left origin (`v' = 1 - v`).
    pub tex_coords: Option<Vec<[f32; 2]>>,
}

impl PrimitiveGeometry {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Extract the geometry of a triangle-list primitive.
///
/// Non-indexed primitives get sequential indices. Trailing indices that do not
/// form a full triangle and triangles referencing missing vertices are dropped.
pub fn extract_geometry(primitive: &Primitive) -> Result<PrimitiveGeometry, GeometryError> {
    if primitive.mode != DrawMode::Triangles {
        return Err(GeometryError::NotTriangles(primitive.mode));
    }
    if primitive.positions.is_empty() {
        return Err(GeometryError::MissingPositions);
    }

    let vertex_count = primitive.positions.len();
    let indices = match &primitive.indices {
        Some(indices) => sanitize_indices(indices, vertex_count),
        None => sanitize_indices(&(0..vertex_count as u32).collect::<Vec<_>>(), vertex_count),
    };
    if indices.is_empty() {
        return Err(GeometryError::NoTriangles);
    }

    let normals = primitive
        .normals
        .as_ref()
        .filter(|normals| matches_vertex_count(normals.len(), vertex_count, "normals"))
        .cloned();

    let tex_coords = primitive
        .tex_coords
        .as_ref()
        .filter(|uvs| matches_vertex_count(uvs.len(), vertex_count, "texture coordinates"))
        .map(|uvs| uvs.iter().map(|&uv| flip_v(uv)).collect());

    log::debug!(
        "Extracted {} vertices, {} triangles, normals: {}, UVs: {}",
        vertex_count,
        indices.len() / 3,
        normals.is_some(),
        tex_coords.is_some()
    );

    Ok(PrimitiveGeometry {
        indices,
        points: primitive.positions.clone(),
        normals,
        tex_coords,
    })
}

/// Move a UV from a top-left origin to USD's bottom-left origin.
pub fn flip_v(uv: [f32; 2]) -> [f32; 2] {
    [uv[0], 1.0 - uv[1]]
}

fn sanitize_indices(indices: &[u32], vertex_count: usize) -> Vec<u32> {
    let remainder = indices.len() % 3;
    if remainder != 0 {
        log::warn!("Truncated {} indices to maintain triangle integrity", remainder);
    }

    let complete = &indices[..indices.len() - remainder];
    let valid: Vec<u32> = complete
        .chunks_exact(3)
        .filter(|triangle| triangle.iter().all(|&i| (i as usize) < vertex_count))
        .flatten()
        .copied()
        .collect();

    let dropped = (complete.len() - valid.len()) / 3;
    if dropped > 0 {
        log::warn!(
            "Dropped {} triangles with indices outside of {} vertices",
            dropped,
            vertex_count
        );
    }
    valid
}

fn matches_vertex_count(len: usize, vertex_count: usize, attribute: &str) -> bool {
    if len != vertex_count {
        log::warn!(
            "Ignoring {} {} for {} vertices",
            len,
            attribute,
            vertex_count
        );
        return false;
    }
    true
}
