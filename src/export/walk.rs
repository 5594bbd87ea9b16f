//! Depth-first traversal of a model's visual nodes into USD mesh prims.

use glam::Mat4;

use crate::config::ConvertOptions;
use crate::error::Result;
use crate::export::material::material_name;
use crate::export::usda::{write_mesh, MeshPrim};
use crate::geometry::{extract_geometry, GeometryError};
use crate::scene::SceneModel;
use crate::transform::compose;

/// Counts gathered while walking one model.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub meshes: usize,
    pub skipped_primitives: usize,
}

/// Prim name of a mesh, unique across every model in a package.
///
/// `emitted` counts the mesh prims already written for the node, so the first
/// one keeps the plain `mesh_{model}_{node}` name.
pub fn mesh_name(model_index: usize, node_index: usize, emitted: usize) -> String {
    if emitted == 0 {
        format!("mesh_{}_{}", model_index, node_index)
    } else {
        format!("mesh_{}_{}_{}", model_index, node_index, emitted)
    }
}

struct MeshWalk<'a> {
    out: &'a mut String,
    model_index: usize,
    model: &'a SceneModel,
    pose: Mat4,
    root: Mat4,
    options: &'a ConvertOptions,
    visited: Vec<bool>,
    stats: WalkStats,
}

/// Write a mesh prim for every triangle primitive reachable from the model's
/// default scene, in pre-order.
///
/// Each node is visited at most once. Cycles and nodes with several parents
/// keep only the first path that reaches them.
pub fn write_model_meshes(
    out: &mut String,
    model_index: usize,
    model: &SceneModel,
    pose: Mat4,
    root: Mat4,
    options: &ConvertOptions,
) -> Result<WalkStats> {
    let mut walk = MeshWalk {
        out,
        model_index,
        model,
        pose,
        root,
        options,
        visited: vec![false; model.nodes.len()],
        stats: WalkStats::default(),
    };
    for &node_index in &model.roots {
        walk.visit(node_index, Mat4::IDENTITY, 0)?;
    }

    log::debug!(
        "Model {}: wrote {} meshes, skipped {} primitives",
        model_index,
        walk.stats.meshes,
        walk.stats.skipped_primitives
    );
    Ok(walk.stats)
}

impl MeshWalk<'_> {
    fn visit(&mut self, node_index: usize, parent_world: Mat4, depth: usize) -> Result<()> {
        if depth > self.options.max_depth {
            log::warn!(
                "Node {} in model {} exceeds the maximum depth of {}, skipping its subtree",
                node_index,
                self.model_index,
                self.options.max_depth
            );
            return Ok(());
        }
        let model = self.model;
        let Some(node) = model.nodes.get(node_index) else {
            log::warn!(
                "Model {} references missing node {}",
                self.model_index,
                node_index
            );
            return Ok(());
        };
        if self.visited[node_index] {
            log::warn!(
                "Node {} in model {} is reachable more than once, skipping the repeat",
                node_index,
                self.model_index
            );
            return Ok(());
        }
        self.visited[node_index] = true;

        let world = parent_world * node.local;

        if let Some(mesh) = node.mesh.and_then(|m| model.meshes.get(m)) {
            let transform = compose(world, self.pose, self.root);
            let mut emitted = 0;
            for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
                let geometry = match extract_geometry(primitive) {
                    Ok(geometry) => geometry,
                    Err(GeometryError::NotTriangles(_)) => {
                        self.stats.skipped_primitives += 1;
                        continue;
                    }
                    Err(e) => {
                        log::warn!(
                            "Skipping primitive {} of node {} in model {}: {}",
                            primitive_index,
                            node_index,
                            self.model_index,
                            e
                        );
                        self.stats.skipped_primitives += 1;
                        continue;
                    }
                };

                let name = mesh_name(self.model_index, node_index, emitted);
                let material = primitive
                    .material
                    .map(|m| material_name(self.model_index, m));
                write_mesh(
                    self.out,
                    &MeshPrim {
                        name: &name,
                        transform,
                        geometry: &geometry,
                        material: material.as_deref(),
                    },
                    self.options.xform_mode,
                    &self.options.number_format,
                )?;
                self.stats.meshes += 1;
                emitted += 1;
            }
        }

        for &child in &node.children {
            self.visit(child, world, depth + 1)?;
        }
        Ok(())
    }
}
