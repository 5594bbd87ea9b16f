//! Decoded scene graph consumed by the exporters.
//!
//! A [SceneModel] is what the glTF importer produces and what the USD and GLB
//! writers read. Every entity is addressed by its logical index, which is its
//! position in the owning list and is only unique within one model.

use glam::Mat4;

/// Topology of a primitive's indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone)]
pub struct VisualNode {
    pub name: Option<String>,
    /// Transform relative to the parent node.
    pub local: Mat4,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

impl VisualNode {
    pub fn new(local: Mat4) -> Self {
        Self {
            name: None,
            local,
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_children(mut self, children: Vec<usize>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

/// Vertex and index data for one drawable unit, as stored by the source.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub mode: DrawMode,
    /// `None` for non-indexed primitives.
    pub indices: Option<Vec<u32>>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// `TEXCOORD_0` with the source's top-left origin.
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub material: Option<usize>,
}

impl Primitive {
    pub fn triangles(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            mode: DrawMode::Triangles,
            indices: Some(indices),
            positions,
            normals: None,
            tex_coords: None,
            material: None,
        }
    }
}

/// Values of the `KHR_materials_clearcoat` extension.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clearcoat {
    pub factor: Option<f32>,
    pub roughness_factor: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub base_color_factor: [f32; 4],
    /// Logical index into [SceneModel::textures].
    pub base_color_texture: Option<usize>,
    pub metallic_factor: Option<f32>,
    pub roughness_factor: Option<f32>,
    pub clearcoat: Option<Clearcoat>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: None,
            roughness_factor: None,
            clearcoat: None,
        }
    }
}

/// Encoded image bytes exactly as they appear in the source asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    /// File extension inferred from the content, such as `png` or `jpg`.
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Texture {
    /// `None` when the image could not be resolved.
    pub image: Option<ImageData>,
}

/// One decoded scene graph.
#[derive(Debug, Clone, Default)]
pub struct SceneModel {
    pub nodes: Vec<VisualNode>,
    /// Root nodes of the default scene.
    pub roots: Vec<usize>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
}

impl SceneModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: VisualNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Adds a node and lists it as a root of the default scene.
    pub fn add_root(&mut self, node: VisualNode) -> usize {
        let index = self.add_node(node);
        self.roots.push(index);
        index
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_texture(&mut self, texture: Texture) -> usize {
        self.textures.push(texture);
        self.textures.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_root_registers_scene_root() {
        let mut model = SceneModel::new();
        let child = model.add_node(VisualNode::new(Mat4::IDENTITY));
        let root = model.add_root(VisualNode::new(Mat4::IDENTITY).with_children(vec![child]));
        assert_eq!(vec![root], model.roots);
        assert_eq!(vec![child], model.nodes[root].children);
    }

    #[test]
    fn default_material_is_white() {
        let material = Material::default();
        assert_eq!([1.0; 4], material.base_color_factor);
        assert_eq!(None, material.metallic_factor);
        assert_eq!(None, material.clearcoat);
    }
}
