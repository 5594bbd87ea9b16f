use glam::{Mat4, Vec3};
use gltf::binary::{Glb, Header};
use gltf_json::buffer::View as BufferView;
use gltf_json::{
    accessor, buffer, extensions, image, material, mesh, texture, validation, Accessor, Asset,
    Buffer, Image, Index, Material, Mesh, Node, Root, Scene, Texture,
};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;

use crate::error::Result;
use crate::scene::{self, DrawMode, SceneModel};

pub const GLB_MIME_TYPE: &str = "model/gltf-binary";

/// Scale applied on top of the root transform when merging models into a GLB.
pub const GLB_UNIT_SCALE: f32 = 0.01;

const CLEARCOAT_EXTENSION: &str = "KHR_materials_clearcoat";

/// Merge posed models into a single binary glTF.
///
/// Each model gets a wrapper node with `scale(0.01) * root * pose` whose
/// children are the model's root nodes. Entities keep their order, so model
/// `i`'s entities follow every entity of models `0..i`.
pub fn export_models_to_glb<W: Write>(
    models: &[(SceneModel, Mat4)],
    root_transform: Mat4,
    writer: W,
) -> Result<()> {
    let mut glb = GlbData::default();
    for (model_index, (model, pose)) in models.iter().enumerate() {
        let world = Mat4::from_scale(Vec3::splat(GLB_UNIT_SCALE)) * root_transform * *pose;
        glb.add_model(model_index, model, world);
    }

    let (root, bin) = glb.finish();
    let json = serde_json::to_vec(&root)?;

    let mut length = 12 + 8 + align_to_four(json.len());
    if !bin.is_empty() {
        length += 8 + bin.len();
    }
    let glb = Glb {
        header: Header {
            magic: *b"glTF",
            version: 2,
            length: length as u32,
        },
        json: Cow::Owned(json),
        bin: (!bin.is_empty()).then_some(Cow::Owned(bin)),
    };
    glb.to_writer(writer)?;

    log::info!(
        "Wrote GLB with {} models, {} meshes and {} images",
        models.len(),
        root.meshes.len(),
        root.images.len()
    );
    Ok(())
}

fn align_to_four(length: usize) -> usize {
    (length + 3) & !3
}

#[derive(Default)]
struct GlbData {
    root: Root,
    buffer_data: Vec<u8>,
    scene_nodes: Vec<Index<Node>>,
}

impl GlbData {
    fn add_model(&mut self, model_index: usize, model: &SceneModel, world: Mat4) {
        let textures: Vec<_> = model
            .textures
            .iter()
            .enumerate()
            .map(|(i, t)| self.add_texture(model_index, i, t))
            .collect();

        let material_offset = self.root.materials.len();
        for m in &model.materials {
            let base_color_texture = m
                .base_color_texture
                .and_then(|t| textures.get(t).copied().flatten());
            let gltf_material = self.create_material(m, base_color_texture);
            self.root.materials.push(gltf_material);
        }

        let meshes: Vec<_> = model
            .meshes
            .iter()
            .map(|m| self.add_mesh(m, material_offset))
            .collect();

        let node_offset = self.root.nodes.len();
        for node in &model.nodes {
            let children: Vec<_> = node
                .children
                .iter()
                .filter(|c| **c < model.nodes.len())
                .map(|c| Index::new((node_offset + c) as u32))
                .collect();

            self.root.nodes.push(Node {
                name: node.name.clone(),
                translation: None,
                rotation: None,
                scale: None,
                children: if children.is_empty() {
                    None
                } else {
                    Some(children)
                },
                camera: None,
                mesh: node.mesh.and_then(|m| meshes.get(m).copied().flatten()),
                skin: None,
                matrix: if node.local == Mat4::IDENTITY {
                    None
                } else {
                    Some(node.local.to_cols_array())
                },
                weights: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
        }

        let roots: Vec<_> = model
            .roots
            .iter()
            .filter(|r| **r < model.nodes.len())
            .map(|r| Index::new((node_offset + r) as u32))
            .collect();

        let wrapper = Node {
            name: Some(format!("model_{}", model_index)),
            translation: None,
            rotation: None,
            scale: None,
            children: if roots.is_empty() { None } else { Some(roots) },
            camera: None,
            mesh: None,
            skin: None,
            matrix: Some(world.to_cols_array()),
            weights: None,
            extensions: Default::default(),
            extras: Default::default(),
        };
        self.root.nodes.push(wrapper);
        self.scene_nodes
            .push(Index::new((self.root.nodes.len() - 1) as u32));
    }

    fn add_texture(
        &mut self,
        model_index: usize,
        texture_index: usize,
        t: &scene::Texture,
    ) -> Option<Index<Texture>> {
        let Some(image_data) = &t.image else {
            log::warn!(
                "Texture {} in model {} has no image data, omitting it from the GLB",
                texture_index,
                model_index
            );
            return None;
        };

        let view = self.push_view(&image_data.bytes, None, None);
        let mime_type = ::image::ImageFormat::from_extension(&image_data.extension)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");

        self.root.images.push(Image {
            buffer_view: Some(view),
            mime_type: Some(image::MimeType(mime_type.to_string())),
            name: None,
            uri: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        let source = Index::new((self.root.images.len() - 1) as u32);

        self.root.textures.push(Texture {
            name: None,
            sampler: None,
            source,
            extensions: Default::default(),
            extras: Default::default(),
        });
        Some(Index::new((self.root.textures.len() - 1) as u32))
    }

    fn create_material(
        &mut self,
        m: &scene::Material,
        base_color_texture: Option<Index<Texture>>,
    ) -> Material {
        let extensions = m.clearcoat.map(|clearcoat| {
            let name = CLEARCOAT_EXTENSION.to_string();
            if !self.root.extensions_used.contains(&name) {
                self.root.extensions_used.push(name.clone());
            }

            let mut value = serde_json::Map::new();
            if let Some(factor) = clearcoat.factor {
                value.insert("clearcoatFactor".to_string(), factor.into());
            }
            if let Some(factor) = clearcoat.roughness_factor {
                value.insert("clearcoatRoughnessFactor".to_string(), factor.into());
            }

            let mut others = serde_json::Map::new();
            others.insert(name, serde_json::Value::Object(value));
            extensions::material::Material {
                others,
                ..Default::default()
            }
        });

        Material {
            name: m.name.clone(),
            pbr_metallic_roughness: material::PbrMetallicRoughness {
                base_color_factor: material::PbrBaseColorFactor(m.base_color_factor),
                metallic_factor: material::StrengthFactor(m.metallic_factor.unwrap_or(1.0)),
                roughness_factor: material::StrengthFactor(m.roughness_factor.unwrap_or(1.0)),
                base_color_texture: base_color_texture.map(|index| texture::Info {
                    index,
                    tex_coord: 0,
                    extensions: Default::default(),
                    extras: Default::default(),
                }),
                metallic_roughness_texture: None,
                extensions: Default::default(),
                extras: Default::default(),
            },
            alpha_cutoff: None,
            alpha_mode: validation::Checked::Valid(material::AlphaMode::Opaque),
            double_sided: false,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: material::EmissiveFactor([0.0, 0.0, 0.0]),
            extensions,
            extras: Default::default(),
        }
    }

    fn add_mesh(&mut self, m: &scene::Mesh, material_offset: usize) -> Option<Index<Mesh>> {
        let mut primitives = Vec::new();
        for p in &m.primitives {
            // Accessors can't be empty.
            if p.positions.is_empty() {
                log::warn!("Skipping primitive without positions");
                continue;
            }

            let mut attributes = BTreeMap::new();
            attributes.insert(
                validation::Checked::Valid(mesh::Semantic::Positions),
                self.create_vec3_accessor(&p.positions, true),
            );
            if let Some(normals) = p.normals.as_ref().filter(|n| !n.is_empty()) {
                attributes.insert(
                    validation::Checked::Valid(mesh::Semantic::Normals),
                    self.create_vec3_accessor(normals, false),
                );
            }
            if let Some(tex_coords) = p.tex_coords.as_ref().filter(|t| !t.is_empty()) {
                attributes.insert(
                    validation::Checked::Valid(mesh::Semantic::TexCoords(0)),
                    self.create_vec2_accessor(tex_coords),
                );
            }

            let indices = p
                .indices
                .as_ref()
                .filter(|i| !i.is_empty())
                .map(|i| self.create_indices_accessor(i));

            primitives.push(mesh::Primitive {
                attributes,
                indices,
                material: p
                    .material
                    .map(|i| Index::new((material_offset + i) as u32)),
                mode: validation::Checked::Valid(gltf_mode(p.mode)),
                targets: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
        }

        if primitives.is_empty() {
            return None;
        }

        self.root.meshes.push(Mesh {
            name: m.name.clone(),
            primitives,
            weights: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        Some(Index::new((self.root.meshes.len() - 1) as u32))
    }

    fn push_view(
        &mut self,
        bytes: &[u8],
        byte_stride: Option<usize>,
        target: Option<buffer::Target>,
    ) -> Index<BufferView> {
        self.buffer_data
            .resize(align_to_four(self.buffer_data.len()), 0);
        let byte_offset = self.buffer_data.len();
        self.buffer_data.extend_from_slice(bytes);

        self.root.buffer_views.push(BufferView {
            buffer: Index::new(0),
            byte_offset: Some(validation::USize64::from(byte_offset)),
            byte_length: validation::USize64::from(bytes.len()),
            byte_stride: byte_stride.map(buffer::Stride),
            target: target.map(validation::Checked::Valid),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        Index::new((self.root.buffer_views.len() - 1) as u32)
    }

    fn push_accessor(
        &mut self,
        view: Index<BufferView>,
        count: usize,
        component_type: accessor::ComponentType,
        type_: accessor::Type,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> Index<Accessor> {
        let to_json = |v: Vec<f32>| {
            serde_json::Value::Array(v.into_iter().map(serde_json::Value::from).collect())
        };
        let (min, max) = match bounds {
            Some((min, max)) => (Some(to_json(min)), Some(to_json(max))),
            None => (None, None),
        };

        self.root.accessors.push(Accessor {
            buffer_view: Some(view),
            byte_offset: Some(validation::USize64::from(0u64)),
            component_type: validation::Checked::Valid(accessor::GenericComponentType(
                component_type,
            )),
            count: validation::USize64::from(count),
            type_: validation::Checked::Valid(type_),
            min,
            max,
            sparse: None,
            normalized: false,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        Index::new((self.root.accessors.len() - 1) as u32)
    }

    fn create_vec3_accessor(&mut self, data: &[[f32; 3]], with_bounds: bool) -> Index<Accessor> {
        let bytes: Vec<u8> = data
            .iter()
            .flatten()
            .flat_map(|component| component.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes, Some(12), Some(buffer::Target::ArrayBuffer));

        // glTF requires bounds for positions.
        let bounds = with_bounds.then(|| {
            let mut min_vals = [f32::INFINITY; 3];
            let mut max_vals = [f32::NEG_INFINITY; 3];
            for vec in data {
                for (i, &val) in vec.iter().enumerate() {
                    min_vals[i] = min_vals[i].min(val);
                    max_vals[i] = max_vals[i].max(val);
                }
            }
            (min_vals.to_vec(), max_vals.to_vec())
        });

        self.push_accessor(
            view,
            data.len(),
            accessor::ComponentType::F32,
            accessor::Type::Vec3,
            bounds,
        )
    }

    fn create_vec2_accessor(&mut self, data: &[[f32; 2]]) -> Index<Accessor> {
        let bytes: Vec<u8> = data
            .iter()
            .flatten()
            .flat_map(|component| component.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes, Some(8), Some(buffer::Target::ArrayBuffer));
        self.push_accessor(
            view,
            data.len(),
            accessor::ComponentType::F32,
            accessor::Type::Vec2,
            None,
        )
    }

    fn create_indices_accessor(&mut self, indices: &[u32]) -> Index<Accessor> {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.push_view(&bytes, None, Some(buffer::Target::ElementArrayBuffer));
        self.push_accessor(
            view,
            indices.len(),
            accessor::ComponentType::U32,
            accessor::Type::Scalar,
            None,
        )
    }

    fn finish(mut self) -> (Root, Vec<u8>) {
        self.buffer_data
            .resize(align_to_four(self.buffer_data.len()), 0);

        let mut root = self.root;
        root.asset = Asset {
            generator: Some(format!("glb2usdz {}", env!("CARGO_PKG_VERSION"))),
            version: "2.0".to_string(),
            ..Default::default()
        };
        if !self.buffer_data.is_empty() {
            root.buffers = vec![Buffer {
                byte_length: validation::USize64::from(self.buffer_data.len()),
                uri: None,
                name: None,
                extensions: Default::default(),
                extras: Default::default(),
            }];
        }
        root.scenes = vec![Scene {
            name: None,
            nodes: self.scene_nodes,
            extensions: Default::default(),
            extras: Default::default(),
        }];
        root.scene = Some(Index::new(0));

        (root, self.buffer_data)
    }
}

fn gltf_mode(mode: DrawMode) -> mesh::Mode {
    match mode {
        DrawMode::Points => mesh::Mode::Points,
        DrawMode::Lines => mesh::Mode::Lines,
        DrawMode::LineLoop => mesh::Mode::LineLoop,
        DrawMode::LineStrip => mesh::Mode::LineStrip,
        DrawMode::Triangles => mesh::Mode::Triangles,
        DrawMode::TriangleStrip => mesh::Mode::TriangleStrip,
        DrawMode::TriangleFan => mesh::Mode::TriangleFan,
    }
}
