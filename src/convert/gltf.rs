use base64::prelude::{Engine as _, BASE64_STANDARD};
use glam::Mat4;
use gltf::image::Source;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::error::{ConvertError, Result};
use crate::scene::{
    Clearcoat, DrawMode, ImageData, Material, Mesh, Primitive, SceneModel, Texture, VisualNode,
};

const CLEARCOAT_EXTENSION: &str = "KHR_materials_clearcoat";

/// Reasons an embedded `data:` image can't be decoded.
#[derive(Error, Debug)]
pub enum DataUriError {
    #[error("missing ',' before the payload")]
    MissingPayload,

    #[error("payload is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Fields of `KHR_materials_clearcoat` that map to preview surface inputs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearcoatExtension {
    clearcoat_factor: Option<f32>,
    clearcoat_roughness_factor: Option<f32>,
}

impl SceneModel {
    /// Decode a GLB or a glTF JSON document with embedded buffers.
    ///
    /// Buffers and images stored in external files can't be resolved without
    /// a base directory, so use [SceneModel::from_path] for those assets.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        import_gltf(bytes, None)
    }

    /// Decode a GLB or glTF file, resolving external files relative to it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        import_gltf(&bytes, path.parent())
    }
}

/// Convert a glTF asset into a [SceneModel].
///
/// Nodes, meshes, materials and textures keep their glTF indices. The roots
/// are the nodes of the default scene, or of the first scene if no default is
/// set.
pub fn import_gltf(bytes: &[u8], base: Option<&Path>) -> Result<SceneModel> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
    let buffers = gltf::import_buffers(&document, base, blob)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ConvertError::NoScene)?;

    let mut model = SceneModel::new();

    for node in document.nodes() {
        model.add_node(VisualNode {
            name: node.name().map(ToString::to_string),
            local: Mat4::from_cols_array_2d(&node.transform().matrix()),
            mesh: node.mesh().map(|m| m.index()),
            children: node.children().map(|c| c.index()).collect(),
        });
    }
    model.roots = scene.nodes().map(|n| n.index()).collect();

    for mesh in document.meshes() {
        let primitives = mesh
            .primitives()
            .map(|p| read_primitive(&p, &buffers))
            .collect();
        model.add_mesh(Mesh {
            name: mesh.name().map(ToString::to_string),
            primitives,
        });
    }

    for material in document.materials() {
        model.add_material(read_material(&material));
    }

    for texture in document.textures() {
        let image = read_image(&texture, &buffers, base);
        model.add_texture(Texture { image });
    }

    log::info!(
        "Imported glTF with {} nodes, {} meshes, {} materials and {} textures",
        model.nodes.len(),
        model.meshes.len(),
        model.materials.len(),
        model.textures.len()
    );

    Ok(model)
}

fn read_primitive(primitive: &gltf::Primitive, buffers: &[gltf::buffer::Data]) -> Primitive {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));

    let positions = reader
        .read_positions()
        .map(|p| p.collect())
        .unwrap_or_default();
    let normals = reader.read_normals().map(|n| n.collect());
    let tex_coords = reader.read_tex_coords(0).map(|t| t.into_f32().collect());
    let indices = reader.read_indices().map(|i| i.into_u32().collect());

    Primitive {
        mode: draw_mode(primitive.mode()),
        indices,
        positions,
        normals,
        tex_coords,
        material: primitive.material().index(),
    }
}

fn draw_mode(mode: gltf::mesh::Mode) -> DrawMode {
    match mode {
        gltf::mesh::Mode::Points => DrawMode::Points,
        gltf::mesh::Mode::Lines => DrawMode::Lines,
        gltf::mesh::Mode::LineLoop => DrawMode::LineLoop,
        gltf::mesh::Mode::LineStrip => DrawMode::LineStrip,
        gltf::mesh::Mode::Triangles => DrawMode::Triangles,
        gltf::mesh::Mode::TriangleStrip => DrawMode::TriangleStrip,
        gltf::mesh::Mode::TriangleFan => DrawMode::TriangleFan,
    }
}

fn read_material(material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();

    let base_color_texture = pbr.base_color_texture().map(|info| {
        if info.tex_coord() != 0 {
            log::warn!(
                "Base color texture uses TEXCOORD_{}, only TEXCOORD_0 is exported",
                info.tex_coord()
            );
        }
        info.texture().index()
    });

    Material {
        name: material.name().map(ToString::to_string),
        base_color_factor: pbr.base_color_factor(),
        base_color_texture,
        metallic_factor: Some(pbr.metallic_factor()),
        roughness_factor: Some(pbr.roughness_factor()),
        clearcoat: read_clearcoat(material),
    }
}

fn read_clearcoat(material: &gltf::Material) -> Option<Clearcoat> {
    let value = material.extensions()?.get(CLEARCOAT_EXTENSION)?;
    match serde_json::from_value::<ClearcoatExtension>(value.clone()) {
        Ok(clearcoat) => Some(Clearcoat {
            factor: Some(clearcoat.clearcoat_factor.unwrap_or(0.0)),
            roughness_factor: Some(clearcoat.clearcoat_roughness_factor.unwrap_or(0.0)),
        }),
        Err(e) => {
            log::warn!(
                "Ignoring invalid {} on material {:?}: {}",
                CLEARCOAT_EXTENSION,
                material.index(),
                e
            );
            None
        }
    }
}

fn read_image(
    texture: &gltf::Texture,
    buffers: &[gltf::buffer::Data],
    base: Option<&Path>,
) -> Option<ImageData> {
    let (bytes, mime_type) = match texture.source().source() {
        Source::View { view, mime_type } => {
            let buffer = buffers.get(view.buffer().index())?;
            let start = view.offset();
            let end = start + view.length();
            let Some(bytes) = buffer.0.get(start..end) else {
                log::warn!(
                    "Image view of texture {} is out of bounds",
                    texture.index()
                );
                return None;
            };
            (bytes.to_vec(), Some(mime_type))
        }
        Source::Uri { uri, mime_type } => {
            if let Some(data_uri) = uri.strip_prefix("data:") {
                match decode_data_uri(data_uri) {
                    Ok((bytes, data_mime_type)) => (bytes, data_mime_type.or(mime_type)),
                    Err(e) => {
                        log::warn!("Ignoring data URI of texture {}: {}", texture.index(), e);
                        return None;
                    }
                }
            } else {
                read_external_image(texture, uri, mime_type, base)?
            }
        }
    };

    let Some(extension) = image_extension(&bytes, mime_type) else {
        log::warn!(
            "Unrecognized image format for texture {}, ignoring it",
            texture.index()
        );
        return None;
    };
    Some(ImageData { bytes, extension })
}

fn read_external_image<'a>(
    texture: &gltf::Texture,
    uri: &str,
    mime_type: Option<&'a str>,
    base: Option<&Path>,
) -> Option<(Vec<u8>, Option<&'a str>)> {
    let Some(base) = base else {
        log::warn!(
            "Texture {} references external image {} without a base directory",
            texture.index(),
            uri
        );
        return None;
    };
    match std::fs::read(base.join(uri)) {
        Ok(bytes) => Some((bytes, mime_type)),
        Err(e) => {
            log::warn!("Failed to read image {}: {}", uri, e);
            None
        }
    }
}

/// Decode the part of a `data:` URI after the scheme.
///
/// Only base64 payloads are accepted. The MIME type is `None` when the URI
/// doesn't declare one.
pub fn decode_data_uri(
    data_uri: &str,
) -> std::result::Result<(Vec<u8>, Option<&str>), DataUriError> {
    let (header, payload) = data_uri
        .split_once(',')
        .ok_or(DataUriError::MissingPayload)?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or(DataUriError::NotBase64)?;
    let bytes = BASE64_STANDARD.decode(payload)?;
    Ok((bytes, (!mime_type.is_empty()).then_some(mime_type)))
}

/// File extension for encoded image bytes.
///
/// The content is checked first since the declared MIME type is optional and
/// sometimes wrong.
pub fn image_extension(bytes: &[u8], mime_type: Option<&str>) -> Option<String> {
    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| mime_type.and_then(image::ImageFormat::from_mime_type))?;
    format.extensions_str().first().map(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    #[test]
    fn extension_from_content() {
        assert_eq!(
            Some("png".to_string()),
            image_extension(&PNG_SIGNATURE, Some("image/jpeg"))
        );
        assert_eq!(
            Some("jpg".to_string()),
            image_extension(&[0xff, 0xd8, 0xff, 0xe0], None)
        );
    }

    #[test]
    fn extension_from_mime_type() {
        assert_eq!(
            Some("jpg".to_string()),
            image_extension(&[1, 2, 3], Some("image/jpeg"))
        );
        assert_eq!(None, image_extension(&[1, 2, 3], None));
    }

    #[test]
    fn json_nodes_and_materials() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [
                { "children": [1], "translation": [0.0, 2.0, 0.0] },
                { "name": "leaf" }
            ],
            "materials": [
                {
                    "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.25, 1.0, 1.0] },
                    "extensions": { "KHR_materials_clearcoat": { "clearcoatFactor": 0.75 } }
                },
                { "pbrMetallicRoughness": { "metallicFactor": 0.0, "roughnessFactor": 0.5 } }
            ]
        }"#;

        let model = SceneModel::from_slice(json.as_bytes()).unwrap();
        assert_eq!(vec![0], model.roots);
        assert_eq!(vec![1], model.nodes[0].children);
        assert_eq!(Some("leaf".to_string()), model.nodes[1].name);
        assert!(model.nodes[0]
            .local
            .abs_diff_eq(Mat4::from_translation(glam::Vec3::Y * 2.0), 1e-6));

        let material = &model.materials[0];
        assert_eq!([0.5, 0.25, 1.0, 1.0], material.base_color_factor);
        assert_eq!(Some(1.0), material.metallic_factor);
        assert_eq!(Some(1.0), material.roughness_factor);
        assert_eq!(None, material.base_color_texture);
        assert_eq!(
            Some(Clearcoat {
                factor: Some(0.75),
                roughness_factor: Some(0.0),
            }),
            material.clearcoat
        );

        let material = &model.materials[1];
        assert_eq!(Some(0.0), material.metallic_factor);
        assert_eq!(Some(0.5), material.roughness_factor);
        assert_eq!(None, material.clearcoat);
    }

    #[test]
    fn data_uri_payload() {
        let encoded = BASE64_STANDARD.encode(PNG_SIGNATURE);
        let uri = format!("image/png;base64,{}", encoded);
        let (bytes, mime_type) = decode_data_uri(&uri).unwrap();
        assert_eq!(PNG_SIGNATURE.to_vec(), bytes);
        assert_eq!(Some("image/png"), mime_type);

        let uri = format!(";base64,{}", encoded);
        let (_, mime_type) = decode_data_uri(&uri).unwrap();
        assert_eq!(None, mime_type);

        assert!(matches!(
            decode_data_uri("image/png,raw"),
            Err(DataUriError::NotBase64)
        ));
        assert!(matches!(
            decode_data_uri("image/png;base64"),
            Err(DataUriError::MissingPayload)
        ));
        assert!(matches!(
            decode_data_uri("image/png;base64,***"),
            Err(DataUriError::Base64(_))
        ));
    }

    #[test]
    fn data_uri_texture() {
        let json = format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scenes": [{{ "nodes": [] }}],
                "images": [{{ "uri": "data:image/png;base64,{}" }}],
                "textures": [{{ "source": 0 }}],
                "materials": [{{ "pbrMetallicRoughness": {{ "baseColorTexture": {{ "index": 0 }} }} }}]
            }}"#,
            BASE64_STANDARD.encode(PNG_SIGNATURE)
        );

        let model = SceneModel::from_slice(json.as_bytes()).unwrap();
        assert_eq!(Some(0), model.materials[0].base_color_texture);
        let image = model.textures[0].image.as_ref().unwrap();
        assert_eq!("png", image.extension);
        assert_eq!(PNG_SIGNATURE.to_vec(), image.bytes);
    }

    #[test]
    fn cyclic_nodes_import() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "children": [1] }, { "children": [1] }]
        }"#;
        let model = SceneModel::from_slice(json.as_bytes()).unwrap();
        assert_eq!(vec![1], model.nodes[1].children);
    }

    #[test]
    fn missing_scene() {
        let json = r#"{ "asset": { "version": "2.0" } }"#;
        assert!(matches!(
            SceneModel::from_slice(json.as_bytes()),
            Err(ConvertError::NoScene)
        ));
    }

    #[test]
    fn first_scene_without_default() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [1] }, { "nodes": [0] }],
            "nodes": [{}, {}]
        }"#;
        let model = SceneModel::from_slice(json.as_bytes()).unwrap();
        assert_eq!(vec![1], model.roots);
    }

    #[test]
    fn invalid_bytes() {
        assert!(matches!(
            SceneModel::from_slice(b"not a gltf"),
            Err(ConvertError::Gltf(_))
        ));
    }
}
