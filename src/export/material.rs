//! Mapping of scene materials to USD preview-surface prims.

use crate::config::MaterialMode;
use crate::export::usda::{DiffuseInput, MaterialPrim};
use crate::scene::{Material, SceneModel};

/// Texture files collected during one package build, in discovery order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TextureTable {
    entries: Vec<(String, Vec<u8>)>,
}

impl TextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under `file_name` unless the name is already present.
    ///
    /// Returns `true` if the entry was added.
    pub fn insert_once(&mut self, file_name: &str, bytes: impl FnOnce() -> Vec<u8>) -> bool {
        if self.contains(file_name) {
            return false;
        }
        self.entries.push((file_name.to_string(), bytes()));
        true
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Prim name of a material, unique across every model in a package.
pub fn material_name(model_index: usize, material_index: usize) -> String {
    format!("mat_{}_{}", model_index, material_index)
}

/// Package file name of a texture, unique across every model in a package.
pub fn texture_file_name(model_index: usize, texture_index: usize, extension: &str) -> String {
    format!("{}_{}.{}", model_index, texture_index, extension)
}

/// Build the prim for one material and register its base color texture.
pub fn resolve_material(
    model_index: usize,
    material_index: usize,
    model: &SceneModel,
    material: &Material,
    mode: MaterialMode,
    textures: &mut TextureTable,
) -> MaterialPrim {
    let name = material_name(model_index, material_index);

    let diffuse = match base_color_file(model_index, model, material, textures) {
        Some(file) => DiffuseInput::Texture(file),
        None => {
            let [r, g, b, _] = material.base_color_factor;
            DiffuseInput::Color([r, g, b])
        }
    };

    let (mut metallic, mut roughness) = (material.metallic_factor, material.roughness_factor);
    if mode == MaterialMode::Legacy && metallic.is_none() && roughness.is_none() {
        metallic = Some(0.0);
        roughness = Some(1.0);
    }

    let clearcoat = material.clearcoat.unwrap_or_default();

    MaterialPrim {
        name,
        diffuse,
        clearcoat: clearcoat.factor,
        clearcoat_roughness: clearcoat.roughness_factor,
        metallic,
        roughness,
    }
}

fn base_color_file(
    model_index: usize,
    model: &SceneModel,
    material: &Material,
    textures: &mut TextureTable,
) -> Option<String> {
    let texture_index = material.base_color_texture?;
    let Some(texture) = model.textures.get(texture_index) else {
        log::warn!(
            "Material references missing texture {} in model {}",
            texture_index,
            model_index
        );
        return None;
    };
    let Some(image) = &texture.image else {
        log::warn!(
            "Texture {} in model {} has no image data, using base color factor",
            texture_index,
            model_index
        );
        return None;
    };

    let file_name = texture_file_name(model_index, texture_index, &image.extension);
    if textures.insert_once(&file_name, || image.bytes.clone()) {
        log::debug!("Registered texture {} ({} bytes)", file_name, image.bytes.len());
    }
    Some(file_name)
}
