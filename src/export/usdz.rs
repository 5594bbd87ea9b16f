//! USDZ packaging of one or more posed models.
//!
//! A USDZ file is a zip archive whose entries are stored without compression
//! and whose data starts on an aligned offset, so viewers can map each file
//! directly. `model.usda` is always the first entry.

use glam::Mat4;
use std::io::{Cursor, Seek, Write};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ConvertOptions;
use crate::error::Result;
use crate::export::material::{resolve_material, TextureTable};
use crate::export::usda::{write_header, write_material, write_root_begin, write_root_end};
use crate::export::walk::write_model_meshes;
use crate::scene::SceneModel;

pub const USDZ_MIME_TYPE: &str = "model/vnd.usdz+zip";
pub const USD_STREAM_MIME_TYPE: &str = "model/usd";

/// Name of the layer entry inside the package.
pub const USDA_ENTRY_NAME: &str = "model.usda";

/// Generated `model.usda` text and the textures it references.
#[derive(Debug, Clone, PartialEq)]
pub struct UsdaDocument {
    pub text: String,
    pub textures: TextureTable,
}

/// Collects posed models and writes them as a single package.
///
/// Model `i` in registration order produces prims named `mesh_i_*` and
/// `mat_i_*` and textures named `i_*`.
#[derive(Debug, Clone, Default)]
pub struct UsdzBuilder {
    models: Vec<(SceneModel, Mat4)>,
    options: ConvertOptions,
}

impl UsdzBuilder {
    pub fn new() -> Self {
        Self::with_options(ConvertOptions::default())
    }

    pub fn with_options(options: ConvertOptions) -> Self {
        Self {
            models: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn root_transform(&self) -> Mat4 {
        self.options.root_transform()
    }

    /// Replace the transform applied after every model's pose.
    pub fn set_root_transform(&mut self, root_transform: Mat4) {
        self.options.root_transform = root_transform.to_cols_array();
    }

    pub fn add_model(&mut self, model: SceneModel, pose: Mat4) {
        self.models.push((model, pose));
    }

    pub fn models(&self) -> &[(SceneModel, Mat4)] {
        &self.models
    }

    /// Generate the `model.usda` text.
    ///
    /// Every model's meshes are written before any material so material names
    /// can be bound before they are defined. Each call starts from an empty
    /// texture table.
    pub fn to_usda(&self) -> Result<UsdaDocument> {
        let root_transform = self.root_transform();
        let mut text = String::new();
        let mut textures = TextureTable::new();

        write_header(&mut text, self.options.apple_ibl_hint)?;
        write_root_begin(&mut text)?;
        for (model_index, (model, pose)) in self.models.iter().enumerate() {
            write_model_meshes(
                &mut text,
                model_index,
                model,
                *pose,
                root_transform,
                &self.options,
            )?;
        }
        write_root_end(&mut text)?;

        for (model_index, (model, _)) in self.models.iter().enumerate() {
            for (material_index, material) in model.materials.iter().enumerate() {
                let prim = resolve_material(
                    model_index,
                    material_index,
                    model,
                    material,
                    self.options.material_mode,
                    &mut textures,
                );
                write_material(&mut text, &prim, &self.options.number_format)?;
            }
        }

        Ok(UsdaDocument { text, textures })
    }

    /// Write the package to a seekable stream and return the stream.
    ///
    /// A failed write leaves the stream with an unusable partial archive.
    pub fn write_usdz<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let document = self.to_usda()?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .with_alignment(self.options.entry_alignment);

        let mut zip = ZipWriter::new(writer);
        zip.start_file(USDA_ENTRY_NAME, options)?;
        zip.write_all(document.text.as_bytes())?;

        for (file_name, bytes) in document.textures.iter() {
            zip.start_file(format!("textures/{}", file_name), options)?;
            zip.write_all(bytes)?;
        }

        let writer = zip.finish()?;
        log::info!(
            "Wrote USDZ package with {} models and {} textures",
            self.models.len(),
            document.textures.len()
        );
        Ok(writer)
    }

    /// Build the complete package in memory.
    pub fn to_usdz_bytes(&self) -> Result<Vec<u8>> {
        let cursor = self.write_usdz(Cursor::new(Vec::new()))?;
        Ok(cursor.into_inner())
    }

    /// Build the package in memory, then write it to an async stream.
    ///
    /// Nothing is written if building fails.
    pub async fn write_usdz_async<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_usdz_bytes()?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write every model merged into one binary glTF, see [crate::export::gltf].
    pub fn write_glb<W: Write>(&self, writer: W) -> Result<()> {
        crate::export::gltf::export_models_to_glb(&self.models, self.root_transform(), writer)
    }
}

/// Convert a GLB asset to USDZ bytes with an identity pose and default options.
pub fn convert_glb_to_usdz(bytes: &[u8]) -> Result<Vec<u8>> {
    let model = SceneModel::from_slice(bytes)?;
    let mut builder = UsdzBuilder::new();
    builder.add_model(model, Mat4::IDENTITY);
    builder.to_usdz_bytes()
}
