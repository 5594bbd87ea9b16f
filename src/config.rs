use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// How node transforms are written to USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XformMode {
    /// A single `matrix4d xformOp:transform`.
    #[default]
    Matrix,
    /// Separate translate, rotateXYZ and scale ops. Shear is lost.
    Decomposed,
}

/// Which scalar inputs a material shader receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialMode {
    /// Only values present on the source material are written.
    #[default]
    Standard,
    /// Writes `metallic = 0` and `roughness = 1` when the source has no metallic-roughness data.
    Legacy,
}

/// Fixed-point formatting used for every vector and scalar in the USD text.
///
/// Rust formatting never consults the process locale, so the decimal
/// separator is always `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormat {
    pub decimals: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self { decimals: 7 }
    }
}

impl NumberFormat {
    pub fn scalar(&self, value: f32) -> String {
        format!("{:.*}", self.decimals, value)
    }

    pub fn vec2(&self, v: [f32; 2]) -> String {
        format!("({:.*}, {:.*})", self.decimals, v[0], self.decimals, v[1])
    }

    pub fn vec3(&self, v: [f32; 3]) -> String {
        format!(
            "({:.*}, {:.*}, {:.*})",
            self.decimals, v[0], self.decimals, v[1], self.decimals, v[2]
        )
    }
}

/// Configuration for USDZ conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub xform_mode: XformMode,
    pub material_mode: MaterialMode,
    /// Adds the `Apple.preferredIblVersion = 2` layer data Quick Look expects.
    pub apple_ibl_hint: bool,
    pub number_format: NumberFormat,
    /// Column-major transform applied after every model's pose.
    pub root_transform: [f32; 16],
    /// Nodes deeper than this are not visited.
    pub max_depth: usize,
    /// Byte alignment of the data of every zip entry, `model.usda` included.
    pub entry_alignment: u16,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            xform_mode: XformMode::Matrix,
            material_mode: MaterialMode::Standard,
            apple_ibl_hint: true,
            number_format: NumberFormat::default(),
            root_transform: glam::Mat4::IDENTITY.to_cols_array(),
            max_depth: 256,
            entry_alignment: 64,
        }
    }
}

impl ConvertOptions {
    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn root_transform(&self) -> glam::Mat4 {
        glam::Mat4::from_cols_array(&self.root_transform)
    }
}
