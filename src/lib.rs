//! Convert glTF scenes into USDZ packages.
//!
//! Models are decoded into a [SceneModel], registered on a [UsdzBuilder] with
//! a pose, and written as a single package:
//!
//! ```no_run
//! use glb2usdz::{SceneModel, UsdzBuilder};
//! use glam::Mat4;
//!
//! # fn main() -> glb2usdz::Result<()> {
//! let model = SceneModel::from_path("robot.glb")?;
//! let mut builder = UsdzBuilder::new();
//! builder.add_model(model, Mat4::IDENTITY);
//! std::fs::write("robot.usdz", builder.to_usdz_bytes()?)?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod geometry;
pub mod scene;
pub mod transform;

pub use config::{ConvertOptions, MaterialMode, NumberFormat, XformMode};
pub use error::{ConvertError, Result};
pub use export::gltf::{export_models_to_glb, GLB_MIME_TYPE};
pub use export::usdz::{
    convert_glb_to_usdz, UsdaDocument, UsdzBuilder, USDZ_MIME_TYPE, USD_STREAM_MIME_TYPE,
};
pub use scene::SceneModel;
