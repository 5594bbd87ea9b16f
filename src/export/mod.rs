pub mod gltf;
pub mod material;
pub mod usda;
pub mod usdz;
pub mod walk;
