use thiserror::Error;

/// Errors that can occur while importing a scene or writing a package.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to format USD text")]
    Format(#[from] std::fmt::Error),

    #[error("glTF document has no scene")]
    NoScene,
}

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;
