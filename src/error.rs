use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Data
    #[error("Dataset unavailable: {0}")]
    DataUnavailable(String),

    #[error("Label {label} is outside the label schema of {num_classes} classes")]
    InvalidLabel { label: usize, num_classes: usize },

    // Tokenization
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    // Model
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Resources exhausted at batch size {batch_size}: {detail}")]
    ResourceExhausted { batch_size: usize, detail: String },

    #[error("Cannot load pretrained weights: {0}")]
    Weights(String),

    // Configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network/Download
    #[error("Download failed: {0}")]
    Download(String),

    // Pass-through from dependencies
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        Error::Download(value.to_string())
    }
}
