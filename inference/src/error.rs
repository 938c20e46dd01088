//! Error types for the letterbox detection pipeline

use thiserror::Error;

/// Result type alias for the detection library
pub type Result<T> = std::result::Result<T, DetectionError>;

/// Errors that can occur while running the detection pipeline
#[derive(Error, Debug)]
pub enum DetectionError {
    /// Malformed or zero-area image, or a pixel buffer that does not match its layout
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The pipeline was invoked before (or without) a successful model load
    #[error("Models not ready: {0}")]
    ModelNotReady(String),

    /// A model invocation failed or returned a tensor outside its contract
    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl DetectionError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_ready<S: Into<String>>(msg: S) -> Self {
        Self::ModelNotReady(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// True for the fail-fast "not ready" condition
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::ModelNotReady(_))
    }
}
