//! Letterbox Object Detection Library
//!
//! Runs a two-stage ONNX pipeline over a single image: an object detector
//! followed by a non-maximum-suppression model. Images are padded to a square
//! (bottom/right) before inference and the surviving boxes are scaled back
//! through the same padding.

pub mod detector;
pub mod error;
pub mod image_utils;
pub mod model;
pub mod pipeline;
pub mod postprocessing;
pub mod preprocessing;
pub mod suppression;
pub mod types;

pub use detector::DetectorInvoker;
pub use error::{DetectionError, Result};
pub use model::{OnnxModel, TensorModel};
pub use pipeline::DetectionPipeline;
pub use suppression::SuppressionInvoker;
pub use types::{
    Detection, DetectionResult, ImageData, ImageFormat, PipelineConfig, ScaleRatio,
    SuppressionConfig,
};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
