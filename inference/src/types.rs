//! Type definitions for the letterbox detection pipeline

use crate::error::{DetectionError, Result};
use ndarray::{Array2, Array3, Array4, ArrayD, ArrayView1, Axis, Ix3};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// COCO class names (80 classes), indexed by label
const COCO_CLASSES: &[&str] = &[
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Human-readable name for a class index, `class_N` past the COCO table
pub fn class_name(label: u32) -> String {
    COCO_CLASSES
        .get(label as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{}", label))
}

/// Pixel layout of an [`ImageData`] buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    RGB,
    BGR,
    RGBA,
    BGRA,
}

impl ImageFormat {
    pub fn channels(&self) -> u32 {
        match self {
            ImageFormat::RGB | ImageFormat::BGR => 3,
            ImageFormat::RGBA | ImageFormat::BGRA => 4,
        }
    }
}

/// Decoded pixel grid (row-major, interleaved channels).
///
/// Owned by whoever decoded it; the pipeline only reads it.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Pixel format
    pub format: ImageFormat,
}

impl ImageData {
    /// Create new image data
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Decode an encoded image (PNG/JPEG) held in memory.
    ///
    /// The alpha channel is kept so that the preprocessor is the single place
    /// where it gets dropped.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| {
            DetectionError::invalid_input(format!("Failed to decode image: {}", e))
        })?;

        Ok(Self::from_dynamic_image(img))
    }

    /// Load and decode an image file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let img = image::open(path.as_ref()).map_err(|e| {
            DetectionError::invalid_input(format!(
                "Failed to load image {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Ok(Self::from_dynamic_image(img))
    }

    /// Convert from DynamicImage
    pub fn from_dynamic_image(img: image::DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(rgba.into_raw(), width, height, ImageFormat::RGBA)
    }

    /// Get number of channels
    pub fn channels(&self) -> u32 {
        self.format.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Validate image data consistency
    pub fn validate(&self) -> bool {
        let expected_size =
            self.width as usize * self.height as usize * self.channels() as usize;
        self.data.len() == expected_size
    }
}

/// Factors mapping model-canvas coordinates back through the square padding.
///
/// `x = padded / width`, `y = padded / height`; the longer side always gets 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRatio {
    pub x: f32,
    pub y: f32,
}

impl ScaleRatio {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Ratios for an image of `width` x `height` padded to a square of its longer side
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        let max_size = width.max(height) as f32;
        Self {
            x: max_size / width as f32,
            y: max_size / height as f32,
        }
    }

    pub fn identity() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// Scalar thresholds fed to the suppression model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Maximum number of detections kept
    pub top_k: u32,
    /// IoU above which same-class boxes are suppressed
    pub iou_threshold: f32,
    /// Minimum class score for a candidate to survive
    pub score_threshold: f32,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            iou_threshold: 0.45,
            score_threshold: 0.25,
        }
    }
}

impl SuppressionConfig {
    pub fn new(top_k: u32, iou_threshold: f32, score_threshold: f32) -> Self {
        Self {
            top_k,
            iou_threshold,
            score_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(DetectionError::config("top_k must be positive"));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(DetectionError::config(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(DetectionError::config(format!(
                "score_threshold must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }

    /// Packed `[top_k, iou_threshold, score_threshold]` as the model expects it
    pub fn to_tensor_data(&self) -> [f32; 3] {
        [self.top_k as f32, self.iou_threshold, self.score_threshold]
    }
}

/// Letterboxed model input, `[1, 3, H, W]`, RGB, values in [0, 1]
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
    data: Array4<f32>,
}

impl PreprocessedTensor {
    pub fn new(data: Array4<f32>) -> Self {
        Self { data }
    }

    /// All-zero tensor of the model input shape, used for warm-up
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            data: Array4::zeros((1, 3, height as usize, width as usize)),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ndarray::ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn into_dyn(self) -> ArrayD<f32> {
        self.data.into_dyn()
    }
}

/// Detector output passed untouched to the suppression model
#[derive(Debug, Clone)]
pub struct RawCandidateTensor {
    data: Array3<f32>,
}

impl RawCandidateTensor {
    /// Wrap a detector output, checking it is a single-batch rank-3 tensor
    pub fn from_dyn(data: ArrayD<f32>) -> Result<Self> {
        let shape = data.shape().to_vec();
        let data = data.into_dimensionality::<Ix3>().map_err(|_| {
            DetectionError::inference(format!(
                "Detector output must be rank 3, got shape {:?}",
                shape
            ))
        })?;
        if data.shape()[0] != 1 {
            return Err(DetectionError::inference(format!(
                "Detector output must have batch size 1, got shape {:?}",
                shape
            )));
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn into_dyn(self) -> ArrayD<f32> {
        self.data.into_dyn()
    }
}

/// Rows surviving suppression, each `[cx, cy, w, h, score_0..score_n]`
#[derive(Debug, Clone)]
pub struct SuppressedTensor {
    rows: Array2<f32>,
}

impl SuppressedTensor {
    /// Wrap a suppression output of shape `[1, rows, 4 + classes]`.
    ///
    /// Fails when the row count exceeds `top_k` or rows cannot hold a box and a score.
    pub fn from_dyn(data: ArrayD<f32>, top_k: u32) -> Result<Self> {
        let shape = data.shape().to_vec();
        let data = data.into_dimensionality::<Ix3>().map_err(|_| {
            DetectionError::inference(format!(
                "Suppression output must be rank 3, got shape {:?}",
                shape
            ))
        })?;
        if shape[0] != 1 {
            return Err(DetectionError::inference(format!(
                "Suppression output must have batch size 1, got shape {:?}",
                shape
            )));
        }
        let (rows, cols) = (shape[1], shape[2]);
        if rows > top_k as usize {
            return Err(DetectionError::inference(format!(
                "Suppression returned {} rows, more than top_k = {}",
                rows, top_k
            )));
        }
        if rows > 0 && cols < 5 {
            return Err(DetectionError::inference(format!(
                "Suppression rows need at least 5 values (box + 1 score), got {}",
                cols
            )));
        }
        Ok(Self {
            rows: data.index_axis_move(Axis(0), 0),
        })
    }

    /// Build directly from rows, bypassing shape checks
    pub fn from_rows(rows: Array2<f32>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = ArrayView1<'_, f32>> {
        self.rows.rows().into_iter()
    }
}

/// Single detection in original-image orientation (top-left origin)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class index
    pub label: u32,
    /// Score of the winning class
    pub probability: f32,
    /// `[x, y, width, height]`
    pub bounding: [f32; 4],
}

impl Detection {
    pub fn new(label: u32, probability: f32, bounding: [f32; 4]) -> Self {
        Self {
            label,
            probability,
            bounding,
        }
    }

    pub fn class_name(&self) -> String {
        class_name(self.label)
    }

    pub fn x(&self) -> f32 {
        self.bounding[0]
    }

    pub fn y(&self) -> f32 {
        self.bounding[1]
    }

    pub fn width(&self) -> f32 {
        self.bounding[2]
    }

    pub fn height(&self) -> f32 {
        self.bounding[3]
    }
}

/// Detection results for a single image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Decoded detections, in suppression-model order
    pub detections: Vec<Detection>,
    /// Wall-clock time spent in the two model calls
    pub inference_time_ms: f32,
    /// Input image dimensions
    pub image_width: u32,
    pub image_height: u32,
}

impl DetectionResult {
    pub fn new(
        detections: Vec<Detection>,
        inference_time_ms: f32,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        Self {
            detections,
            inference_time_ms,
            image_width,
            image_height,
        }
    }

    /// Get number of detections
    pub fn count(&self) -> usize {
        self.detections.len()
    }

    /// Filter detections by minimum confidence
    pub fn filter_by_confidence(mut self, min_confidence: f32) -> Self {
        self.detections
            .retain(|det| det.probability >= min_confidence);
        self
    }

    /// Get detections sorted by confidence (descending)
    pub fn sorted_by_confidence(mut self) -> Self {
        self.detections
            .sort_by(|a, b| b.probability.total_cmp(&a.probability));
        self
    }

    /// Boxes mapped onto the actual pixel grid of the source image.
    ///
    /// Decoded boxes live on a `input_size` canvas stretched over the image;
    /// this rescales them by `image / input_size` per axis.
    pub fn to_image_pixels(&self, input_size: (u32, u32)) -> Vec<Detection> {
        let sx = self.image_width as f32 / input_size.0 as f32;
        let sy = self.image_height as f32 / input_size.1 as f32;
        self.detections
            .iter()
            .map(|det| {
                let [x, y, w, h] = det.bounding;
                Detection::new(det.label, det.probability, [x * sx, y * sy, w * sx, h * sy])
            })
            .collect()
    }
}

/// Configuration for the two-model pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detector ONNX model
    pub detector_model_path: String,
    /// Suppression (NMS) ONNX model
    pub nms_model_path: String,

    /// Model input size (width, height)
    pub input_size: (u32, u32),

    pub suppression: SuppressionConfig,

    /// Tensor names of the detector
    pub detector_input: String,
    pub detector_output: String,

    /// Tensor names of the suppression model, inputs as `[candidates, config]`
    pub nms_inputs: [String; 2],
    pub nms_output: String,

    /// Use GPU acceleration if available
    pub use_gpu: bool,

    /// GPU device ID (for multi-GPU systems)
    pub gpu_device_id: i32,

    /// Number of threads for CPU inference
    pub num_threads: Option<usize>,

    /// Independent ONNX Runtime sessions per model, so that concurrent
    /// requests do not queue on a single session
    pub sessions_per_model: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector_model_path: "models/yolov8n.onnx".to_string(),
            nms_model_path: "models/nms-yolov8.onnx".to_string(),
            input_size: (640, 640),
            suppression: SuppressionConfig::default(),
            detector_input: "images".to_string(),
            detector_output: "output0".to_string(),
            nms_inputs: ["detection".to_string(), "config".to_string()],
            nms_output: "selected".to_string(),
            use_gpu: false,
            gpu_device_id: 0,
            num_threads: None,
            sessions_per_model: 1,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; absent fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return Err(DetectionError::config(format!(
                "input_size must be non-zero, got {:?}",
                self.input_size
            )));
        }
        if self.sessions_per_model == 0 {
            return Err(DetectionError::config("sessions_per_model must be at least 1"));
        }
        self.suppression.validate()
    }

    /// Full detector input shape `[1, 3, H, W]`
    pub fn input_shape(&self) -> [usize; 4] {
        [1, 3, self.input_size.1 as usize, self.input_size.0 as usize]
    }
}
