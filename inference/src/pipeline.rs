/// Detection pipeline: letterbox -> detector -> suppression -> decode
///
/// The two model handles follow a set-once lifecycle:
/// - unset while startup has not finished
/// - `Ready` after both models loaded and warmed up
/// - `NotReady` if loading or warm-up failed (requests then fail fast)
use crate::detector::DetectorInvoker;
use crate::error::{DetectionError, Result};
use crate::model::{OnnxModel, TensorModel};
use crate::postprocessing;
use crate::preprocessing;
use crate::suppression::SuppressionInvoker;
use crate::types::{
    Detection, DetectionResult, ImageData, PipelineConfig, PreprocessedTensor, SuppressionConfig,
};
use log::{debug, error, info};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Both model handles, immutable once loaded
#[derive(Clone)]
pub struct LoadedModels {
    pub detector: DetectorInvoker,
    pub suppressor: SuppressionInvoker,
}

/// Outcome of startup
pub enum ModelState {
    Ready(LoadedModels),
    NotReady { reason: String },
}

pub struct DetectionPipeline {
    config: PipelineConfig,
    state: OnceLock<ModelState>,
}

static PIPELINE_INSTANCE: OnceLock<Arc<DetectionPipeline>> = OnceLock::new();

/// Initialize the process-wide pipeline, loading and warming up the models once
pub fn init_global(config: PipelineConfig) -> Arc<DetectionPipeline> {
    PIPELINE_INSTANCE
        .get_or_init(|| {
            let pipeline = DetectionPipeline::new(config);
            pipeline.startup();
            Arc::new(pipeline)
        })
        .clone()
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load both ONNX models from the configured paths and warm them up.
    ///
    /// Failures are logged and leave the pipeline not ready instead of
    /// propagating; returns whether the pipeline is ready afterwards.
    pub fn startup(&self) -> bool {
        if self.state.get().is_some() {
            return self.is_ready();
        }

        let loaded = self.config.validate().and_then(|_| self.load_models());
        self.finish_startup(loaded)
    }

    /// Same as [`startup`](Self::startup) with already constructed operators
    pub fn startup_with_models(
        &self,
        detector: Arc<dyn TensorModel>,
        suppressor: Arc<dyn TensorModel>,
    ) -> bool {
        if self.state.get().is_some() {
            return self.is_ready();
        }

        let loaded = self.config.validate().map(|_| LoadedModels {
            detector: DetectorInvoker::new(detector, self.config.input_shape()),
            suppressor: SuppressionInvoker::new(suppressor),
        });
        self.finish_startup(loaded)
    }

    fn load_models(&self) -> Result<LoadedModels> {
        let config = &self.config;

        let detector = OnnxModel::load(
            &config.detector_model_path,
            vec![config.detector_input.clone()],
            config.detector_output.clone(),
            config,
        )?;
        let suppressor = OnnxModel::load(
            &config.nms_model_path,
            config.nms_inputs.to_vec(),
            config.nms_output.clone(),
            config,
        )?;

        Ok(LoadedModels {
            detector: DetectorInvoker::new(Arc::new(detector), config.input_shape()),
            suppressor: SuppressionInvoker::new(Arc::new(suppressor)),
        })
    }

    fn finish_startup(&self, loaded: Result<LoadedModels>) -> bool {
        let state = match loaded.and_then(|models| self.warm_up(&models).map(|_| models)) {
            Ok(models) => ModelState::Ready(models),
            Err(e) => {
                error!("Model startup failed, pipeline marked not ready: {}", e);
                ModelState::NotReady {
                    reason: e.to_string(),
                }
            }
        };

        // A concurrent startup may have won; its outcome stands.
        let _ = self.state.set(state);
        self.is_ready()
    }

    /// One throwaway pass with an all-zero input so the first real request
    /// does not pay for runtime initialization.
    fn warm_up(&self, models: &LoadedModels) -> Result<()> {
        let (width, height) = self.config.input_size;
        let start = Instant::now();

        let raw = models.detector.run(PreprocessedTensor::zeros(width, height))?;
        models.suppressor.run(raw, &self.config.suppression)?;

        info!(
            "✓ Warm-up inference finished in {:.1}ms",
            start.elapsed().as_secs_f32() * 1000.0
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state.get(), Some(ModelState::Ready(_)))
    }

    fn models(&self) -> Result<&LoadedModels> {
        match self.state.get() {
            Some(ModelState::Ready(models)) => Ok(models),
            Some(ModelState::NotReady { reason }) => Err(DetectionError::not_ready(reason.clone())),
            None => Err(DetectionError::not_ready("startup has not completed")),
        }
    }

    /// Detect objects in an encoded image (PNG/JPEG bytes) with the deployment thresholds
    pub async fn detect(&self, image: &[u8]) -> Result<Vec<Detection>> {
        self.detect_with_config(image, &self.config.suppression).await
    }

    /// Detect objects in an encoded image using request-specific thresholds
    pub async fn detect_with_config(
        &self,
        image: &[u8],
        suppression: &SuppressionConfig,
    ) -> Result<Vec<Detection>> {
        self.models()?;
        let image = ImageData::from_bytes(image)?;
        Ok(self
            .detect_image_with_config(&image, suppression)
            .await?
            .detections)
    }

    /// Detect objects in an already decoded pixel grid
    pub async fn detect_image(&self, image: &ImageData) -> Result<DetectionResult> {
        self.detect_image_with_config(image, &self.config.suppression)
            .await
    }

    pub async fn detect_image_with_config(
        &self,
        image: &ImageData,
        suppression: &SuppressionConfig,
    ) -> Result<DetectionResult> {
        let models = self.models()?;
        suppression
            .validate()
            .map_err(|e| DetectionError::invalid_input(e.to_string()))?;
        let (target_width, target_height) = self.config.input_size;

        let (tensor, ratio) = preprocessing::letterbox(image, target_width, target_height)?;
        debug!(
            "Letterboxed {}x{} image, ratio ({:.3}, {:.3})",
            image.width, image.height, ratio.x, ratio.y
        );

        let start = Instant::now();

        let detector = models.detector.clone();
        let raw = tokio::task::spawn_blocking(move || detector.run(tensor))
            .await
            .map_err(|e| DetectionError::inference(format!("Detector task failed: {}", e)))??;

        let suppressor = models.suppressor.clone();
        let suppression = *suppression;
        let selected = tokio::task::spawn_blocking(move || suppressor.run(raw, &suppression))
            .await
            .map_err(|e| DetectionError::inference(format!("Suppression task failed: {}", e)))??;

        let inference_time_ms = start.elapsed().as_secs_f32() * 1000.0;

        let detections = postprocessing::decode(&selected, ratio)?;
        debug!(
            "Detected {} objects (inference {:.1}ms)",
            detections.len(),
            inference_time_ms
        );

        Ok(DetectionResult::new(
            detections,
            inference_time_ms,
            image.width,
            image.height,
        ))
    }
}
