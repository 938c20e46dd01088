//! Opaque tensor-in/tensor-out model operators
//!
//! Both networks in the pipeline are treated as black boxes behind
//! [`TensorModel`]. [`OnnxModel`] runs an ONNX file through ONNX Runtime;
//! tests and alternative runtimes implement the trait directly.

use crate::error::{DetectionError, Result};
use crate::types::PipelineConfig;
use log::{debug, info, warn};
use ndarray::ArrayD;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::Tensor;
use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Common interface for the detector and suppression networks
pub trait TensorModel: Send + Sync {
    /// Model name (for logging/debugging)
    fn name(&self) -> &str;

    /// Run one inference. Inputs are positional and the model's single output is returned.
    fn run(&self, inputs: Vec<ArrayD<f32>>) -> Result<ArrayD<f32>>;
}

/// Fixed set of interchangeable slots handed out round-robin.
///
/// An ONNX Runtime session needs exclusive access for each run, so every
/// session sits behind its own lock. `acquire` prefers an idle slot and only
/// waits when all of them are busy.
pub(crate) struct SessionPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SessionPool<T> {
    /// `slots` must not be empty
    pub(crate) fn new(slots: Vec<T>) -> Self {
        Self {
            slots: slots.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn acquire(&self) -> Result<MutexGuard<'_, T>> {
        if self.slots.is_empty() {
            return Err(DetectionError::inference("Session pool is empty"));
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        for offset in 0..self.slots.len() {
            let index = (start + offset) % self.slots.len();
            if let Ok(guard) = self.slots[index].try_lock() {
                return Ok(guard);
            }
        }

        self.slots[start]
            .lock()
            .map_err(|_| DetectionError::inference("Session lock poisoned"))
    }
}

/// ONNX Runtime backed model with fixed input/output tensor names
pub struct OnnxModel {
    name: String,
    sessions: SessionPool<Session>,
    input_names: Vec<String>,
    output_name: String,
}

impl OnnxModel {
    /// Load a model, trying the enabled GPU providers before falling back to CPU
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_names: Vec<String>,
        output_name: String,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(DetectionError::model_load(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        info!("Loading model {} from {}", name, model_path.display());

        let session = Self::create_session(model_path, config)?;

        let declared: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        debug!("{} declares inputs {:?}", name, declared);
        for input in &input_names {
            if !declared.contains(&input.as_str()) {
                return Err(DetectionError::model_load(format!(
                    "{} has no input named '{}' (declared: {:?})",
                    name, input, declared
                )));
            }
        }

        let mut sessions = Vec::with_capacity(config.sessions_per_model);
        sessions.push(session);
        while sessions.len() < config.sessions_per_model {
            sessions.push(Self::create_session(model_path, config)?);
        }

        let sessions = SessionPool::new(sessions);
        info!("✓ Model {} loaded ({} session(s))", name, sessions.len());
        Ok(Self {
            name,
            sessions,
            input_names,
            output_name,
        })
    }

    fn create_session(model_path: &Path, config: &PipelineConfig) -> Result<Session> {
        if config.use_gpu {
            #[cfg(feature = "cuda")]
            {
                match Self::try_create_cuda_session(model_path, config) {
                    Ok(session) => return Ok(session),
                    Err(e) => warn!("CUDA initialization failed: {}", e),
                }
            }

            #[cfg(feature = "tensorrt")]
            {
                match Self::try_create_tensorrt_session(model_path, config) {
                    Ok(session) => return Ok(session),
                    Err(e) => warn!("TensorRT initialization failed: {}", e),
                }
            }

            #[cfg(feature = "metal")]
            {
                match Self::try_create_coreml_session(model_path, config) {
                    Ok(session) => return Ok(session),
                    Err(e) => warn!("CoreML initialization failed: {}", e),
                }
            }

            warn!("No GPU backend available, falling back to CPU");
        }

        Self::create_cpu_session(model_path, config)
    }

    fn base_builder(config: &PipelineConfig) -> Result<ort::session::builder::SessionBuilder> {
        let builder = Session::builder()
            .map_err(|e| DetectionError::model_load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectionError::model_load(e.to_string()))?;

        match config.num_threads {
            Some(threads) => builder
                .with_intra_threads(threads)
                .map_err(|e| DetectionError::model_load(e.to_string())),
            None => Ok(builder),
        }
    }

    #[cfg(feature = "cuda")]
    fn try_create_cuda_session(model_path: &Path, config: &PipelineConfig) -> Result<Session> {
        use ort::execution_providers::CUDAExecutionProvider;

        info!("Attempting to use CUDA backend (NVIDIA GPU)...");
        Self::base_builder(config)?
            .with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(config.gpu_device_id)
                .build()])
            .map_err(|e| DetectionError::model_load(format!("CUDA provider failed: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| {
                DetectionError::model_load(format!("Failed to load model with CUDA: {}", e))
            })
    }

    #[cfg(feature = "tensorrt")]
    fn try_create_tensorrt_session(model_path: &Path, config: &PipelineConfig) -> Result<Session> {
        use ort::execution_providers::TensorRTExecutionProvider;

        info!("Attempting to use TensorRT backend (NVIDIA GPU - optimized)...");
        Self::base_builder(config)?
            .with_execution_providers([TensorRTExecutionProvider::default()
                .with_device_id(config.gpu_device_id)
                .with_fp16(true)
                .build()])
            .map_err(|e| DetectionError::model_load(format!("TensorRT provider failed: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| {
                DetectionError::model_load(format!("Failed to load model with TensorRT: {}", e))
            })
    }

    #[cfg(feature = "metal")]
    fn try_create_coreml_session(model_path: &Path, config: &PipelineConfig) -> Result<Session> {
        use ort::execution_providers::CoreMLExecutionProvider;

        info!("Attempting to use CoreML (Metal) backend...");
        Self::base_builder(config)?
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
            .map_err(|e| DetectionError::model_load(format!("CoreML provider failed: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| DetectionError::model_load(format!("Failed to load model: {}", e)))
    }

    fn create_cpu_session(model_path: &Path, config: &PipelineConfig) -> Result<Session> {
        Self::base_builder(config)?
            .commit_from_file(model_path)
            .map_err(|e| DetectionError::model_load(format!("Failed to load model: {}", e)))
    }
}

impl TensorModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, inputs: Vec<ArrayD<f32>>) -> Result<ArrayD<f32>> {
        if inputs.len() != self.input_names.len() {
            return Err(DetectionError::inference(format!(
                "{} expects {} inputs, got {}",
                self.name,
                self.input_names.len(),
                inputs.len()
            )));
        }

        let mut bound: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(inputs.len());
        for (name, array) in self.input_names.iter().zip(inputs) {
            let tensor = Tensor::from_array(array)
                .map_err(|e| DetectionError::inference(e.to_string()))?;
            bound.push((Cow::Borrowed(name.as_str()), SessionInputValue::from(tensor)));
        }

        let mut session = self.sessions.acquire()?;

        let outputs = session
            .run(bound)
            .map_err(|e| DetectionError::inference(format!("{}: {}", self.name, e)))?;

        let output_array = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                DetectionError::inference(format!(
                    "{} produced no output named '{}'",
                    self.name, self.output_name
                ))
            })?
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::inference(e.to_string()))?
            .into_owned();

        // Drop outputs to release the borrow on the session
        drop(outputs);

        Ok(output_array)
    }
}
