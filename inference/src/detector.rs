//! Detector invoker: feeds the letterboxed tensor to the detection model

use crate::error::{DetectionError, Result};
use crate::model::TensorModel;
use crate::types::{PreprocessedTensor, RawCandidateTensor};
use log::debug;
use std::sync::Arc;

/// Handle to the detection network
#[derive(Clone)]
pub struct DetectorInvoker {
    model: Arc<dyn TensorModel>,
    input_shape: [usize; 4],
}

impl DetectorInvoker {
    /// `input_shape` is the exact `[1, 3, H, W]` the model was exported with
    pub fn new(model: Arc<dyn TensorModel>, input_shape: [usize; 4]) -> Self {
        Self { model, input_shape }
    }

    /// Run the detector once. No retry; any failure is an inference error.
    pub fn run(&self, tensor: PreprocessedTensor) -> Result<RawCandidateTensor> {
        if tensor.shape() != self.input_shape {
            return Err(DetectionError::inference(format!(
                "Detector expects input {:?}, got {:?}",
                self.input_shape,
                tensor.shape()
            )));
        }

        let output = self.model.run(vec![tensor.into_dyn()])?;
        debug!("{} output shape {:?}", self.model.name(), output.shape());

        RawCandidateTensor::from_dyn(output)
    }
}
