//! Suppression invoker: runs the NMS model over the raw detector output
//!
//! IoU filtering, score thresholding and top-k truncation all happen inside
//! the model; this side only packs the three scalars into a `[3]` tensor and
//! checks the returned shape.

use crate::error::Result;
use crate::model::TensorModel;
use crate::types::{RawCandidateTensor, SuppressedTensor, SuppressionConfig};
use log::debug;
use ndarray::Array1;
use std::sync::Arc;

/// Handle to the suppression network
#[derive(Clone)]
pub struct SuppressionInvoker {
    model: Arc<dyn TensorModel>,
}

impl SuppressionInvoker {
    pub fn new(model: Arc<dyn TensorModel>) -> Self {
        Self { model }
    }

    pub fn run(&self, raw: RawCandidateTensor, config: &SuppressionConfig) -> Result<SuppressedTensor> {
        let config_tensor = Array1::from(config.to_tensor_data().to_vec()).into_dyn();

        let output = self.model.run(vec![raw.into_dyn(), config_tensor])?;
        debug!("{} output shape {:?}", self.model.name(), output.shape());

        SuppressedTensor::from_dyn(output, config.top_k)
    }
}
