use std::path::Path;

use ndarray::{Array2, ArrayView4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use pipeline_config::ModelSettings;
use tracing::info;

use super::FeatureExtractor;
use crate::error::ExtractionError;

/// Side length of the square input VGG-style networks expect.
pub const DEFAULT_INPUT_SIDE: u32 = 224;

/// Runs an exported ONNX feature network through onnxruntime.
pub struct OnnxExtractor {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: (u32, u32),
    output_dim: usize,
}

impl OnnxExtractor {
    pub fn from_settings(model: &ModelSettings, output_dim: usize) -> Result<Self, ExtractionError> {
        Self::from_file(
            &model.weights_path,
            &model.input_name,
            &model.output_name,
            output_dim,
        )
    }

    pub fn from_file(
        path: &Path,
        input_name: &str,
        output_name: &str,
        output_dim: usize,
    ) -> Result<Self, ExtractionError> {
        if !path.is_file() {
            return Err(ExtractionError::Extractor(format!(
                "model weights {} not found",
                path.display()
            )));
        }
        let session = Session::builder()
            .map_err(model_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error)?
            .commit_from_file(path)
            .map_err(model_error)?;
        info!(model = %path.display(), output_dim, "loaded feature network");
        Ok(Self {
            session,
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
            input_size: (DEFAULT_INPUT_SIDE, DEFAULT_INPUT_SIDE),
            output_dim,
        })
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn extract(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ExtractionError> {
        let rows = batch.shape()[0];
        let input = batch.as_standard_layout().into_owned();
        let outputs = self
            .session
            .run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(&input).map_err(model_error)?
            ])
            .map_err(model_error)?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ExtractionError::Extractor(format!("model has no output `{}`", self.output_name))
        })?;
        output
            .try_extract_array::<f32>()
            .map_err(model_error)?
            .into_owned()
            .into_shape_with_order((rows, self.output_dim))
            .map_err(model_error)
    }
}

fn model_error(err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Extractor(err.to_string())
}
