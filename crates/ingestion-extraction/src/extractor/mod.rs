use ndarray::{Array2, ArrayView4};

use crate::error::ExtractionError;

#[cfg(feature = "onnx")]
pub mod onnx;

/// A pretrained network truncated at its penultimate layer.
pub trait FeatureExtractor {
    /// `(width, height)` of the images the network accepts.
    fn input_size(&self) -> (u32, u32);

    /// Length of one feature vector.
    fn output_dim(&self) -> usize;

    /// Maps an `(n, 3, height, width)` batch to `(n, output_dim)` features.
    fn extract(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ExtractionError>;
}

impl<X: FeatureExtractor + ?Sized> FeatureExtractor for &mut X {
    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn output_dim(&self) -> usize {
        (**self).output_dim()
    }

    fn extract(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ExtractionError> {
        (**self).extract(batch)
    }
}
