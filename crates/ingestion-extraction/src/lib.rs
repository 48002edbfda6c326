//! Image feature extraction into a feature store, plus word vector import.
//!
//! The [`ExtractionDriver`] walks one image directory tree, pushes the files
//! through a [`FeatureExtractor`] in fixed-size chunks, appends each chunk to
//! the store's `features` table and finally rewrites the class range index
//! from the stored identifiers.

pub mod driver;
pub mod error;
pub mod extractor;
pub mod planning;
pub mod preprocess;
pub mod walk;
pub mod words;

pub use driver::{ExtractionDriver, ExtractionReport};
pub use error::ExtractionError;
pub use extractor::FeatureExtractor;
#[cfg(feature = "onnx")]
pub use extractor::onnx::OnnxExtractor;
pub use planning::chunk_ranges;
pub use preprocess::{ImagePreprocessor, IMAGENET_MEAN_BGR};
pub use walk::{enumerate_images, source_id};
pub use words::{import_word_vectors, WordImportReport};
