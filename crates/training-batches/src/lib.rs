//! Negative sampling and training batch assembly for the image/word
//! alignment trainer.

pub mod error;
pub mod generator;
pub mod mapping;
pub mod sampler;

pub use error::{BatchError, SamplingError};
pub use generator::{BatchGenerator, BatchRow, ClassExclusion, GeneratorState, TrainingBatch};
pub use mapping::WordMapping;
pub use sampler::{Exclusion, NegativeSampler};
