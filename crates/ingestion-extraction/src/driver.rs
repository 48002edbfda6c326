use std::path::{Path, PathBuf};

use index_classes::ClassRanges;
use pipeline_config::{PipelineConfig, RunMode, RunSettings};
use storage_features::{FeatureStore, OpenMode, FEATURES_TABLE};
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::extractor::FeatureExtractor;
use crate::planning::chunk_ranges;
use crate::preprocess::ImagePreprocessor;
use crate::walk::{enumerate_images, source_id};

/// Summary of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionReport {
    pub files: usize,
    pub chunks: usize,
    /// Rows in the features table before the run appended anything.
    pub rows_before: usize,
    pub rows_after: usize,
    pub classes: usize,
}

/// Extracts one run mode's image tree into its feature store.
pub struct ExtractionDriver<'a, X> {
    run: RunSettings<'a>,
    image_dim: usize,
    batch: usize,
    extractor: X,
    preprocessor: ImagePreprocessor,
}

impl<'a, X: FeatureExtractor> ExtractionDriver<'a, X> {
    pub fn new(
        config: &'a PipelineConfig,
        mode: RunMode,
        extractor: X,
    ) -> Result<Self, ExtractionError> {
        let image_dim = config.training.image_dim;
        if extractor.output_dim() != image_dim {
            return Err(ExtractionError::ExtractorWidth {
                expected: image_dim,
                found: extractor.output_dim(),
            });
        }
        let (width, height) = extractor.input_size();
        Ok(Self {
            run: config.run_settings(mode),
            image_dim,
            batch: config.training.extraction_batch,
            preprocessor: ImagePreprocessor::new(width, height),
            extractor,
        })
    }

    #[must_use]
    pub const fn run_settings(&self) -> &RunSettings<'a> {
        &self.run
    }

    /// Walks the image root, appends every file's features to the store and
    /// rewrites the class range file. The store must already exist. Any
    /// failure aborts the run; chunks appended before it stay in the store.
    pub fn run(&mut self) -> Result<ExtractionReport, ExtractionError> {
        self.run.check_paths()?;
        let files = enumerate_images(self.run.images_root)?;
        info!(
            mode = %self.run.mode,
            root = %self.run.images_root.display(),
            files = files.len(),
            "starting feature extraction"
        );
        let store_path = self.run.feature_store;
        let ranges_path = self.run.class_ranges;
        let report = FeatureStore::scoped(store_path, OpenMode::ReadWrite, |store| {
            self.extract_into(store, &files, ranges_path)
        })?;
        info!(
            rows = report.rows_after,
            classes = report.classes,
            "feature extraction finished"
        );
        Ok(report)
    }

    /// Extraction against an already open store.
    pub fn extract_into(
        &mut self,
        store: &FeatureStore,
        files: &[PathBuf],
        ranges_path: &Path,
    ) -> Result<ExtractionReport, ExtractionError> {
        let table = store.create_or_get(FEATURES_TABLE, self.image_dim)?;
        let rows_before = store.size(&table)?;
        let chunks = files.len().div_ceil(self.batch.max(1));

        for (chunk, range) in chunk_ranges(files.len(), self.batch).enumerate() {
            let paths = &files[range.clone()];
            let images = self.preprocessor.load_batch(paths)?;
            let features = self.extractor.extract(images.view())?;
            if features.dim() != (paths.len(), self.image_dim) {
                return Err(ExtractionError::OutputShape {
                    expected: (paths.len(), self.image_dim),
                    found: features.dim(),
                });
            }
            let ids: Vec<String> = paths.iter().map(|path| source_id(path)).collect();
            let rows = store.append(&table, features.view(), &ids)?;
            debug!(chunk = chunk + 1, chunks, ?rows, "appended chunk");
            info!(done = range.end, total = files.len(), "extraction progress");
        }

        let ids = store.read_ids(&table)?;
        let ranges = ClassRanges::build(&ids)?;
        ranges.save(ranges_path)?;
        debug!(path = %ranges_path.display(), classes = ranges.len(), "wrote class ranges");

        Ok(ExtractionReport {
            files: files.len(),
            chunks,
            rows_before,
            rows_after: ids.len(),
            classes: ranges.len(),
        })
    }
}
