use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{Rgb, RgbImage};
use index_classes::ClassRanges;
use ingestion_extraction::{
    import_word_vectors, ExtractionDriver, ExtractionError, FeatureExtractor, IMAGENET_MEAN_BGR,
};
use ndarray::{Array2, ArrayView4};
use pipeline_config::{PipelineConfig, RunMode};
use storage_features::{FeatureStore, OpenMode, FEATURES_TABLE, WORD_EMBEDDINGS_TABLE};
use training_batches::{BatchGenerator, BatchRow};

/// Blue channel level used for each class's images.
const CLASSES: [(&str, u8); 3] = [("apple", 0), ("boat", 120), ("cloud", 240)];

/// Feature row: the image's blue level, repeated.
struct BlueLevel;

impl FeatureExtractor for BlueLevel {
    fn input_size(&self) -> (u32, u32) {
        (4, 4)
    }

    fn output_dim(&self) -> usize {
        2
    }

    fn extract(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ExtractionError> {
        let rows = batch.shape()[0];
        Ok(Array2::from_shape_fn((rows, 2), |(row, _)| {
            batch[[row, 0, 2, 2]] + IMAGENET_MEAN_BGR[0]
        }))
    }
}

fn class_of_level(level: f32) -> &'static str {
    CLASSES
        .iter()
        .min_by(|a, b| {
            let da = (f32::from(a.1) - level).abs();
            let db = (f32::from(b.1) - level).abs();
            da.total_cmp(&db)
        })
        .map(|(name, _)| *name)
        .unwrap()
}

fn config(root: &Path) -> PipelineConfig {
    let raw = format!(
        r#"
[training]
image_dim = 2
word_dim = 3
extraction_batch = 4
negatives_per_batch = 3
sampling_seed = 7

[stores]
training = "{root}/train.fst"
validation = "{root}/valid.fst"
embeddings = "{root}/words.fst"

[model]
weights_path = "{root}/unused.onnx"

[data]
training_images = "{root}/images"
validation_images = "{root}/valid_images"
training_class_ranges = "{root}/train_ranges.json"
validation_class_ranges = "{root}/valid_ranges.json"
"#,
        root = root.display()
    );
    PipelineConfig::from_toml_str(&raw).unwrap()
}

#[test]
fn extracted_store_feeds_the_batch_generator() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());

    for (class, blue) in CLASSES {
        let dir = tmp.path().join("images").join(class);
        fs::create_dir_all(&dir).unwrap();
        for n in 0..3 {
            RgbImage::from_pixel(12, 12, Rgb([90, 90, blue]))
                .save(dir.join(format!("{n}.png")))
                .unwrap();
        }
    }
    FeatureStore::open(&config.stores.training, OpenMode::Create)
        .unwrap()
        .close()
        .unwrap();

    let report = ExtractionDriver::new(&config, RunMode::Train, BlueLevel)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!((report.rows_after, report.chunks, report.classes), (9, 3, 3));

    let words = FeatureStore::open(&config.stores.embeddings, OpenMode::Create).unwrap();
    let vectors = "boat 0 1 0\napple 1 0 0\ncloud 0 0 1\nunrelated 5 5 5\n";
    import_word_vectors(Cursor::new(vectors), &words, 3, 2, |_| true).unwrap();

    let images = FeatureStore::open(&config.stores.training, OpenMode::Read).unwrap();
    let ranges = ClassRanges::load(&config.data.training_class_ranges).unwrap();
    let mut generator = BatchGenerator::with_class_ranges(
        &config.training,
        images.reader(images.table(FEATURES_TABLE).unwrap()),
        words.reader(words.table(WORD_EMBEDDINGS_TABLE).unwrap()),
        ranges,
    )
    .unwrap();

    for step in 0..18 {
        let batch = generator.next_batch().unwrap();
        assert_eq!(batch.rows[0], BatchRow::Positive(step % 9));
        assert_eq!(batch.len(), 4);

        let anchor_class = class_of_level(batch.features[[0, 0]]);
        for slot in 0..batch.len() {
            let class = class_of_level(batch.features[[slot, 0]]);
            let hot = CLASSES.iter().position(|(name, _)| *name == class).unwrap();
            assert_eq!(batch.embeddings[[slot, hot]], 1.0, "slot {slot} word row");
            if slot > 0 {
                assert_ne!(class, anchor_class);
            }
        }
    }
}
