use index_classes::{class_label, ClassRanges};
use ndarray::{Array1, Array2};
use pipeline_config::TrainingSettings;
use storage_features::{FeatureStore, OpenMode, FEATURES_TABLE, WORD_EMBEDDINGS_TABLE};
use tempfile::TempDir;
use training_batches::{BatchError, BatchGenerator, BatchRow, GeneratorState};

fn settings(negatives: usize) -> TrainingSettings {
    TrainingSettings {
        image_dim: 3,
        word_dim: 2,
        extraction_batch: 2,
        negatives_per_batch: negatives,
        sampling_seed: Some(123),
    }
}

/// Image row `i` holds `[i, i, i]`; the word for class `n` (1-based, in
/// `words` order) holds `[n, 0]`.
fn fixture(image_ids: &[&str], words: &[&str]) -> (TempDir, FeatureStore) {
    let tmpdir = tempfile::tempdir().expect("tmpdir");
    let store = FeatureStore::open(tmpdir.path().join("train.fst"), OpenMode::Create).unwrap();
    let images = store.create_or_get(FEATURES_TABLE, 3).unwrap();
    let features = Array2::from_shape_fn((image_ids.len(), 3), |(r, _)| r as f32);
    store.append(&images, features.view(), image_ids).unwrap();

    let embeddings = store.create_or_get(WORD_EMBEDDINGS_TABLE, 2).unwrap();
    let vectors = Array2::from_shape_fn((words.len(), 2), |(r, c)| {
        if c == 0 {
            (r + 1) as f32
        } else {
            0.0
        }
    });
    store.append(&embeddings, vectors.view(), words).unwrap();
    (tmpdir, store)
}

const IMAGES: [&str; 7] = [
    "img/cat/1.jpg",
    "img/cat/2.jpg",
    "img/cat/3.jpg",
    "img/dog/4.jpg",
    "img/dog/5.jpg",
    "img/owl/6.jpg",
    "img/owl/7.jpg",
];
const WORDS: [&str; 3] = ["cat", "dog", "owl"];

fn word_value(image_id: &str) -> f32 {
    let label = class_label(image_id).unwrap();
    (WORDS.iter().position(|w| *w == label).unwrap() + 1) as f32
}

#[test]
fn batches_have_configured_shape_and_genuine_first_row() {
    let (_tmp, store) = fixture(&IMAGES, &WORDS);
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let generator = BatchGenerator::new(&settings(3), images, words).unwrap();

    for (step, batch) in generator.take(14).enumerate() {
        let batch = batch.expect("batch");
        let anchor = step % IMAGES.len();
        assert_eq!(batch.features.dim(), (4, 3));
        assert_eq!(batch.embeddings.dim(), (4, 2));
        assert_eq!(batch.rows[0], BatchRow::Positive(anchor));
        assert_eq!(batch.features.row(0), Array1::from_elem(3, anchor as f32));
        assert_eq!(batch.embeddings[[0, 0]], word_value(IMAGES[anchor]));

        let anchor_label = class_label(IMAGES[anchor]).unwrap();
        for (slot, row) in batch.rows.iter().enumerate().skip(1) {
            let BatchRow::Negative(negative) = *row else {
                panic!("row {slot} should be a negative");
            };
            assert_ne!(class_label(IMAGES[negative]).unwrap(), anchor_label);
            assert_eq!(batch.features[[slot, 0]], negative as f32);
            assert_eq!(batch.embeddings[[slot, 0]], word_value(IMAGES[negative]));
        }
    }
}

#[test]
fn cursor_wraps_after_every_pass() {
    let (_tmp, store) = fixture(&IMAGES, &WORDS);
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let mut generator = BatchGenerator::new(&settings(2), images, words).unwrap();
    assert_eq!(generator.state(), GeneratorState::Idle);
    assert_eq!(generator.total(), 7);

    for _cycle in 0..3 {
        for expected in 0..7 {
            assert_eq!(generator.cursor(), expected);
            let batch = generator.next_batch().unwrap();
            assert_eq!(batch.anchor(), expected);
        }
        assert_eq!(generator.state(), GeneratorState::Streaming { cursor: 0 });
    }
}

#[test]
fn interleaved_classes_are_still_excluded_by_membership() {
    let ids = ["img/cat/1", "img/dog/2", "img/cat/3", "img/dog/4", "img/cat/5"];
    let (_tmp, store) = fixture(&ids, &["cat", "dog"]);
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let mut generator = BatchGenerator::new(&settings(2), images, words).unwrap();

    let batch = generator.next_batch().unwrap();
    assert_eq!(batch.negatives().collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn persisted_ranges_must_match_the_table() {
    let ids = ["img/cat/1", "img/dog/2", "img/cat/3"];
    let (_tmp, store) = fixture(&ids, &["cat", "dog"]);
    let ranges = ClassRanges::build(&ids).unwrap();
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());

    let err = BatchGenerator::with_class_ranges(&settings(1), images, words, ranges)
        .err()
        .expect("overlapping ranges rejected");
    assert!(matches!(err, BatchError::Index(_)));
}

#[test]
fn persisted_ranges_drive_exclusion() {
    let (_tmp, store) = fixture(&IMAGES, &WORDS);
    let ranges = ClassRanges::build(&IMAGES).unwrap();
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let mut generator =
        BatchGenerator::with_class_ranges(&settings(4), images, words, ranges).unwrap();

    // anchor 0 is a cat; the four non-cat rows are the whole pool
    let batch = generator.next_batch().unwrap();
    assert_eq!(batch.negatives().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
}

#[test]
fn class_without_embedding_fails_the_step() {
    let ids = ["img/cat/1", "img/cat/2", "img/owl/3", "img/owl/4"];
    let (_tmp, store) = fixture(&ids, &["cat"]);
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let mut generator = BatchGenerator::new(&settings(1), images, words).unwrap();

    let err = generator.next_batch().unwrap_err();
    assert!(matches!(err, BatchError::MissingMapping(ref label) if label == "owl"));
    assert_eq!(generator.cursor(), 0);
}

#[test]
fn oversized_negative_count_surfaces_sampling_error() {
    let (_tmp, store) = fixture(&IMAGES, &WORDS);
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let mut generator = BatchGenerator::new(&settings(5), images, words).unwrap();

    assert!(matches!(
        generator.next().expect("stream never ends"),
        Err(BatchError::Sampling(_))
    ));
}

#[test]
fn configured_dimensions_are_checked() {
    let (_tmp, store) = fixture(&IMAGES, &WORDS);
    let images = store.reader(store.table(FEATURES_TABLE).unwrap());
    let words = store.reader(store.table(WORD_EMBEDDINGS_TABLE).unwrap());
    let mut wrong = settings(1);
    wrong.word_dim = 50;

    let err = BatchGenerator::new(&wrong, images, words).err().unwrap();
    assert!(matches!(
        err,
        BatchError::DimensionMismatch {
            table: "embedding",
            expected: 50,
            found: 2
        }
    ));
}
