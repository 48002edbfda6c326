use std::io::Cursor;

use ingestion_extraction::{import_word_vectors, ExtractionError};
use storage_features::{FeatureStore, OpenMode, WORD_EMBEDDINGS_TABLE};

const VECTORS: &str = "3 2\ncat 1.0 0.5\n\ndog -2 3\nowl 0.25 0.75\n";

#[test]
fn imports_words_in_batches_and_skips_header() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FeatureStore::open(tmp.path().join("words.fst"), OpenMode::Create).unwrap();

    let report = import_word_vectors(Cursor::new(VECTORS), &store, 2, 2, |_| true).unwrap();
    assert_eq!(report.imported, 3);
    assert_eq!(report.filtered, 0);

    let table = store.table(WORD_EMBEDDINGS_TABLE).unwrap();
    assert_eq!(store.read_ids(&table).unwrap(), ["cat", "dog", "owl"]);
    let dog = store.read_indices(&table, &[1]).unwrap();
    assert_eq!(dog.row(0).to_vec(), vec![-2.0, 3.0]);
}

#[test]
fn filter_limits_the_vocabulary() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FeatureStore::open(tmp.path().join("words.fst"), OpenMode::Create).unwrap();

    let report =
        import_word_vectors(Cursor::new(VECTORS), &store, 2, 16, |word| word != "dog").unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.filtered, 1);
    let table = store.table(WORD_EMBEDDINGS_TABLE).unwrap();
    assert_eq!(store.read_ids(&table).unwrap(), ["cat", "owl"]);
}

#[test]
fn wrong_width_reports_line_number() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FeatureStore::open(tmp.path().join("words.fst"), OpenMode::Create).unwrap();

    let err = import_word_vectors(
        Cursor::new("cat 1 2\ndog 1 2 3\n"),
        &store,
        2,
        1,
        |_| true,
    )
    .unwrap_err();
    assert!(matches!(err, ExtractionError::Parse { line: 2, .. }));
    // the first batch was already committed
    let table = store.table(WORD_EMBEDDINGS_TABLE).unwrap();
    assert_eq!(store.size(&table).unwrap(), 1);
}
