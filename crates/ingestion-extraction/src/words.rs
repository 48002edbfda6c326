//! Import of plain-text word vectors (`word v1 v2 ... vD` per line) into a
//! store's `word_embeddings` table.

use std::io::BufRead;

use ndarray::Array2;
use storage_features::{FeatureStore, FeatureTable, WORD_EMBEDDINGS_TABLE};
use tracing::{debug, info};

use crate::error::ExtractionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WordImportReport {
    pub imported: usize,
    /// Words rejected by the `keep` filter.
    pub filtered: usize,
}

/// Appends every kept word vector from `reader`, `batch` rows at a time.
///
/// Blank lines are ignored, as is a leading `count dim` header line of the
/// kind word2vec text exports carry. A line whose vector length differs from
/// `word_dim` fails the import with its 1-based line number.
pub fn import_word_vectors<R, F>(
    reader: R,
    store: &FeatureStore,
    word_dim: usize,
    batch: usize,
    mut keep: F,
) -> Result<WordImportReport, ExtractionError>
where
    R: BufRead,
    F: FnMut(&str) -> bool,
{
    let table = store.create_or_get(WORD_EMBEDDINGS_TABLE, word_dim)?;
    let batch = batch.max(1);
    let mut report = WordImportReport::default();
    let mut words: Vec<String> = Vec::with_capacity(batch);
    let mut values: Vec<f32> = Vec::with_capacity(batch * word_dim);

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(word) = fields.next() else {
            continue;
        };
        let rest: Vec<&str> = fields.collect();
        if line_no == 1 && is_header(word, &rest) {
            debug!(header = %line, "skipping word vector header");
            continue;
        }
        if rest.len() != word_dim {
            return Err(ExtractionError::Parse {
                line: line_no,
                reason: format!("expected {word_dim} values for `{word}`, found {}", rest.len()),
            });
        }
        if !keep(word) {
            report.filtered += 1;
            continue;
        }
        for field in rest {
            let value = field.parse::<f32>().map_err(|err| ExtractionError::Parse {
                line: line_no,
                reason: format!("`{field}`: {err}"),
            })?;
            values.push(value);
        }
        words.push(word.to_string());
        if words.len() == batch {
            report.imported += flush(store, &table, &mut words, &mut values)?;
        }
    }
    report.imported += flush(store, &table, &mut words, &mut values)?;
    info!(
        imported = report.imported,
        filtered = report.filtered,
        "imported word vectors"
    );
    Ok(report)
}

fn is_header(first: &str, rest: &[&str]) -> bool {
    rest.len() == 1 && first.parse::<usize>().is_ok() && rest[0].parse::<usize>().is_ok()
}

fn flush(
    store: &FeatureStore,
    table: &FeatureTable,
    words: &mut Vec<String>,
    values: &mut Vec<f32>,
) -> Result<usize, ExtractionError> {
    if words.is_empty() {
        return Ok(0);
    }
    let rows = words.len();
    let vectors = Array2::from_shape_vec((rows, table.dim()), std::mem::take(values))
        .map_err(|err| ExtractionError::Shape(err.to_string()))?;
    store.append(table, vectors.view(), words.as_slice())?;
    words.clear();
    Ok(rows)
}
