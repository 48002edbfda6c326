//! Infinite stream of (genuine pair + sampled negatives) training batches.

use index_classes::{labels, ClassMembers, ClassRanges};
use ndarray::Array2;
use pipeline_config::TrainingSettings;
use storage_features::RowSource;
use tracing::{debug, trace, warn};

use crate::error::BatchError;
use crate::mapping::WordMapping;
use crate::sampler::{Exclusion, NegativeSampler};

/// Role of one row in a [`TrainingBatch`], tagged with its image row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRow {
    Positive(usize),
    Negative(usize),
}

impl BatchRow {
    #[must_use]
    pub const fn row(self) -> usize {
        match self {
            Self::Positive(row) | Self::Negative(row) => row,
        }
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::Positive(_))
    }
}

/// One step of training input. Row `i` of `features` and `embeddings`
/// describes `rows[i]`; the positive pair always comes first.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingBatch {
    pub rows: Vec<BatchRow>,
    pub features: Array2<f32>,
    pub embeddings: Array2<f32>,
}

impl TrainingBatch {
    #[must_use]
    pub fn anchor(&self) -> usize {
        self.rows[0].row()
    }

    pub fn negatives(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .filter(|row| !row.is_positive())
            .map(|row| row.row())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(X, y)` as handed to the trainer.
    #[must_use]
    pub fn into_arrays(self) -> (Array2<f32>, Array2<f32>) {
        (self.features, self.embeddings)
    }
}

/// Which rows count as "same class" when drawing negatives.
#[derive(Debug, Clone)]
pub enum ClassExclusion {
    /// Every row sharing the anchor's label.
    Members(ClassMembers),
    /// The anchor label's persisted `[start, end]` range.
    Ranges(ClassRanges),
}

impl ClassExclusion {
    fn for_label(&self, label: &str) -> Result<Exclusion<'_>, BatchError> {
        match self {
            Self::Members(members) => members
                .rows(label)
                .map(Exclusion::Rows)
                .ok_or_else(|| BatchError::MissingClass(label.to_string())),
            Self::Ranges(ranges) => ranges
                .get(label)
                .map(|range| Exclusion::Range {
                    start: range.start,
                    end: range.end,
                })
                .ok_or_else(|| BatchError::MissingClass(label.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Streaming { cursor: usize },
}

/// Pull-based, never-ending batch producer.
///
/// Anchors walk the image table in row order and wrap around forever; the
/// consumer bounds the stream (for example with `take(steps_per_epoch)`).
/// The cursor lives inside the generator, so starting over means building a
/// new generator over the same tables. A failed step leaves the cursor on
/// the same anchor.
pub struct BatchGenerator<I, E> {
    images: I,
    embeddings: E,
    labels: Vec<String>,
    classes: ClassExclusion,
    words: WordMapping,
    sampler: NegativeSampler,
    negatives: usize,
    total: usize,
    state: GeneratorState,
}

impl<I, E> BatchGenerator<I, E>
where
    I: RowSource,
    E: RowSource,
{
    /// Excludes every same-class row, wherever it sits in the table.
    pub fn new(settings: &TrainingSettings, images: I, embeddings: E) -> Result<Self, BatchError> {
        let ids = images.read_ids()?;
        let classes = ClassExclusion::Members(ClassMembers::build(&ids)?);
        Self::assemble(settings, images, embeddings, ids, classes)
    }

    /// Excludes the persisted class ranges. The ranges must describe the
    /// image table exactly, otherwise construction fails.
    pub fn with_class_ranges(
        settings: &TrainingSettings,
        images: I,
        embeddings: E,
        ranges: ClassRanges,
    ) -> Result<Self, BatchError> {
        let ids = images.read_ids()?;
        ranges.check_contiguous(&ids)?;
        Self::assemble(settings, images, embeddings, ids, ClassExclusion::Ranges(ranges))
    }

    fn assemble(
        settings: &TrainingSettings,
        images: I,
        embeddings: E,
        ids: Vec<String>,
        classes: ClassExclusion,
    ) -> Result<Self, BatchError> {
        if images.dim() != settings.image_dim {
            return Err(BatchError::DimensionMismatch {
                table: "image",
                expected: settings.image_dim,
                found: images.dim(),
            });
        }
        if embeddings.dim() != settings.word_dim {
            return Err(BatchError::DimensionMismatch {
                table: "embedding",
                expected: settings.word_dim,
                found: embeddings.dim(),
            });
        }
        if ids.is_empty() {
            return Err(BatchError::EmptyStore);
        }
        let labels = labels(&ids)?;
        let words = WordMapping::build(&embeddings.read_ids()?);

        let unmapped = labels
            .iter()
            .filter(|label| words.row(label).is_none())
            .count();
        if unmapped > 0 {
            warn!(unmapped, "image rows without a word embedding");
        }
        debug!(
            rows = ids.len(),
            words = words.len(),
            negatives = settings.negatives_per_batch,
            "batch generator ready"
        );
        Ok(Self {
            images,
            embeddings,
            total: ids.len(),
            labels,
            classes,
            words,
            sampler: NegativeSampler::new(settings.sampling_seed),
            negatives: settings.negatives_per_batch,
            state: GeneratorState::Idle,
        })
    }

    #[must_use]
    pub const fn state(&self) -> GeneratorState {
        self.state
    }

    /// Anchor row of the next batch.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        match self.state {
            GeneratorState::Idle => 0,
            GeneratorState::Streaming { cursor } => cursor,
        }
    }

    /// Image rows per pass; the cursor wraps after this many steps.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    pub fn next_batch(&mut self) -> Result<TrainingBatch, BatchError> {
        let anchor = self.cursor();
        let label = &self.labels[anchor];
        let exclusion = self.classes.for_label(label)?;
        let negatives = self.sampler.sample(exclusion, self.total, self.negatives)?;

        let mut rows = Vec::with_capacity(1 + negatives.len());
        rows.push(BatchRow::Positive(anchor));
        rows.extend(negatives.into_iter().map(BatchRow::Negative));

        let image_rows: Vec<usize> = rows.iter().map(|row| row.row()).collect();
        let word_rows = image_rows
            .iter()
            .map(|&row| {
                let label = &self.labels[row];
                self.words
                    .row(label)
                    .ok_or_else(|| BatchError::MissingMapping(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let features = self.images.read_rows(&image_rows)?;
        let embeddings = self.embeddings.read_rows(&word_rows)?;

        let next = (anchor + 1) % self.total;
        if next == 0 {
            debug!(rows = self.total, "completed pass over image table");
        }
        trace!(anchor, next, "yielding training batch");
        self.state = GeneratorState::Streaming { cursor: next };
        Ok(TrainingBatch {
            rows,
            features,
            embeddings,
        })
    }
}

impl<I, E> Iterator for BatchGenerator<I, E>
where
    I: RowSource,
    E: RowSource,
{
    type Item = Result<TrainingBatch, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
