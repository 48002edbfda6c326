//! Class indices over the identifiers of a feature table.
//!
//! A row's class label is the parent directory of its source path. Two views
//! are derived from the ordered identifier list:
//!
//! * [`ClassRanges`], the `label -> [start, end]` map persisted next to a
//!   store. It is only exact when every class occupies a contiguous block of
//!   rows, which the extraction walk guarantees but nothing enforces.
//! * [`ClassMembers`], the full row set per label, which has no ordering
//!   precondition.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("row {row} identifier `{id}` has no parent directory component")]
    Unlabelled { row: usize, id: String },
    #[error("class `{label}` is not contiguous: row {row} falls outside [{start}, {end}]")]
    NonContiguous {
        label: String,
        row: usize,
        start: usize,
        end: usize,
    },
    #[error("class ranges overlap: {covered} rows covered for {rows} rows")]
    Overlapping { covered: usize, rows: usize },
    #[error("no class range for label `{0}`")]
    MissingLabel(String),
    #[error("class range for `{0}` matches no row")]
    UnknownLabel(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("class range encoding error: {0}")]
    Encoding(String),
}

/// Class label of a `/`-separated source identifier: its second-to-last
/// component. `root/dogs/01.jpg` belongs to `dogs`.
#[must_use]
pub fn class_label(source_id: &str) -> Option<&str> {
    let mut parts = source_id.rsplit('/');
    parts.next()?;
    parts.next().filter(|label| !label.is_empty())
}

/// Labels for every identifier, failing on the first one without a parent.
pub fn labels<S: AsRef<str>>(ids: &[S]) -> Result<Vec<String>, IndexError> {
    ids.iter()
        .enumerate()
        .map(|(row, id)| {
            class_label(id.as_ref())
                .map(str::to_string)
                .ok_or_else(|| IndexError::Unlabelled {
                    row,
                    id: id.as_ref().to_string(),
                })
        })
        .collect()
}

/// Inclusive row span `[start, end]` of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct ClassRange {
    pub start: usize,
    pub end: usize,
}

impl ClassRange {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn contains(&self, row: usize) -> bool {
        self.start <= row && row <= self.end
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }
}

impl From<[usize; 2]> for ClassRange {
    fn from([start, end]: [usize; 2]) -> Self {
        Self { start, end }
    }
}

impl From<ClassRange> for [usize; 2] {
    fn from(range: ClassRange) -> Self {
        [range.start, range.end]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassRanges {
    ranges: BTreeMap<String, ClassRange>,
}

impl ClassRanges {
    /// Single left-to-right scan: the first sighting of a label opens its
    /// range, later sightings move only the end.
    pub fn build<S: AsRef<str>>(ids: &[S]) -> Result<Self, IndexError> {
        let mut ranges: BTreeMap<String, ClassRange> = BTreeMap::new();
        for (row, label) in labels(ids)?.into_iter().enumerate() {
            ranges
                .entry(label)
                .and_modify(|range| range.end = row)
                .or_insert(ClassRange::new(row, row));
        }
        Ok(Self { ranges })
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<ClassRange> {
        self.ranges.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ClassRange)> {
        self.ranges.iter().map(|(label, range)| (label.as_str(), *range))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Confirms that the ranges describe `ids` exactly: every label has rows,
    /// every row lies in its own label's range and no two ranges overlap.
    pub fn check_contiguous<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), IndexError> {
        let labels = labels(ids)?;
        let seen: BTreeSet<&str> = labels.iter().map(String::as_str).collect();
        if let Some(extra) = self.ranges.keys().find(|label| !seen.contains(label.as_str())) {
            return Err(IndexError::UnknownLabel(extra.clone()));
        }
        for (row, label) in labels.iter().enumerate() {
            let range = self
                .get(label)
                .ok_or_else(|| IndexError::MissingLabel(label.clone()))?;
            if !range.contains(row) {
                return Err(IndexError::NonContiguous {
                    label: label.clone(),
                    row,
                    start: range.start,
                    end: range.end,
                });
            }
        }
        let covered: usize = self.ranges.values().map(ClassRange::row_count).sum();
        if covered != ids.len() {
            return Err(IndexError::Overlapping {
                covered,
                rows: ids.len(),
            });
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IndexError::Io(e.to_string()))?;
        }
        let encoded =
            serde_json::to_vec_pretty(self).map_err(|e| IndexError::Encoding(e.to_string()))?;
        fs::write(path, encoded)
            .map_err(|e| IndexError::Io(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), classes = self.len(), "saved class ranges");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes =
            fs::read(path).map_err(|e| IndexError::Io(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&bytes).map_err(|e| IndexError::Encoding(e.to_string()))
    }
}

/// Every row of every class, rows sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMembers {
    members: BTreeMap<String, Vec<usize>>,
}

impl ClassMembers {
    pub fn build<S: AsRef<str>>(ids: &[S]) -> Result<Self, IndexError> {
        let mut members: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (row, label) in labels(ids)?.into_iter().enumerate() {
            members.entry(label).or_default().push(row);
        }
        Ok(Self { members })
    }

    #[must_use]
    pub fn rows(&self, label: &str) -> Option<&[usize]> {
        self.members.get(label).map(Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
