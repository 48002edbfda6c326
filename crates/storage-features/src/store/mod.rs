use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use ndarray::{Array2, ArrayView2};
use tracing::{debug, warn};

use crate::config::OpenMode;
use crate::error::StoreError;
use self::fs::{RowLocation, TableLayout};
pub mod fs;

/// Handle to a named table inside a [`FeatureStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTable {
    name: String,
    dim: usize,
}

impl FeatureTable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }
}

/// Read access to one table's rows, independent of the backing store.
pub trait RowSource {
    /// Width of every row.
    fn dim(&self) -> usize;
    /// Current row count.
    fn len(&self) -> Result<usize, StoreError>;
    /// Rows in caller order; ids may be unsorted or repeated.
    fn read_rows(&self, rows: &[usize]) -> Result<Array2<f32>, StoreError>;
    /// Identifier of every row, in row order.
    fn read_ids(&self) -> Result<Vec<String>, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

struct StoreState {
    file: File,
    tables: BTreeMap<String, TableLayout>,
    end: u64,
    dirty: bool,
}

/// Append-only store of fixed-width float rows, each tagged with a source id.
///
/// Rows are addressed by their append order within a table. Nothing already
/// written is ever rewritten; growth only happens at the tail. The handle
/// syncs pending writes when dropped, but [`FeatureStore::close`] should be
/// preferred so flush failures are reported.
pub struct FeatureStore {
    path: PathBuf,
    mode: OpenMode,
    inner: Mutex<StoreState>,
}

impl std::fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl FeatureStore {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.read(true);
        if mode.is_writable() {
            options.write(true);
        }
        if mode == OpenMode::Create {
            options.create(true);
        }
        let mut file = options
            .open(&path)
            .map_err(|err| StoreError::Io(format!("{}: {err}", path.display())))?;

        let fresh = file.metadata()?.len() == 0;
        let (tables, end) = if fresh && mode.is_writable() {
            fs::write_header(&mut file)?;
            file.sync_all()?;
            (BTreeMap::new(), fs::HEADER_LEN)
        } else {
            let replay = fs::scan(&mut file)?;
            if replay.torn_bytes() > 0 {
                warn!(
                    path = %path.display(),
                    offset = replay.end,
                    bytes = replay.torn_bytes(),
                    truncate = mode.is_writable(),
                    "ignoring interrupted append at end of feature store"
                );
                if mode.is_writable() {
                    file.set_len(replay.end)?;
                    file.sync_all()?;
                }
            }
            (replay.tables, replay.end)
        };
        debug!(
            path = %path.display(),
            tables = tables.len(),
            bytes = end,
            "opened feature store"
        );
        Ok(Self {
            path,
            mode,
            inner: Mutex::new(StoreState {
                file,
                tables,
                end,
                dirty: false,
            }),
        })
    }

    /// Opens the store, runs `f`, and closes the store on every exit path.
    pub fn scoped<T, E, F>(path: impl AsRef<Path>, mode: OpenMode, f: F) -> Result<T, E>
    where
        F: FnOnce(&FeatureStore) -> Result<T, E>,
        E: From<StoreError>,
    {
        let store = Self::open(path, mode)?;
        let outcome = f(&store);
        let closed = store.close();
        let value = outcome?;
        closed?;
        Ok(value)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn tables(&self) -> Result<Vec<FeatureTable>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .iter()
            .map(|(name, layout)| FeatureTable {
                name: name.clone(),
                dim: layout.dim,
            })
            .collect())
    }

    pub fn table(&self, name: &str) -> Result<FeatureTable, StoreError> {
        let guard = self.lock()?;
        guard
            .tables
            .get(name)
            .map(|layout| FeatureTable {
                name: name.to_string(),
                dim: layout.dim,
            })
            .ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }

    /// Returns the named table, creating it empty with width `dim` if absent.
    pub fn create_or_get(&self, name: &str, dim: usize) -> Result<FeatureTable, StoreError> {
        if name.is_empty() || name.len() > usize::from(u16::MAX) {
            return Err(StoreError::InvalidTableName(name.to_string()));
        }
        if dim == 0 || dim > u32::MAX as usize {
            return Err(StoreError::DimensionMismatch {
                table: name.to_string(),
                expected: 1,
                found: dim,
            });
        }
        let mut guard = self.lock()?;
        if let Some(layout) = guard.tables.get(name) {
            if layout.dim != dim {
                return Err(StoreError::DimensionMismatch {
                    table: name.to_string(),
                    expected: layout.dim,
                    found: dim,
                });
            }
            return Ok(FeatureTable {
                name: name.to_string(),
                dim,
            });
        }
        if !self.mode.is_writable() {
            return Err(StoreError::ReadOnly);
        }
        let chunk = fs::encode_create(name, dim);
        guard.write_chunk(&chunk)?;
        guard.tables.insert(
            name.to_string(),
            TableLayout {
                dim,
                rows: Vec::new(),
            },
        );
        debug!(table = name, dim, "created feature table");
        Ok(FeatureTable {
            name: name.to_string(),
            dim,
        })
    }

    /// Appends rows at the tail of `table` and returns the ids they received.
    pub fn append<S: AsRef<str>>(
        &self,
        table: &FeatureTable,
        vectors: ArrayView2<'_, f32>,
        ids: &[S],
    ) -> Result<Range<usize>, StoreError> {
        if vectors.nrows() != ids.len() {
            return Err(StoreError::ShapeMismatch {
                vectors: vectors.nrows(),
                ids: ids.len(),
            });
        }
        if !self.mode.is_writable() {
            return Err(StoreError::ReadOnly);
        }
        let mut guard = self.lock()?;
        let layout = guard
            .tables
            .get(table.name())
            .ok_or_else(|| StoreError::MissingTable(table.name().to_string()))?;
        if vectors.ncols() != layout.dim {
            return Err(StoreError::DimensionMismatch {
                table: table.name().to_string(),
                expected: layout.dim,
                found: vectors.ncols(),
            });
        }
        if let Some(id) = ids.iter().find(|id| id.as_ref().len() > u32::MAX as usize) {
            return Err(StoreError::Integrity(format!(
                "identifier of {} bytes is too long",
                id.as_ref().len()
            )));
        }
        let start = layout.rows.len();
        if ids.is_empty() {
            return Ok(start..start);
        }

        let (chunk, relative) = fs::encode_rows(table.name(), vectors, ids);
        let base = guard.write_chunk(&chunk)?;
        let rows = &mut guard
            .tables
            .get_mut(table.name())
            .ok_or_else(|| StoreError::MissingTable(table.name().to_string()))?
            .rows;
        rows.extend(relative.into_iter().map(|location| RowLocation {
            offset: base + location.offset,
            id_len: location.id_len,
        }));
        let end = rows.len();
        debug!(table = table.name(), start, end, "appended feature rows");
        Ok(start..end)
    }

    pub fn size(&self, table: &FeatureTable) -> Result<usize, StoreError> {
        let guard = self.lock()?;
        Ok(guard.layout(table.name())?.rows.len())
    }

    /// Reads the contiguous rows `range.start..range.end`.
    pub fn read_range(
        &self,
        table: &FeatureTable,
        range: Range<usize>,
    ) -> Result<Array2<f32>, StoreError> {
        let mut guard = self.lock()?;
        let (dim, locations) = guard.locations_in(table.name(), range)?;
        let mut flat = Vec::with_capacity(locations.len() * dim);
        for location in &locations {
            fs::read_vector_into(&mut guard.file, *location, dim, &mut flat)?;
        }
        Array2::from_shape_vec((locations.len(), dim), flat)
            .map_err(|err| StoreError::Integrity(err.to_string()))
    }

    /// Reads arbitrary rows and returns them in the order requested.
    ///
    /// The backing file is visited once per distinct row in ascending offset
    /// order; duplicates are served from that single read.
    pub fn read_indices(
        &self,
        table: &FeatureTable,
        ids: &[usize],
    ) -> Result<Array2<f32>, StoreError> {
        let mut guard = self.lock()?;
        let layout = guard.layout(table.name())?;
        let dim = layout.dim;
        let len = layout.rows.len();
        if let Some(&index) = ids.iter().find(|&&id| id >= len) {
            return Err(StoreError::IndexOutOfRange { index, len });
        }
        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let locations: Vec<RowLocation> = unique.iter().map(|&id| layout.rows[id]).collect();

        let mut sorted_rows = Vec::with_capacity(unique.len() * dim);
        for location in locations {
            fs::read_vector_into(&mut guard.file, location, dim, &mut sorted_rows)?;
        }
        let mut flat = Vec::with_capacity(ids.len() * dim);
        for id in ids {
            // present by construction
            let slot = unique.binary_search(id).unwrap_or_default();
            flat.extend_from_slice(&sorted_rows[slot * dim..(slot + 1) * dim]);
        }
        Array2::from_shape_vec((ids.len(), dim), flat)
            .map_err(|err| StoreError::Integrity(err.to_string()))
    }

    pub fn read_id(&self, table: &FeatureTable, row: usize) -> Result<String, StoreError> {
        let mut guard = self.lock()?;
        let end = match row.checked_add(1) {
            Some(end) => end,
            None => {
                return Err(StoreError::IndexOutOfRange {
                    index: row,
                    len: guard.layout(table.name())?.rows.len(),
                })
            }
        };
        let (dim, locations) = guard.locations_in(table.name(), row..end)?;
        fs::read_id(&mut guard.file, locations[0], dim)
    }

    pub fn read_ids_range(
        &self,
        table: &FeatureTable,
        range: Range<usize>,
    ) -> Result<Vec<String>, StoreError> {
        let mut guard = self.lock()?;
        let (dim, locations) = guard.locations_in(table.name(), range)?;
        locations
            .into_iter()
            .map(|location| fs::read_id(&mut guard.file, location, dim))
            .collect()
    }

    pub fn read_ids(&self, table: &FeatureTable) -> Result<Vec<String>, StoreError> {
        let len = self.size(table)?;
        self.read_ids_range(table, 0..len)
    }

    /// Borrowing view over one table, usable wherever a [`RowSource`] is expected.
    #[must_use]
    pub fn reader(&self, table: FeatureTable) -> TableReader<'_> {
        TableReader { store: self, table }
    }

    /// Syncs pending appends to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.sync()
    }

    pub fn close(self) -> Result<(), StoreError> {
        self.flush()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.inner.lock().map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl Drop for FeatureStore {
    fn drop(&mut self) {
        let state = match self.inner.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = state.sync() {
            warn!(path = %self.path.display(), error = %err, "failed to sync feature store on drop");
        }
    }
}

impl StoreState {
    fn layout(&self, name: &str) -> Result<&TableLayout, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }

    fn locations_in(
        &self,
        name: &str,
        range: Range<usize>,
    ) -> Result<(usize, Vec<RowLocation>), StoreError> {
        let layout = self.layout(name)?;
        let len = layout.rows.len();
        if range.start > range.end {
            return Err(StoreError::IndexOutOfRange {
                index: range.start,
                len,
            });
        }
        if range.end > len {
            return Err(StoreError::IndexOutOfRange {
                index: range.end - 1,
                len,
            });
        }
        Ok((layout.dim, layout.rows[range].to_vec()))
    }

    /// Writes a chunk at the end of the log and returns its start offset.
    /// On failure the file is cut back to `base`, so a partial chunk never
    /// survives behind the last committed one.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<u64, StoreError> {
        let base = self.end;
        let written = self
            .file
            .seek(SeekFrom::Start(base))
            .and_then(|_| self.file.write_all(chunk));
        if let Err(err) = written {
            if let Err(rollback) = self.file.set_len(base) {
                warn!(offset = base, error = %rollback, "failed to discard partial chunk");
            }
            return Err(err.into());
        }
        self.end = base + chunk.len() as u64;
        self.dirty = true;
        Ok(base)
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.file.flush()?;
            self.file.sync_all()?;
            self.dirty = false;
        }
        Ok(())
    }
}

/// A [`FeatureStore`] table seen through the [`RowSource`] trait.
#[derive(Debug)]
pub struct TableReader<'a> {
    store: &'a FeatureStore,
    table: FeatureTable,
}

impl TableReader<'_> {
    #[must_use]
    pub const fn table(&self) -> &FeatureTable {
        &self.table
    }
}

impl RowSource for TableReader<'_> {
    fn dim(&self) -> usize {
        self.table.dim()
    }

    fn len(&self) -> Result<usize, StoreError> {
        self.store.size(&self.table)
    }

    fn read_rows(&self, rows: &[usize]) -> Result<Array2<f32>, StoreError> {
        self.store.read_indices(&self.table, rows)
    }

    fn read_ids(&self) -> Result<Vec<String>, StoreError> {
        self.store.read_ids(&self.table)
    }
}
