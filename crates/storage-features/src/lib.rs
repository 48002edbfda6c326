//! Append-only feature tables backed by a single checksummed log file.
//!
//! A store file holds any number of named tables. Each table has a fixed row
//! width and grows only at its tail; a row keeps its id (append position) and
//! contents for the lifetime of the file.

pub mod config;
pub mod error;
pub mod store;

pub use config::{OpenMode, FEATURES_TABLE, WORD_EMBEDDINGS_TABLE};
pub use error::StoreError;
pub use store::{FeatureStore, FeatureTable, RowSource, TableReader};
