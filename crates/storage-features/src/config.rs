//! Open modes and well-known table names.

/// How a store file is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Existing file, reads only.
    #[default]
    Read,
    /// Existing file, reads and appends.
    ReadWrite,
    /// Reads and appends; the file is initialised if absent.
    Create,
}

impl OpenMode {
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite | Self::Create)
    }
}

/// Table holding image feature rows keyed by source file path.
pub const FEATURES_TABLE: &str = "features";

/// Table holding word embedding rows keyed by the word itself.
pub const WORD_EMBEDDINGS_TABLE: &str = "word_embeddings";
