use std::collections::HashMap;

/// Word or class label to its row in the embeddings table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordMapping {
    rows: HashMap<String, usize>,
}

impl WordMapping {
    /// Builds the mapping from the embeddings table's identifiers. A word that
    /// appears twice resolves to its last row.
    pub fn build<S: AsRef<str>>(words: &[S]) -> Self {
        let rows = words
            .iter()
            .enumerate()
            .map(|(row, word)| (word.as_ref().to_string(), row))
            .collect();
        Self { rows }
    }

    #[must_use]
    pub fn row(&self, word: &str) -> Option<usize> {
        self.rows.get(word).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
