use std::ops::Range;

/// Splits `total` rows into consecutive chunks of at most `batch` rows.
/// A zero batch size is treated as one.
pub fn chunk_ranges(total: usize, batch: usize) -> impl Iterator<Item = Range<usize>> {
    let batch = batch.max(1);
    (0..total)
        .step_by(batch)
        .map(move |start| start..(start + batch).min(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_chunk_is_short() {
        let chunks: Vec<_> = chunk_ranges(5, 2).collect();
        assert_eq!(chunks, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn oversized_batch_is_one_chunk() {
        assert_eq!(chunk_ranges(3, 128).collect::<Vec<_>>(), vec![0..3]);
        assert_eq!(chunk_ranges(0, 4).count(), 0);
        assert_eq!(chunk_ranges(2, 0).count(), 2);
    }
}
