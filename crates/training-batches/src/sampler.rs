//! Draws negative row ids from outside an anchor's class.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::SamplingError;

/// Rows that may not be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion<'a> {
    /// Inclusive `[start, end]`.
    Range { start: usize, end: usize },
    /// Strictly ascending row ids.
    Rows(&'a [usize]),
}

impl Exclusion<'_> {
    /// Number of excluded rows, after checking they fit inside `total`.
    fn excluded_count(&self, total: usize) -> Result<usize, SamplingError> {
        match *self {
            Self::Range { start, end } => {
                if start > end || end >= total {
                    return Err(SamplingError::InvalidExclusion {
                        total,
                        reason: format!("range [{start}, {end}]"),
                    });
                }
                Ok(end - start + 1)
            }
            Self::Rows(rows) => {
                if rows.windows(2).any(|pair| pair[0] >= pair[1]) {
                    return Err(SamplingError::InvalidExclusion {
                        total,
                        reason: "rows must be strictly ascending".into(),
                    });
                }
                if rows.last().is_some_and(|&last| last >= total) {
                    return Err(SamplingError::InvalidExclusion {
                        total,
                        reason: "row outside the table".into(),
                    });
                }
                Ok(rows.len())
            }
        }
    }

    /// Maps a position in the allowed population to its row id.
    fn nth_allowed(&self, slot: usize) -> usize {
        match *self {
            Self::Range { start, end } => {
                if slot < start {
                    slot
                } else {
                    slot + (end - start + 1)
                }
            }
            Self::Rows(rows) => {
                let mut row = slot;
                for &excluded in rows {
                    if excluded <= row {
                        row += 1;
                    } else {
                        break;
                    }
                }
                row
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NegativeSampler {
    rng: StdRng,
}

impl NegativeSampler {
    /// Seeded samplers replay the same draws; `None` seeds from the OS.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Draws `k` distinct rows from `0..total` outside `exclusion`, without
    /// replacement, sorted ascending.
    pub fn sample(
        &mut self,
        exclusion: Exclusion<'_>,
        total: usize,
        k: usize,
    ) -> Result<Vec<usize>, SamplingError> {
        let population = total - exclusion.excluded_count(total)?;
        if population < k {
            return Err(SamplingError::InsufficientPopulation {
                population,
                requested: k,
            });
        }
        let mut rows: Vec<usize> = rand::seq::index::sample(&mut self.rng, population, k)
            .into_iter()
            .map(|slot| exclusion.nth_allowed(slot))
            .collect();
        rows.sort_unstable();
        Ok(rows)
    }
}
