//! Seeded shuffle and train/test partitioning.

use crate::dataset::ImageRecord;
use crate::error::{ClassifyError, Result};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Disjoint train/test partition of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T = ImageRecord> {
    pub train: Vec<T>,
    pub test: Vec<T>,
}

impl<T> Split<T> {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.test.is_empty()
    }
}

/// Number of records reserved for testing: `fraction * total`, rounded half
/// away from zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn test_size(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction).round() as usize).min(total)
}

/// Shuffle `items` with a `ChaCha8Rng` seeded from `seed`, then take the first
/// [`test_size`] items as the test set and the remainder as the train set.
///
/// Identical inputs and seed always produce identical splits.
pub fn shuffle_and_split<T>(mut items: Vec<T>, test_fraction: f64, seed: u64) -> Result<Split<T>> {
    if !(0.0..=1.0).contains(&test_fraction) {
        return Err(ClassifyError::config(format!(
            "test fraction must be within [0, 1], got {test_fraction}"
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let n_test = test_size(items.len(), test_fraction);
    let train = items.split_off(n_test);
    tracing::debug!(train = train.len(), test = items.len(), seed, "Split dataset");
    Ok(Split { train, test: items })
}
