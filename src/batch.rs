//! Batch partitioning over the remaining work items.

use snafu::ensure;

use crate::error::{ConfigError, ZeroBatchSizeSnafu};
use crate::source::WorkItem;

/// A fixed-size, order-preserving group of work items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Monotonically increasing batch number. Continues from the number of
    /// batches already completed when resuming, so logs line up across runs.
    pub index: usize,
    /// Items in original work-source order.
    pub items: Vec<WorkItem>,
}

impl Batch {
    /// Ids of every item in this batch.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

/// Split `items` into batches of `batch_size`, preserving order.
///
/// Produces `ceil(N/B)` batches, each of size B except possibly the last.
/// No item is dropped or duplicated. `first_index` offsets the batch
/// numbering for resumed runs.
pub fn partition(
    items: Vec<WorkItem>,
    batch_size: usize,
    first_index: usize,
) -> Result<Vec<Batch>, ConfigError> {
    ensure!(batch_size > 0, ZeroBatchSizeSnafu);

    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);

    for item in items {
        current.push(item);
        if current.len() == batch_size {
            batches.push(Batch {
                index: first_index + batches.len(),
                items: std::mem::replace(&mut current, Vec::with_capacity(batch_size)),
            });
        }
    }

    if !current.is_empty() {
        batches.push(Batch {
            index: first_index + batches.len(),
            items: current,
        });
    }

    Ok(batches)
}
