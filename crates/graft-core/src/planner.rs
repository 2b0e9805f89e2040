//! Batch planning.
//!
//! Splits an ordered list of records into contiguous, order-preserving batches.
//! Pure functions, no database access.

use crate::errors::GraftError;

/// A contiguous slice of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<'a, R> {
    /// Position of this batch within its type, from 0.
    pub index: usize,

    /// Position of the first record within the input.
    pub offset: usize,

    pub records: &'a [R],
}

impl<R> Batch<'_, R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn check_batch_size(batch_size: usize) -> Result<(), GraftError> {
    if batch_size == 0 {
        return Err(GraftError::invalid_configuration(
            "batch size cannot be 0",
            "Use a batch size of at least 1",
        ));
    }
    Ok(())
}

/// Split `records` into batches of `batch_size`; the last may be smaller.
///
/// An empty input yields no batches.
///
/// # Errors
///
/// Returns [`GraftError::InvalidConfiguration`] if `batch_size` is 0.
pub fn plan<R>(records: &[R], batch_size: usize) -> Result<Vec<Batch<'_, R>>, GraftError> {
    check_batch_size(batch_size)?;

    Ok(records
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            offset: index * batch_size,
            records: chunk,
        })
        .collect())
}

/// `ceil(count / batch_size)`.
///
/// # Errors
///
/// Returns [`GraftError::InvalidConfiguration`] if `batch_size` is 0.
pub fn estimate_total_batches(count: usize, batch_size: usize) -> Result<usize, GraftError> {
    check_batch_size(batch_size)?;
    Ok(count.div_ceil(batch_size))
}
