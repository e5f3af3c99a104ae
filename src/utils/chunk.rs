use crate::error::{CollectorError, Result};

/// Lazy iterator over bounded-size groups of an underlying iterator.
///
/// Every group holds exactly `size` items except possibly the last one.
/// Calling [`batched`] again on the same source yields the full sequence from
/// the start.
#[derive(Debug, Clone)]
pub struct Batched<I> {
    iter: I,
    size: usize,
}

impl<I: Iterator> Iterator for Batched<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I::Item> = self.iter.by_ref().take(self.size).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (low, high) = self.iter.size_hint();
        (
            low.div_ceil(self.size),
            high.map(|high| high.div_ceil(self.size)),
        )
    }
}

/// Split `items` into groups of at most `size` elements, preserving order.
///
/// `batched("ABCDEFG", 3)` yields `ABC`, `DEF`, `G`.
pub fn batched<I>(items: I, size: usize) -> Result<Batched<I::IntoIter>>
where
    I: IntoIterator,
{
    if size == 0 {
        return Err(CollectorError::InvalidArgument(
            "chunk size must be at least one".to_string(),
        ));
    }

    Ok(Batched {
        iter: items.into_iter(),
        size,
    })
}
