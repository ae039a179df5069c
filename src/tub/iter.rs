//! Tub iterators
//!
//! Both iterators borrow the tub, so its length and deletion set are fixed
//! for the whole traversal.

use std::sync::Arc;

use super::Tub;
use crate::catalog::Record;
use crate::errors::TubResult;
use crate::record::{AssetResolver, TubRecord};

/// Non-deleted records in ascending index order.
///
/// Indices without an entry are skipped like deleted ones.
pub struct TubIter<'a> {
    tub: &'a Tub,
    next_index: u64,
    end: u64,
}

impl<'a> TubIter<'a> {
    pub(super) fn new(tub: &'a Tub) -> Self {
        Self {
            tub,
            next_index: 0,
            end: tub.catalog.length(),
        }
    }
}

impl Iterator for TubIter<'_> {
    type Item = TubResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index < self.end {
            let index = self.next_index;
            self.next_index += 1;
            if !self.tub.is_live(index) {
                continue;
            }
            return Some(self.tub.catalog.read(index));
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some((self.end - self.next_index) as usize))
    }
}

/// Non-deleted records wrapped as `TubRecord`s sharing one resolver
pub struct TubRecords<'a> {
    inner: TubIter<'a>,
    resolver: Arc<dyn AssetResolver>,
}

impl<'a> TubRecords<'a> {
    pub(super) fn new(tub: &'a Tub, resolver: Arc<dyn AssetResolver>) -> Self {
        Self {
            inner: TubIter::new(tub),
            resolver,
        }
    }
}

impl Iterator for TubRecords<'_> {
    type Item = TubResult<TubRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let schema = self.inner.tub.schema();
        self.inner.next().map(|result| {
            result.map(|record| TubRecord::new(record, schema, Arc::clone(&self.resolver)))
        })
    }
}
