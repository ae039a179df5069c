//! Index selections accepted by `Tub::delete_records`

use std::ops::{Range, RangeInclusive};

/// One or many record indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSelection(Vec<u64>);

impl IndexSelection {
    pub fn indices(&self) -> &[u64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for IndexSelection {
    type Item = u64;
    type IntoIter = std::vec::IntoIter<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<u64> for IndexSelection {
    fn from(index: u64) -> Self {
        Self(vec![index])
    }
}

impl From<Vec<u64>> for IndexSelection {
    fn from(indices: Vec<u64>) -> Self {
        Self(indices)
    }
}

impl From<&[u64]> for IndexSelection {
    fn from(indices: &[u64]) -> Self {
        Self(indices.to_vec())
    }
}

impl<const N: usize> From<[u64; N]> for IndexSelection {
    fn from(indices: [u64; N]) -> Self {
        Self(indices.to_vec())
    }
}

impl From<Range<u64>> for IndexSelection {
    fn from(range: Range<u64>) -> Self {
        Self(range.collect())
    }
}

impl From<RangeInclusive<u64>> for IndexSelection {
    fn from(range: RangeInclusive<u64>) -> Self {
        Self(range.collect())
    }
}
