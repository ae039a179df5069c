//! Collator: fixed-length windows of index-contiguous records
//!
//! Consumes an ascending, already deletion-filtered sequence and emits every
//! run of `length` consecutive indices as one window. A gap in the indices
//! restarts accumulation, so no window ever spans a deleted record.
//!
//! ```text
//! indices  0 1 2 _ 4 5 6     length = 3
//! windows  [0 1 2] [4 5 6]
//! ```

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::Record;
use crate::record::TubRecord;

/// Anything that carries a record index
pub trait Indexed {
    fn index(&self) -> u64;
}

impl Indexed for Record {
    fn index(&self) -> u64 {
        Record::index(self)
    }
}

impl Indexed for TubRecord {
    fn index(&self) -> u64 {
        TubRecord::index(self)
    }
}

impl<T: Indexed + ?Sized> Indexed for &T {
    fn index(&self) -> u64 {
        (**self).index()
    }
}

impl<T: Indexed + ?Sized> Indexed for Rc<T> {
    fn index(&self) -> u64 {
        (**self).index()
    }
}

impl<T: Indexed + ?Sized> Indexed for Arc<T> {
    fn index(&self) -> u64 {
        (**self).index()
    }
}

/// Whether `b` immediately follows `a`
pub fn is_continuous<A: Indexed + ?Sized, B: Indexed + ?Sized>(a: &A, b: &B) -> bool {
    a.index().checked_add(1) == Some(b.index())
}

/// Collator construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollatorError {
    #[error("Window length must be positive, got {0}")]
    InvalidWindowLength(usize),
}

/// Lazy iterator of windows over an ordered record sequence.
///
/// Items are cloned into each window they belong to; wrap large items in
/// `Rc` or `Arc` (or collate references) to share them instead.
pub struct Collator<I, T> {
    source: I,
    length: usize,
    buffer: VecDeque<T>,
}

impl<I, T> Collator<I, T>
where
    I: Iterator<Item = T>,
    T: Indexed + Clone,
{
    /// # Errors
    ///
    /// `InvalidWindowLength` if `length` is zero.
    pub fn new<S>(length: usize, source: S) -> Result<Self, CollatorError>
    where
        S: IntoIterator<IntoIter = I, Item = T>,
    {
        if length == 0 {
            return Err(CollatorError::InvalidWindowLength(length));
        }

        Ok(Self {
            source: source.into_iter(),
            length,
            buffer: VecDeque::with_capacity(length),
        })
    }

    pub fn window_length(&self) -> usize {
        self.length
    }
}

impl<I, T> Iterator for Collator<I, T>
where
    I: Iterator<Item = T>,
    T: Indexed + Clone,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        for item in self.source.by_ref() {
            if let Some(last) = self.buffer.back() {
                if !is_continuous(last, &item) {
                    self.buffer.clear();
                }
            }
            self.buffer.push_back(item);

            if self.buffer.len() == self.length {
                let window: Vec<T> = self.buffer.iter().cloned().collect();
                self.buffer.pop_front();
                return Some(window);
            }
        }
        None
    }
}
