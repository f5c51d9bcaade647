#![forbid(unsafe_code)]

//! Row selections: ordered, deduplicated sets of 0-based row positions.
//!
//! A `Selection` is a compressed Roaring bitmap over 64-bit positions, so
//! its cost follows the number of selected rows rather than the largest
//! position. Iteration is always ascending.

use std::fmt;

use croaring::Treemap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("row position {position} is out of bounds for {row_count} rows")]
    PositionOutOfBounds { position: usize, row_count: usize },
}

fn to_value(position: usize) -> u64 {
    position as u64
}

fn to_position(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[derive(Clone)]
pub struct Selection {
    rows: Treemap,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Treemap::new(),
        }
    }

    #[must_use]
    pub fn with_single(position: usize) -> Self {
        let mut selection = Self::new();
        selection.add(position);
        selection
    }

    /// Positions in `start..end`.
    #[must_use]
    pub fn with_range(start: usize, end: usize) -> Self {
        (start..end).collect()
    }

    #[must_use]
    pub fn from_positions(positions: &[usize]) -> Self {
        positions.iter().copied().collect()
    }

    /// Adds `position`; returns `false` if it was already present.
    pub fn add(&mut self, position: usize) -> bool {
        let value = to_value(position);
        if self.rows.contains(value) {
            return false;
        }
        self.rows.add(value);
        true
    }

    /// Removes `position`; returns `true` if it was present.
    pub fn remove(&mut self, position: usize) -> bool {
        let value = to_value(position);
        if !self.rows.contains(value) {
            return false;
        }
        self.rows.remove(value);
        true
    }

    #[must_use]
    pub fn contains(&self, position: usize) -> bool {
        self.rows.contains(to_value(position))
    }

    #[must_use]
    pub fn size(&self) -> usize {
        to_position(self.rows.cardinality())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The `i`-th smallest position.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<usize> {
        self.rows.select(to_value(i)).map(to_position)
    }

    #[must_use]
    pub fn first(&self) -> Option<usize> {
        self.rows.minimum().map(to_position)
    }

    #[must_use]
    pub fn last(&self) -> Option<usize> {
        self.rows.maximum().map(to_position)
    }

    /// In-place union.
    pub fn or(&mut self, other: &Self) -> &mut Self {
        self.rows.or_inplace(&other.rows);
        self
    }

    /// In-place intersection.
    pub fn and(&mut self, other: &Self) -> &mut Self {
        self.rows.and_inplace(&other.rows);
        self
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.or(other);
        out
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.and(other);
        out
    }

    /// Positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().map(to_position)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Checks every position against a table's row-count domain.
    pub fn check_bounds(&self, row_count: usize) -> Result<(), SelectionError> {
        match self.last() {
            Some(position) if position >= row_count => {
                Err(SelectionError::PositionOutOfBounds {
                    position,
                    row_count,
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<usize> for Selection {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut selection = Self::new();
        selection.extend(iter);
        selection
    }
}

impl Extend<usize> for Selection {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for position in iter {
            self.rows.add(to_value(position));
        }
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.rows.cardinality() == other.rows.cardinality() && self.iter().eq(other.iter())
    }
}

impl Eq for Selection {}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for Selection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let positions = Vec::<usize>::deserialize(deserializer)?;
        Ok(positions.into_iter().collect())
    }
}
