#![forbid(unsafe_code)]

//! Equality indexes over a single column.
//!
//! An index is a multimap from a raw key value to the row positions holding
//! it, built in one pass over the column. Temporal columns are indexed by
//! their integral encoding and fractional columns by their rounded value.
//! Missing sentinels are ordinary keys: a missing key matches every other
//! row whose key is missing in the same encoding.

use std::borrow::Borrow;
use std::hash::Hash;

use ft_columnar::{Column, ColumnData};
use ft_selection::Selection;
use ft_types::{ColumnType, round_to_key};
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error(
        "joining is supported on integer, fractional, string and date-like columns; \
         column '{column}' is of type {column_type}"
    )]
    UnsupportedColumnType {
        column: String,
        column_type: ColumnType,
    },
    #[error("row {row} is out of bounds for column '{column}' with {len} rows")]
    RowOutOfBounds {
        column: String,
        row: usize,
        len: usize,
    },
}

/// Multimap from key to ascending row positions.
#[derive(Debug, Clone)]
pub struct ColumnIndex<K> {
    entries: FxHashMap<K, Vec<usize>>,
    rows: usize,
}

pub type ShortIndex = ColumnIndex<i16>;
pub type IntIndex = ColumnIndex<i32>;
pub type LongIndex = ColumnIndex<i64>;
pub type StringIndex = ColumnIndex<String>;

impl<K: Eq + Hash> ColumnIndex<K> {
    /// Indexes `keys`, taking each key's enumeration order as its row.
    pub fn from_keys<I: IntoIterator<Item = K>>(keys: I) -> Self {
        let mut entries = FxHashMap::<K, Vec<usize>>::default();
        let mut rows = 0;
        for (row, key) in keys.into_iter().enumerate() {
            entries.entry(key).or_default().push(row);
            rows = row + 1;
        }
        Self { entries, rows }
    }

    /// Row positions holding `key`, ascending.
    #[must_use]
    pub fn positions<Q>(&self, key: &Q) -> &[usize]
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Selection of rows holding `key`; empty when there are none. Costs
    /// time in the number of matches, not in the table's row count.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Selection
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Selection::from_positions(self.positions(key))
    }

    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Number of rows indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

/// Which index specialization and raw-value path a key column uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKeyKind {
    Short,
    Int,
    Long,
    Text,
    Date,
    DateTime,
    Time,
    RoundedFractional,
}

impl JoinKeyKind {
    /// `None` for column types that cannot be joined on.
    #[must_use]
    pub fn for_type(column_type: ColumnType) -> Option<Self> {
        match column_type {
            ColumnType::Int16 => Some(Self::Short),
            ColumnType::Int32 => Some(Self::Int),
            ColumnType::Int64 => Some(Self::Long),
            ColumnType::Float64 => Some(Self::RoundedFractional),
            ColumnType::Utf8 => Some(Self::Text),
            ColumnType::Date => Some(Self::Date),
            ColumnType::DateTime => Some(Self::DateTime),
            ColumnType::Time => Some(Self::Time),
            ColumnType::Bool => None,
        }
    }

    pub fn of(column: &Column) -> Result<Self, IndexError> {
        Self::for_type(column.column_type()).ok_or_else(|| IndexError::UnsupportedColumnType {
            column: column.name().to_owned(),
            column_type: column.column_type(),
        })
    }
}

/// A raw join-key value borrowed from a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKeyRef<'a> {
    Short(i16),
    Int(i32),
    Long(i64),
    Text(&'a str),
}

/// Raw comparable key of `column` at `row`.
pub fn key_at(column: &Column, row: usize) -> Result<JoinKeyRef<'_>, IndexError> {
    let out_of_bounds = || IndexError::RowOutOfBounds {
        column: column.name().to_owned(),
        row,
        len: column.len(),
    };
    let key = match column.data() {
        ColumnData::Int16(d) => JoinKeyRef::Short(*d.get(row).ok_or_else(out_of_bounds)?),
        ColumnData::Int32(d) | ColumnData::Date(d) | ColumnData::Time(d) => {
            JoinKeyRef::Int(*d.get(row).ok_or_else(out_of_bounds)?)
        }
        ColumnData::Int64(d) | ColumnData::DateTime(d) => {
            JoinKeyRef::Long(*d.get(row).ok_or_else(out_of_bounds)?)
        }
        ColumnData::Float64(d) => {
            JoinKeyRef::Long(round_to_key(*d.get(row).ok_or_else(out_of_bounds)?))
        }
        ColumnData::Utf8(d) => JoinKeyRef::Text(d.get(row).ok_or_else(out_of_bounds)?),
        ColumnData::Bool(_) => {
            return Err(IndexError::UnsupportedColumnType {
                column: column.name().to_owned(),
                column_type: ColumnType::Bool,
            });
        }
    };
    Ok(key)
}

/// An index over one join-key column, specialized by the column's type.
#[derive(Debug, Clone)]
pub enum JoinKeyIndex {
    Short(ShortIndex),
    Int(IntIndex),
    Long(LongIndex),
    Text(StringIndex),
}

impl JoinKeyIndex {
    pub fn build(column: &Column) -> Result<Self, IndexError> {
        let index = match column.data() {
            ColumnData::Int16(d) => Self::Short(ColumnIndex::from_keys(d.iter().copied())),
            ColumnData::Int32(d) | ColumnData::Date(d) | ColumnData::Time(d) => {
                Self::Int(ColumnIndex::from_keys(d.iter().copied()))
            }
            ColumnData::Int64(d) | ColumnData::DateTime(d) => {
                Self::Long(ColumnIndex::from_keys(d.iter().copied()))
            }
            ColumnData::Float64(d) => {
                Self::Long(ColumnIndex::from_keys(d.iter().copied().map(round_to_key)))
            }
            ColumnData::Utf8(d) => Self::Text(ColumnIndex::from_keys(d.iter().cloned())),
            ColumnData::Bool(_) => {
                return Err(IndexError::UnsupportedColumnType {
                    column: column.name().to_owned(),
                    column_type: ColumnType::Bool,
                });
            }
        };
        Ok(index)
    }

    /// Rows matching `key`. A key of a different encoding never matches.
    #[must_use]
    pub fn get(&self, key: JoinKeyRef<'_>) -> Selection {
        Selection::from_positions(self.positions(key))
    }

    /// Ascending rows matching `key`, borrowed from the index.
    #[must_use]
    pub fn positions(&self, key: JoinKeyRef<'_>) -> &[usize] {
        match (self, key) {
            (Self::Short(index), JoinKeyRef::Short(k)) => index.positions(&k),
            (Self::Int(index), JoinKeyRef::Int(k)) => index.positions(&k),
            (Self::Long(index), JoinKeyRef::Long(k)) => index.positions(&k),
            (Self::Text(index), JoinKeyRef::Text(k)) => index.positions(k),
            _ => &[],
        }
    }

    /// Number of rows matching `key`, without materializing a selection.
    #[must_use]
    pub fn match_count(&self, key: JoinKeyRef<'_>) -> usize {
        self.positions(key).len()
    }

    /// Rows of the indexed column matching `probe[row]`.
    pub fn lookup(&self, probe: &Column, row: usize) -> Result<Selection, IndexError> {
        Ok(self.get(key_at(probe, row)?))
    }

    #[must_use]
    pub fn contains(&self, key: JoinKeyRef<'_>) -> bool {
        match (self, key) {
            (Self::Short(index), JoinKeyRef::Short(k)) => index.contains_key(&k),
            (Self::Int(index), JoinKeyRef::Int(k)) => index.contains_key(&k),
            (Self::Long(index), JoinKeyRef::Long(k)) => index.contains_key(&k),
            (Self::Text(index), JoinKeyRef::Text(k)) => index.contains_key(k),
            _ => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Short(index) => index.len(),
            Self::Int(index) => index.len(),
            Self::Long(index) => index.len(),
            Self::Text(index) => index.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        match self {
            Self::Short(index) => index.key_count(),
            Self::Int(index) => index.key_count(),
            Self::Long(index) => index.key_count(),
            Self::Text(index) => index.key_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ft_columnar::Column;
    use ft_selection::Selection;
    use ft_types::ColumnType;
    use proptest::prelude::*;

    use super::{
        IndexError, IntIndex, JoinKeyIndex, JoinKeyKind, JoinKeyRef, StringIndex, key_at,
    };

    #[test]
    fn duplicate_keys_keep_every_position() {
        let index = IntIndex::from_keys([5, 7, 5, 5]);
        assert_eq!(index.get(&5).to_vec(), vec![0, 2, 3]);
        assert_eq!(index.positions(&7), &[1]);
        assert!(index.get(&9).is_empty());
        assert_eq!(index.len(), 4);
        assert_eq!(index.key_count(), 2);
    }

    #[test]
    fn string_index_looks_up_by_str() {
        let index = StringIndex::from_keys(["a".to_owned(), "b".to_owned(), "a".to_owned()]);
        assert_eq!(index.get("a"), Selection::from_positions(&[0, 2]));
        assert!(index.contains_key("b"));
        assert!(!index.contains_key("c"));
    }

    #[test]
    fn missing_sentinels_are_ordinary_keys() {
        let mut column = Column::from_i32("id", vec![1]);
        column.append_missing();
        column.append_missing();
        let index = JoinKeyIndex::build(&column).expect("index");

        let probe_key = key_at(&column, 1).expect("key");
        assert_eq!(index.get(probe_key).to_vec(), vec![1, 2]);
    }

    #[test]
    fn fractional_columns_index_rounded_values() {
        let right = Column::from_f64("k", vec![1.2, 0.6, 2.5, f64::NAN]);
        let index = JoinKeyIndex::build(&right).expect("index");
        assert!(matches!(index, JoinKeyIndex::Long(_)));

        let probe = Column::from_f64("k", vec![1.4, 3.0, f64::NAN]);
        assert_eq!(index.lookup(&probe, 0).expect("probe").to_vec(), vec![0, 1]);
        assert_eq!(index.lookup(&probe, 1).expect("probe").to_vec(), vec![2]);
        assert_eq!(index.lookup(&probe, 2).expect("probe").to_vec(), vec![3]);
    }

    #[test]
    fn dates_index_by_internal_encoding() {
        let d1 = NaiveDate::from_ymd_opt(2021, 3, 4).expect("date");
        let d2 = NaiveDate::from_ymd_opt(2021, 3, 5).expect("date");
        let right = Column::from_dates("d", &[d1, d2, d1]);
        let index = JoinKeyIndex::build(&right).expect("index");
        assert!(matches!(index, JoinKeyIndex::Int(_)));

        let probe = Column::from_dates("d", &[d1]);
        assert_eq!(index.lookup(&probe, 0).expect("probe").to_vec(), vec![0, 2]);
    }

    #[test]
    fn bool_columns_are_rejected_with_name_and_type() {
        let column = Column::from_bools("flag", vec![true]);
        let err = JoinKeyIndex::build(&column).expect_err("unsupported");
        assert_eq!(
            err,
            IndexError::UnsupportedColumnType {
                column: "flag".to_owned(),
                column_type: ColumnType::Bool
            }
        );
        assert!(err.to_string().contains("flag"));
        assert!(JoinKeyKind::of(&column).is_err());
        assert_eq!(
            JoinKeyKind::for_type(ColumnType::DateTime),
            Some(JoinKeyKind::DateTime)
        );
    }

    #[test]
    fn mismatched_key_encoding_never_matches() {
        let index = JoinKeyIndex::build(&Column::from_i32("k", vec![1])).expect("index");
        assert!(index.get(JoinKeyRef::Long(1)).is_empty());
        assert!(index.get(JoinKeyRef::Int(1)).contains(0));
        assert!(!index.contains(JoinKeyRef::Text("1")));
    }

    #[test]
    fn late_rows_are_found_without_scanning_earlier_ones() {
        let rows = 200_000_i64;
        let column = Column::from_i64("k", (0..rows).collect());
        let index = JoinKeyIndex::build(&column).expect("index");
        let last = JoinKeyRef::Long(rows - 1);
        assert_eq!(index.positions(last), &[199_999]);
        assert_eq!(index.get(last).to_vec(), vec![199_999]);
        assert_eq!(index.match_count(last), 1);
        assert!(index.positions(JoinKeyRef::Int(0)).is_empty());
    }

    #[test]
    fn key_at_reports_out_of_bounds_rows() {
        let column = Column::from_strs("s", &["x"]);
        assert_eq!(key_at(&column, 0), Ok(JoinKeyRef::Text("x")));
        assert!(matches!(
            key_at(&column, 1),
            Err(IndexError::RowOutOfBounds { row: 1, len: 1, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_get_returns_exactly_equal_positions(
            keys in proptest::collection::vec(-5i64..5, 0..60),
            probe in -6i64..6,
        ) {
            let index = JoinKeyIndex::build(&Column::from_i64("k", keys.clone())).expect("index");
            let expected: Vec<usize> = keys
                .iter()
                .enumerate()
                .filter(|(_, k)| **k == probe)
                .map(|(row, _)| row)
                .collect();
            prop_assert_eq!(index.get(JoinKeyRef::Long(probe)).to_vec(), expected);
            prop_assert_eq!(index.len(), keys.len());
        }
    }
}
