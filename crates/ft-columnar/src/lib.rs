#![forbid(unsafe_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ft_selection::{Selection, SelectionError};
use ft_types::{
    BOOL_MISSING, ColumnType, DATE_MISSING, DATE_TIME_MISSING, INT16_MISSING, INT32_MISSING,
    INT64_MISSING, Scalar, TIME_MISSING, TypeError, encode_date, encode_date_time, encode_time,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed backing storage for a column.
///
/// Missing values are stored inline as the type's sentinel (see
/// `ft_types::*_MISSING`, `NaN` for `Float64`, `""` for `Utf8`), so every
/// position always holds a raw comparable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<i8>),
    Utf8(Vec<String>),
    Date(Vec<i32>),
    DateTime(Vec<i64>),
    Time(Vec<i32>),
}

fn take_values<T: Clone>(
    values: &[T],
    positions: &[Option<usize>],
    missing: &T,
) -> Result<Vec<T>, usize> {
    positions
        .iter()
        .map(|slot| match slot {
            Some(idx) => values.get(*idx).cloned().ok_or(*idx),
            None => Ok(missing.clone()),
        })
        .collect()
}

fn push_from<T: Clone>(dst: &mut Vec<T>, src: &[T], row: usize) -> Result<(), usize> {
    let value = src.get(row).ok_or(row)?;
    dst.push(value.clone());
    Ok(())
}

fn narrow<T, U>(value: U, column_type: ColumnType) -> Result<T, TypeError>
where
    T: TryFrom<U>,
    U: Copy + Into<i64>,
{
    T::try_from(value).map_err(|_| TypeError::OutOfRange {
        column_type,
        value: value.into(),
    })
}

impl ColumnData {
    #[must_use]
    pub fn empty(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Int16 => Self::Int16(Vec::with_capacity(capacity)),
            ColumnType::Int32 => Self::Int32(Vec::with_capacity(capacity)),
            ColumnType::Int64 => Self::Int64(Vec::with_capacity(capacity)),
            ColumnType::Float64 => Self::Float64(Vec::with_capacity(capacity)),
            ColumnType::Bool => Self::Bool(Vec::with_capacity(capacity)),
            ColumnType::Utf8 => Self::Utf8(Vec::with_capacity(capacity)),
            ColumnType::Date => Self::Date(Vec::with_capacity(capacity)),
            ColumnType::DateTime => Self::DateTime(Vec::with_capacity(capacity)),
            ColumnType::Time => Self::Time(Vec::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Int16(_) => ColumnType::Int16,
            Self::Int32(_) => ColumnType::Int32,
            Self::Int64(_) => ColumnType::Int64,
            Self::Float64(_) => ColumnType::Float64,
            Self::Bool(_) => ColumnType::Bool,
            Self::Utf8(_) => ColumnType::Utf8,
            Self::Date(_) => ColumnType::Date,
            Self::DateTime(_) => ColumnType::DateTime,
            Self::Time(_) => ColumnType::Time,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int16(d) => d.len(),
            Self::Int32(d) | Self::Date(d) | Self::Time(d) => d.len(),
            Self::Int64(d) | Self::DateTime(d) => d.len(),
            Self::Float64(d) => d.len(),
            Self::Bool(d) => d.len(),
            Self::Utf8(d) => d.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded value at `row`; sentinels come back as `Scalar::Missing`.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<Scalar> {
        let value = match self {
            Self::Int16(d) => Scalar::Int16(*d.get(row)?),
            Self::Int32(d) => Scalar::Int32(*d.get(row)?),
            Self::Int64(d) => Scalar::Int64(*d.get(row)?),
            Self::Float64(d) => Scalar::Float64(*d.get(row)?),
            Self::Bool(d) => match *d.get(row)? {
                BOOL_MISSING => Scalar::Missing,
                b => Scalar::Bool(b != 0),
            },
            Self::Utf8(d) => Scalar::Utf8(d.get(row)?.clone()),
            Self::Date(d) => Scalar::Date(*d.get(row)?),
            Self::DateTime(d) => Scalar::DateTime(*d.get(row)?),
            Self::Time(d) => Scalar::Time(*d.get(row)?),
        };
        Some(if value.is_missing() {
            Scalar::Missing
        } else {
            value
        })
    }

    pub fn push_missing(&mut self) {
        match self {
            Self::Int16(d) => d.push(INT16_MISSING),
            Self::Int32(d) => d.push(INT32_MISSING),
            Self::Int64(d) => d.push(INT64_MISSING),
            Self::Float64(d) => d.push(f64::NAN),
            Self::Bool(d) => d.push(BOOL_MISSING),
            Self::Utf8(d) => d.push(String::new()),
            Self::Date(d) => d.push(DATE_MISSING),
            Self::DateTime(d) => d.push(DATE_TIME_MISSING),
            Self::Time(d) => d.push(TIME_MISSING),
        }
    }

    /// Appends a scalar, widening integral values and range-checking
    /// narrowing ones.
    pub fn push_scalar(&mut self, value: Scalar) -> Result<(), TypeError> {
        let column_type = self.column_type();
        match (self, value) {
            (data, Scalar::Missing) => data.push_missing(),
            (Self::Int16(d), Scalar::Int16(v)) => d.push(v),
            (Self::Int16(d), Scalar::Int32(v)) => d.push(narrow(v, column_type)?),
            (Self::Int16(d), Scalar::Int64(v)) => d.push(narrow(v, column_type)?),
            (Self::Int32(d), Scalar::Int16(v)) => d.push(i32::from(v)),
            (Self::Int32(d), Scalar::Int32(v)) => d.push(v),
            (Self::Int32(d), Scalar::Int64(v)) => d.push(narrow(v, column_type)?),
            (Self::Int64(d), Scalar::Int16(v)) => d.push(i64::from(v)),
            (Self::Int64(d), Scalar::Int32(v)) => d.push(i64::from(v)),
            (Self::Int64(d), Scalar::Int64(v)) => d.push(v),
            (Self::Float64(d), Scalar::Float64(v)) => d.push(v),
            (Self::Float64(d), Scalar::Int16(v)) => d.push(f64::from(v)),
            (Self::Float64(d), Scalar::Int32(v)) => d.push(f64::from(v)),
            (Self::Float64(d), Scalar::Int64(v)) => d.push(v as f64),
            (Self::Bool(d), Scalar::Bool(v)) => d.push(i8::from(v)),
            (Self::Utf8(d), Scalar::Utf8(v)) => d.push(v),
            (Self::Date(d), Scalar::Date(v)) => d.push(v),
            (Self::DateTime(d), Scalar::DateTime(v)) => d.push(v),
            (Self::Time(d), Scalar::Time(v)) => d.push(v),
            (_, found) => {
                return Err(TypeError::Mismatch {
                    expected: column_type,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Appends `src[row]`. `Err(None)` on a type mismatch, `Err(Some(row))`
    /// when `row` is out of range.
    fn push_from(&mut self, src: &Self, row: usize) -> Result<(), Option<usize>> {
        let pushed = match (self, src) {
            (Self::Int16(d), Self::Int16(s)) => push_from(d, s, row),
            (Self::Int32(d), Self::Int32(s)) => push_from(d, s, row),
            (Self::Int64(d), Self::Int64(s)) => push_from(d, s, row),
            (Self::Float64(d), Self::Float64(s)) => push_from(d, s, row),
            (Self::Bool(d), Self::Bool(s)) => push_from(d, s, row),
            (Self::Utf8(d), Self::Utf8(s)) => push_from(d, s, row),
            (Self::Date(d), Self::Date(s)) => push_from(d, s, row),
            (Self::DateTime(d), Self::DateTime(s)) => push_from(d, s, row),
            (Self::Time(d), Self::Time(s)) => push_from(d, s, row),
            _ => return Err(None),
        };
        pushed.map_err(Some)
    }

    fn extend_from(&mut self, src: &Self) -> bool {
        match (self, src) {
            (Self::Int16(d), Self::Int16(s)) => d.extend_from_slice(s),
            (Self::Int32(d), Self::Int32(s)) => d.extend_from_slice(s),
            (Self::Int64(d), Self::Int64(s)) => d.extend_from_slice(s),
            (Self::Float64(d), Self::Float64(s)) => d.extend_from_slice(s),
            (Self::Bool(d), Self::Bool(s)) => d.extend_from_slice(s),
            (Self::Utf8(d), Self::Utf8(s)) => d.extend_from_slice(s),
            (Self::Date(d), Self::Date(s)) => d.extend_from_slice(s),
            (Self::DateTime(d), Self::DateTime(s)) => d.extend_from_slice(s),
            (Self::Time(d), Self::Time(s)) => d.extend_from_slice(s),
            _ => return false,
        }
        true
    }

    fn take(&self, positions: &[Option<usize>]) -> Result<Self, usize> {
        Ok(match self {
            Self::Int16(d) => Self::Int16(take_values(d, positions, &INT16_MISSING)?),
            Self::Int32(d) => Self::Int32(take_values(d, positions, &INT32_MISSING)?),
            Self::Int64(d) => Self::Int64(take_values(d, positions, &INT64_MISSING)?),
            Self::Float64(d) => Self::Float64(take_values(d, positions, &f64::NAN)?),
            Self::Bool(d) => Self::Bool(take_values(d, positions, &BOOL_MISSING)?),
            Self::Utf8(d) => Self::Utf8(take_values(d, positions, &String::new())?),
            Self::Date(d) => Self::Date(take_values(d, positions, &DATE_MISSING)?),
            Self::DateTime(d) => Self::DateTime(take_values(d, positions, &DATE_TIME_MISSING)?),
            Self::Time(d) => Self::Time(take_values(d, positions, &TIME_MISSING)?),
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column '{column}' has type {expected} but a {found} column was supplied")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: ColumnType,
    },
    #[error("row {row} is out of bounds for column '{column}' with {len} rows")]
    RowOutOfBounds {
        column: String,
        row: usize,
        len: usize,
    },
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    #[must_use]
    pub fn from_data(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Builds a column of `column_type` from scalars, coercing integral
    /// widths where lossless.
    pub fn new(
        name: impl Into<String>,
        column_type: ColumnType,
        values: Vec<Scalar>,
    ) -> Result<Self, ColumnError> {
        let mut data = ColumnData::empty(column_type, values.len());
        for value in values {
            data.push_scalar(value)?;
        }
        Ok(Self::from_data(name, data))
    }

    #[must_use]
    pub fn empty(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::from_data(name, ColumnData::empty(column_type, 0))
    }

    #[must_use]
    pub fn from_i16(name: impl Into<String>, values: Vec<i16>) -> Self {
        Self::from_data(name, ColumnData::Int16(values))
    }

    #[must_use]
    pub fn from_i32(name: impl Into<String>, values: Vec<i32>) -> Self {
        Self::from_data(name, ColumnData::Int32(values))
    }

    #[must_use]
    pub fn from_i64(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::from_data(name, ColumnData::Int64(values))
    }

    #[must_use]
    pub fn from_f64(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::from_data(name, ColumnData::Float64(values))
    }

    #[must_use]
    pub fn from_bools(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self::from_data(
            name,
            ColumnData::Bool(values.into_iter().map(i8::from).collect()),
        )
    }

    #[must_use]
    pub fn from_strs(name: impl Into<String>, values: &[&str]) -> Self {
        Self::from_data(
            name,
            ColumnData::Utf8(values.iter().map(|v| (*v).to_owned()).collect()),
        )
    }

    #[must_use]
    pub fn from_dates(name: impl Into<String>, values: &[NaiveDate]) -> Self {
        Self::from_data(
            name,
            ColumnData::Date(values.iter().copied().map(encode_date).collect()),
        )
    }

    #[must_use]
    pub fn from_date_times(name: impl Into<String>, values: &[NaiveDateTime]) -> Self {
        Self::from_data(
            name,
            ColumnData::DateTime(values.iter().copied().map(encode_date_time).collect()),
        )
    }

    #[must_use]
    pub fn from_times(name: impl Into<String>, values: &[NaiveTime]) -> Self {
        Self::from_data(
            name,
            ColumnData::Time(values.iter().copied().map(encode_time).collect()),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    #[must_use]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn out_of_bounds(&self, row: usize) -> ColumnError {
        ColumnError::RowOutOfBounds {
            column: self.name.clone(),
            row,
            len: self.len(),
        }
    }

    pub fn get(&self, row: usize) -> Result<Scalar, ColumnError> {
        self.data.get(row).ok_or_else(|| self.out_of_bounds(row))
    }

    #[must_use]
    pub fn is_missing(&self, row: usize) -> bool {
        self.data.get(row).is_some_and(|v| v.is_missing())
    }

    #[must_use]
    pub fn count_missing(&self) -> usize {
        (0..self.len()).filter(|row| self.is_missing(*row)).count()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Scalar> {
        (0..self.len()).filter_map(|row| self.data.get(row)).collect()
    }

    /// Same name and type, no rows.
    #[must_use]
    pub fn empty_copy(&self, size_hint: usize) -> Self {
        Self::from_data(
            self.name.clone(),
            ColumnData::empty(self.column_type(), size_hint),
        )
    }

    pub fn push(&mut self, value: Scalar) -> Result<(), ColumnError> {
        self.data.push_scalar(value)?;
        Ok(())
    }

    pub fn append_missing(&mut self) {
        self.data.push_missing();
    }

    fn type_mismatch(&self, other: &Self) -> ColumnError {
        ColumnError::TypeMismatch {
            column: self.name.clone(),
            expected: self.column_type(),
            found: other.column_type(),
        }
    }

    /// Appends `other[row]`, keeping its raw value (sentinels included).
    pub fn append_from(&mut self, other: &Self, row: usize) -> Result<(), ColumnError> {
        match self.data.push_from(&other.data, row) {
            Ok(()) => Ok(()),
            Err(None) => Err(self.type_mismatch(other)),
            Err(Some(row)) => Err(other.out_of_bounds(row)),
        }
    }

    /// Appends every row of `other`.
    pub fn append_column(&mut self, other: &Self) -> Result<(), ColumnError> {
        if self.data.extend_from(&other.data) {
            Ok(())
        } else {
            Err(self.type_mismatch(other))
        }
    }

    /// Gathers rows by position; `None` slots become missing.
    pub fn take_positions(&self, positions: &[Option<usize>]) -> Result<Self, ColumnError> {
        let data = self
            .data
            .take(positions)
            .map_err(|row| self.out_of_bounds(row))?;
        Ok(Self::from_data(self.name.clone(), data))
    }

    /// The rows named by `selection`, in ascending order.
    pub fn where_rows(&self, selection: &Selection) -> Result<Self, ColumnError> {
        selection.check_bounds(self.len())?;
        let positions: Vec<Option<usize>> = selection.iter().map(Some).collect();
        self.take_positions(&positions)
    }

    /// Name, type and values equal, with all missing representations equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.column_type() == other.column_type()
            && self.len() == other.len()
            && (0..self.len()).all(|row| match (self.data.get(row), other.data.get(row)) {
                (Some(a), Some(b)) => a.semantic_eq(&b),
                _ => false,
            })
    }
}
