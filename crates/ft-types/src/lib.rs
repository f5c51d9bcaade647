#![forbid(unsafe_code)]

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;
const MILLIS_PER_SECOND: u32 = 1_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

pub const INT16_MISSING: i16 = i16::MIN;
pub const INT32_MISSING: i32 = i32::MIN;
pub const INT64_MISSING: i64 = i64::MIN;
pub const BOOL_MISSING: i8 = i8::MIN;
pub const UTF8_MISSING: &str = "";
pub const DATE_MISSING: i32 = i32::MIN;
pub const DATE_TIME_MISSING: i64 = i64::MIN;
pub const TIME_MISSING: i32 = i32::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int16,
    Int32,
    Int64,
    Float64,
    Bool,
    Utf8,
    Date,
    DateTime,
    Time,
}

impl ColumnType {
    pub const ALL: [Self; 9] = [
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float64,
        Self::Bool,
        Self::Utf8,
        Self::Date,
        Self::DateTime,
        Self::Time,
    ];

    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Int16 | Self::Int32 | Self::Int64)
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Utf8 => "utf8",
            Self::Date => "date",
            Self::DateTime => "date_time",
            Self::Time => "time",
        };
        f.write_str(name)
    }
}

/// A single cell value.
///
/// Temporal variants carry their internal integral encoding: `Date` is days
/// since 1970-01-01, `DateTime` is milliseconds since the Unix epoch (UTC,
/// naive) and `Time` is milliseconds since midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Missing,
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Utf8(String),
    Date(i32),
    DateTime(i64),
    Time(i32),
}

impl From<i16> for Scalar {
    fn from(value: i16) -> Self {
        Self::Int16(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Self::Date(encode_date(value))
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(encode_date_time(value))
    }
}

impl From<NaiveTime> for Scalar {
    fn from(value: NaiveTime) -> Self {
        Self::Time(encode_time(value))
    }
}

impl Scalar {
    /// Type tag of a present value; `None` for `Missing`.
    #[must_use]
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Missing => None,
            Self::Int16(_) => Some(ColumnType::Int16),
            Self::Int32(_) => Some(ColumnType::Int32),
            Self::Int64(_) => Some(ColumnType::Int64),
            Self::Float64(_) => Some(ColumnType::Float64),
            Self::Bool(_) => Some(ColumnType::Bool),
            Self::Utf8(_) => Some(ColumnType::Utf8),
            Self::Date(_) => Some(ColumnType::Date),
            Self::DateTime(_) => Some(ColumnType::DateTime),
            Self::Time(_) => Some(ColumnType::Time),
        }
    }

    /// True for `Missing` and for values equal to their type's sentinel.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Int16(v) => *v == INT16_MISSING,
            Self::Int32(v) => *v == INT32_MISSING,
            Self::Int64(v) => *v == INT64_MISSING,
            Self::Float64(v) => v.is_nan(),
            Self::Bool(_) => false,
            Self::Utf8(v) => v.is_empty(),
            Self::Date(v) => *v == DATE_MISSING,
            Self::DateTime(v) => *v == DATE_TIME_MISSING,
            Self::Time(v) => *v == TIME_MISSING,
        }
    }

    /// Equality that treats every missing representation as equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => true,
            (false, false) => self == other,
            _ => false,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(days) if *days != DATE_MISSING => decode_date(*days),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(millis) if *millis != DATE_TIME_MISSING => decode_date_time(*millis),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(millis) if *millis != TIME_MISSING => decode_time(*millis),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_missing() {
            return f.write_str("");
        }
        match self {
            Self::Missing => Ok(()),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
            Self::Date(days) => match decode_date(*days) {
                Some(date) => write!(f, "{date}"),
                None => write!(f, "{days}"),
            },
            Self::DateTime(millis) => match decode_date_time(*millis) {
                Some(dt) => write!(f, "{dt}"),
                None => write!(f, "{millis}"),
            },
            Self::Time(millis) => match decode_time(*millis) {
                Some(time) => write!(f, "{time}"),
                None => write!(f, "{millis}"),
            },
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("expected a {expected} value but found {found:?}")]
    Mismatch { expected: ColumnType, found: Scalar },
    #[error("{value} cannot be represented as a {column_type} value")]
    OutOfRange { column_type: ColumnType, value: i64 },
}

// ── Temporal encodings ──────────────────────────────────────────────────

#[must_use]
pub fn encode_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

#[must_use]
pub fn decode_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

#[must_use]
pub fn encode_date_time(date_time: NaiveDateTime) -> i64 {
    date_time.and_utc().timestamp_millis()
}

#[must_use]
pub fn decode_date_time(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

#[must_use]
pub fn encode_time(time: NaiveTime) -> i32 {
    let millis = time.num_seconds_from_midnight() * MILLIS_PER_SECOND
        + time.nanosecond() / NANOS_PER_MILLI;
    // At most 86_400_999, comfortably inside i32.
    millis as i32
}

#[must_use]
pub fn decode_time(millis: i32) -> Option<NaiveTime> {
    let millis = u32::try_from(millis).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(
        millis / MILLIS_PER_SECOND,
        (millis % MILLIS_PER_SECOND) * NANOS_PER_MILLI,
    )
}

/// Join-key form of a fractional value: rounded half away from zero,
/// saturating at the `i64` bounds. `NaN` maps to the long missing sentinel
/// so missing fractional keys still meet each other. Present values never
/// reach the sentinel: the low end saturates at `INT64_MISSING + 1`.
#[must_use]
pub fn round_to_key(value: f64) -> i64 {
    if value.is_nan() {
        INT64_MISSING
    } else {
        (value.round() as i64).max(INT64_MISSING + 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{
        ColumnType, INT32_MISSING, INT64_MISSING, Scalar, decode_date, encode_date, round_to_key,
    };

    #[test]
    fn date_encoding_is_days_since_unix_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
        assert_eq!(encode_date(epoch), 0);

        let later = NaiveDate::from_ymd_opt(1970, 2, 1).expect("date");
        assert_eq!(encode_date(later), 31);
        assert_eq!(decode_date(31), Some(later));

        let before = NaiveDate::from_ymd_opt(1969, 12, 31).expect("date");
        assert_eq!(encode_date(before), -1);
    }

    #[test]
    fn temporal_scalars_round_trip_through_chrono() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("leap day");
        assert_eq!(Scalar::from(date).as_date(), Some(date));

        let dt = date.and_hms_milli_opt(13, 45, 7, 250).expect("date time");
        assert_eq!(Scalar::from(dt).as_date_time(), Some(dt));

        let time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).expect("time");
        let scalar = Scalar::from(time);
        assert_eq!(scalar, Scalar::Time(86_399_999));
        assert_eq!(scalar.as_time(), Some(time));
    }

    #[test]
    fn sentinels_count_as_missing() {
        assert!(Scalar::Missing.is_missing());
        assert!(Scalar::Int32(INT32_MISSING).is_missing());
        assert!(Scalar::Int64(INT64_MISSING).is_missing());
        assert!(Scalar::Float64(f64::NAN).is_missing());
        assert!(Scalar::Utf8(String::new()).is_missing());
        assert!(!Scalar::Int32(0).is_missing());
        assert!(!Scalar::Bool(false).is_missing());
    }

    #[test]
    fn semantic_eq_unifies_missing_representations() {
        assert!(Scalar::Missing.semantic_eq(&Scalar::Int32(INT32_MISSING)));
        assert!(Scalar::Float64(f64::NAN).semantic_eq(&Scalar::Missing));
        assert!(!Scalar::Missing.semantic_eq(&Scalar::Int32(0)));
        assert!(Scalar::from("a").semantic_eq(&Scalar::from("a")));
    }

    #[test]
    fn fractional_keys_round_half_away_from_zero() {
        assert_eq!(round_to_key(1.4), 1);
        assert_eq!(round_to_key(1.5), 2);
        assert_eq!(round_to_key(-2.5), -3);
        assert_eq!(round_to_key(f64::NAN), INT64_MISSING);
        assert_eq!(round_to_key(f64::INFINITY), i64::MAX);
        assert_eq!(round_to_key(f64::NEG_INFINITY), INT64_MISSING + 1);
        assert_eq!(round_to_key(-1e300), INT64_MISSING + 1);
        assert_ne!(round_to_key(f64::NEG_INFINITY), round_to_key(f64::NAN));
    }

    #[test]
    fn column_type_tags_serialize_snake_case() {
        let json = serde_json::to_string(&ColumnType::DateTime).expect("serialize");
        assert_eq!(json, "\"date_time\"");
        assert_eq!(ColumnType::DateTime.to_string(), "date_time");
        assert!(ColumnType::Time.is_temporal());
        assert!(ColumnType::Int16.is_integral());
        assert!(!ColumnType::Float64.is_integral());
    }

    #[test]
    fn scalar_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Scalar::Int32(7)).expect("serialize");
        assert_eq!(json, r#"{"kind":"int32","value":7}"#);
        let back: Scalar = serde_json::from_str(r#"{"kind":"missing"}"#).expect("deserialize");
        assert_eq!(back, Scalar::Missing);
    }
}
