//! Dynamic document values.
//!
//! `Datum` is the closed value type every query operates on. Numbers are `f64`; times carry their
//! own display offset but compare by instant. See `compare` for ordering rules.

pub mod compare;
pub mod convert;
pub mod time;

use crate::errors::DbError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Object = BTreeMap<String, Datum>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(Object),
    Time(DateTime<FixedOffset>),
}

impl Datum {
    /// Type name as reported in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Number(_) => "NUMBER",
            Self::String(_) => "STRING",
            Self::Array(_) => "ARRAY",
            Self::Object(_) => "OBJECT",
            Self::Time(_) => "PTYPE<TIME>",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Only `null` and `false` are falsy.
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> Option<&Vec<Self>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn expect_number(&self) -> Result<f64, DbError> {
        self.as_f64().ok_or_else(|| self.expected("NUMBER"))
    }

    pub fn expect_str(&self) -> Result<&str, DbError> {
        self.as_str().ok_or_else(|| self.expected("STRING"))
    }

    pub fn expect_bool(&self) -> Result<bool, DbError> {
        self.as_bool().ok_or_else(|| self.expected("BOOL"))
    }

    pub fn expect_array(&self) -> Result<&Vec<Self>, DbError> {
        self.as_array().ok_or_else(|| self.expected("ARRAY"))
    }

    pub fn expect_object(&self) -> Result<&Object, DbError> {
        self.as_object().ok_or_else(|| self.expected("OBJECT"))
    }

    pub fn into_array(self) -> Result<Vec<Self>, DbError> {
        match self {
            Self::Array(a) => Ok(a),
            other => Err(other.expected("ARRAY")),
        }
    }

    pub fn into_object(self) -> Result<Object, DbError> {
        match self {
            Self::Object(o) => Ok(o),
            other => Err(other.expected("OBJECT")),
        }
    }

    pub fn expect_time(&self) -> Result<&DateTime<FixedOffset>, DbError> {
        match self {
            Self::Time(t) => Ok(t),
            other => Err(other.expected("PTYPE<TIME>")),
        }
    }

    /// A non-negative whole number usable as a position or count.
    pub fn expect_index(&self) -> Result<i64, DbError> {
        let n = self.expect_number()?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(DbError::InvalidArgument(format!("Number not an integer: {n}")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(n as i64)
    }

    pub fn expect_count(&self) -> Result<usize, DbError> {
        let n = self.expect_index()?;
        usize::try_from(n)
            .map_err(|_| DbError::InvalidArgument(format!("Expected a non-negative count, got {n}")))
    }

    /// Field lookup failing with `KeyMissing` when absent.
    pub fn get_field(&self, name: &str) -> Result<&Self, DbError> {
        let obj = self.expect_object()?;
        obj.get(name).ok_or_else(|| {
            DbError::KeyMissing(format!("No attribute `{name}` in object: {}", self.to_json()))
        })
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Self> {
        self.as_object().and_then(|o| o.get(name))
    }

    pub(crate) fn expected(&self, want: &str) -> DbError {
        DbError::TypeMismatch(format!("Expected type {want} but found {}.", self.type_name()))
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }
}

/// Builds an object datum from `(key, value)` pairs.
pub fn object<K, V, I>(pairs: I) -> Datum
where
    K: Into<String>,
    V: Into<Datum>,
    I: IntoIterator<Item = (K, V)>,
{
    Datum::Object(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Datum {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

#[allow(clippy::cast_precision_loss)]
impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

#[allow(clippy::cast_precision_loss)]
impl From<u64> for Datum {
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

#[allow(clippy::cast_precision_loss)]
impl From<usize> for Datum {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Self>> for Datum {
    fn from(v: Vec<Self>) -> Self {
        Self::Array(v)
    }
}

impl From<Object> for Datum {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<DateTime<FixedOffset>> for Datum {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Self::Time(t)
    }
}

impl<T: Into<Self>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn truthiness_only_null_and_false_are_falsy() {
        assert!(!Datum::Null.is_truthy());
        assert!(!Datum::Bool(false).is_truthy());
        assert!(Datum::Number(0.0).is_truthy());
        assert!(Datum::String(String::new()).is_truthy());
    }

    #[test]
    fn get_field_reports_missing_key() {
        let d = object([("a", 1)]);
        assert_eq!(d.get_field("a").unwrap(), &Datum::Number(1.0));
        let err = d.get_field("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyMissing);
        assert!(err.to_string().contains("`b`"));
    }

    #[test]
    fn expect_count_rejects_fractions_and_negatives() {
        assert_eq!(Datum::from(3).expect_count().unwrap(), 3);
        assert_eq!(Datum::from(1.5).expect_count().unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(Datum::from(-1).expect_count().unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(Datum::from("x").expect_count().unwrap_err().kind(), ErrorKind::TypeMismatch);
    }
}
