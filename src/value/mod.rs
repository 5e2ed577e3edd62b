//! # Value Type System
//!
//! Scalar values flowing through the engine and the closed set of type tags
//! attached to every bound column and expression.
//!
//! ## Usage
//!
//! ```rust
//! use quarry::value::{Value, ValueType};
//!
//! let v = Value::Integer(9);
//! assert_eq!(v.value_type(), ValueType::Integer);
//! assert!(Value::Null.is_null());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// The closed set of column/expression type tags.
///
/// `Missing` marks an expression whose type could not be resolved from the
/// operator map; such expressions cannot be folded or pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Boolean,
    Integer,
    Double,
    Varchar,
    Blob,
    Date,
    Time,
    Timestamp,
    Interval,
    Array,
    Struct,
    Null,
    Missing,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::Integer => "INTEGER",
            ValueType::Double => "DOUBLE",
            ValueType::Varchar => "VARCHAR",
            ValueType::Blob => "BLOB",
            ValueType::Date => "DATE",
            ValueType::Time => "TIME",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::Interval => "INTERVAL",
            ValueType::Array => "ARRAY",
            ValueType::Struct => "STRUCT",
            ValueType::Null => "NULL",
            ValueType::Missing => "MISSING",
        };
        f.write_str(name)
    }
}

/// A single scalar value.
///
/// Intervals are carried as whole seconds; structs as name/value pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Varchar(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Interval(i64),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Varchar(_) => ValueType::Varchar,
            Value::Blob(_) => ValueType::Blob,
            Value::Date(_) => ValueType::Date,
            Value::Time(_) => ValueType::Time,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Interval(_) => ValueType::Interval,
            Value::Array(_) => ValueType::Array,
            Value::Struct(_) => ValueType::Struct,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used for arithmetic and cross-type comparison.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    /// Three-way comparison for ORDER BY and range predicates.
    ///
    /// Returns `None` for incomparable pairs (e.g. a string against an
    /// integer). Numeric variants compare across Integer/Double.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Interval(a), Value::Interval(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Timestamp(b)) => Some(a.and_hms_opt(0, 0, 0)?.cmp(b)),
            (Value::Timestamp(a), Value::Date(b)) => Some(a.cmp(&b.and_hms_opt(0, 0, 0)?)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }

    /// Equality with numeric coercion, used by comparison evaluation,
    /// hash-join probing and IN-list membership. Null never equals anything.
    pub fn sql_eq(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Varchar(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "0x{}", hex(b)),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Interval(s) => write!(f, "{s}s"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A value wrapper with total `Eq`/`Hash`, used as hash-table keys by
/// joins, DISTINCT and GROUP BY. Doubles hash by bit pattern; Null is a
/// distinct key that only matches itself (join probes skip nulls before
/// keying, per SQL semantics).
#[derive(Debug, Clone, PartialEq)]
pub struct HashableValue(pub Value);

impl Eq for HashableValue {}

impl Hash for HashableValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Null => state.write_u8(0),
            Value::Boolean(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Integer(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Value::Double(d) => {
                // integral doubles hash like the equal integer so that
                // 1 and 1.0 land in the same bucket
                if d.fract() == 0.0 && d.is_finite() && *d >= i64::MIN as f64 && *d <= i64::MAX as f64
                {
                    state.write_u8(2);
                    (*d as i64).hash(state);
                } else {
                    state.write_u8(3);
                    d.to_bits().hash(state);
                }
            }
            Value::Varchar(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::Blob(b) => {
                state.write_u8(5);
                b.hash(state);
            }
            Value::Date(d) => {
                state.write_u8(6);
                d.hash(state);
            }
            Value::Time(t) => {
                state.write_u8(7);
                t.hash(state);
            }
            Value::Timestamp(t) => {
                state.write_u8(8);
                t.hash(state);
            }
            Value::Interval(i) => {
                state.write_u8(9);
                i.hash(state);
            }
            Value::Array(items) => {
                state.write_u8(10);
                for item in items {
                    HashableValue(item.clone()).hash(state);
                }
            }
            Value::Struct(fields) => {
                state.write_u8(11);
                for (name, value) in fields {
                    name.hash(state);
                    HashableValue(value.clone()).hash(state);
                }
            }
        }
    }
}

/// Composite key over several columns; hashes with the stable
/// `h = h * 31 + h_i` combiner.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey(pub Vec<Value>);

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined: u64 = 0;
        for value in &self.0 {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            HashableValue(value.clone()).hash(&mut hasher);
            combined = combined.wrapping_mul(31).wrapping_add(hasher.finish());
        }
        state.write_u64(combined);
    }
}

impl RowKey {
    /// True if any component is null; null keys match nothing in joins.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_compare() {
        assert!(Value::Integer(1).sql_eq(&Value::Double(1.0)));
        assert_eq!(
            Value::Integer(2).compare(&Value::Double(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn null_compares_with_nothing() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert!(!Value::Null.sql_eq(&Value::Null));
    }

    #[test]
    fn hashable_integral_double_matches_integer() {
        use std::collections::hash_map::DefaultHasher;
        let mut a = DefaultHasher::new();
        let mut b = DefaultHasher::new();
        HashableValue(Value::Integer(7)).hash(&mut a);
        HashableValue(Value::Double(7.0)).hash(&mut b);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn row_key_distinguishes_composites() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        seen.insert(RowKey(vec![Value::Integer(1), Value::Varchar("a".into())]));
        assert!(seen.contains(&RowKey(vec![
            Value::Integer(1),
            Value::Varchar("a".into())
        ])));
        assert!(!seen.contains(&RowKey(vec![
            Value::Integer(1),
            Value::Varchar("b".into())
        ])));
    }
}
