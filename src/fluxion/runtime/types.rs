//! Core streaming data types.
//!
//! This module contains the fundamental types flowing through the dataflow
//! graph:
//! - [`Value`] - the dynamically typed value system for point fields
//! - [`Point`] - a single streaming record: a field-name to value map
//! - [`Event`] - the tagged union delivered along one input edge
//!
//! Points are treated as immutable once emitted: procs that modify a point
//! clone it first. All arithmetic and comparison over values is an explicit
//! match over the [`Value`] enum; there is no implicit coercion beyond the
//! numeric cases spelled out in each operation.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::error::{RuntimeError, RuntimeResult};
use super::time::{Moment, Span};

/// A value in a point field.
///
/// This enum represents every type the runtime moves through the graph,
/// from scalars to nested structures. Time values are first-class so that
/// procs can do calendar arithmetic on fields, not just on the reserved
/// `time` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent or null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit floating point number (integers are whole-valued floats)
    Number(f64),
    /// UTF-8 string
    String(String),
    /// An instant
    Time(Moment),
    /// A duration
    Span(Span),
    /// Array of values
    Array(Vec<Value>),
    /// Nested object with named fields
    Object(HashMap<String, Value>),
}

impl Value {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Time(_) => "time",
            Value::Span(_) => "span",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// The numeric content, when this value is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret as a boolean, rejecting every other type
    pub fn as_bool(&self) -> RuntimeResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::type_error("boolean", other.type_name())),
        }
    }

    /// Add two values: numbers, string concatenation, time/span and
    /// span/span arithmetic.
    pub fn add(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Time(t), Value::Span(s)) | (Value::Span(s), Value::Time(t)) => {
                Ok(Value::Time(t.add_span(s)))
            }
            (Value::Span(a), Value::Span(b)) => Ok(Value::Span(*a + *b)),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) => Err(RuntimeError::type_error(
                "addable operands",
                format!("{} + {}", a.type_name(), b.type_name()),
            )),
        }
    }

    /// Subtract two values; time minus time yields a span.
    pub fn subtract(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
            (Value::Time(t), Value::Span(s)) => Ok(Value::Time(t.sub_span(s))),
            (Value::Time(a), Value::Time(b)) => Ok(Value::Span(a.since(b))),
            (Value::Span(a), Value::Span(b)) => Ok(Value::Span(*a - *b)),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) => Err(RuntimeError::type_error(
                "subtractable operands",
                format!("{} - {}", a.type_name(), b.type_name()),
            )),
        }
    }

    /// Multiply two values; spans scale by numbers.
    pub fn multiply(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
            (Value::Span(s), Value::Number(n)) | (Value::Number(n), Value::Span(s)) => {
                Ok(Value::Span(s.scale(*n)?))
            }
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) => Err(RuntimeError::type_error(
                "numeric operands",
                format!("{} * {}", a.type_name(), b.type_name()),
            )),
        }
    }

    /// Divide two values; division by zero is a type error the caller
    /// converts to a warning.
    pub fn divide(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(_), Value::Number(b)) if *b == 0.0 => {
                Err(RuntimeError::type_error("non-zero divisor", "zero"))
            }
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
            (Value::Span(s), Value::Number(n)) => Ok(Value::Span(s.divide(*n)?)),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) => Err(RuntimeError::type_error(
                "numeric operands",
                format!("{} / {}", a.type_name(), b.type_name()),
            )),
        }
    }

    /// Compare two values of the same kind. Cross-kind comparison is a
    /// type error; use [`Value::total_cmp`] where an arbitrary-but-stable
    /// order over mixed kinds is needed.
    pub fn compare(&self, other: &Value) -> RuntimeResult<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => Ok(a.total_cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Ok(a.cmp(b)),
            (Value::Span(a), Value::Span(b)) if !a.is_calendar() && !b.is_calendar() => {
                Ok(a.milli_count().cmp(&b.milli_count()))
            }
            (a, b) => Err(RuntimeError::type_error(
                "comparable operands",
                format!("{} vs {}", a.type_name(), b.type_name()),
            )),
        }
    }

    /// A total order over all values: kinds rank
    /// null < bool < number < string < time < span < array < object,
    /// then values compare within their kind. Used by sort and uniq, where
    /// mixed-type field contents must not abort the stream.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::String(_) => 3,
                Value::Time(_) => 4,
                Value::Span(_) => 5,
                Value::Array(_) => 6,
                Value::Object(_) => 7,
            }
        }
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Span(a), Value::Span(b)) => a
                .month_count()
                .cmp(&b.month_count())
                .then(a.milli_count().cmp(&b.milli_count())),
            (Value::Object(a), Value::Object(b)) => {
                let mut ka: Vec<&String> = a.keys().collect();
                let mut kb: Vec<&String> = b.keys().collect();
                ka.sort();
                kb.sort();
                for (x, y) in ka.iter().zip(kb.iter()) {
                    let ord = x.cmp(y).then_with(|| a[*x].total_cmp(&b[*y]));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                ka.len().cmp(&kb.len())
            }
            (a, b) => {
                let (ra, rb) = (rank(a), rank(b));
                if ra != rb {
                    return ra.cmp(&rb);
                }
                a.compare(b).unwrap_or(Ordering::Equal)
            }
        }
    }
}

/// Hash implementation so values can key the group index.
///
/// Floats hash by bit pattern, which handles NaN, infinity, and -0.0
/// deterministically; object keys are sorted first so logically equal
/// objects hash equally.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Span(s) => s.hash(state),
            Value::Array(arr) => {
                arr.len().hash(state);
                for elem in arr {
                    elem.hash(state);
                }
            }
            Value::Object(map) => {
                let mut sorted_keys: Vec<&String> = map.keys().collect();
                sorted_keys.sort();
                sorted_keys.len().hash(state);
                for key in sorted_keys {
                    key.hash(state);
                    map.get(key).unwrap().hash(state);
                }
            }
        }
    }
}

// PartialEq is structural; NaN-keyed groups are distinguished by the bit
// pattern in Hash, so hash-map usage stays consistent.
impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Time(t) => write!(f, "{}", t),
            Value::Span(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Direct serialization without an intermediate `serde_json::Value`.
///
/// Times and spans serialize as their display strings; whole-valued numbers
/// serialize as integers so sink output stays readable.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Time(t) => serializer.serialize_str(&t.to_string()),
            Value::Span(s) => serializer.serialize_str(&s.to_string()),
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for elem in arr {
                    seq.serialize_element(elem)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value (string, number, bool, null, array, or object)")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut arr = Vec::new();
        while let Some(elem) = seq.next_element()? {
            arr.push(elem);
        }
        Ok(Value::Array(arr))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut object = HashMap::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}

/// One streaming record: an unordered field-name to value map.
///
/// The reserved `time` field, when present and of time type, orders the
/// point within the stream. Procs treat emitted points as immutable and
/// clone before mutating.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Point {
    fields: HashMap<String, Value>,
}

impl Point {
    /// The reserved timestamp field name
    pub const TIME_FIELD: &'static str = "time";

    /// Create an empty point
    pub fn new() -> Self {
        Point {
            fields: HashMap::new(),
        }
    }

    /// Create a point from an existing field map
    pub fn from_fields(fields: HashMap<String, Value>) -> Self {
        Point { fields }
    }

    /// Builder-style field insertion, used heavily in tests
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Builder-style timestamp insertion
    pub fn at(self, time: Moment) -> Self {
        self.with(Self::TIME_FIELD, Value::Time(time))
    }

    /// The point's timestamp, when the reserved field holds a time value
    pub fn time(&self) -> Option<Moment> {
        match self.fields.get(Self::TIME_FIELD) {
            Some(Value::Time(t)) => Some(*t),
            _ => None,
        }
    }

    /// Replace the point's timestamp
    pub fn set_time(&mut self, time: Moment) {
        self.fields
            .insert(Self::TIME_FIELD.to_string(), Value::Time(time));
    }

    /// Remove the timestamp, making the point timeless
    pub fn clear_time(&mut self) {
        self.fields.remove(Self::TIME_FIELD);
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Remove a field, returning its previous value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// True when the point has no fields at all
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The underlying field map
    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// Last-write union: fields of `other` overwrite fields of `self`.
    /// This is the merge rule the join uses when combining matched points
    /// across edges.
    pub fn union(&self, other: &Point) -> Point {
        let mut fields = self.fields.clone();
        for (k, v) in &other.fields {
            fields.insert(k.clone(), v.clone());
        }
        Point { fields }
    }
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut m = serializer.serialize_map(Some(self.fields.len()))?;
        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        for k in keys {
            m.serialize_entry(k, &self.fields[k])?;
        }
        m.end()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        write!(f, "{{")?;
        for (i, k) in keys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, self.fields[*k])?;
        }
        write!(f, "}}")
    }
}

/// The unit of traffic delivered along one input edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A batch of data points, in per-edge time order
    Points(Vec<Point>),
    /// Batch-boundary marker: the preceding batch is closed at this time
    Mark(Moment),
    /// Heartbeat: time has progressed to this moment with no data
    Tick(Moment),
    /// The upstream edge is exhausted
    Eof,
}
