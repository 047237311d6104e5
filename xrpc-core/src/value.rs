//! Typed XML-RPC values
//!
//! XML-RPC has a small, fixed type system: six scalars plus arrays and
//! structs, which may nest to any depth. [`Value`] is a tagged union over
//! exactly those types; it is what the parser produces and the serializer
//! consumes.
//!
//! # Equality
//!
//! - `Array` equality is deep and order-sensitive.
//! - `Struct` equality compares the member name set and the value of each
//!   member; member order does not matter.
//! - `Double` equality is IEEE equality, so `NaN != NaN`.
//!
//! # Bridging to serde
//!
//! Handlers that prefer typed Rust values can go through
//! [`to_value`]/[`from_value`], which use `serde_json::Value` as the
//! intermediate form. JSON values with no XML-RPC counterpart (`null`,
//! integers outside `i32`) are reported as [`Error::Serialization`].
//!
//! # Examples
//!
//! ```rust
//! use xrpc_core::{Struct, Value};
//!
//! let mut member = Struct::new();
//! member.insert("test", Value::Integer(999));
//!
//! let value = Value::Array(vec![Value::from("a"), Value::Struct(member)]);
//! assert_eq!(value.as_array().map(|a| a.len()), Some(2));
//! ```

use crate::error::{Error, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::NaiveDateTime;

/// Wire format of `<dateTime.iso8601>` used when rendering dates
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// A single XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `<int>` / `<i4>`
    Integer(i32),
    /// `<double>`
    Double(f64),
    /// `<boolean>`, encoded as `0`/`1`
    Boolean(bool),
    /// `<string>`, or a bare `<value>` with text only
    String(String),
    /// `<dateTime.iso8601>`, kept as text
    DateTime(String),
    /// `<base64>`, decoded bytes
    Binary(Vec<u8>),
    /// `<array><data>...</data></array>`
    Array(Vec<Value>),
    /// `<struct><member>...</member></struct>`
    Struct(Struct),
}

impl Value {
    /// Name of the XML-RPC tag this value is written as
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Binary(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
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

    /// Text of a `String` or `DateTime` value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::DateTime(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Build a `DateTime` value in the compact XML-RPC form
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Value::DateTime(datetime.format(DATETIME_FORMAT).to_string())
    }

    /// Interpret a `DateTime` value as a calendar date and time
    ///
    /// Accepts the compact `19980717T14:08:55` form and the dashed
    /// `1998-07-17T14:08:55` variant. Returns `None` for any other value.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        let Value::DateTime(text) = self else {
            return None;
        };
        let text = text.trim();
        NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
            .ok()
    }

    /// Convert a JSON value into an XML-RPC value
    ///
    /// Objects become structs, arrays become arrays. Integers must fit in
    /// `i32`; `null` has no XML-RPC form.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Err(Error::Serialization("null".to_string())),
            serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i)
                        .map(Value::Integer)
                        .map_err(|_| Error::Serialization(format!("integer {} exceeds i32", i)))
                } else if n.is_u64() {
                    Err(Error::Serialization(format!("integer {} exceeds i32", n)))
                } else {
                    n.as_f64()
                        .map(Value::Double)
                        .ok_or_else(|| Error::Serialization(format!("number {}", n)))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            serde_json::Value::Object(map) => {
                let mut members = Struct::new();
                for (name, value) in map {
                    members.insert(name, Value::from_json(value)?);
                }
                Ok(Value::Struct(members))
            }
        }
    }

    /// Convert into JSON
    ///
    /// Binary data becomes a base64 string and dates their text form.
    /// Non-finite doubles have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::String(s) | Value::DateTime(s) => serde_json::Value::String(s.clone()),
            Value::Binary(bytes) => serde_json::Value::String(BASE64_STANDARD.encode(bytes)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Serialize any Rust value into an XML-RPC value
pub fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    let json = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
    Value::from_json(json)
}

/// Deserialize an XML-RPC value into a Rust value
pub fn from_value<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.to_json()).map_err(|e| Error::Serialization(e.to_string()))
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Struct> for Value {
    fn from(members: Struct) -> Self {
        Value::Struct(members)
    }
}

/// Struct members, in insertion order, with unique names
///
/// Insertion order is kept so serialization is deterministic; it plays no
/// part in equality.
#[derive(Debug, Clone, Default)]
pub struct Struct {
    members: Vec<(String, Value)>,
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a member, returning the value it replaced
    ///
    /// A replaced member keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.members.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.members.iter().position(|(n, _)| n == name)?;
        Some(self.members.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Struct {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut members = Struct::new();
        for (name, value) in iter {
            members.insert(name, value);
        }
        members
    }
}

impl IntoIterator for Struct {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}
