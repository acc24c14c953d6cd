//! Dynamically typed HTSP values.
//!
//! A [`Message`] is an unordered mapping from field name to [`Value`]. Values
//! nest: a map field carries another message, a list field carries a sequence
//! of values whose own field names are empty on the wire.

use crate::field::FieldType;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::hash_map;
use std::collections::HashMap;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Signed 64-bit integer.
    S64(i64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes, passed through untouched.
    #[serde(serialize_with = "serialize_hex")]
    Bin(Bytes),
    /// Nested message.
    Map(Message),
    /// Ordered, heterogeneous sequence.
    List(Vec<Value>),
}

fn serialize_hex<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl Value {
    /// Returns the wire type tag for this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::S64(_) => FieldType::S64,
            Value::Str(_) => FieldType::Str,
            Value::Bin(_) => FieldType::Bin,
            Value::Map(_) => FieldType::Map,
            Value::List(_) => FieldType::List,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::S64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Message> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::S64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::S64(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::S64(v.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bin(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bin(Bytes::from(b))
    }
}

impl From<Message> for Value {
    fn from(m: Message) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

/// An HTSP message: field name to value, names unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Message {
    fields: HashMap<String, Value>,
}

impl Message {
    /// Name of the field carrying the RPC or push method.
    pub const METHOD: &'static str = "method";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a field, returning the previous value under that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bytes(&self, name: &str) -> Option<&Bytes> {
        self.get(name).and_then(Value::as_bytes)
    }

    pub fn get_map(&self, name: &str) -> Option<&Message> {
        self.get(name).and_then(Value::as_map)
    }

    pub fn get_list(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_list)
    }

    /// Returns the `method` field, if present and a string.
    pub fn method(&self) -> Option<&str> {
        self.get_str(Self::METHOD)
    }

    /// Copies every field of `other` into `self`, overwriting on conflict.
    pub fn merge(&mut self, other: Message) {
        self.fields.extend(other.fields);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Message {
    type Item = (String, Value);
    type IntoIter = hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = (&'a String, &'a Value);
    type IntoIter = hash_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
