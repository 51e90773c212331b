//! Argument data: the key/value payload attached to an event.
//!
//! Argument payloads are owned collectively by the store in a side table
//! and referenced from event records by id. A shallow merge (later values
//! for a key win) is the only permitted post-creation mutation; it is used
//! when additional argument sets target an already-open scope.

use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value as JsonValue};

/// A single decoded argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Absent optional value (an empty wire string).
    Null,
    /// Signed integer (int8/int16/int32 wire forms).
    I32(i32),
    /// Unsigned integer (uint8/uint16/uint32/flowId wire forms).
    U32(u32),
    /// 32-bit float.
    F32(f32),
    /// String (ascii or utf8 wire forms).
    Str(String),
    /// Raw byte array (uint8[] wire form).
    Bytes(Vec<u8>),
}

impl ArgValue {
    /// Value as an unsigned integer, if it is one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ArgValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Value as a signed integer, if it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ArgValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a JSON value for export.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ArgValue::Null => JsonValue::Null,
            ArgValue::I32(v) => JsonValue::Number((*v).into()),
            ArgValue::U32(v) => JsonValue::Number((*v).into()),
            ArgValue::F32(v) => Number::from_f64(f64::from(*v))
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ArgValue::Str(v) => JsonValue::String(v.clone()),
            ArgValue::Bytes(v) => {
                JsonValue::Array(v.iter().map(|b| JsonValue::Number((*b).into())).collect())
            }
        }
    }
}

/// Key/value argument storage for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentData {
    values: FxHashMap<String, ArgValue>,
}

impl ArgumentData {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an argument value by name.
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.values.get(key)
    }

    /// Set an argument value, replacing any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: ArgValue) {
        self.values.insert(key.into(), value);
    }

    /// Shallow-merge another payload into this one. Later values win.
    pub fn merge(&mut self, other: ArgumentData) {
        for (key, value) in other.values {
            self.values.insert(key, value);
        }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the payload has no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all arguments.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Export to a plain JSON object.
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.values.len());
        for (key, value) in &self.values {
            map.insert(key.clone(), value.to_json());
        }
        JsonValue::Object(map)
    }
}
