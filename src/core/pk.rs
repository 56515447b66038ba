//! Composite primary key codec
//!
//! Multi-column primary keys travel across service boundaries as one opaque,
//! URL-safe token: the ordered `{column: value}` mapping serialized as compact
//! JSON, then base64 encoded. A key made of the single default `id` column is
//! not wrapped at all, so plain integer keys stay plain integers on the wire.
//!
//! The token format appears in URLs and as the `pk` field of every entity
//! representation; changing it breaks every client.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::core::error::CodecError;

/// Name of the default single primary key column
pub const DEFAULT_PK_COLUMN: &str = "id";

/// Anything the codec can read primary key components from
pub trait Record {
    /// Get the value of a field by name
    fn field_value(&self, field: &str) -> Option<Value>;
}

impl Record for Map<String, Value> {
    fn field_value(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }
}

impl Record for IndexMap<String, Value> {
    fn field_value(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }
}

impl Record for HashMap<String, Value> {
    fn field_value(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }
}

impl Record for Value {
    fn field_value(&self, field: &str) -> Option<Value> {
        self.as_object().and_then(|o| o.get(field).cloned())
    }
}

/// A decoded primary key
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    /// Bare value of the single `id` column
    Scalar(Value),
    /// Ordered column/value mapping
    Composite(IndexMap<String, Value>),
}

impl PrimaryKey {
    /// Turn the key into column/value filter pairs.
    ///
    /// A scalar is the value of the default `id` column.
    pub fn into_filter(self) -> IndexMap<String, Value> {
        match self {
            PrimaryKey::Scalar(value) => {
                let mut map = IndexMap::new();
                map.insert(DEFAULT_PK_COLUMN.to_string(), value);
                map
            }
            PrimaryKey::Composite(map) => map,
        }
    }

    /// Value of one component, the scalar standing for `id`
    pub fn component(&self, column: &str) -> Option<&Value> {
        match self {
            PrimaryKey::Scalar(value) if column == DEFAULT_PK_COLUMN => Some(value),
            PrimaryKey::Scalar(_) => None,
            PrimaryKey::Composite(map) => map.get(column),
        }
    }

    /// Wire representation of the key
    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Scalar(value) => value.clone(),
            PrimaryKey::Composite(map) => Value::String(encode_mapping(map)),
        }
    }
}

/// Encoder/decoder for primary key tokens
pub struct CompositePkCodec;

impl CompositePkCodec {
    /// Encode the primary key of `record`.
    ///
    /// Returns the raw `id` value when `primary_keys` is exactly `["id"]`,
    /// otherwise a token string built from the listed columns in order.
    pub fn encode<R, S>(record: &R, primary_keys: &[S]) -> Result<Value, CodecError>
    where
        R: Record + ?Sized,
        S: AsRef<str>,
    {
        if primary_keys.len() == 1 && primary_keys[0].as_ref() == DEFAULT_PK_COLUMN {
            return component(record, DEFAULT_PK_COLUMN);
        }

        let mut mapping = IndexMap::with_capacity(primary_keys.len());
        for column in primary_keys {
            let column = column.as_ref();
            mapping.insert(column.to_string(), component(record, column)?);
        }
        Ok(Value::String(encode_mapping(&mapping)))
    }

    /// Decode a token or scalar back into a [`PrimaryKey`].
    ///
    /// Numbers pass through unchanged, numeric strings (primary keys taken
    /// from URL paths) become integers, anything else must be a token.
    pub fn decode(value: &Value) -> Result<PrimaryKey, CodecError> {
        match value {
            Value::Number(_) => Ok(PrimaryKey::Scalar(value.clone())),
            Value::String(token) => {
                if let Ok(number) = token.trim().parse::<i64>() {
                    return Ok(PrimaryKey::Scalar(Value::from(number)));
                }
                Self::decode_token(token).map(PrimaryKey::Composite)
            }
            _ => Err(CodecError::InvalidToken {
                value: value.clone(),
            }),
        }
    }

    /// Decode a token string into its column mapping
    pub fn decode_token(token: &str) -> Result<IndexMap<String, Value>, CodecError> {
        let bytes = URL_SAFE
            .decode(token)
            .or_else(|_| STANDARD.decode(token))
            .map_err(|e| CodecError::InvalidEncoding {
                token: token.to_string(),
                message: e.to_string(),
            })?;

        serde_json::from_slice::<IndexMap<String, Value>>(&bytes).map_err(|e| {
            CodecError::InvalidPayload {
                token: token.to_string(),
                message: e.to_string(),
            }
        })
    }
}

fn component<R: Record + ?Sized>(record: &R, column: &str) -> Result<Value, CodecError> {
    let value = record
        .field_value(column)
        .ok_or_else(|| CodecError::MissingComponent {
            column: column.to_string(),
        })?;

    match value {
        Value::Array(_) | Value::Object(_) => Err(CodecError::UnsupportedComponent {
            column: column.to_string(),
            value,
        }),
        primitive => Ok(primitive),
    }
}

fn encode_mapping(mapping: &IndexMap<String, Value>) -> String {
    // Map of primitives always serializes
    let json = serde_json::to_vec(mapping).unwrap_or_default();
    URL_SAFE.encode(json)
}
