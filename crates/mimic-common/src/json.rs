//! JSON codec used for response decoding and request encoding.
//!
//! `dumps` always produces UTF-8 bytes with non-ASCII characters written
//! literally. Key order follows insertion unless `sort_keys` is set.

use crate::error::{CodecError, CodecResult};
use serde_json::{Map, Value};

/// Encoding options for [`dumps`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    /// Order object keys lexicographically, recursively.
    pub sort_keys: bool,
    /// Pretty-print with two-space indentation.
    pub indent_2: bool,
}

impl JsonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_keys(mut self, enabled: bool) -> Self {
        self.sort_keys = enabled;
        self
    }

    pub fn indent_2(mut self, enabled: bool) -> Self {
        self.indent_2 = enabled;
        self
    }
}

/// Encode a value to JSON bytes.
pub fn dumps(value: &Value, options: JsonOptions) -> CodecResult<Vec<u8>> {
    let sorted;
    let value = if options.sort_keys {
        sorted = sort_keys(value);
        &sorted
    } else {
        value
    };

    let encoded = if options.indent_2 {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    encoded.map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decode JSON bytes. Input must be valid UTF-8.
pub fn loads(data: &[u8]) -> CodecResult<Value> {
    serde_json::from_slice(data).map_err(|e| CodecError::Deserialization(e.to_string()))
}

/// Decode a JSON string.
pub fn loads_str(data: &str) -> CodecResult<Value> {
    loads(data.as_bytes())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                out.insert(key.clone(), sort_keys(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
