//! JSON ↔ shared-structure conversion.
//!
//! Block payloads cross the CRDT boundary as nested shared types so
//! peers merge them at full depth: JSON sequences become shared arrays,
//! keyed mappings become shared maps, text becomes shared text, and
//! scalars pass through as-is. Dispatch is on the JSON value's
//! discriminant over that closed set of shapes, never on runtime type
//! probing.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use yrs::{Any, ArrayPrelim, In, MapPrelim, TextPrelim};

/// Convert a JSON value into the prelim shape of a shared structure.
pub fn json_to_shared(value: &Value) -> In {
    match value {
        Value::Array(items) => {
            let items: Vec<In> = items.iter().map(json_to_shared).collect();
            In::Array(ArrayPrelim::from(items))
        }
        Value::Object(fields) => {
            let fields: HashMap<Arc<str>, In> = fields
                .iter()
                .map(|(key, value)| (Arc::from(key.as_str()), json_to_shared(value)))
                .collect();
            In::Map(MapPrelim::from_iter(fields))
        }
        Value::String(text) => In::Text(TextPrelim::new(text.clone()).into()),
        Value::Bool(flag) => In::Any(Any::Bool(*flag)),
        Value::Number(number) => In::Any(number_to_any(number)),
        Value::Null => In::Any(Any::Null),
    }
}

/// Convert a materialized shared value back into JSON.
///
/// This is the inverse of [`json_to_shared`] over the materialized form:
/// shared text reads back as a string, shared arrays and maps as JSON
/// sequences and objects.
pub fn shared_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(flag) => Value::Bool(*flag),
        Any::Number(number) => serde_json::Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Any::BigInt(number) => Value::Number((*number).into()),
        Any::String(text) => Value::String(text.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(shared_to_json).collect()),
        Any::Map(fields) => {
            let mut object = serde_json::Map::new();
            for (key, value) in fields.iter() {
                object.insert(key.clone(), shared_to_json(value));
            }
            Value::Object(object)
        }
    }
}

fn number_to_any(number: &serde_json::Number) -> Any {
    if let Some(int) = number.as_i64() {
        Any::BigInt(int)
    } else {
        Any::Number(number.as_f64().unwrap_or(f64::NAN))
    }
}
