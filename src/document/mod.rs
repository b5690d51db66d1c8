//! # Documents
//!
//! A document is an open JSON object: string field names mapped to any
//! JSON value, nested to any depth. The codec is the only place that knows
//! how a record is laid out inside an engine tuple.

pub mod codec;

pub use codec::{
    assign_value, decode_value, encode_value, from_tuple, to_tuple, CodecError, KEY_FIELD,
    VALUE_FIELD,
};

/// A stored record's value
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Accept a JSON value as a document, if it is an object
pub fn as_document(value: serde_json::Value) -> Option<Document> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}
