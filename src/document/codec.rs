//! Document Codec
//!
//! Converts between `Document` and the engine's `[key, value]` tuple.
//!
//! Encoding is structure-preserving: the engine stores whatever MessagePack
//! we hand it and returns it unchanged. Decoding is the strict direction:
//! the engine returns maps as ordered pairs with arbitrary keys, and
//! anything that is not a JSON object with string keys is refused rather
//! than coerced.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::backend::{Tuple, UpdateOp, WireValue};

use super::Document;

/// Tuple position of the record key
pub const KEY_FIELD: usize = 0;

/// Tuple position of the record value
pub const VALUE_FIELD: usize = 1;

/// Failures turning engine data back into a document
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("tuple has {0} fields, expected at least 2")]
    Arity(usize),

    #[error("value is a {0}, expected map")]
    NotADocument(&'static str),

    #[error("map key is a {0}, expected string")]
    NonStringKey(&'static str),

    #[error("duplicate field {0:?}")]
    DuplicateField(String),

    #[error("binary data at {0:?} has no JSON representation")]
    Binary(String),

    #[error("non-finite float at {0:?}")]
    NonFiniteFloat(String),
}

/// Encode a document for the value slot
pub fn encode_value(doc: &Document) -> WireValue {
    encode_map(doc)
}

fn encode_map(map: &Map<String, Value>) -> WireValue {
    WireValue::Map(
        map.iter()
            .map(|(k, v)| (WireValue::Str(k.clone()), encode_json(v)))
            .collect(),
    )
}

fn encode_json(value: &Value) -> WireValue {
    match value {
        Value::Null => WireValue::Nil,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Number(n) => encode_number(n),
        Value::String(s) => WireValue::Str(s.clone()),
        Value::Array(items) => WireValue::Array(items.iter().map(encode_json).collect()),
        Value::Object(map) => encode_map(map),
    }
}

fn encode_number(n: &Number) -> WireValue {
    if let Some(u) = n.as_u64() {
        WireValue::UInt(u)
    } else if let Some(i) = n.as_i64() {
        WireValue::Int(i)
    } else {
        // serde_json numbers are always one of u64, i64 or finite f64
        WireValue::F64(n.as_f64().unwrap_or_default())
    }
}

/// Decode the value slot back into a document
pub fn decode_value(raw: WireValue) -> Result<Document, CodecError> {
    match raw {
        WireValue::Map(entries) => decode_map(entries, ""),
        other => Err(CodecError::NotADocument(other.type_name())),
    }
}

fn decode_map(entries: Vec<(WireValue, WireValue)>, path: &str) -> Result<Document, CodecError> {
    let mut map = Map::new();

    for (key, value) in entries {
        let key = match key {
            WireValue::Str(key) => key,
            other => return Err(CodecError::NonStringKey(other.type_name())),
        };
        if map.contains_key(&key) {
            return Err(CodecError::DuplicateField(join(path, &key)));
        }
        let child = join(path, &key);
        map.insert(key, decode_json(value, &child)?);
    }

    Ok(map)
}

fn decode_json(raw: WireValue, path: &str) -> Result<Value, CodecError> {
    Ok(match raw {
        WireValue::Nil => Value::Null,
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::Int(i) => Value::Number(i.into()),
        WireValue::UInt(u) => Value::Number(u.into()),
        WireValue::F64(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| CodecError::NonFiniteFloat(path.to_string()))?,
        WireValue::Str(s) => Value::String(s),
        WireValue::Bin(_) => return Err(CodecError::Binary(path.to_string())),
        WireValue::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| decode_json(item, &format!("{}[{}]", path, i)))
                .collect::<Result<_, _>>()?,
        ),
        WireValue::Map(entries) => Value::Object(decode_map(entries, path)?),
    })
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Build the stored tuple for a record
pub fn to_tuple(key: &str, doc: &Document) -> Tuple {
    let mut tuple = vec![WireValue::Nil; VALUE_FIELD + 1];
    tuple[KEY_FIELD] = WireValue::str(key);
    tuple[VALUE_FIELD] = encode_value(doc);
    tuple
}

/// Update operation replacing the whole value slot
pub fn assign_value(doc: &Document) -> UpdateOp {
    UpdateOp::Assign {
        field: VALUE_FIELD as u32,
        value: encode_value(doc),
    }
}

/// Extract the document from a stored tuple
pub fn from_tuple(mut tuple: Tuple) -> Result<Document, CodecError> {
    if tuple.len() <= VALUE_FIELD {
        return Err(CodecError::Arity(tuple.len()));
    }
    decode_value(tuple.swap_remove(VALUE_FIELD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn test_tuple_layout() {
        let d = doc(json!({"name": "Ann"}));
        let tuple = to_tuple("user:1", &d);

        assert_eq!(tuple.len(), 2);
        assert_eq!(tuple[KEY_FIELD], WireValue::str("user:1"));
        assert_eq!(from_tuple(tuple).unwrap(), d);
    }

    #[test]
    fn test_numeric_kinds_survive() {
        let d = doc(json!({"pos": 30, "neg": -4, "float": 2.5, "big": u64::MAX}));
        let decoded = decode_value(encode_value(&d)).unwrap();

        assert_eq!(decoded, d);
        assert!(decoded["pos"].is_u64());
        assert!(decoded["neg"].is_i64());
        assert!(decoded["float"].is_f64());
    }

    #[test]
    fn test_nested_structure_survives_msgpack() {
        let d = doc(json!({
            "profile": {"tags": ["a", "b"], "address": {"zip": null}},
            "active": true
        }));

        let bytes = rmp_serde::to_vec(&to_tuple("k", &d)).unwrap();
        let tuple: Vec<WireValue> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(from_tuple(tuple).unwrap(), d);
    }

    #[test]
    fn test_short_tuple_is_arity_error() {
        assert_eq!(
            from_tuple(vec![WireValue::str("k")]),
            Err(CodecError::Arity(1))
        );
    }

    #[test]
    fn test_non_map_value_is_refused() {
        let tuple = vec![WireValue::str("k"), WireValue::Array(Vec::new())];
        assert_eq!(from_tuple(tuple), Err(CodecError::NotADocument("array")));
    }

    #[test]
    fn test_integer_keys_are_refused() {
        let raw = WireValue::Map(vec![(WireValue::UInt(1), WireValue::Nil)]);
        assert_eq!(decode_value(raw), Err(CodecError::NonStringKey("integer")));
    }

    #[test]
    fn test_duplicate_keys_are_refused() {
        let raw = WireValue::Map(vec![
            (WireValue::str("a"), WireValue::UInt(1)),
            (WireValue::str("a"), WireValue::UInt(2)),
        ]);
        assert_eq!(
            decode_value(raw),
            Err(CodecError::DuplicateField("a".to_string()))
        );
    }

    #[test]
    fn test_binary_reports_its_path() {
        let raw = WireValue::Map(vec![(
            WireValue::str("outer"),
            WireValue::Array(vec![WireValue::Bin(vec![1])]),
        )]);
        assert_eq!(
            decode_value(raw),
            Err(CodecError::Binary("outer[0]".to_string()))
        );
    }

    #[test]
    fn test_assign_targets_value_slot() {
        let d = doc(json!({"a": 1}));
        match assign_value(&d) {
            UpdateOp::Assign { field, value } => {
                assert_eq!(field as usize, VALUE_FIELD);
                assert_eq!(decode_value(value).unwrap(), d);
            }
        }
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<u64>().prop_map(|n| json!(n)),
            (-1.0e12f64..1.0e12).prop_map(|f| json!(f)),
            "[a-z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_document_roundtrips_through_stored_tuple(
            fields in prop::collection::btree_map("[a-z_]{1,8}", arb_json(), 0..8)
        ) {
            let d: Document = fields.into_iter().collect();
            let bytes = rmp_serde::to_vec(&to_tuple("key", &d)).unwrap();
            let tuple: Vec<WireValue> = rmp_serde::from_slice(&bytes).unwrap();
            prop_assert_eq!(from_tuple(tuple).unwrap(), d);
        }
    }
}
