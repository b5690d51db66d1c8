//! Wire Value Model
//!
//! The MessagePack value model the engine sends and receives. Maps keep
//! their on-wire order as key/value pairs and may carry non-string keys,
//! so this type is deliberately looser than a JSON document.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A raw MessagePack value
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Nil,
    Bool(bool),
    /// Negative integer (non-negative ones decode as `UInt`)
    Int(i64),
    UInt(u64),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<WireValue>),
    /// Ordered key/value pairs
    Map(Vec<(WireValue, WireValue)>),
}

impl WireValue {
    /// Build a string value
    pub fn str(s: impl Into<String>) -> Self {
        WireValue::Str(s.into())
    }

    /// Returns the value as an unsigned integer, if it is one
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            WireValue::UInt(n) => Some(*n),
            WireValue::Int(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements of an array value
    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up an entry of a map value by unsigned integer key.
    ///
    /// IPROTO headers and bodies are keyed this way.
    pub fn get_by_code(&self, code: u64) -> Option<&WireValue> {
        match self {
            WireValue::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_u64() == Some(code))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Nil => "nil",
            WireValue::Bool(_) => "bool",
            WireValue::Int(_) | WireValue::UInt(_) => "integer",
            WireValue::F64(_) => "float",
            WireValue::Str(_) => "string",
            WireValue::Bin(_) => "binary",
            WireValue::Array(_) => "array",
            WireValue::Map(_) => "map",
        }
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireValue::Nil => serializer.serialize_unit(),
            WireValue::Bool(b) => serializer.serialize_bool(*b),
            WireValue::Int(n) => serializer.serialize_i64(*n),
            WireValue::UInt(n) => serializer.serialize_u64(*n),
            WireValue::F64(f) => serializer.serialize_f64(*f),
            WireValue::Str(s) => serializer.serialize_str(s),
            WireValue::Bin(b) => serializer.serialize_bytes(b),
            WireValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            WireValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any MessagePack value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        if v >= 0 {
            Ok(WireValue::UInt(v as u64))
        } else {
            Ok(WireValue::Int(v))
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        Ok(WireValue::UInt(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        Ok(WireValue::F64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        Ok(WireValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        Ok(WireValue::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<WireValue, E> {
        Ok(WireValue::Bin(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<WireValue, E> {
        Ok(WireValue::Bin(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Nil)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        WireValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(WireValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WireValue, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry()? {
            entries.push(entry);
        }
        Ok(WireValue::Map(entries))
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &WireValue) -> WireValue {
        let bytes = rmp_serde::to_vec(value).unwrap();
        rmp_serde::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_map_with_integer_keys_survives_msgpack() {
        let header = WireValue::Map(vec![
            (WireValue::UInt(0x00), WireValue::UInt(0)),
            (WireValue::UInt(0x01), WireValue::UInt(42)),
        ]);

        let decoded = roundtrip(&header);
        assert_eq!(decoded.get_by_code(0x01), Some(&WireValue::UInt(42)));
        assert_eq!(decoded.get_by_code(0x05), None);
    }

    #[test]
    fn test_non_negative_int_normalizes_to_uint() {
        assert_eq!(roundtrip(&WireValue::Int(-7)), WireValue::Int(-7));
        assert_eq!(roundtrip(&WireValue::UInt(7)), WireValue::UInt(7));
    }

    #[test]
    fn test_binary_is_kept_apart_from_strings() {
        let decoded = roundtrip(&WireValue::Bin(vec![0xde, 0xad]));
        assert_eq!(decoded, WireValue::Bin(vec![0xde, 0xad]));
        assert_eq!(decoded.type_name(), "binary");
    }

    #[test]
    fn test_nil_and_nested_array() {
        let value = WireValue::Array(vec![
            WireValue::Nil,
            WireValue::Array(vec![WireValue::Bool(true), WireValue::F64(1.5)]),
        ]);
        assert_eq!(roundtrip(&value), value);
    }
}
