//! Plugin state and its serialized blob.
//!
//! A saved state and a preset are the same thing: named port values plus
//! whatever custom properties the plugin contributes. The blob is JSON text
//! so it can be stored in an XML attribute or a CDATA section unchanged.

use crate::urid::{Urid, UridMap};
use crate::uris::Urids;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A typed value, as found in a preset or a saved blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Float(#[serde(with = "float_repr::single")] f32),
    Double(#[serde(with = "float_repr::double")] f64),
    Int(i32),
    Long(i64),
    Bool(bool),
    String(String),
    Chunk { type_uri: String, data: Vec<u8> },
}

impl StateValue {
    /// Value coerced for a control port. `None` for non-numeric types.
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            StateValue::Float(v) => Some(v),
            StateValue::Double(v) => Some(v as f32),
            StateValue::Int(v) => Some(v as f32),
            StateValue::Long(v) => Some(v as f32),
            _ => None,
        }
    }

    /// Atom type and native-endian body, as handed to a plugin's state
    /// `retrieve` callback. Strings are NUL-terminated.
    pub fn to_atom(&self, map: &UridMap, urids: &Urids) -> (Urid, Vec<u8>) {
        match self {
            StateValue::Float(v) => (urids.atom_float, v.to_ne_bytes().to_vec()),
            StateValue::Double(v) => (urids.atom_double, v.to_ne_bytes().to_vec()),
            StateValue::Int(v) => (urids.atom_int, v.to_ne_bytes().to_vec()),
            StateValue::Long(v) => (urids.atom_long, v.to_ne_bytes().to_vec()),
            StateValue::Bool(v) => (urids.atom_bool, (*v as i32).to_ne_bytes().to_vec()),
            StateValue::String(v) => {
                let mut bytes = v.as_bytes().to_vec();
                bytes.push(0);
                (urids.atom_string, bytes)
            }
            StateValue::Chunk { type_uri, data } => (map.intern(type_uri), data.clone()),
        }
    }

    /// Inverse of [`to_atom`](Self::to_atom). Bodies of a known scalar type
    /// but the wrong size are rejected; unknown types become chunks.
    pub fn from_atom(type_: Urid, body: &[u8], map: &UridMap, urids: &Urids) -> Option<Self> {
        let value = if type_ == urids.atom_float {
            StateValue::Float(f32::from_ne_bytes(body.try_into().ok()?))
        } else if type_ == urids.atom_double {
            StateValue::Double(f64::from_ne_bytes(body.try_into().ok()?))
        } else if type_ == urids.atom_int {
            StateValue::Int(i32::from_ne_bytes(body.try_into().ok()?))
        } else if type_ == urids.atom_long {
            StateValue::Long(i64::from_ne_bytes(body.try_into().ok()?))
        } else if type_ == urids.atom_bool {
            StateValue::Bool(i32::from_ne_bytes(body.try_into().ok()?) != 0)
        } else if type_ == urids.atom_string {
            let text = body.strip_suffix(&[0]).unwrap_or(body);
            StateValue::String(String::from_utf8_lossy(text).into_owned())
        } else {
            StateValue::Chunk {
                type_uri: map.resolve(type_).ok()?,
                data: body.to_vec(),
            }
        };
        Some(value)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StateValue::Float(_) => "float",
            StateValue::Double(_) => "double",
            StateValue::Int(_) => "int",
            StateValue::Long(_) => "long",
            StateValue::Bool(_) => "bool",
            StateValue::String(_) => "string",
            StateValue::Chunk { .. } => "chunk",
        }
    }
}

/// Value of one control port, keyed by its symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortValue {
    pub symbol: String,
    pub value: StateValue,
}

impl PortValue {
    pub fn new(symbol: impl Into<String>, value: StateValue) -> Self {
        Self {
            symbol: symbol.into(),
            value,
        }
    }
}

/// Plugin-defined property, keyed by URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: StateValue,
}

impl Property {
    pub fn new(key: impl Into<String>, value: StateValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginState {
    /// URI of the plugin that produced the state.
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub values: Vec<PortValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

impl PluginState {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, symbol: &str, value: StateValue) -> Self {
        self.values.push(PortValue::new(symbol, value));
        self
    }

    pub fn with_property(mut self, key: &str, value: StateValue) -> Self {
        self.properties.push(Property::new(key, value));
        self
    }

    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a blob. Only text that is not a JSON state object at all is
    /// an error; entries that do not parse are skipped one by one.
    pub fn from_blob(blob: &str) -> Result<Self> {
        let raw: RawState = serde_json::from_str(blob)?;
        Ok(Self {
            plugin: raw.plugin,
            values: parse_entries(raw.values, "port value"),
            properties: parse_entries(raw.properties, "property"),
        })
    }
}

#[derive(Deserialize)]
struct RawState {
    #[serde(default)]
    plugin: String,
    #[serde(default)]
    values: Vec<serde_json::Value>,
    #[serde(default)]
    properties: Vec<serde_json::Value>,
}

fn parse_entries<T: DeserializeOwned>(raw: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    raw.into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Skipping unreadable {} in state: {}", what, e);
                None
            }
        })
        .collect()
}

/// JSON has no infinities or NaN. Finite values are written as numbers,
/// the rest by name.
mod float_repr {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Name(String),
    }

    fn write<S: Serializer>(value: f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    fn read<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Name(name) => match name.as_str() {
                "nan" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("not a number: {other:?}"))),
            },
        }
    }

    pub mod single {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
            super::write(*value as f64, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
            super::read(deserializer).map(|v| v as f32)
        }
    }

    pub mod double {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
            super::write(*value, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
            super::read(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostError;

    #[test]
    fn test_atom_conversion() {
        let map = UridMap::new();
        let urids = Urids::new(&map);

        let (type_, body) = StateValue::Bool(true).to_atom(&map, &urids);
        assert_eq!(type_, urids.atom_bool);
        assert_eq!(body.len(), 4);
        assert_eq!(
            StateValue::from_atom(type_, &body, &map, &urids),
            Some(StateValue::Bool(true))
        );

        let (type_, body) = StateValue::String("pad".into()).to_atom(&map, &urids);
        assert_eq!(body, b"pad\0");
        assert_eq!(
            StateValue::from_atom(type_, &body, &map, &urids),
            Some(StateValue::String("pad".into()))
        );

        let chunk = StateValue::Chunk {
            type_uri: "urn:test:blob".into(),
            data: vec![1, 2, 3],
        };
        let (type_, body) = chunk.to_atom(&map, &urids);
        assert_eq!(map.resolve(type_).unwrap(), "urn:test:blob");
        assert_eq!(StateValue::from_atom(type_, &body, &map, &urids), Some(chunk));
    }

    #[test]
    fn test_atom_with_wrong_size_is_rejected() {
        let map = UridMap::new();
        let urids = Urids::new(&map);
        assert_eq!(StateValue::from_atom(urids.atom_float, &[0; 3], &map, &urids), None);
        assert_eq!(StateValue::from_atom(urids.atom_long, &[0; 4], &map, &urids), None);
        assert_eq!(StateValue::from_atom(9999, &[1], &map, &urids), None);
    }

    #[test]
    fn test_numeric_values_coerce() {
        assert_eq!(StateValue::Float(0.25).as_f32(), Some(0.25));
        assert_eq!(StateValue::Double(0.5).as_f32(), Some(0.5));
        assert_eq!(StateValue::Int(-3).as_f32(), Some(-3.0));
        assert_eq!(StateValue::Long(1 << 20).as_f32(), Some(1048576.0));
        assert_eq!(StateValue::Bool(true).as_f32(), None);
        assert_eq!(StateValue::String("1.0".into()).as_f32(), None);
    }

    #[test]
    fn test_blob_is_plain_json() {
        let state = PluginState::new("urn:test:synth")
            .with_value("cutoff", StateValue::Float(0.75))
            .with_property(
                "urn:test:sample",
                StateValue::Chunk {
                    type_uri: "urn:test:wav".into(),
                    data: vec![1, 2, 3],
                },
            );

        let blob = state.to_blob().unwrap();
        assert!(blob.contains("\"cutoff\""));
        assert!(!blob.contains('\n'));
        assert_eq!(PluginState::from_blob(&blob).unwrap(), state);
    }

    #[test]
    fn test_missing_fields_default() {
        let state = PluginState::from_blob(r#"{"values":[]}"#).unwrap();
        assert!(state.plugin.is_empty());
        assert!(state.properties.is_empty());
    }

    #[test]
    fn test_non_finite_values_survive_blob() {
        let state = PluginState::new("urn:test:synth")
            .with_value("gain", StateValue::Float(f32::INFINITY))
            .with_value("cutoff", StateValue::Float(0.125))
            .with_value("drive", StateValue::Double(f64::NEG_INFINITY));

        let blob = state.to_blob().unwrap();
        assert!(!blob.contains("null"));
        assert_eq!(PluginState::from_blob(&blob).unwrap(), state);

        let nan = PluginState::new("").with_value("gain", StateValue::Float(f32::NAN));
        let restored = PluginState::from_blob(&nan.to_blob().unwrap()).unwrap();
        assert!(restored.values[0].value.as_f32().unwrap().is_nan());
    }

    #[test]
    fn test_bad_entry_does_not_spoil_the_rest() {
        let blob = r#"{"plugin":"urn:test:synth","values":[
            {"symbol":"gain","value":{"type":"float","value":null}},
            {"symbol":"cutoff","value":{"type":"float","value":0.125}},
            {"symbol":"mode","value":{"type":"float","value":"loud"}},
            {"value":{"type":"int","value":3}}
        ],"properties":[{"key":"urn:test:p","value":{"type":"nope"}}]}"#;
        let state = PluginState::from_blob(blob).unwrap();
        assert_eq!(state.plugin, "urn:test:synth");
        assert_eq!(state.values, vec![PortValue::new("cutoff", StateValue::Float(0.125))]);
        assert!(state.properties.is_empty());
    }

    #[test]
    fn test_garbage_blob_is_parse_error() {
        assert!(matches!(
            PluginState::from_blob("<not json>"),
            Err(HostError::StateParse(_))
        ));
    }
}
