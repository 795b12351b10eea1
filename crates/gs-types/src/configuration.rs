//! Parameter values and configurations.
//!
//! A [`Configuration`] is one concrete assignment of values to parameters. Its
//! identity is the canonical key: compact JSON with keys in sorted order, so
//! two configurations are equal exactly when their keys are byte-identical.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{GsError, GsResult};

/// A single discrete parameter value.
///
/// Untagged so the canonical key reads like plain JSON (`{"C":0.1}`).
/// Variant order matters for decoding: integers are tried before floats so
/// `1` and `1.0` stay distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl ParameterValue {
    /// False only for NaN and infinite floats, which have no JSON form and
    /// would collapse to `null` in the canonical key.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// An immutable mapping from parameter name to value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    params: BTreeMap<String, ParameterValue>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion; a repeated name overwrites the earlier value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.params.get(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate parameters in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The canonical serialized form used as the deduplication key.
    pub fn canonical_key(&self) -> String {
        // A map of strings to plain scalars cannot fail to serialize.
        serde_json::to_string(&self.params).unwrap_or_default()
    }

    /// Fails with a validation error if any value is a NaN or infinite float.
    pub fn ensure_finite(&self) -> GsResult<()> {
        match self.params.iter().find(|(_, value)| !value.is_finite()) {
            Some((name, value)) => Err(GsError::Validation(format!(
                "parameter {name:?} has non-finite value {value}"
            ))),
            None => Ok(()),
        }
    }

    /// Rebuild a configuration from its canonical key.
    pub fn from_canonical_key(key: &str) -> GsResult<Self> {
        let params: BTreeMap<String, ParameterValue> = serde_json::from_str(key)?;
        Ok(Self { params })
    }

    /// Decode the configuration into a typed parameter struct.
    ///
    /// Mark the target with `#[serde(deny_unknown_fields)]` to turn a
    /// misspelled grid key into an error instead of a silently ignored value.
    pub fn decode<T: DeserializeOwned>(&self) -> GsResult<T> {
        let value = serde_json::to_value(&self.params)?;
        serde_json::from_value(value).map_err(|e| {
            GsError::Validation(format!("cannot decode configuration {}: {e}", self))
        })
    }
}

/// Equality is identity of canonical keys, so `-0.0` and `0.0` differ.
impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

impl FromIterator<(String, ParameterValue)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}
