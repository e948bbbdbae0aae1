//! Service properties
//!
//! Property bags are ordered, keyed case-insensitively and preserve the
//! caller's key spelling. A registration's bag is immutable once published;
//! a property replace swaps in a whole new bag.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::registration::{ServiceId, ServiceScope};
use crate::registry::traits::RegistryError;

/// Capability type names the service is published under
pub const OBJECT_CLASS: &str = "objectClass";
/// Registry-assigned registration id
pub const SERVICE_ID: &str = "service.id";
/// Id of the consumer that published the service
pub const SERVICE_BUNDLE_ID: &str = "service.bundleid";
/// Scope of the registration (`singleton`, `bundle` or `prototype`)
pub const SERVICE_SCOPE: &str = "service.scope";
/// Caller-owned priority; higher wins
pub const SERVICE_RANKING: &str = "service.ranking";

/// Keys injected by the registry on every registration
pub const RESERVED_KEYS: [&str; 4] = [OBJECT_CLASS, SERVICE_ID, SERVICE_BUNDLE_ID, SERVICE_SCOPE];

/// A single property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    LongList(Vec<i64>),
    StringList(Vec<String>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::StringList(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Long(_) => "long",
            PropertyValue::Double(_) => "double",
            PropertyValue::String(_) => "string",
            PropertyValue::LongList(_) => "long[]",
            PropertyValue::StringList(_) => "string[]",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::LongList(v) => write!(f, "{:?}", v),
            PropertyValue::StringList(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Long(v as i64)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::Long(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::StringList(v)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(v: Vec<&str>) -> Self {
        PropertyValue::StringList(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(v: Vec<i64>) -> Self {
        PropertyValue::LongList(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    value: PropertyValue,
}

/// Ordered, case-insensitive, case-preserving property bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, PropertyValue>",
    into = "IndexMap<String, PropertyValue>"
)]
pub struct Properties {
    /// Lower-cased key -> original key and value
    entries: IndexMap<String, Entry>,
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl Properties {
    /// Create an empty property bag
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Set `key`, replacing any existing key that matches case-insensitively
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        let key = key.into();
        self.entries.insert(
            fold(&key),
            Entry {
                key,
                value: value.into(),
            },
        );
        self
    }

    /// Insert a property
    ///
    /// Fails when a different spelling of the same key is already present.
    /// Re-inserting the exact same key replaces its value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, RegistryError> {
        let key = key.into();
        let folded = fold(&key);
        if let Some(existing) = self.entries.get(&folded) {
            if existing.key != key {
                return Err(RegistryError::Validation(format!(
                    "property keys '{}' and '{}' differ only in case",
                    existing.key, key
                )));
            }
        }
        let previous = self.entries.insert(
            folded,
            Entry {
                key,
                value: value.into(),
            },
        );
        Ok(previous.map(|e| e.value))
    }

    /// Look a property up, ignoring key case
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(&fold(key)).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.shift_remove(&fold(key)).map(|e| e.value)
    }

    /// Keys in insertion order, with their original spelling
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| e.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.values().map(|e| (e.key.as_str(), &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ranking derived from `service.ranking`
    ///
    /// Anything other than a long within `i32` range ranks 0.
    pub fn ranking(&self) -> i32 {
        self.get(SERVICE_RANKING)
            .and_then(PropertyValue::as_long)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0)
    }
}

impl TryFrom<IndexMap<String, PropertyValue>> for Properties {
    type Error = RegistryError;

    fn try_from(map: IndexMap<String, PropertyValue>) -> Result<Self, Self::Error> {
        let mut props = Properties::new();
        for (key, value) in map {
            props.insert(key, value)?;
        }
        Ok(props)
    }
}

impl TryFrom<Vec<(String, PropertyValue)>> for Properties {
    type Error = RegistryError;

    fn try_from(pairs: Vec<(String, PropertyValue)>) -> Result<Self, Self::Error> {
        let mut props = Properties::new();
        for (key, value) in pairs {
            if props.contains_key(&key) {
                return Err(RegistryError::Validation(format!(
                    "duplicate property key '{}'",
                    key
                )));
            }
            props.insert(key, value)?;
        }
        Ok(props)
    }
}

impl From<Properties> for IndexMap<String, PropertyValue> {
    fn from(props: Properties) -> Self {
        props
            .entries
            .into_values()
            .map(|e| (e.key, e.value))
            .collect()
    }
}

/// Registry-owned values for the reserved keys of one registration
pub(crate) struct ReservedValues<'a> {
    pub id: ServiceId,
    pub classes: &'a [String],
    pub owner: u64,
    pub scope: ServiceScope,
}

impl ReservedValues<'_> {
    fn value_of(&self, key: &str) -> PropertyValue {
        match key {
            OBJECT_CLASS => PropertyValue::StringList(self.classes.to_vec()),
            SERVICE_ID => PropertyValue::Long(self.id.get() as i64),
            SERVICE_BUNDLE_ID => PropertyValue::Long(self.owner as i64),
            _ => PropertyValue::String(self.scope.as_str().to_string()),
        }
    }

    fn matches(&self, key: &str, supplied: &PropertyValue) -> bool {
        let expected = self.value_of(key);
        if expected == *supplied {
            return true;
        }
        // A single class may be given as a plain string
        match (key, supplied) {
            (OBJECT_CLASS, PropertyValue::String(s)) => self.classes.len() == 1 && self.classes[0] == *s,
            _ => false,
        }
    }
}

/// Check caller-supplied reserved keys against the registry's values
pub(crate) fn check_reserved(
    supplied: &Properties,
    reserved: &ReservedValues<'_>,
) -> Result<(), RegistryError> {
    for key in RESERVED_KEYS {
        if let Some(value) = supplied.get(key) {
            if !reserved.matches(key, value) {
                return Err(RegistryError::Validation(format!(
                    "reserved property '{}' cannot be set to {}",
                    key, value
                )));
            }
        }
    }
    Ok(())
}

/// Build the committed property bag: reserved keys first, then caller keys
pub(crate) fn with_reserved(supplied: &Properties, reserved: &ReservedValues<'_>) -> Properties {
    let mut props = Properties::new();
    for key in RESERVED_KEYS {
        props = props.with(key, reserved.value_of(key));
    }
    for (key, value) in supplied.iter() {
        if RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key)) {
            continue;
        }
        props = props.with(key, value.clone());
    }
    props
}
