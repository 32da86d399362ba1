use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Field names that make a record reachable by a campaign.
const CONTACT_FIELDS: [&str; 2] = ["email", "phone"];

/// Stable external identifier of a discovered record (e.g. a provider place id).
///
/// Backends send either strings or integers; both are kept as sent so the
/// record serializes back unchanged. Integers above `i64::MAX` keep their
/// unsigned value. Fractional ids are kept as their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    UInt(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::UInt(id) => write!(f, "{id}"),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RecordIdVisitor)
    }
}

struct RecordIdVisitor;

impl Visitor<'_> for RecordIdVisitor {
    type Value = RecordId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or numeric record id")
    }

    fn visit_i64<E: de::Error>(self, id: i64) -> Result<RecordId, E> {
        Ok(RecordId::Int(id))
    }

    fn visit_u64<E: de::Error>(self, id: u64) -> Result<RecordId, E> {
        Ok(match i64::try_from(id) {
            Ok(id) => RecordId::Int(id),
            Err(_) => RecordId::UInt(id),
        })
    }

    fn visit_f64<E: de::Error>(self, id: f64) -> Result<RecordId, E> {
        match Number::from_f64(id) {
            Some(number) => Ok(RecordId::Text(number.to_string())),
            None => Err(E::invalid_value(de::Unexpected::Float(id), &self)),
        }
    }

    fn visit_str<E: de::Error>(self, id: &str) -> Result<RecordId, E> {
        Ok(RecordId::Text(id.to_string()))
    }

    fn visit_string<E: de::Error>(self, id: String) -> Result<RecordId, E> {
        Ok(RecordId::Text(id))
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Text(id)
    }
}

/// One discovered lead. Opaque beyond its `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter, mostly for tests and fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Shallow merge: every field of `patch` overwrites the same field here.
    pub(crate) fn merge_from(&mut self, patch: Record) {
        for (key, value) in patch.fields {
            self.fields.insert(key, value);
        }
    }

    pub fn has_email(&self) -> bool {
        self.get("email").is_some_and(is_filled)
    }

    pub fn has_phone(&self) -> bool {
        self.get("phone").is_some_and(is_filled)
    }

    /// A record counts as valid when at least one contact field is filled.
    pub fn has_contact(&self) -> bool {
        CONTACT_FIELDS
            .iter()
            .any(|key| self.get(key).is_some_and(is_filled))
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}
