//! The message flowing between rivers.
//!
//! A [`Packet`] is an open JSON object. Stages only ever *add* keys; the one
//! exception is `@event_name`, which is rewritten with [`Packet::advance`] to
//! move the saga to its next stage.

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Categorizable, ErrorKind};

/// Names the current saga stage.
pub const EVENT_NAME_KEY: &str = "@event_name";
/// Correlates every log line and message belonging to one case.
pub const CORRELATION_ID_KEY: &str = "@correlation_id";
/// Unique per published message version.
pub const MESSAGE_ID_KEY: &str = "@id";
/// Creation timestamp of this message version.
pub const CREATED_KEY: &str = "@opprettet";

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("message is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing required key `{0}`")]
    MissingKey(String),

    #[error("key `{key}` has unexpected shape: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("key `{0}` is already set and packets are append-only")]
    KeyAlreadySet(String),

    #[error("key `{0}` is reserved for the framework")]
    ReservedKey(String),
}

impl Categorizable for PacketError {
    fn kind(&self) -> ErrorKind {
        // A message that does not carry what its precondition promised is a
        // producer bug, not something a retry fixes.
        ErrorKind::DataIntegrity
    }

    fn code(&self) -> &'static str {
        match self {
            PacketError::Malformed(_) | PacketError::NotAnObject => "UgyldigMelding",
            PacketError::MissingKey(_) => "ManglerFelt",
            PacketError::InvalidValue { .. } => "UgyldigFelt",
            PacketError::KeyAlreadySet(_) => "FeltAlleredeSatt",
            PacketError::ReservedKey(_) => "ReservertFelt",
        }
    }
}

/// Open, append-only key/value message.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    fields: Map<String, Value>,
}

impl Packet {
    /// Start a brand new message (used by triggers and tests).
    pub fn new(event_name: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(EVENT_NAME_KEY.to_string(), Value::String(event_name.into()));
        fields.insert(
            CORRELATION_ID_KEY.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
        let mut packet = Self { fields };
        packet.stamp();
        packet
    }

    pub fn from_json(raw: &str) -> Result<Self, PacketError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PacketError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(PacketError::NotAnObject),
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        self.fields.get(EVENT_NAME_KEY).and_then(Value::as_str)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.fields.get(CORRELATION_ID_KEY).and_then(Value::as_str)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.fields.get(MESSAGE_ID_KEY).and_then(Value::as_str)
    }

    /// Look up a value by dotted path, e.g. `hendelse_data.sakType`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// A key counts as present when it exists and is not `null`.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some_and(|value| !value.is_null())
    }

    /// Deserialize a required field.
    pub fn field<T: DeserializeOwned>(&self, path: &str) -> Result<T, PacketError> {
        let value = self
            .get(path)
            .filter(|value| !value.is_null())
            .ok_or_else(|| PacketError::MissingKey(path.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| PacketError::InvalidValue {
            key: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Deserialize an optional field. `null` and absent both yield `None`.
    pub fn optional_field<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PacketError> {
        if self.contains(path) {
            self.field(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Add a new top-level key. Existing keys are never overwritten.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PacketError> {
        if key.starts_with('@') {
            return Err(PacketError::ReservedKey(key.to_string()));
        }
        if self.fields.contains_key(key) {
            return Err(PacketError::KeyAlreadySet(key.to_string()));
        }
        let value = serde_json::to_value(value).map_err(|e| PacketError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Rewrite the event name to hand the message to the next stage.
    pub fn advance(&mut self, event_name: impl Into<String>) {
        self.fields
            .insert(EVENT_NAME_KEY.to_string(), Value::String(event_name.into()));
    }

    /// Fill in a correlation id when the producer forgot one. Returns the id
    /// in effect afterwards.
    pub fn ensure_correlation_id(&mut self) -> String {
        if let Some(id) = self.correlation_id() {
            return id.to_string();
        }
        let id = Uuid::new_v4().to_string();
        self.fields
            .insert(CORRELATION_ID_KEY.to_string(), Value::String(id.clone()));
        id
    }

    /// Give this version of the message its own id and timestamp.
    pub(crate) fn stamp(&mut self) {
        self.fields.insert(
            MESSAGE_ID_KEY.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
        self.fields.insert(
            CREATED_KEY.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn packet(value: Value) -> Packet {
        Packet::from_value(value).unwrap()
    }

    #[test]
    fn test_new_packet_carries_envelope_keys() {
        let packet = Packet::new("OMREGNING:KLAR_FOR_OMREGNING");

        assert_eq!(packet.event_name(), Some("OMREGNING:KLAR_FOR_OMREGNING"));
        assert!(packet.correlation_id().is_some());
        assert!(packet.message_id().is_some());
        assert!(packet.contains(CREATED_KEY));
    }

    #[test]
    fn test_dotted_lookup_reaches_nested_keys() {
        let packet = packet(json!({
            "@event_name": "x",
            "hendelse_data": { "sakType": "BARNEPENSJON", "sakId": 42 }
        }));

        assert_eq!(packet.get("hendelse_data.sakType"), Some(&json!("BARNEPENSJON")));
        assert_eq!(packet.field::<i64>("hendelse_data.sakId").unwrap(), 42);
        assert!(packet.get("hendelse_data.sakType.mer").is_none());
        assert!(!packet.contains("hendelse_data.behandlingId"));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let packet = packet(json!({ "@event_name": "x", "beregning": null }));

        assert!(!packet.contains("beregning"));
        assert!(matches!(
            packet.field::<Value>("beregning"),
            Err(PacketError::MissingKey(_))
        ));
        assert_eq!(packet.optional_field::<Value>("beregning").unwrap(), None);
    }

    #[test]
    fn test_set_is_append_only() {
        let mut packet = Packet::new("x");
        packet.set("beregning", json!({ "a": 1 })).unwrap();

        let err = packet.set("beregning", json!({ "a": 2 })).unwrap_err();
        assert!(matches!(err, PacketError::KeyAlreadySet(ref key) if key == "beregning"));
        assert_eq!(packet.get("beregning.a"), Some(&json!(1)));
    }

    #[test]
    fn test_framework_keys_cannot_be_set() {
        let mut packet = Packet::new("x");
        let err = packet.set(EVENT_NAME_KEY, "y").unwrap_err();
        assert!(matches!(err, PacketError::ReservedKey(_)));
    }

    #[test]
    fn test_advance_rewrites_only_event_name() {
        let mut packet = Packet::new("A");
        let correlation = packet.correlation_id().map(str::to_string);
        packet.advance("B");

        assert_eq!(packet.event_name(), Some("B"));
        assert_eq!(packet.correlation_id().map(str::to_string), correlation);
    }

    #[test]
    fn test_invalid_field_shape_is_reported() {
        let packet = packet(json!({ "@event_name": "x", "sakId": "ikke-et-tall" }));
        let err = packet.field::<i64>("sakId").unwrap_err();
        assert!(matches!(err, PacketError::InvalidValue { .. }));
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(Packet::from_json("[1,2]"), Err(PacketError::NotAnObject)));
        assert!(matches!(Packet::from_json("{"), Err(PacketError::Malformed(_))));
    }

    #[test]
    fn test_missing_correlation_id_is_generated_once() {
        let mut packet = packet(json!({ "@event_name": "x" }));
        let first = packet.ensure_correlation_id();
        let second = packet.ensure_correlation_id();
        assert_eq!(first, second);
    }
}
