use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HarnessError;

/// Schema-agnostic representation of a gRPC message (request or response)
///
/// Decoded requests are always JSON objects keyed by the proto field names.
/// Response documents may be partial; absent fields take their default
/// values when encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    pub value: Value,
}

impl Message {
    /// An empty document (`{}`)
    pub fn new() -> Self {
        Self {
            value: Value::Object(Map::new()),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, HarnessError> {
        Ok(Self {
            value: serde_json::from_str(json)?,
        })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        match &self.value {
            Value::Object(fields) => fields.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self { value }
    }
}

impl From<Map<String, Value>> for Message {
    fn from(fields: Map<String, Value>) -> Self {
        Self {
            value: Value::Object(fields),
        }
    }
}

impl From<Message> for Value {
    fn from(msg: Message) -> Self {
        msg.value
    }
}

impl std::ops::Index<&str> for Message {
    type Output = Value;

    fn index(&self, field: &str) -> &Value {
        &self.value[field]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_new_is_empty_object() {
        let msg = Message::new();
        assert!(msg.is_empty());
        assert_eq!(msg.value, json!({}));
    }

    #[test]
    fn test_message_from_value() {
        let msg: Message = json!({"name": "hello"}).into();
        assert_eq!(msg["name"], "hello");
        assert_eq!(msg.get("name"), Some(&json!("hello")));
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_message_missing_field_indexes_to_null() {
        let msg = Message::new();
        assert!(msg["missing"].is_null());
        assert!(msg.get("missing").is_none());
    }

    #[test]
    fn test_message_from_json_str() {
        let msg = Message::from_json_str(r#"{"ok": true}"#).unwrap();
        assert_eq!(msg["ok"], true);
    }

    #[test]
    fn test_message_from_invalid_json_str() {
        let err = Message::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidMessage(_)));
    }

    #[test]
    fn test_message_serializes_transparently() {
        let msg: Message = json!({"x": 1}).into();
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"x":1}"#);
    }
}
