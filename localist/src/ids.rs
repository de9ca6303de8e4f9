use crate::error::ModelError;
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of a record within its collection.
///
/// Server-assigned identifiers are usually numeric; locally created records
/// carry a temporary string id of the form `outbox-<n>` until the server
/// assigns a permanent one. Integer ids order before string ids, each kind
/// in its natural order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    pub fn from_value(value: &Value) -> Option<RecordId> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(n) => Value::from(*n),
            RecordId::Str(s) => Value::from(s.clone()),
        }
    }

    pub fn is_outbox(&self) -> bool {
        matches!(self, RecordId::Str(s) if s.starts_with("outbox-"))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

/// Reads a record's identifier column, failing when it is absent or not an
/// id-shaped value.
pub fn extract_id(model: &str, id_col: &str, record: &Map<String, Value>) -> Result<RecordId, ModelError> {
    record
        .get(id_col)
        .and_then(RecordId::from_value)
        .ok_or_else(|| ModelError::MissingId(model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_ids_order_before_string_ids() {
        let mut ids = vec![
            RecordId::from("outbox-1"),
            RecordId::from(3),
            RecordId::from(1),
            RecordId::from("outbox-10"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                RecordId::from(1),
                RecordId::from(3),
                RecordId::from("outbox-1"),
                RecordId::from("outbox-10"),
            ]
        );
    }

    #[test]
    fn outbox_ids_are_detected() {
        assert!(RecordId::from("outbox-7").is_outbox());
        assert!(!RecordId::from("7").is_outbox());
        assert!(!RecordId::from(7).is_outbox());
    }

    #[test]
    fn extract_id_requires_the_identifier_column() {
        let record = json!({"id": 5, "name": "x"});
        let record = record.as_object().unwrap();
        assert_eq!(extract_id("site", "id", record).unwrap(), RecordId::Int(5));

        let err = extract_id("site", "slug", record).unwrap_err();
        assert!(matches!(err, ModelError::MissingId(_)));
    }

    #[test]
    fn id_values_round_trip() {
        for value in [json!(42), json!("outbox-1")] {
            let id = RecordId::from_value(&value).unwrap();
            assert_eq!(id.to_value(), value);
        }
        assert!(RecordId::from_value(&json!(1.5)).is_none());
        assert!(RecordId::from_value(&json!({"id": 1})).is_none());
    }
}
