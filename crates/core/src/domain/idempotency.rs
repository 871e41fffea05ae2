use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// SHA-256 over the canonical form of (conversation, tool, arguments).
    ///
    /// Object keys are sorted at every depth, so the digest does not depend
    /// on the order in which the caller serialized its arguments.
    pub fn compute(
        conversation_id: Option<&str>,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Self {
        let conversation = match conversation_id {
            Some(id) => Value::String(id.to_string()).to_string(),
            None => Value::Null.to_string(),
        };
        let canonical = format!(
            "[{conversation},{},{}]",
            Value::String(tool_name.to_string()),
            canonicalize_json_object(arguments)
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub fingerprint: Fingerprint,
    pub tool_name: String,
    pub conversation_id: Option<String>,
    pub arguments: Value,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of writing a record to a ledger with a unique fingerprint key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    AlreadyRecorded,
}

fn canonicalize_json_object(map: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut output = String::from("{");
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            output.push(',');
        }
        output.push_str(&Value::String((*key).clone()).to_string());
        output.push(':');
        if let Some(entry) = map.get(*key) {
            output.push_str(&canonicalize_json_value(entry));
        }
    }
    output.push('}');
    output
}

fn canonicalize_json_value(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_string(),
        Value::Array(entries) => {
            let mut output = String::from("[");
            for (index, entry) in entries.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                output.push_str(&canonicalize_json_value(entry));
            }
            output.push(']');
            output
        }
        Value::Object(map) => canonicalize_json_object(map),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::Fingerprint;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn fingerprint_is_stable_for_same_triple() {
        let args = object(json!({"phone": "0712345678", "quantity": 2}));

        let first = Fingerprint::compute(Some("call-1"), "place_order", &args);
        let second = Fingerprint::compute(Some("call-1"), "place_order", &args);

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_ignores_key_order_at_every_depth() {
        let forward: Map<String, Value> = serde_json::from_str(
            r#"{"cylinder_size":"6kg","quantity":2,"meta":{"a":1,"b":[{"x":1,"y":2}]}}"#,
        )
        .expect("forward");
        let reversed: Map<String, Value> = serde_json::from_str(
            r#"{"meta":{"b":[{"y":2,"x":1}],"a":1},"quantity":2,"cylinder_size":"6kg"}"#,
        )
        .expect("reversed");

        assert_eq!(
            Fingerprint::compute(Some("call-1"), "place_order", &forward),
            Fingerprint::compute(Some("call-1"), "place_order", &reversed)
        );
    }

    #[test]
    fn fingerprint_separates_conversation_tool_and_arguments() {
        let args = object(json!({"phone": "0712345678"}));
        let base = Fingerprint::compute(Some("call-1"), "get_order_status", &args);

        assert_ne!(base, Fingerprint::compute(Some("call-2"), "get_order_status", &args));
        assert_ne!(base, Fingerprint::compute(None, "get_order_status", &args));
        assert_ne!(base, Fingerprint::compute(Some("call-1"), "place_order", &args));
        assert_ne!(
            base,
            Fingerprint::compute(
                Some("call-1"),
                "get_order_status",
                &object(json!({"phone": "0712345679"}))
            )
        );
    }
}
