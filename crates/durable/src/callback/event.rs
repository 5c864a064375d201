//! Completion events from the external job system

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path::{walk, FieldPath};

/// A completion event as delivered by the event channel
///
/// Wire shape: `{"source": .., "detail-type": .., "detail": {..}}`.
/// `eventType` and `detail_type` are accepted as aliases for `detail-type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionEvent {
    /// Producer of the event
    pub source: String,

    /// Event type
    #[serde(rename = "detail-type", alias = "eventType", alias = "detail_type")]
    pub detail_type: String,

    /// Event body
    #[serde(default)]
    pub detail: Value,
}

impl CompletionEvent {
    /// Create a new event
    pub fn new(source: impl Into<String>, detail_type: impl Into<String>, detail: Value) -> Self {
        Self {
            source: source.into(),
            detail_type: detail_type.into(),
            detail,
        }
    }

    /// Look up a field by path
    ///
    /// Paths address the event envelope, so they start at `detail`
    /// (`detail.executionId`, `$.detail.execution-id`). Anything outside
    /// the `detail` subtree resolves to nothing.
    pub fn field(&self, path: &FieldPath) -> Option<&Value> {
        match path.segments().split_first() {
            Some((head, rest)) if head == "detail" => walk(&self.detail, rest),
            _ => None,
        }
    }

    /// Look up a non-empty string field by path
    pub fn str_field(&self, path: &FieldPath) -> Option<&str> {
        self.field(path)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_wire_names() {
        let event: CompletionEvent = serde_json::from_value(json!({
            "source": "aws.appflow",
            "detail-type": "AppFlow End Flow Run Report",
            "detail": {"status": "Execution Successful"}
        }))
        .unwrap();

        assert_eq!(event.source, "aws.appflow");
        assert_eq!(event.detail_type, "AppFlow End Flow Run Report");
    }

    #[test]
    fn test_deserialize_event_type_alias() {
        let event: CompletionEvent = serde_json::from_value(json!({
            "source": "ext.job",
            "eventType": "JobEndReport",
            "detail": {}
        }))
        .unwrap();

        assert_eq!(event.detail_type, "JobEndReport");
    }

    #[test]
    fn test_field_lookup() {
        let event = CompletionEvent::new(
            "ext.job",
            "JobEndReport",
            json!({"executionId": "exec-1", "output": {"rows": 3}}),
        );

        let id_path = FieldPath::parse("$.detail.executionId").unwrap();
        assert_eq!(event.str_field(&id_path), Some("exec-1"));

        let output_path = FieldPath::parse("detail.output.rows").unwrap();
        assert_eq!(event.field(&output_path), Some(&json!(3)));

        // Only the detail subtree is addressable
        let source_path = FieldPath::parse("source").unwrap();
        assert!(event.field(&source_path).is_none());
    }
}
