//! Payload validation against the optional job schema.
//!
//! The schema is process-wide configuration held by a [`SchemaHandle`]. The
//! façade takes a snapshot of it for each enqueue and passes that snapshot
//! to [`validate`] explicitly, so a concurrent `set` never changes the rules
//! halfway through a call.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::info;

use crate::error::QueueError;

/// A JSON Schema document together with its compiled validator.
pub struct CompiledSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl CompiledSchema {
    pub fn compile(document: Value) -> Result<Self, QueueError> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| QueueError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

/// Check `data` against `schema`. No schema accepts everything.
pub fn validate(data: &Value, schema: Option<&CompiledSchema>) -> Result<(), QueueError> {
    let Some(schema) = schema else {
        return Ok(());
    };
    let details: Vec<String> = schema
        .validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();
    if details.is_empty() {
        Ok(())
    } else {
        Err(QueueError::Validation { details })
    }
}

/// Shared, replace-on-write holder for the current job schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaHandle {
    current: Arc<RwLock<Option<Arc<CompiledSchema>>>>,
}

impl SchemaHandle {
    /// Replace the schema. An invalid document leaves the current one in place.
    pub fn set(&self, document: Value) -> Result<(), QueueError> {
        let compiled = Arc::new(CompiledSchema::compile(document)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(compiled);
        info!("job schema updated");
        Ok(())
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("job schema cleared");
    }

    pub fn snapshot(&self) -> Option<Arc<CompiledSchema>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn document(&self) -> Option<Value> {
        self.snapshot().map(|s| s.document().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn string_k_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"k": {"type": "string"}},
            "required": ["k"]
        })
    }

    #[test]
    fn no_schema_accepts_anything() {
        assert!(validate(&json!({"k": 123}), None).is_ok());
        assert!(validate(&json!([1, 2, 3]), None).is_ok());
    }

    #[test]
    fn matching_payload_passes() {
        let schema = CompiledSchema::compile(string_k_schema()).unwrap();
        assert!(validate(&json!({"k": "v"}), Some(&schema)).is_ok());
    }

    #[test]
    fn wrong_type_is_reported() {
        let schema = CompiledSchema::compile(string_k_schema()).unwrap();
        match validate(&json!({"k": 123}), Some(&schema)) {
            Err(QueueError::Validation { details }) => {
                assert_eq!(details.len(), 1);
                assert!(details[0].contains("string"), "detail: {}", details[0]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_field_is_reported() {
        let schema = CompiledSchema::compile(string_k_schema()).unwrap();
        assert!(matches!(
            validate(&json!({}), Some(&schema)),
            Err(QueueError::Validation { .. })
        ));
    }

    #[test]
    fn invalid_schema_is_rejected_and_keeps_previous() {
        let handle = SchemaHandle::default();
        handle.set(string_k_schema()).unwrap();

        let err = handle.set(json!({"type": 12})).unwrap_err();
        assert!(matches!(err, QueueError::InvalidSchema(_)));
        assert_eq!(handle.document(), Some(string_k_schema()));
    }

    #[test]
    fn handle_defaults_to_none_and_can_be_cleared() {
        let handle = SchemaHandle::default();
        assert!(handle.document().is_none());

        handle.set(string_k_schema()).unwrap();
        assert!(handle.snapshot().is_some());

        handle.clear();
        assert!(handle.document().is_none());
    }

    #[test]
    fn clones_share_the_same_schema() {
        let handle = SchemaHandle::default();
        let other = handle.clone();
        handle.set(string_k_schema()).unwrap();
        assert_eq!(other.document(), Some(string_k_schema()));
    }
}
