//! The tagged outcome of one evaluation.

use serde::ser::Serializer;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{EvaluationError, FaultKind};

/// Outcome of a single `evaluate` call.
///
/// Serializes to `{ "ok": true, "data": … }` or
/// `{ "ok": false, "error": { "message": …, "kind": … } }`.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    /// The module completed; `data` is its marshaled default export
    /// (`null` when there is none).
    Ok(Value),
    /// The evaluation failed inside the sandbox.
    Err(EvaluationError),
}

impl EvaluationResult {
    /// Build a failed result.
    pub fn fault(kind: FaultKind, message: impl Into<String>) -> Self {
        EvaluationResult::Err(EvaluationError::new(kind, message))
    }

    /// Check if the evaluation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, EvaluationResult::Ok(_))
    }

    /// The marshaled default export, if the evaluation succeeded.
    pub fn data(&self) -> Option<&Value> {
        match self {
            EvaluationResult::Ok(data) => Some(data),
            EvaluationResult::Err(_) => None,
        }
    }

    /// The fault, if the evaluation failed.
    pub fn error(&self) -> Option<&EvaluationError> {
        match self {
            EvaluationResult::Ok(_) => None,
            EvaluationResult::Err(err) => Some(err),
        }
    }

    /// The fault kind, if the evaluation failed.
    pub fn kind(&self) -> Option<FaultKind> {
        self.error().map(|e| e.kind)
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> std::result::Result<Value, EvaluationError> {
        match self {
            EvaluationResult::Ok(data) => Ok(data),
            EvaluationResult::Err(err) => Err(err),
        }
    }

    /// Render the wire shape as a JSON value. The stack trace stays on the
    /// host side.
    pub fn to_json(&self) -> Value {
        match self {
            EvaluationResult::Ok(data) => json!({ "ok": true, "data": data }),
            EvaluationResult::Err(err) => json!({
                "ok": false,
                "error": { "message": err.message, "kind": err.kind },
            }),
        }
    }
}

impl Serialize for EvaluationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<EvaluationError> for EvaluationResult {
    fn from(err: EvaluationError) -> Self {
        EvaluationResult::Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_wire_shape() {
        let result = EvaluationResult::Ok(json!("hi"));
        assert_eq!(result.to_json(), json!({ "ok": true, "data": "hi" }));
        assert!(result.is_ok());
        assert_eq!(result.data(), Some(&json!("hi")));
        assert!(result.kind().is_none());
    }

    #[test]
    fn test_err_wire_shape() {
        let result = EvaluationResult::fault(FaultKind::Interrupted, "interrupted");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "ok": false, "error": { "kind": "interrupted", "message": "interrupted" } })
        );
        assert_eq!(result.kind(), Some(FaultKind::Interrupted));
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_stack_not_on_the_wire() {
        let err = EvaluationError::new(FaultKind::Exception, "Error: boom")
            .with_stack(Some("    at <eval> (/src/index.js:1)".into()));
        let result = EvaluationResult::from(err);
        assert_eq!(
            result.to_json(),
            json!({ "ok": false, "error": { "message": "Error: boom", "kind": "exception" } })
        );
        assert!(result.error().unwrap().stack.is_some());
    }
}
