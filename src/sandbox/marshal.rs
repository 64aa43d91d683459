//! Conversion of engine values and faults into host values.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Value};

use crate::error::{EvaluationError, FaultKind};

/// A thrown value, reduced to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownValue {
    /// `Name: message` for error objects, the coerced value otherwise.
    pub message: String,
    /// The `stack` property, when present.
    pub stack: Option<String>,
}

/// Take the pending exception off the context and describe it.
pub fn catch_exception<'js>(ctx: &Ctx<'js>) -> ThrownValue {
    describe_thrown(&ctx.catch())
}

/// Describe a thrown value without running any more script than needed to
/// read `name`, `message` and `stack`.
pub fn describe_thrown<'js>(value: &Value<'js>) -> ThrownValue {
    if let Some(obj) = value.as_object() {
        let message = obj
            .get::<_, Option<Coerced<String>>>("message")
            .ok()
            .flatten()
            .map(|m| m.0);
        let name = obj
            .get::<_, Option<Coerced<String>>>("name")
            .ok()
            .flatten()
            .map(|n| n.0);
        let stack = obj.get::<_, Option<String>>("stack").ok().flatten();

        if let Some(message) = message {
            let message = match name {
                Some(name) if !name.is_empty() => format!("{name}: {message}"),
                _ => message,
            };
            return ThrownValue { message, stack };
        }
    }

    let message = value
        .get::<Coerced<String>>()
        .map(|c| c.0)
        .unwrap_or_else(|_| "unknown exception".to_string());
    ThrownValue {
        message,
        stack: None,
    }
}

/// Convert an exported value to JSON.
///
/// `undefined` becomes `null`. Anything `JSON.stringify` refuses or drops
/// (BigInt, cycles, functions, symbols) is a marshal fault.
pub fn to_json<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
) -> Result<serde_json::Value, EvaluationError> {
    if value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }

    let text = match ctx.json_stringify(value) {
        Ok(Some(text)) => text
            .to_string()
            .map_err(|e| EvaluationError::new(FaultKind::MarshalFault, e.to_string()))?,
        Ok(None) => {
            return Err(EvaluationError::new(
                FaultKind::MarshalFault,
                "value has no JSON representation",
            ))
        }
        Err(rquickjs::Error::Exception) => {
            let thrown = catch_exception(ctx);
            return Err(EvaluationError::new(FaultKind::MarshalFault, thrown.message));
        }
        Err(e) => return Err(EvaluationError::new(FaultKind::MarshalFault, e.to_string())),
    };

    serde_json::from_str(&text)
        .map_err(|e| EvaluationError::new(FaultKind::MarshalFault, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_ctx<F: FnOnce(Ctx<'_>) + Send>(f: F) {
        let runtime = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&runtime).unwrap();
        context.with(f);
    }

    #[test]
    fn test_plain_values_marshal() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("({ a: 1, b: ['x', true, null] })").unwrap();
            assert_eq!(to_json(&ctx, value).unwrap(), json!({ "a": 1, "b": ["x", true, null] }));

            let undefined: Value = ctx.eval("undefined").unwrap();
            assert_eq!(to_json(&ctx, undefined).unwrap(), serde_json::Value::Null);
        });
    }

    #[test]
    fn test_unrepresentable_values_fault() {
        with_ctx(|ctx| {
            for source in ["10n", "(() => { const a = {}; a.self = a; return a })()", "(() => 1)"] {
                let value: Value = ctx.eval(source).unwrap();
                let err = to_json(&ctx, value).unwrap_err();
                assert_eq!(err.kind, FaultKind::MarshalFault, "source: {source}");
            }
        });
    }

    #[test]
    fn test_describe_thrown() {
        with_ctx(|ctx| {
            let error: Value = ctx.eval("new TypeError('bad input')").unwrap();
            assert_eq!(describe_thrown(&error).message, "TypeError: bad input");

            let plain: Value = ctx.eval("'just a string'").unwrap();
            let thrown = describe_thrown(&plain);
            assert_eq!(thrown.message, "just a string");
            assert!(thrown.stack.is_none());
        });
    }
}
