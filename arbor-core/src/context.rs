//! Instance context: the receiver for named guards and actions.
//!
//! Guards and actions declared by name (for example in a JSON chart) are
//! looked up on the instance context when they run, not when the chart is
//! built. A context that does not know a name returns `None` and the engine
//! reports [`CoreError::UnresolvedMethod`](crate::CoreError::UnresolvedMethod).

use crate::error::CallbackError;
use serde_json::Value;

/// User state owned by an instance.
pub trait Context {
    /// Evaluates the named guard, or returns `None` if it is not provided.
    fn guard(&self, name: &str, args: &[Value]) -> Option<Result<bool, CallbackError>> {
        let _ = (name, args);
        None
    }

    /// Runs the named action, or returns `None` if it is not provided.
    fn action(&mut self, name: &str, args: &[Value]) -> Option<Result<(), CallbackError>> {
        let _ = (name, args);
        None
    }
}

impl Context for () {}

/// A JSON document as context: a named guard reads the field of that name
/// and tests it for truthiness. JSON provides no actions.
impl Context for Value {
    fn guard(&self, name: &str, _args: &[Value]) -> Option<Result<bool, CallbackError>> {
        self.get(name).map(|value| Ok(is_truthy(value)))
    }
}

/// Truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
