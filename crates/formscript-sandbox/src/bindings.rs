//! Form-data bindings exposed to scripts as read-only globals.

use serde_json::{Map, Value};

use crate::error::ExecutionError;

/// Field name to submitted value. Each key becomes a global in the isolate.
pub type Bindings = Map<String, Value>;

/// Name of the internal global the executor installs in every isolate.
pub const INTERNAL_GLOBAL: &str = "__formscript";

/// Globals that V8 defines as non-configurable and therefore cannot be shadowed.
const IMMUTABLE_GLOBALS: &[&str] = &["undefined", "NaN", "Infinity"];

/// Reject bindings whose names the isolate cannot honour.
///
/// Any other key, including builtin names such as `console` or `Math`,
/// shadows the builtin for the duration of the call.
pub fn check_reserved(bindings: &Bindings) -> Result<(), ExecutionError> {
    if let Some(name) = bindings
        .keys()
        .find(|k| k.as_str() == INTERNAL_GLOBAL || IMMUTABLE_GLOBALS.contains(&k.as_str()))
    {
        return Err(ExecutionError::ReservedBinding { name: name.clone() });
    }
    Ok(())
}

/// Encode bindings as a JavaScript string literal holding their JSON text.
///
/// The bootstrap passes this to `JSON.parse`, so keys such as `__proto__`
/// become plain own properties instead of touching any prototype.
pub fn json_literal(bindings: &Bindings) -> Result<String, ExecutionError> {
    let json = serde_json::to_string(bindings)?;
    Ok(serde_json::to_string(&json)?)
}

/// Convert an arbitrary JSON payload into bindings.
///
/// Only objects are accepted; anything else is reported with its JSON type name.
pub fn from_value(value: Value) -> Result<Bindings, &'static str> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err("null"),
        Value::Bool(_) => Err("boolean"),
        Value::Number(_) => Err("number"),
        Value::String(_) => Err("string"),
        Value::Array(_) => Err("array"),
    }
}
