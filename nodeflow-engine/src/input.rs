use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::error::EngineError;
use crate::traits::{InputField, InputKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertedInput {
    pub values: Map<String, Value>,
    pub warnings: Vec<String>,
}

/// Coerces caller input to the graph's declared parameters.
///
/// Undeclared keys pass through untouched. Missing required fields and failed
/// coercions are errors under `fail_fast`; otherwise they are collected as
/// warnings and the offending field is left out.
pub fn convert_inputs(
    input: &Map<String, Value>,
    fields: &[InputField],
    fail_fast: bool,
) -> Result<ConvertedInput, EngineError> {
    let mut out = ConvertedInput::default();

    for (key, value) in input {
        if !fields.iter().any(|f| &f.name == key) {
            out.values.insert(key.clone(), value.clone());
        }
    }

    for field in fields {
        let problem = match input.get(&field.name) {
            None | Some(Value::Null) if field.required => {
                Some(format!("missing required input '{}'", field.name))
            }
            None | Some(Value::Null) => None,
            Some(value) => match coerce(value, field.kind) {
                Some(converted) => {
                    out.values.insert(field.name.clone(), converted);
                    None
                }
                None => Some(format!(
                    "input '{}' cannot be converted to {:?}: {}",
                    field.name, field.kind, value
                )),
            },
        };

        if let Some(problem) = problem {
            if fail_fast {
                return Err(EngineError::InvalidInput(problem));
            }
            out.warnings.push(problem);
        }
    }

    if !out.warnings.is_empty() {
        warn!(warnings = ?out.warnings, "convert inputs warnings");
    }
    Ok(out)
}

fn coerce(value: &Value, kind: InputKind) -> Option<Value> {
    match (kind, value) {
        (InputKind::String, Value::String(_)) => Some(value.clone()),
        (InputKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (InputKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (InputKind::String, other) => serde_json::to_string(other).ok().map(Value::String),

        (InputKind::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::from),
        (InputKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

        (InputKind::Number, Value::Number(_)) => Some(value.clone()),
        (InputKind::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),

        (InputKind::Boolean, Value::Bool(_)) => Some(value.clone()),
        (InputKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        (InputKind::Object, Value::Object(_)) | (InputKind::Array, Value::Array(_)) => {
            Some(value.clone())
        }
        (InputKind::Object, Value::String(s)) => {
            serde_json::from_str::<Value>(s).ok().filter(Value::is_object)
        }
        (InputKind::Array, Value::String(s)) => {
            serde_json::from_str::<Value>(s).ok().filter(Value::is_array)
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, kind: InputKind, required: bool) -> InputField {
        InputField {
            name: name.into(),
            kind,
            required,
        }
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn coerces_strings_to_declared_kinds() {
        let fields = [
            field("n", InputKind::Integer, true),
            field("f", InputKind::Number, false),
            field("b", InputKind::Boolean, false),
            field("o", InputKind::Object, false),
            field("s", InputKind::String, false),
        ];
        let input = map(json!({
            "n": "42", "f": "1.5", "b": "TRUE", "o": "{\"k\":1}", "s": 7, "extra": [1]
        }));

        let out = convert_inputs(&input, &fields, true).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(
            Value::Object(out.values),
            json!({"n": 42, "f": 1.5, "b": true, "o": {"k": 1}, "s": "7", "extra": [1]})
        );
    }

    #[test]
    fn fail_fast_rejects_missing_required() {
        let fields = [field("query", InputKind::String, true)];
        let err = convert_inputs(&Map::new(), &fields, true).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn lenient_mode_collects_warnings() {
        let fields = [
            field("query", InputKind::String, true),
            field("n", InputKind::Integer, false),
        ];
        let out = convert_inputs(&map(json!({"n": "abc"})), &fields, false).unwrap();
        assert_eq!(out.warnings.len(), 2);
        assert!(out.values.is_empty());
    }
}
