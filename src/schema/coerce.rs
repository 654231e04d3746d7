use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Number, Value};

use crate::error::{EditError, Result};
use crate::types::Properties;

use super::fields::{FieldMeta, FieldType, ID_FIELD};

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}(Z|[+-]\d{2}:?\d{2})?$").expect("date regex is valid"))
}

fn datetime_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$")
            .expect("datetime regex is valid")
    })
}

fn invalid(key: &str, detail: impl Into<String>) -> EditError {
    EditError::InvalidValue {
        key: key.to_string(),
        detail: detail.into(),
    }
}

/// Integral floats are folded to integers so `12` and `12.0` compare equal.
fn normalize_number(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

fn to_integer(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Value::from(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
                _ => Err(invalid(key, format!("{n} is not an integer"))),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(key, format!("\"{s}\" is not an integer"))),
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        other => Err(invalid(key, format!("{other} is not an integer"))),
    }
}

fn to_number(key: &str, value: &Value) -> Result<Value> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .and_then(normalize_number)
        .ok_or_else(|| invalid(key, format!("{value} is not a number")))
}

fn to_boolean(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(invalid(key, format!("{n} is not a boolean"))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "f" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(invalid(key, format!("\"{s}\" is not a boolean"))),
        },
        other => Err(invalid(key, format!("{other} is not a boolean"))),
    }
}

fn to_pattern(key: &str, value: &Value, re: &Regex, what: &str) -> Result<Value> {
    match value {
        Value::String(s) if re.is_match(s.trim()) => Ok(Value::String(s.trim().to_string())),
        other => Err(invalid(key, format!("{other} is not a {what}"))),
    }
}

fn to_text(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Convert user or wire input to the value type of `field`.
///
/// `null` and blank strings become `null` for every type.
pub fn coerce_value(field: &FieldMeta, value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Value::String(s) = value {
        if s.trim().is_empty() {
            return Ok(Value::Null);
        }
    }
    let key = field.key.as_str();
    match field.field_type {
        FieldType::Integer => to_integer(key, value),
        FieldType::Number => to_number(key, value),
        FieldType::Boolean => to_boolean(key, value),
        FieldType::Date => to_pattern(key, value, date_regex(), "date"),
        FieldType::Datetime => to_pattern(key, value, datetime_regex(), "datetime"),
        FieldType::Multiselect => match value {
            Value::Array(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            )),
            other => Ok(Value::Array(vec![other.clone()])),
        },
        FieldType::Select => match value {
            Value::Array(_) | Value::Object(_) => {
                Err(invalid(key, "a single option is expected"))
            }
            _ => Ok(value.clone()),
        },
        FieldType::Text | FieldType::Textarea => match value {
            Value::Array(_) | Value::Object(_) => Err(invalid(key, "text is expected")),
            _ => Ok(to_text(value)),
        },
    }
}

/// Coerce every known field of a loaded feature. Values that do not fit their
/// declared type are kept verbatim; server data is never dropped.
pub fn coerce_properties(fields: &[FieldMeta], properties: &Properties) -> Properties {
    let mut out = properties.clone();
    for field in fields {
        if field.key == ID_FIELD {
            continue;
        }
        let Some(raw) = properties.get(&field.key) else {
            continue;
        };
        match coerce_value(field, raw) {
            Ok(v) => {
                out.insert(field.key.clone(), v);
            }
            Err(e) => {
                tracing::debug!(field = %field.key, error = %e, "keeping uncoercible server value");
            }
        }
    }
    out
}
