use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::{
    EdgeFunctionError,
    catalog::{FunctionSpec, ParamKind},
};

/// Checks `arguments` against the declared parameters of `spec` and returns
/// the normalized argument object. `null` counts as an empty object, and
/// optional parameters set to `null` are dropped.
pub fn validate_arguments(
    spec: &FunctionSpec,
    arguments: Value,
) -> Result<Map<String, Value>, EdgeFunctionError> {
    let raw = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(EdgeFunctionError::InvalidArguments {
                function: spec.name.to_string(),
                message: format!("expected a JSON object, got {}", json_type(&other)),
            });
        }
    };

    let mut normalized = Map::new();
    for (key, value) in raw {
        let Some(param) = spec.param(&key) else {
            return Err(EdgeFunctionError::InvalidArguments {
                function: spec.name.to_string(),
                message: format!("unknown parameter '{key}'"),
            });
        };
        if value.is_null() {
            continue;
        }
        let value = check_kind(&param.kind, value).map_err(|reason| {
            EdgeFunctionError::InvalidParameter {
                function: spec.name.to_string(),
                parameter: param.name.to_string(),
                reason,
            }
        })?;
        normalized.insert(key, value);
    }

    if let Some(missing) = spec
        .params
        .iter()
        .find(|param| param.required && !normalized.contains_key(param.name))
    {
        return Err(EdgeFunctionError::MissingParameter {
            function: spec.name.to_string(),
            parameter: missing.name.to_string(),
        });
    }

    if !spec.at_least_one_of.is_empty()
        && !spec
            .at_least_one_of
            .iter()
            .any(|name| normalized.contains_key(*name))
    {
        return Err(EdgeFunctionError::MissingParameter {
            function: spec.name.to_string(),
            parameter: spec.at_least_one_of.join(" or "),
        });
    }

    Ok(normalized)
}

fn check_kind(kind: &ParamKind, value: Value) -> Result<Value, String> {
    match kind {
        ParamKind::String => match value {
            Value::String(_) => Ok(value),
            // Models like to send ids as bare numbers.
            Value::Number(number) => Ok(Value::String(number.to_string())),
            other => Err(format!("expected a string, got {}", json_type(&other))),
        },
        ParamKind::Enum { values } => match value.as_str() {
            Some(text) if values.contains(&text) => Ok(value),
            Some(text) => Err(format!(
                "'{text}' is not one of {}",
                values.join(", ")
            )),
            None => Err(format!("expected a string, got {}", json_type(&value))),
        },
        ParamKind::Date => match value.as_str() {
            Some(text) if is_iso_date(text) => Ok(value),
            Some(text) => Err(format!("'{text}' is not a YYYY-MM-DD date")),
            None => Err(format!("expected a date string, got {}", json_type(&value))),
        },
        ParamKind::Integer { min, max } => {
            let number = as_integer(&value)
                .ok_or_else(|| format!("expected an integer, got {value}"))?;
            match (min, max) {
                (Some(min), _) if number < *min => {
                    Err(format!("{number} is below the minimum of {min}"))
                }
                (_, Some(max)) if number > *max => {
                    Err(format!("{number} is above the maximum of {max}"))
                }
                _ => Ok(Value::from(number)),
            }
        }
        ParamKind::StringList => match &value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(value),
            _ => Err("expected an array of strings".to_string()),
        },
    }
}

fn is_iso_date(text: &str) -> bool {
    text.len() == 10 && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
