//! Built-in functions callable from expressions.

use std::collections::BTreeMap;

use varsmith_core::Value;
use varsmith_core::coerce::{parse_bool, parse_number};

use super::ExprError;
use super::eval::{mismatch, to_number};

/// Accepted argument counts: (minimum, maximum). `None` means variadic.
fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    let range = match name {
        "upper" | "lower" | "trimspace" | "title" | "length" | "keys" | "values" | "abs"
        | "tostring" | "tonumber" | "tobool" | "tolist" => (1, Some(1)),
        "split" | "join" | "contains" => (2, Some(2)),
        "replace" | "lookup" => (3, Some(3)),
        "format" | "min" | "max" | "coalesce" => (1, None),
        "concat" | "merge" => (0, None),
        _ => return None,
    };
    Some(range)
}

fn describe(range: (usize, Option<usize>)) -> String {
    match range {
        (min, Some(max)) if min == max => min.to_string(),
        (min, Some(max)) => format!("{min} to {max}"),
        (min, None) => format!("at least {min}"),
    }
}

/// Call the built-in function `name`.
pub fn call(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    let range = arity(name).ok_or_else(|| ExprError::UnknownFunction(name.to_string()))?;
    let (min, max) = range;
    if args.len() < min || max.is_some_and(|max| args.len() > max) {
        return Err(ExprError::Arity {
            function: name.to_string(),
            expected: describe(range),
            found: args.len(),
        });
    }

    if args.iter().any(Value::contains_unknown) {
        return Ok(Value::Unknown);
    }

    match name {
        "upper" => map_string(name, &args[0], |s| s.to_uppercase()),
        "lower" => map_string(name, &args[0], |s| s.to_lowercase()),
        "trimspace" => map_string(name, &args[0], |s| s.trim().to_string()),
        "title" => map_string(name, &args[0], title_case),
        "replace" => {
            let s = string_arg(name, &args[0])?;
            let from = string_arg(name, &args[1])?;
            let to = string_arg(name, &args[2])?;
            if from.is_empty() {
                return Ok(Value::String(s));
            }
            Ok(Value::String(s.replace(&from, &to)))
        }
        "split" => {
            let sep = string_arg(name, &args[0])?;
            let s = string_arg(name, &args[1])?;
            if s.is_empty() {
                return Ok(Value::List(vec![Value::String(String::new())]));
            }
            Ok(Value::List(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let sep = string_arg(name, &args[0])?;
            let items = list_arg(name, &args[1])?;
            let parts = items
                .iter()
                .map(|item| string_arg(name, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::String(parts.join(&sep)))
        }
        "format" => format(&args),
        "length" => match &args[0] {
            Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::List(items) => Ok(Value::Number(items.len() as f64)),
            Value::Map(entries) => Ok(Value::Number(entries.len() as f64)),
            other => Err(mismatch("length", "string, list or map", other)),
        },
        "concat" => {
            let mut out = Vec::new();
            for arg in &args {
                out.extend(list_arg(name, arg)?.iter().cloned());
            }
            Ok(Value::List(out))
        }
        "merge" => {
            let mut out = BTreeMap::new();
            for arg in &args {
                if arg.is_null() {
                    continue;
                }
                let entries = arg.as_map().ok_or_else(|| mismatch(name, "map", arg))?;
                out.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Ok(Value::Map(out))
        }
        "keys" => {
            let entries = args[0].as_map().ok_or_else(|| mismatch(name, "map", &args[0]))?;
            Ok(Value::List(
                entries.keys().map(|k| Value::String(k.clone())).collect(),
            ))
        }
        "values" => {
            let entries = args[0].as_map().ok_or_else(|| mismatch(name, "map", &args[0]))?;
            Ok(Value::List(entries.values().cloned().collect()))
        }
        "lookup" => {
            let entries = args[0].as_map().ok_or_else(|| mismatch(name, "map", &args[0]))?;
            let key = string_arg(name, &args[1])?;
            Ok(entries.get(&key).cloned().unwrap_or_else(|| args[2].clone()))
        }
        "contains" => {
            let items = list_arg(name, &args[0])?;
            Ok(Value::Bool(items.contains(&args[1])))
        }
        "coalesce" => {
            for arg in &args {
                match arg {
                    Value::Null => continue,
                    Value::String(s) if s.is_empty() => continue,
                    other => return Ok(other.clone()),
                }
            }
            Err(ExprError::InvalidArgument {
                function: name.to_string(),
                message: "no non-null, non-empty argument".to_string(),
            })
        }
        "min" | "max" => {
            let numbers = args
                .iter()
                .map(|arg| to_number(name, arg))
                .collect::<Result<Vec<_>, _>>()?;
            let pick = if name == "min" { f64::min } else { f64::max };
            let first = numbers[0];
            Ok(Value::Number(numbers[1..].iter().copied().fold(first, pick)))
        }
        "abs" => Ok(Value::Number(to_number(name, &args[0])?.abs())),
        "tostring" => match &args[0] {
            Value::Null => Ok(Value::Null),
            other => other
                .to_plain_string()
                .map(Value::String)
                .ok_or_else(|| mismatch(name, "string, number or bool", other)),
        },
        "tonumber" => match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::String(s) => parse_number(s).map(Value::Number).ok_or_else(|| {
                ExprError::InvalidArgument {
                    function: name.to_string(),
                    message: format!("cannot convert \"{s}\" to number"),
                }
            }),
            other => Err(mismatch(name, "string or number", other)),
        },
        "tobool" => match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(|| {
                ExprError::InvalidArgument {
                    function: name.to_string(),
                    message: format!("cannot convert \"{s}\" to bool"),
                }
            }),
            other => Err(mismatch(name, "string or bool", other)),
        },
        "tolist" => match &args[0] {
            Value::List(items) => Ok(Value::List(items.clone())),
            Value::Map(entries) if entries.is_empty() => Ok(Value::List(vec![])),
            other => Err(mismatch(name, "list", other)),
        },
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

fn string_arg(function: &str, value: &Value) -> Result<String, ExprError> {
    value
        .to_plain_string()
        .ok_or_else(|| mismatch(function, "string", value))
}

fn list_arg<'a>(function: &str, value: &'a Value) -> Result<&'a [Value], ExprError> {
    value.as_list().ok_or_else(|| mismatch(function, "list", value))
}

fn map_string(function: &str, value: &Value, f: impl Fn(&str) -> String) -> Result<Value, ExprError> {
    let s = string_arg(function, value)?;
    Ok(Value::String(f(&s)))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

/// `format("%s-%d", a, b)`: `%s` and `%v` insert any scalar, `%d` a whole number.
fn format(args: &[Value]) -> Result<Value, ExprError> {
    let spec = string_arg("format", &args[0])?;
    let mut rest = args[1..].iter();
    let mut out = String::new();
    let mut chars = spec.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = chars.next().ok_or_else(|| ExprError::InvalidArgument {
            function: "format".to_string(),
            message: "format string ends with '%'".to_string(),
        })?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = rest.next().ok_or_else(|| ExprError::InvalidArgument {
            function: "format".to_string(),
            message: "not enough arguments for format string".to_string(),
        })?;
        match verb {
            's' => out.push_str(&string_arg("format", arg)?),
            'v' => match arg.to_plain_string() {
                Some(text) => out.push_str(&text),
                None => out.push_str(&arg.to_string()),
            },
            'd' => {
                let n = to_number("format", arg)?;
                if n.fract() != 0.0 {
                    return Err(mismatch("format %d", "whole number", arg));
                }
                out.push_str(&(n as i64).to_string());
            }
            other => {
                return Err(ExprError::InvalidArgument {
                    function: "format".to_string(),
                    message: format!("unsupported verb '%{other}'"),
                });
            }
        }
    }

    if rest.next().is_some() {
        return Err(ExprError::InvalidArgument {
            function: "format".to_string(),
            message: "too many arguments for format string".to_string(),
        });
    }
    Ok(Value::String(out))
}
