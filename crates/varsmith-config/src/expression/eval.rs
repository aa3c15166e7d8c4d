//! Expression evaluation against resolved variables and locals.

use std::collections::BTreeMap;

use varsmith_core::Value;
use varsmith_core::coerce::parse_number;

use super::ExprError;
use super::ast::{BinaryOp, Expr, RefKind, Reference, TemplatePart, UnaryOp};
use super::functions;

/// The values an expression can reference.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub variables: &'a BTreeMap<String, Value>,
    pub locals: &'a BTreeMap<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(
        variables: &'a BTreeMap<String, Value>,
        locals: &'a BTreeMap<String, Value>,
    ) -> Self {
        Self { variables, locals }
    }

    pub fn lookup(&self, reference: &Reference) -> Option<&'a Value> {
        match reference.kind {
            RefKind::Variable => self.variables.get(&reference.name),
            RefKind::Local => self.locals.get(&reference.name),
        }
    }
}

/// Evaluate an expression. Operations on unknown values yield `Value::Unknown`.
pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Reference(reference) => scope
            .lookup(reference)
            .cloned()
            .ok_or_else(|| ExprError::UnknownReference(reference.clone())),
        Expr::Template(parts) => evaluate_template(parts, scope),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Map(entries) => entries
            .iter()
            .map(|(key, item)| evaluate(item, scope).map(|v| (key.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map),
        Expr::Index { target, index } => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            index_value(&target, &index)
        }
        Expr::GetAttr { target, name } => {
            let target = evaluate(target, scope)?;
            index_value(&target, &Value::String(name.clone()))
        }
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(name, args)
        }
        Expr::Unary { op, operand } => {
            let operand = evaluate(operand, scope)?;
            evaluate_unary(*op, operand)
        }
        Expr::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, scope),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => match evaluate(condition, scope)? {
            Value::Bool(true) => evaluate(then, scope),
            Value::Bool(false) => evaluate(otherwise, scope),
            Value::Unknown => Ok(Value::Unknown),
            other => Err(mismatch("condition", "bool", &other)),
        },
    }
}

fn evaluate_template(parts: &[TemplatePart], scope: &Scope<'_>) -> Result<Value, ExprError> {
    // A template made of a single interpolation keeps the value's own type.
    if let [TemplatePart::Interpolation(expr)] = parts {
        return evaluate(expr, scope);
    }

    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Interpolation(expr) => {
                let value = evaluate(expr, scope)?;
                if value.is_unknown() {
                    return Ok(Value::Unknown);
                }
                match value.to_plain_string() {
                    Some(text) => out.push_str(&text),
                    None => return Err(mismatch("template interpolation", "string", &value)),
                }
            }
        }
    }
    Ok(Value::String(out))
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ExprError> {
    if target.is_unknown() || index.is_unknown() {
        return Ok(Value::Unknown);
    }

    match target {
        Value::List(items) => {
            let n = to_number("index", index)?;
            if n.fract() != 0.0 {
                return Err(mismatch("index", "whole number", index));
            }
            let i = n as i64;
            if i < 0 || i as usize >= items.len() {
                return Err(ExprError::IndexOutOfRange {
                    index: i,
                    len: items.len(),
                });
            }
            Ok(items[i as usize].clone())
        }
        Value::Map(entries) => {
            let key = index
                .to_plain_string()
                .ok_or_else(|| mismatch("map key", "string", index))?;
            entries
                .get(&key)
                .cloned()
                .ok_or(ExprError::MissingKey(key))
        }
        other => Err(mismatch("index", "list or map", other)),
    }
}

fn evaluate_unary(op: UnaryOp, operand: Value) -> Result<Value, ExprError> {
    if operand.is_unknown() {
        return Ok(Value::Unknown);
    }
    match op {
        UnaryOp::Not => match operand {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(mismatch("operator !", "bool", &other)),
        },
        UnaryOp::Negate => Ok(Value::Number(-to_number("operator -", &operand)?)),
    }
}

fn evaluate_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &Scope<'_>,
) -> Result<Value, ExprError> {
    let left = evaluate(lhs, scope)?;

    // Short-circuit logic operators on a known left operand.
    match (op, &left) {
        (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
        (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
        (BinaryOp::And | BinaryOp::Or, Value::Bool(_) | Value::Unknown) => {}
        (BinaryOp::And | BinaryOp::Or, other) => {
            return Err(mismatch(&format!("operator {op}"), "bool", other));
        }
        _ => {}
    }

    let right = evaluate(rhs, scope)?;
    if left.contains_unknown() || right.contains_unknown() {
        return Ok(Value::Unknown);
    }

    let operation = format!("operator {op}");
    match op {
        BinaryOp::And | BinaryOp::Or => match right {
            Value::Bool(b) => Ok(Value::Bool(b)),
            other => Err(mismatch(&operation, "bool", &other)),
        },
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => compare(&operation, &left, &right, |a, b| a < b),
        BinaryOp::Le => compare(&operation, &left, &right, |a, b| a <= b),
        BinaryOp::Gt => compare(&operation, &left, &right, |a, b| a > b),
        BinaryOp::Ge => compare(&operation, &left, &right, |a, b| a >= b),
        BinaryOp::Add => arithmetic(&operation, &left, &right, |a, b| Ok(a + b)),
        BinaryOp::Sub => arithmetic(&operation, &left, &right, |a, b| Ok(a - b)),
        BinaryOp::Mul => arithmetic(&operation, &left, &right, |a, b| Ok(a * b)),
        BinaryOp::Div => arithmetic(&operation, &left, &right, |a, b| {
            if b == 0.0 {
                Err(ExprError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Rem => arithmetic(&operation, &left, &right, |a, b| {
            if b == 0.0 {
                Err(ExprError::DivisionByZero)
            } else {
                Ok(a % b)
            }
        }),
    }
}

fn compare(
    operation: &str,
    left: &Value,
    right: &Value,
    f: impl Fn(f64, f64) -> bool,
) -> Result<Value, ExprError> {
    let a = to_number(operation, left)?;
    let b = to_number(operation, right)?;
    Ok(Value::Bool(f(a, b)))
}

fn arithmetic(
    operation: &str,
    left: &Value,
    right: &Value,
    f: impl Fn(f64, f64) -> Result<f64, ExprError>,
) -> Result<Value, ExprError> {
    let a = to_number(operation, left)?;
    let b = to_number(operation, right)?;
    f(a, b).map(Value::Number)
}

/// Numbers, and strings holding a number, convert to `f64`.
pub(crate) fn to_number(operation: &str, value: &Value) -> Result<f64, ExprError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::String(s) => parse_number(s).ok_or_else(|| mismatch(operation, "number", value)),
        other => Err(mismatch(operation, "number", other)),
    }
}

pub(crate) fn mismatch(operation: &str, expected: &str, found: &Value) -> ExprError {
    ExprError::TypeMismatch {
        operation: operation.to_string(),
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse;

    fn eval_with(src: &str, vars: &[(&str, Value)]) -> Result<Value, ExprError> {
        let variables: BTreeMap<String, Value> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let locals = BTreeMap::new();
        evaluate(&parse(src)?, &Scope::new(&variables, &locals))
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(eval_with("(1 + 2) * 3", &[]).unwrap(), Value::Number(9.0));
        assert_eq!(eval_with("7 % 4 == 3", &[]).unwrap(), Value::Bool(true));
        assert_eq!(eval_with(r#""10" > 9"#, &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_template_interpolation() {
        let value = eval_with(
            r#""${var.prefix}-${var.count}""#,
            &[("prefix", Value::from("web")), ("count", Value::from(3i64))],
        )
        .unwrap();
        assert_eq!(value, Value::from("web-3"));
    }

    #[test]
    fn test_single_interpolation_keeps_type() {
        let zones = Value::List(vec![Value::from("a")]);
        let value = eval_with(r#""${var.zones}""#, &[("zones", zones.clone())]).unwrap();
        assert_eq!(value, zones);
    }

    #[test]
    fn test_list_in_template_rejected() {
        let zones = Value::List(vec![Value::from("a")]);
        let err = eval_with(r#""zones: ${var.zones}""#, &[("zones", zones)]).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_propagates() {
        let value = eval_with(
            r#""${var.region}-ami""#,
            &[("region", Value::Unknown)],
        )
        .unwrap();
        assert_eq!(value, Value::Unknown);

        let value = eval_with("var.n + 1", &[("n", Value::Unknown)]).unwrap();
        assert_eq!(value, Value::Unknown);
    }

    #[test]
    fn test_short_circuit_with_unknown() {
        let value = eval_with("false && var.flag", &[("flag", Value::Unknown)]).unwrap();
        assert_eq!(value, Value::Bool(false));
    }

    #[test]
    fn test_index_and_attribute_access() {
        let tags = eval_with(r#"{ owner = "ops" }"#, &[]).unwrap();
        let zones = Value::List(vec![Value::from("a"), Value::from("b")]);
        let vars = [("tags", tags), ("zones", zones)];

        assert_eq!(eval_with("var.tags.owner", &vars).unwrap(), Value::from("ops"));
        assert_eq!(eval_with("var.zones[1]", &vars).unwrap(), Value::from("b"));
        assert!(matches!(
            eval_with("var.zones[2]", &vars).unwrap_err(),
            ExprError::IndexOutOfRange { index: 2, len: 2 }
        ));
        assert!(matches!(
            eval_with(r#"var.tags["team"]"#, &vars).unwrap_err(),
            ExprError::MissingKey(_)
        ));
    }

    #[test]
    fn test_conditional() {
        let value = eval_with(
            r#"var.env == "prod" ? 3 : 1"#,
            &[("env", Value::from("prod"))],
        )
        .unwrap();
        assert_eq!(value, Value::Number(3.0));
    }

    #[test]
    fn test_undeclared_reference() {
        let err = eval_with("var.missing", &[]).unwrap_err();
        assert_eq!(err.to_string(), "reference to undeclared var.missing");
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval_with("1 / 0", &[]).unwrap_err(), ExprError::DivisionByZero);
    }
}
