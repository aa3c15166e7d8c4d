//! Expression language for locals and validation conditions.
//!
//! Supports:
//! - Literals: `"text ${var.name}"`, `42`, `true`, `null`, `["a", "b"]`, `{ key = "value" }`
//! - References: `var.NAME`, `local.NAME`, with `[index]` and `.key` access
//! - Operators: `? :`, `||`, `&&`, `==`, `!=`, `<`, `<=`, `>`, `>=`, `+`, `-`, `*`, `/`, `%`, `!`
//! - Function calls such as `upper(var.name)` or `join(",", var.zones)`

pub mod ast;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub use ast::{BinaryOp, Expr, RefKind, Reference, TemplatePart, UnaryOp};
pub use eval::{Scope, evaluate};
pub use parser::{parse, parse_template};

/// Deepest nesting of brackets, prefix operators, conditionals and template
/// interpolations accepted by the parser.
pub const MAX_NESTING: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("reference to undeclared {0}")]
    UnknownReference(Reference),

    #[error("{operation}: expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("map has no key \"{0}\"")]
    MissingKey(String),

    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("invalid argument to '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    #[error("division by zero")]
    DivisionByZero,
}

/// Collect the distinct references made by an expression, in order of first use.
pub fn references(expr: &Expr) -> Vec<Reference> {
    let mut found = Vec::new();
    expr.visit_references(&mut |r| {
        if !found.contains(r) {
            found.push(r.clone());
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_deduplicated() {
        let expr = parse(r#"var.a == "x" ? "${local.b}-${var.a}" : join(",", var.c)"#).unwrap();
        let refs = references(&expr);
        assert_eq!(
            refs,
            vec![
                Reference::variable("a"),
                Reference::local("b"),
                Reference::variable("c"),
            ]
        );
    }
}
