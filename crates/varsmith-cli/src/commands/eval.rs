//! Eval command: evaluate an expression against resolved variables and locals.

use anyhow::{Context, Result};
use varsmith_config::Mode;
use varsmith_config::expression::{self, RefKind};

use super::{SENSITIVE, redacted};
use crate::VarArgs;

pub fn run(source: &str, args: &VarArgs, show_sensitive: bool) -> Result<()> {
    let (_project, resolved) = super::load_and_resolve(args, Mode::Lenient)?;

    let expr = expression::parse(source).with_context(|| format!("Invalid expression: {source}"))?;
    let value = resolved
        .evaluate(&expr)
        .with_context(|| format!("Failed to evaluate: {source}"))?;

    let sensitive = expression::references(&expr).iter().any(|r| match r.kind {
        RefKind::Variable => resolved.variable(&r.name).is_some_and(|v| v.sensitive),
        RefKind::Local => resolved.local(&r.name).is_some_and(|l| l.sensitive),
    });

    if redacted(&value, sensitive) && !show_sensitive {
        println!("{SENSITIVE}");
    } else {
        println!("{value}");
    }
    Ok(())
}
