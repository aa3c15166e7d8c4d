//! Configuration validation command.

use anyhow::Result;
use varsmith_config::Mode;

use crate::VarArgs;

/// Validate declarations, values and locals. Unset variables are allowed and
/// treated as unknown.
pub fn run(args: &VarArgs) -> Result<()> {
    let (_project, resolved) = super::load_and_resolve(args, Mode::Lenient)?;

    let unset: Vec<&str> = resolved
        .variables
        .iter()
        .filter(|v| v.value.is_unknown())
        .map(|v| v.name.as_str())
        .collect();
    if !unset.is_empty() {
        eprintln!(
            "Note: no value for {}; a build would fail until they are set",
            unset.join(", ")
        );
    }

    println!("The configuration is valid.");
    Ok(())
}
