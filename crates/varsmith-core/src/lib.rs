//! Core value and type model for varsmith.
//!
//! This crate contains:
//! - The resolved `Value` representation (strings, numbers, bools, lists, maps)
//! - Declared variable types (`VarType`) and their type-string syntax
//! - Coercion of values into declared types

pub mod coerce;
pub mod error;
pub mod types;
pub mod value;

pub use coerce::coerce;
pub use error::{Error, Result};
pub use types::VarType;
pub use value::Value;
