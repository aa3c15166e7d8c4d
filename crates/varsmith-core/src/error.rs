//! Error types for the value and type model.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid type '{input}': {message}")]
    InvalidType { input: String, message: String },

    #[error("cannot convert {found} to {expected}{}", location(.path))]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

fn location(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at {path}")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
