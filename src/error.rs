//! The error taxonomy for compilation and rendering.

use std::path::PathBuf;

/// An engine error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed tag, unknown directive, scope imbalance, bad argument list,
    /// or invalid expression.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A tag name was missing from the replacements, a function name is
    /// unknown, or an expression referenced an undefined name.
    #[error("name error: {0}")]
    Name(String),

    /// An index projection had no matching element, key, or field.
    #[error("key error: {0}")]
    Key(String),

    /// A function received an incompatible argument, or an expression
    /// comparison mismatched types.
    #[error("type error in '{function}': {message}")]
    Type {
        /// The function or operator that raised the error.
        function: String,
        /// A description of the mismatch.
        message: String,
    },

    /// A loop unpack had the wrong arity, or the source was not unpackable.
    #[error("value error: {0}")]
    Value(String),

    /// The template file could not be located, opened, or read on first
    /// load.
    #[error("could not read template {path}: {source}")]
    Read {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A requested template name resolved outside the cache's search root.
    #[error("template name {0:?} escapes the search path")]
    PathEscape(String),
}

/// The engine's result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
