//! The dynamic value model replacements and resolved tag values are built
//! from.

use crate::safestring::SafeString;
use indexmap::IndexMap;
use std::fmt;

/// A compile-time literal: the only thing a function-call argument list or
/// an expression atom is allowed to contain. No tag references, no
/// expressions — see `spec.md` §3 and §4.5.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// An integer literal.
    Int(i64),
    /// A string literal.
    Str(String),
    /// `true`/`false`.
    Bool(bool),
    /// `none`.
    None,
    /// A parenthesised, comma-separated literal list (function args only).
    Tuple(Vec<Literal>),
}

/// A runtime value: either resolved from a replacement mapping, or produced
/// by a function in the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// An unescaped, plain string.
    Str(String),
    /// A string already carrying an escaping contract.
    Safe(SafeString),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// An insertion-ordered mapping.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Builds a `Value` from a [`Literal`], for evaluating closure
    /// arguments and expression atoms.
    pub fn from_literal(lit: &Literal) -> Self {
        match lit {
            Literal::Int(n) => Value::Int(*n),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::None => Value::Null,
            Literal::Tuple(items) => Value::Array(items.iter().map(Value::from_literal).collect()),
        }
    }

    /// Truthiness per `spec.md` §4.5: empty string/sequence/mapping, `0`,
    /// `false`, and `none` are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Safe(s) => !s.as_str().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }

    /// Renders the value to its display text, the way the function
    /// pipeline and text-node emission do. This does not apply any
    /// escaping; callers decide that separately (see `functions.rs`).
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Safe(s) => s.as_str().to_string(),
            Value::Array(items) => items
                .iter()
                .map(Value::display_text)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{k}: {}", v.display_text()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Returns an ordered sequence of items for iteration (loops, `items`,
    /// `values`), if this value supports it.
    pub fn as_sequence(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.clone()),
            Value::Object(map) => Some(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

/// The polymorphic-indexing capability named in `spec.md` §9: dispatch is
/// always attempted integer-sequence, then key, then field, with the
/// resolver (`resolver.rs`) deciding which of the three to try based on
/// whether the index text is all digits.
pub trait Indexable {
    /// Looks up by ordered-sequence position.
    fn get_by_index(&self, index: usize) -> Option<Value>;
    /// Looks up by mapping key.
    fn get_by_key(&self, key: &str) -> Option<Value>;
    /// Looks up by named-field access.
    fn get_by_field(&self, key: &str) -> Option<Value>;
}

impl Indexable for Value {
    fn get_by_index(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    fn get_by_key(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            _ => None,
        }
    }

    fn get_by_field(&self, key: &str) -> Option<Value> {
        // A dynamic Value has no distinct notion of "attribute" versus
        // "key"; both name the same underlying map entry.
        self.get_by_key(key)
    }
}
