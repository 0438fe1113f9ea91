//! The function pipeline and registry (`spec.md` §4.4, "C6 Function
//! pipeline").
//!
//! Modelled per the design note in `spec.md` §9: a map from name to a
//! tagged variant of a plain one-argument transform or a closure factory
//! that first consumes the call's literal argument list and returns the
//! transform to apply. Registered functions are resolved by name at every
//! render, so registering a replacement after a template has been compiled
//! is observed by subsequent renders.

use crate::error::{Error, Result};
use crate::safestring::SafeString;
use crate::value::{Literal, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// A plain, argument-less transform.
pub type PlainFn = Rc<dyn Fn(Value) -> Result<Value>>;
/// A closure transform, already configured with its literal arguments.
pub type ClosureFn = Rc<dyn Fn(Value) -> Result<Value>>;
/// A factory that builds a [`ClosureFn`] from a call's literal arguments.
pub type ClosureFactory = Rc<dyn Fn(&[Literal]) -> Result<ClosureFn>>;

/// A registered template function.
#[derive(Clone)]
pub enum FunctionEntry {
    /// Always called with no arguments: `fn(value)`.
    Plain(PlainFn),
    /// Called with a `(args)` list that configures the transform, which is
    /// then applied to the resolved value: `fn(args)(value)`.
    Closure(ClosureFactory),
}

/// The function registry. Lookup is dynamic at every call site, so
/// mutating the registry after a template compiles still affects its next
/// render.
#[derive(Clone, Default)]
pub struct Registry {
    entries: HashMap<String, FunctionEntry>,
}

impl Registry {
    /// Builds a registry pre-populated with the mandatory built-ins from
    /// `spec.md` §4.4: `default`, `html`, `raw`, `url`, `items`, `values`,
    /// `sorted`, `len`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::default();
        reg.register("default", FunctionEntry::Plain(Rc::new(default_fn)));
        reg.register("html", FunctionEntry::Plain(Rc::new(default_fn)));
        reg.register("raw", FunctionEntry::Plain(Rc::new(raw_fn)));
        reg.register("url", FunctionEntry::Plain(Rc::new(url_fn)));
        reg.register("items", FunctionEntry::Plain(Rc::new(items_fn)));
        reg.register("values", FunctionEntry::Plain(Rc::new(values_fn)));
        reg.register("sorted", FunctionEntry::Plain(Rc::new(sorted_fn)));
        reg.register("len", FunctionEntry::Plain(Rc::new(len_fn)));
        reg
    }

    /// Registers (or replaces) a function under `name`.
    pub fn register(&mut self, name: impl Into<String>, entry: FunctionEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Applies the call named `name`, with optional `args`, to `value`.
    pub fn apply(&self, name: &str, args: Option<&[Literal]>, value: Value) -> Result<Value> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::Name(format!("unknown template function {name:?}")))?;
        match (entry, args) {
            (FunctionEntry::Plain(f), None) => f(value),
            (FunctionEntry::Plain(f), Some(args)) if args.is_empty() => f(value),
            (FunctionEntry::Plain(_), Some(_)) => Err(Error::Type {
                function: name.to_string(),
                message: "this function takes no closure arguments".to_string(),
            }),
            (FunctionEntry::Closure(factory), args) => {
                let args = args.unwrap_or(&[]);
                let closure = factory(args)?;
                closure(value)
            }
        }
    }

    /// Applies the `default` rule when a tag has no explicit functions: a
    /// value already carrying a [`SafeString`] is left untouched, anything
    /// else is passed through `default`.
    pub fn apply_default_if_unsafe(&self, value: Value) -> Result<Value> {
        if matches!(value, Value::Safe(_)) {
            Ok(value)
        } else {
            self.apply("default", None, value)
        }
    }
}

fn default_fn(value: Value) -> Result<Value> {
    if let Value::Safe(s) = &value {
        // Idempotent: an already-safe value is not re-escaped.
        return Ok(Value::Safe(s.clone()));
    }
    let escaped = html_escape::encode_text(&value.display_text()).into_owned();
    Ok(Value::Safe(SafeString::html(escaped)))
}

fn raw_fn(value: Value) -> Result<Value> {
    match value {
        Value::Safe(s) => Ok(Value::Safe(s)),
        other => Ok(Value::Safe(SafeString::raw(other.display_text()))),
    }
}

fn url_fn(value: Value) -> Result<Value> {
    let encoded = percent_encoding::utf8_percent_encode(
        &value.display_text(),
        percent_encoding::NON_ALPHANUMERIC,
    )
    .to_string();
    Ok(Value::Safe(SafeString::url(encoded)))
}

fn items_fn(value: Value) -> Result<Value> {
    match value {
        Value::Object(map) => Ok(Value::Array(
            map.into_iter()
                .map(|(k, v)| Value::Array(vec![Value::Str(k), v]))
                .collect(),
        )),
        other => Err(Error::Type {
            function: "items".to_string(),
            message: format!("expected a mapping, got {other:?}"),
        }),
    }
}

fn values_fn(value: Value) -> Result<Value> {
    match value {
        Value::Object(map) => Ok(Value::Array(map.into_values().collect())),
        other => Err(Error::Type {
            function: "values".to_string(),
            message: format!("expected a mapping, got {other:?}"),
        }),
    }
}

fn sorted_fn(value: Value) -> Result<Value> {
    // Sorting a mapping sorts (and returns) its keys, not its [key, value]
    // iteration pairs.
    if let Value::Object(map) = &value {
        let mut keys: Vec<Value> = map.keys().cloned().map(Value::Str).collect();
        keys.sort_by(compare_values);
        return Ok(Value::Array(keys));
    }
    let mut items = value.as_sequence().ok_or_else(|| Error::Type {
        function: "sorted".to_string(),
        message: format!("expected a sequence, got {value:?}"),
    })?;
    items.sort_by(compare_values);
    Ok(Value::Array(items))
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => a.display_text().cmp(&b.display_text()),
    }
}

fn len_fn(value: Value) -> Result<Value> {
    let n = match &value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Str(s) => s.chars().count(),
        Value::Safe(s) => s.as_str().chars().count(),
        other => {
            return Err(Error::Type {
                function: "len".to_string(),
                message: format!("expected a sequence, mapping, or string, got {other:?}"),
            });
        }
    };
    Ok(Value::Int(n as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_escapes_html() {
        let reg = Registry::with_builtins();
        let out = reg.apply("default", None, Value::Str("<b>".into())).unwrap();
        assert_eq!(out, Value::Safe(SafeString::html("&lt;b&gt;".to_string())));
    }

    #[test]
    fn default_is_idempotent_on_already_safe_values() {
        let reg = Registry::with_builtins();
        let safe = Value::Safe(SafeString::html("<b>"));
        let out = reg.apply("default", None, safe.clone()).unwrap();
        assert_eq!(out, safe);
    }

    #[test]
    fn raw_is_identity_marked_safe() {
        let reg = Registry::with_builtins();
        let out = reg.apply("raw", None, Value::Str("<b>".into())).unwrap();
        assert_eq!(out, Value::Safe(SafeString::raw("<b>".to_string())));
    }

    #[test]
    fn pipeline_is_left_associative() {
        let reg = Registry::with_builtins();
        let xs = Value::Array(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        let sorted = reg.apply("sorted", None, xs).unwrap();
        let len = reg.apply("len", None, sorted).unwrap();
        assert_eq!(len, Value::Int(3));
    }

    #[test]
    fn unknown_function_is_name_error() {
        let reg = Registry::with_builtins();
        let err = reg.apply("nope", None, Value::Null).unwrap_err();
        assert!(matches!(err, Error::Name(_)));
    }

    #[test]
    fn sorted_on_a_mapping_returns_sorted_keys_not_pairs() {
        use indexmap::IndexMap;
        let mut map = IndexMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::Int(1));
        let reg = Registry::with_builtins();
        let out = reg.apply("sorted", None, Value::Object(map)).unwrap();
        assert_eq!(
            out,
            Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())])
        );
    }

    #[test]
    fn values_rejects_a_sequence() {
        let reg = Registry::with_builtins();
        let err = reg
            .apply("values", None, Value::Array(vec![Value::Int(1)]))
            .unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
    }
}
