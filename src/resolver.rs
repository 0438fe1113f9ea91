//! The value resolver (`spec.md` §4.3, "C5 Value resolver").

use crate::error::{Error, Result};
use crate::node::Tag;
use crate::value::{Indexable, Value};

/// Resolves `tag` against `replacements`, walking its index chain.
///
/// `tag.name` is looked up first (`Error::Name` if missing); each index is
/// then applied left-associatively (`Error::Key` on the first index with no
/// matching element, key, or field).
pub fn resolve(tag: &Tag, replacements: &Value) -> Result<Value> {
    let mut value = replacements
        .get_by_key(&tag.name)
        .ok_or_else(|| Error::Name(format!("no replacement named {:?}", tag.name)))?;

    for index in &tag.indices {
        value = get_index(&value, index)?;
    }
    Ok(value)
}

/// Projects `needle` out of `haystack`, per `spec.md` §4.3's dispatch
/// order: if `needle` is all digits, try an ordered-sequence element first,
/// falling back to a string key of the same digits; otherwise try a
/// mapping key, falling back to a named field of the same name.
fn get_index(haystack: &Value, needle: &str) -> Result<Value> {
    let not_found = || Error::Key(format!("no index, key, or field {needle:?}"));

    if needle.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = needle.parse::<usize>() {
            if let Some(v) = haystack.get_by_index(n) {
                return Ok(v);
            }
        }
        return haystack.get_by_key(needle).ok_or_else(not_found);
    }

    if let Some(v) = haystack.get_by_key(needle) {
        return Ok(v);
    }
    haystack.get_by_field(needle).ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FunctionCall;
    use indexmap::IndexMap;

    fn tag(name: &str, indices: &[&str]) -> Tag {
        Tag {
            name: name.to_string(),
            indices: indices.iter().map(|s| s.to_string()).collect(),
            functions: Vec::<FunctionCall>::new(),
            raw: String::new(),
        }
    }

    #[test]
    fn missing_name_is_name_error() {
        let replacements = Value::Object(IndexMap::new());
        let err = resolve(&tag("missing", &[]), &replacements).unwrap_err();
        assert!(matches!(err, Error::Name(_)));
    }

    #[test]
    fn index_chain_walks_nested_values() {
        let mut user = IndexMap::new();
        user.insert("name".to_string(), Value::Str("Ada".into()));
        let mut replacements = IndexMap::new();
        replacements.insert("user".to_string(), Value::Array(vec![Value::Object(user)]));
        let replacements = Value::Object(replacements);

        let value = resolve(&tag("user", &["0", "name"]), &replacements).unwrap();
        assert_eq!(value, Value::Str("Ada".into()));
    }

    #[test]
    fn missing_index_is_key_error() {
        let mut replacements = IndexMap::new();
        replacements.insert("x".to_string(), Value::Array(vec![]));
        let replacements = Value::Object(replacements);
        let err = resolve(&tag("x", &["5"]), &replacements).unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn numeric_index_falls_back_to_string_key() {
        let mut inner = IndexMap::new();
        inner.insert("0".to_string(), Value::Str("zero".into()));
        let mut replacements = IndexMap::new();
        replacements.insert("x".to_string(), Value::Object(inner));
        let replacements = Value::Object(replacements);
        let value = resolve(&tag("x", &["0"]), &replacements).unwrap();
        assert_eq!(value, Value::Str("zero".into()));
    }
}
