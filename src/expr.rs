//! The safe expression sub-language (`spec.md` §4.5, "C7 Expression
//! evaluator").
//!
//! A small recursive-descent parser producing an [`Expr`] tree at compile
//! time, plus a tree walker that evaluates it lazily at render time,
//! scanning by character-class peeking over `char_indices` rather than a
//! regular expression engine.
//!
//! ```text
//! expr    = or_expr
//! or_expr = and_expr ( 'or' and_expr )*
//! and_expr= not_expr ( 'and' not_expr )*
//! not_expr= 'not' not_expr | cmp
//! cmp     = atom (('=='|'!='|'<'|'<='|'>'|'>='|'in'|'not in') atom)?
//! atom    = literal | tag | '(' expr ')'
//! literal = integer | string | 'true' | 'false' | 'none'
//! ```

use crate::error::{Error, Result};
use crate::lexer::lex_tag;
use crate::node::{CmpOp, Expr};
use crate::value::{Literal, Value};
use std::iter::Peekable;
use std::str::CharIndices;

type Chars<'a> = Peekable<CharIndices<'a>>;

/// Parses a full expression from `src`, requiring the whole (trimmed)
/// string to be consumed.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let mut chars = src.char_indices().peekable();
    let expr = parse_or(&mut chars, src)?;
    skip_ws(&mut chars);
    if chars.peek().is_some() {
        return Err(Error::Syntax(format!("unexpected trailing text in expression {src:?}")));
    }
    Ok(expr)
}

fn skip_ws(chars: &mut Chars<'_>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

/// Peeks for a bare keyword (`and`, `or`, `not`, `in`) at the current
/// position, consuming it only if it is followed by a word boundary.
fn peek_keyword(chars: &Chars<'_>, src: &str, keyword: &str) -> bool {
    let Some(&(offset, _)) = chars.peek() else { return false };
    let rest = &src[offset..];
    if !rest.starts_with(keyword) {
        return false;
    }
    match rest[keyword.len()..].chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => false,
        _ => true,
    }
}

fn consume_keyword(chars: &mut Chars<'_>, src: &str, keyword: &str) {
    let Some(&(offset, _)) = chars.peek() else { return };
    let end = offset + keyword.len();
    while let Some(&(o, _)) = chars.peek() {
        if o < end {
            chars.next();
        } else {
            break;
        }
    }
}

fn parse_or(chars: &mut Chars<'_>, src: &str) -> Result<Expr> {
    let mut lhs = parse_and(chars, src)?;
    loop {
        skip_ws(chars);
        if peek_keyword(chars, src, "or") {
            consume_keyword(chars, src, "or");
            let rhs = parse_and(chars, src)?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_and(chars: &mut Chars<'_>, src: &str) -> Result<Expr> {
    let mut lhs = parse_not(chars, src)?;
    loop {
        skip_ws(chars);
        if peek_keyword(chars, src, "and") {
            consume_keyword(chars, src, "and");
            let rhs = parse_not(chars, src)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        } else {
            break;
        }
    }
    Ok(lhs)
}

fn parse_not(chars: &mut Chars<'_>, src: &str) -> Result<Expr> {
    skip_ws(chars);
    if peek_keyword(chars, src, "not") {
        consume_keyword(chars, src, "not");
        let inner = parse_not(chars, src)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    parse_cmp(chars, src)
}

fn parse_cmp(chars: &mut Chars<'_>, src: &str) -> Result<Expr> {
    let lhs = parse_atom(chars, src)?;
    skip_ws(chars);
    if let Some(op) = peek_cmp_op(chars, src) {
        consume_cmp_op(chars, src, op);
        let rhs = parse_atom(chars, src)?;
        return Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)));
    }
    Ok(lhs)
}

fn peek_cmp_op(chars: &Chars<'_>, src: &str) -> Option<CmpOp> {
    let Some(&(offset, _)) = chars.peek() else { return None };
    let rest = &src[offset..];
    if rest.starts_with("==") {
        Some(CmpOp::Eq)
    } else if rest.starts_with("!=") {
        Some(CmpOp::Ne)
    } else if rest.starts_with("<=") {
        Some(CmpOp::Le)
    } else if rest.starts_with(">=") {
        Some(CmpOp::Ge)
    } else if rest.starts_with('<') {
        Some(CmpOp::Lt)
    } else if rest.starts_with('>') {
        Some(CmpOp::Gt)
    } else if starts_with_keyword(rest, "not") && rest["not".len()..].trim_start().starts_with("in") {
        Some(CmpOp::NotIn)
    } else if starts_with_keyword(rest, "in") {
        Some(CmpOp::In)
    } else {
        None
    }
}

fn starts_with_keyword(rest: &str, keyword: &str) -> bool {
    if !rest.starts_with(keyword) {
        return false;
    }
    match rest[keyword.len()..].chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => false,
        _ => true,
    }
}

fn consume_cmp_op(chars: &mut Chars<'_>, src: &str, op: CmpOp) {
    let len = match op {
        CmpOp::Eq | CmpOp::Ne | CmpOp::Le | CmpOp::Ge => 2,
        CmpOp::Lt | CmpOp::Gt => 1,
        CmpOp::In => 2,
        CmpOp::NotIn => {
            let Some(&(offset, _)) = chars.peek() else { return };
            let after_not = &src[offset + 3..];
            let ws_len = after_not.len() - after_not.trim_start().len();
            3 + ws_len + 2
        }
    };
    let Some(&(offset, _)) = chars.peek() else { return };
    let end = offset + len;
    while let Some(&(o, _)) = chars.peek() {
        if o < end {
            chars.next();
        } else {
            break;
        }
    }
}

fn parse_atom(chars: &mut Chars<'_>, src: &str) -> Result<Expr> {
    skip_ws(chars);
    match chars.peek().copied() {
        Some((_, '(')) => {
            chars.next();
            let inner = parse_or(chars, src)?;
            skip_ws(chars);
            match chars.next() {
                Some((_, ')')) => Ok(inner),
                _ => Err(Error::Syntax(format!("unclosed '(' in expression {src:?}"))),
            }
        }
        Some((offset, '[')) => {
            let (tag, end) = lex_tag(src, offset)?;
            advance_to(chars, end);
            Ok(Expr::TagRef(tag))
        }
        Some((offset, '"')) | Some((offset, '\'')) => {
            let quote = src[offset..].chars().next().unwrap();
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some((_, c)) if c == quote => break,
                    Some((_, c)) => s.push(c),
                    None => return Err(Error::Syntax(format!("unterminated string in {src:?}"))),
                }
            }
            Ok(Expr::Lit(Literal::Str(s)))
        }
        Some((offset, c)) if c == '-' || c.is_ascii_digit() => {
            let mut end = offset + c.len_utf8();
            chars.next();
            while let Some(&(o, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    end = o + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            src[offset..end]
                .parse::<i64>()
                .map(|n| Expr::Lit(Literal::Int(n)))
                .map_err(|_| Error::Syntax(format!("invalid integer in {src:?}")))
        }
        Some((offset, c)) if c.is_alphabetic() || c == '_' => {
            let mut end = offset;
            while let Some(&(o, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    end = o + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            match &src[offset..end] {
                "true" => Ok(Expr::Lit(Literal::Bool(true))),
                "false" => Ok(Expr::Lit(Literal::Bool(false))),
                "none" => Ok(Expr::Lit(Literal::None)),
                other => Err(Error::Syntax(format!("unexpected identifier {other:?} in expression"))),
            }
        }
        _ => Err(Error::Syntax(format!("unexpected end of expression {src:?}"))),
    }
}

fn advance_to(chars: &mut Chars<'_>, byte_offset: usize) {
    while let Some(&(o, _)) = chars.peek() {
        if o < byte_offset {
            chars.next();
        } else {
            break;
        }
    }
}

/// Evaluates `expr` against `replacements`, resolving tag references
/// lazily so that short-circuiting `and`/`or` never force an unevaluated
/// branch (`spec.md` §4.5, end-to-end scenario 4).
pub fn eval(
    expr: &Expr,
    replacements: &Value,
    functions: &crate::functions::Registry,
) -> Result<Value> {
    match expr {
        Expr::Lit(lit) => Ok(Value::from_literal(lit)),
        Expr::TagRef(tag) => resolve_for_expr(tag, replacements, functions),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, replacements, functions)?.is_truthy())),
        Expr::And(lhs, rhs) => {
            let left = eval(lhs, replacements, functions)?;
            if !left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, replacements, functions)
            }
        }
        Expr::Or(lhs, rhs) => {
            let left = eval(lhs, replacements, functions)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, replacements, functions)
            }
        }
        Expr::Cmp(op, lhs, rhs) => {
            let left = eval(lhs, replacements, functions)?;
            let right = eval(rhs, replacements, functions)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

/// Resolves a tag inside an expression. Unlike a bare `Node::Tag` in the
/// renderer, a tag referenced from inside an expression gets no local
/// recovery: a `Name`/`Key` failure propagates to the caller of `eval`,
/// just as every other resolution failure does.
fn resolve_for_expr(
    tag: &crate::node::Tag,
    replacements: &Value,
    functions: &crate::functions::Registry,
) -> Result<Value> {
    let mut value = crate::resolver::resolve(tag, replacements)?;
    for call in &tag.functions {
        value = functions.apply(&call.name, call.args.as_deref(), value)?;
    }
    Ok(value)
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
    match op {
        CmpOp::Eq => Ok(values_equal(a, b)),
        CmpOp::Ne => Ok(!values_equal(a, b)),
        CmpOp::In => membership(b, a),
        CmpOp::NotIn => membership(b, a).map(|found| !found),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => ordering(op, a, b),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Safe(a), Value::Safe(b)) => a.as_str() == b.as_str(),
        (Value::Safe(a), Value::Str(b)) | (Value::Str(b), Value::Safe(a)) => a.as_str() == b,
        _ => false,
    }
}

fn ordering(op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
    use std::cmp::Ordering;
    let ord = match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).ok_or_else(|| type_error("comparison", "NaN is not ordered"))?
        }
        (Value::Int(a), Value::Float(b)) => (*a as f64)
            .partial_cmp(b)
            .ok_or_else(|| type_error("comparison", "NaN is not ordered"))?,
        (Value::Float(a), Value::Int(b)) => a
            .partial_cmp(&(*b as f64))
            .ok_or_else(|| type_error("comparison", "NaN is not ordered"))?,
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            return Err(type_error(
                "comparison",
                &format!("cannot compare {a:?} and {b:?}"),
            ));
        }
    };
    Ok(match op {
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
        _ => unreachable!(),
    })
}

fn membership(container: &Value, needle: &Value) -> Result<bool> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, needle))),
        Value::Object(map) => match needle {
            Value::Str(s) => Ok(map.contains_key(s)),
            Value::Safe(s) => Ok(map.contains_key(s.as_str())),
            _ => Ok(false),
        },
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(n.as_str())),
            _ => Err(type_error("in", "string membership requires a string needle")),
        },
        other => Err(type_error("in", &format!("{other:?} is not a container"))),
    }
}

fn type_error(function: &str, message: &str) -> Error {
    Error::Type { function: function.to_string(), message: message.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Registry;
    use indexmap::IndexMap;

    fn replacements(pairs: Vec<(&str, Value)>) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v);
        }
        Value::Object(map)
    }

    #[test]
    fn and_short_circuits_without_evaluating_rhs_tag_error() {
        let expr = parse_expr("[a] and [b]").unwrap();
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Bool(false))]);
        // `b` is absent entirely. This only proves short-circuiting because
        // touching `b` would actually raise (see
        // `and_does_not_short_circuit_when_lhs_is_truthy` below); if a
        // missing tag degraded to `none` instead, this would pass for the
        // wrong reason.
        let result = eval(&expr, &repl, &reg).unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn and_does_not_short_circuit_when_lhs_is_truthy() {
        let expr = parse_expr("[a] and [b]").unwrap();
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Bool(true))]);
        let err = eval(&expr, &repl, &reg).unwrap_err();
        assert!(matches!(err, Error::Name(_)));
    }

    #[test]
    fn or_short_circuits() {
        let expr = parse_expr("[a] or [b]").unwrap();
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Bool(true))]);
        let result = eval(&expr, &repl, &reg).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn or_does_not_short_circuit_when_lhs_is_falsy() {
        let expr = parse_expr("[a] or [b]").unwrap();
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Bool(false))]);
        let err = eval(&expr, &repl, &reg).unwrap_err();
        assert!(matches!(err, Error::Name(_)));
    }

    #[test]
    fn not_negates_truthiness() {
        let expr = parse_expr("not [a]").unwrap();
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Int(0))]);
        assert_eq!(eval(&expr, &repl, &reg).unwrap(), Value::Bool(true));
    }

    #[test]
    fn comparisons() {
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Int(3))]);
        assert_eq!(
            eval(&parse_expr("[a] == 3").unwrap(), &repl, &reg).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&parse_expr("[a] < 10").unwrap(), &repl, &reg).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&parse_expr("[a] >= 10").unwrap(), &repl, &reg).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn in_operator_checks_membership() {
        let reg = Registry::with_builtins();
        let repl = replacements(vec![(
            "xs",
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
        )]);
        assert_eq!(
            eval(&parse_expr("1 in [xs]").unwrap(), &repl, &reg).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&parse_expr("5 not in [xs]").unwrap(), &repl, &reg).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let reg = Registry::with_builtins();
        let repl = replacements(vec![
            ("a", Value::Bool(true)),
            ("b", Value::Bool(false)),
            ("c", Value::Bool(false)),
        ]);
        // a or (b and c) -> true
        assert_eq!(
            eval(&parse_expr("[a] or [b] and [c]").unwrap(), &repl, &reg).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn type_mismatch_in_ordering_is_type_error() {
        let reg = Registry::with_builtins();
        let repl = replacements(vec![("a", Value::Str("x".into()))]);
        let err = eval(&parse_expr("[a] < 3").unwrap(), &repl, &reg).unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
    }
}
