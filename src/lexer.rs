//! The tag lexer (`spec.md` §4.1, "C2 Tag lexer").
//!
//! Recognises `[name(:index)*(|func(args)?)*]`. Hand-rolled over a
//! `Peekable<CharIndices>`, the same scanning style `expr.rs` uses for its
//! own grammar — the grammar is a simple character-class affair that gains
//! nothing from pulling in a regex engine for it.

use crate::error::{Error, Result};
use crate::node::{FunctionCall, Tag};
use crate::value::Literal;
use std::iter::Peekable;
use std::str::CharIndices;

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_index_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Scans a single tag starting at `src[start..]`, where `src.as_bytes()[start] == b'['`.
/// Returns the parsed [`Tag`] and the byte offset just past the closing `]`.
pub fn lex_tag(src: &str, start: usize) -> Result<(Tag, usize)> {
    let mut chars = src[start..].char_indices().peekable();
    let Some((_, '[')) = chars.next() else {
        return Err(Error::Syntax(format!("tag at {start} does not start with '['")));
    };

    let name = read_name(&mut chars, src, start)?;
    if name.is_empty() {
        return Err(syntax_at(src, start));
    }

    let mut indices = Vec::new();
    while matches!(chars.peek(), Some((_, ':'))) {
        chars.next();
        let index = read_index(&mut chars, src, start)?;
        indices.push(index);
    }

    let mut functions = Vec::new();
    while matches!(chars.peek(), Some((_, '|'))) {
        chars.next();
        functions.push(read_function(&mut chars, src, start)?);
    }

    match chars.next() {
        Some((offset, ']')) => {
            let end = start + offset + 1;
            Ok((
                Tag { name, indices, functions, raw: src[start..end].to_string() },
                end,
            ))
        }
        _ => Err(syntax_at(src, start)),
    }
}

fn syntax_at(src: &str, start: usize) -> Error {
    let end = (start + 40).min(src.len());
    Error::Syntax(format!("invalid tag syntax near {:?}", &src[start..end]))
}

fn read_name(
    chars: &mut Peekable<CharIndices<'_>>,
    src: &str,
    start: usize,
) -> Result<String> {
    let Some(&(first_offset, first)) = chars.peek() else {
        return Err(syntax_at(src, start));
    };
    if !is_name_start(first) {
        return Err(syntax_at(src, start));
    }
    let _ = first_offset;
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if is_name_char(c) {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Ok(name)
}

fn read_index(
    chars: &mut Peekable<CharIndices<'_>>,
    src: &str,
    start: usize,
) -> Result<String> {
    let mut index = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if is_index_char(c) {
            index.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if index.is_empty() {
        return Err(syntax_at(src, start));
    }
    Ok(index)
}

fn read_function(
    chars: &mut Peekable<CharIndices<'_>>,
    src: &str,
    start: usize,
) -> Result<FunctionCall> {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if is_index_char(c) {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if name.is_empty() {
        return Err(syntax_at(src, start));
    }

    let args = if matches!(chars.peek(), Some((_, '('))) {
        chars.next();
        let mut raw_args = String::new();
        loop {
            match chars.next() {
                Some((_, ')')) => break,
                Some((_, c)) => raw_args.push(c),
                None => return Err(syntax_at(src, start)),
            }
        }
        Some(parse_arg_list(&raw_args, src, start)?)
    } else {
        None
    };

    Ok(FunctionCall { name, args })
}

/// Parses a comma-separated literal list, e.g. `1, "x", true, (1, 2)`.
/// Used both for function-call arguments and nowhere else — expression
/// atoms parse a single literal, not a list (see `expr.rs`).
pub fn parse_arg_list(raw: &str, src: &str, start: usize) -> Result<Vec<Literal>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut chars = trimmed.char_indices().peekable();
    let mut items = Vec::new();
    loop {
        skip_ws(&mut chars);
        let lit = parse_literal(&mut chars, trimmed, src, start)?;
        items.push(lit);
        skip_ws(&mut chars);
        match chars.peek() {
            Some((_, ',')) => {
                chars.next();
            }
            Some((_, c)) => return Err(syntax_at(src, start).tap_msg(format!("unexpected '{c}' in argument list"))),
            None => break,
        }
    }
    Ok(items)
}

fn skip_ws(chars: &mut Peekable<CharIndices<'_>>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

/// Parses one literal: an integer, a quoted string, `true`/`false`/`none`,
/// or a parenthesised tuple of literals.
pub fn parse_literal(
    chars: &mut Peekable<CharIndices<'_>>,
    full: &str,
    src: &str,
    start: usize,
) -> Result<Literal> {
    skip_ws(chars);
    match chars.peek().copied() {
        Some((_, '"')) | Some((_, '\'')) => {
            let quote = chars.next().unwrap().1;
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some((_, c)) if c == quote => break,
                    Some((_, c)) => s.push(c),
                    None => return Err(syntax_at(src, start)),
                }
            }
            Ok(Literal::Str(s))
        }
        Some((_, '(')) => {
            chars.next();
            let mut items = Vec::new();
            skip_ws(chars);
            if matches!(chars.peek(), Some((_, ')'))) {
                chars.next();
                return Ok(Literal::Tuple(items));
            }
            loop {
                let item = parse_literal(chars, full, src, start)?;
                items.push(item);
                skip_ws(chars);
                match chars.next() {
                    Some((_, ',')) => {
                        skip_ws(chars);
                        if matches!(chars.peek(), Some((_, ')'))) {
                            chars.next();
                            break;
                        }
                    }
                    Some((_, ')')) => break,
                    _ => return Err(syntax_at(src, start)),
                }
            }
            Ok(Literal::Tuple(items))
        }
        Some((_, c)) if c == '-' || c.is_ascii_digit() => {
            let begin = chars.peek().unwrap().0;
            chars.next();
            let mut end = begin + c.len_utf8();
            while let Some(&(offset, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    end = offset + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            full[begin..end]
                .parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| syntax_at(src, start))
        }
        Some((_, c)) if is_name_start(c) => {
            let begin = chars.peek().unwrap().0;
            let mut end = begin;
            while let Some(&(offset, c)) = chars.peek() {
                if is_name_char(c) {
                    end = offset + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            match &full[begin..end] {
                "true" => Ok(Literal::Bool(true)),
                "false" => Ok(Literal::Bool(false)),
                "none" => Ok(Literal::None),
                other => Err(syntax_at(src, start).tap_msg(format!("unknown literal '{other}'"))),
            }
        }
        _ => Err(syntax_at(src, start)),
    }
}

impl Error {
    fn tap_msg(self, msg: String) -> Error {
        match self {
            Error::Syntax(_) => Error::Syntax(msg),
            other => other,
        }
    }
}
