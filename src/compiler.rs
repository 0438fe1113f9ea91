//! The template compiler (`spec.md` §4.2, "C3 Template compiler") and its
//! compile-time scope stack (`spec.md` §4.8).

use crate::error::{Error, Result};
use crate::expr::parse_expr;
use crate::lexer::lex_tag;
use crate::node::{CondNode, LoopNode, Node, PresenceNode, Tag, Template};
use std::rc::Rc;

/// Loads a named template's compiled node sequence, for the `inline`
/// directive. Implemented by `cache::TemplateCache`; a throwaway
/// [`compile`] call (`ParseString`, in spec.md terms) passes `None`, and
/// `inline` in such a template is a compile error.
pub trait TemplateLoader {
    /// Returns the node sequence of the named template.
    fn load(&self, name: &str) -> Result<Rc<Vec<Node>>>;
}

/// A scope on the compile-time scope stack (`spec.md` §4.8).
enum Frame {
    Root(Vec<Node>),
    Loop { source_tag: Tag, aliases: Vec<String>, body: Vec<Node> },
    If { branches: Vec<(crate::node::Expr, Vec<Node>)>, default: Option<Vec<Node>>, current: Vec<Node> },
    Presence { invert: bool, branches: Vec<(Vec<Tag>, Vec<Node>)>, default: Option<Vec<Node>>, current: Vec<Node> },
}

/// Compiles `source` into a [`Template`]. `loader` resolves `inline`
/// directives, if the source uses any.
pub fn compile(source: &str, loader: Option<&dyn TemplateLoader>) -> Result<Template> {
    let mut stack = vec![Frame::Root(Vec::new())];
    for (is_directive, chunk) in split_directives(source) {
        if is_directive {
            compile_directive(&mut stack, chunk.trim(), loader)?;
        } else {
            compile_text(&mut stack, chunk)?;
        }
    }
    if stack.len() != 1 {
        let delta = stack.len() as isize - 1;
        return Err(Error::Syntax(format!(
            "template left {delta} open scope(s) unclosed"
        )));
    }
    match stack.pop().unwrap() {
        Frame::Root(nodes) => Ok(Template { nodes }),
        _ => unreachable!("root frame must be Frame::Root"),
    }
}

/// Splits `source` on `{{ ... }}` directive blocks, yielding alternating
/// `(false, text)` / `(true, directive_body)` chunks in order. Whitespace
/// immediately inside the braces is trimmed from the directive body.
fn split_directives(source: &str) -> Vec<(bool, &str)> {
    let mut chunks = Vec::new();
    let mut rest = source;
    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    chunks.push((false, rest));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    chunks.push((false, &rest[..start]));
                }
                let after = &rest[start + 2..];
                match after.find("}}") {
                    None => {
                        // No closing brace; treat the rest as literal text,
                        // matching a template with no directives at all.
                        chunks.push((false, &rest[start..]));
                        break;
                    }
                    Some(end) => {
                        chunks.push((true, &after[..end]));
                        rest = &after[end + 2..];
                    }
                }
            }
        }
    }
    chunks
}

fn compile_text(stack: &mut Vec<Frame>, text: &str) -> Result<()> {
    for node in split_tags(text)? {
        append_node(stack, node);
    }
    Ok(())
}

/// Splits plain text into `Text`/`Tag` nodes using the C2 lexer.
fn split_tags(text: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    let mut rest_start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            match lex_tag(text, i) {
                Ok((tag, end)) => {
                    if i > rest_start {
                        nodes.push(Node::Text(text[rest_start..i].to_string()));
                    }
                    nodes.push(Node::Tag(tag));
                    rest_start = end;
                    i = end;
                    continue;
                }
                Err(_) => {
                    // Not a well-formed tag at this position; treat '[' as
                    // ordinary text and keep scanning.
                    i += 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    if rest_start < text.len() {
        nodes.push(Node::Text(text[rest_start..].to_string()));
    }
    Ok(nodes)
}

fn append_node(stack: &mut Vec<Frame>, node: Node) {
    match stack.last_mut().expect("scope stack is never empty") {
        Frame::Root(nodes) => nodes.push(node),
        Frame::Loop { body, .. } => body.push(node),
        Frame::If { default: Some(body), .. } => body.push(node),
        Frame::If { current, .. } => current.push(node),
        Frame::Presence { default: Some(body), .. } => body.push(node),
        Frame::Presence { current, .. } => current.push(node),
    }
}

fn compile_directive(
    stack: &mut Vec<Frame>,
    body: &str,
    loader: Option<&dyn TemplateLoader>,
) -> Result<()> {
    let mut words = body.splitn(2, char::is_whitespace);
    let directive = words.next().unwrap_or("");
    let rest = words.next().unwrap_or("").trim();

    match directive {
        "inline" => compile_inline(stack, rest, loader),
        "for" => compile_for(stack, rest),
        "endfor" => compile_endfor(stack),
        "if" => compile_if(stack, rest),
        "ifpresent" => compile_presence(stack, rest, false),
        "ifnotpresent" => compile_presence(stack, rest, true),
        "elif" => compile_elif(stack, rest),
        "else" => compile_else(stack),
        "endif" => compile_endif(stack),
        "xsrf" => compile_xsrf(stack, rest),
        "" => Err(Error::Syntax("empty directive '{{ }}'".to_string())),
        other => Err(Error::Syntax(format!("unknown template directive '{{{{ {other} }}}}'"))),
    }
}

fn compile_inline(stack: &mut Vec<Frame>, name: &str, loader: Option<&dyn TemplateLoader>) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Syntax("'inline' requires a template name".to_string()));
    }
    let loader = loader.ok_or_else(|| {
        Error::Syntax("'inline' requires a template cache, but this template was compiled standalone".to_string())
    })?;
    for node in loader.load(name)?.iter().cloned() {
        append_node(stack, node);
    }
    Ok(())
}

fn compile_for(stack: &mut Vec<Frame>, rest: &str) -> Result<()> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let in_pos = tokens
        .iter()
        .position(|t| *t == "in")
        .ok_or_else(|| Error::Syntax("'for' requires 'ALIASES in TAG'".to_string()))?;
    if in_pos == 0 || in_pos + 1 >= tokens.len() {
        return Err(Error::Syntax("'for' requires 'ALIASES in TAG'".to_string()));
    }
    // Faithful to the source behaviour: every token before `in` is joined
    // back together (no separators) and re-split on commas, so `for a, b
    // in [x]` and `for a,b in [x]` parse identically.
    let aliases: Vec<String> = tokens[..in_pos]
        .concat()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if aliases.is_empty() {
        return Err(Error::Syntax("'for' requires at least one alias".to_string()));
    }
    let tag_text = tokens[in_pos + 1..].concat();
    let (tag, end) = lex_tag(&tag_text, 0)
        .map_err(|_| Error::Syntax(format!("tag {tag_text:?} in 'for' loop is not valid")))?;
    if end != tag_text.len() {
        return Err(Error::Syntax(format!("tag {tag_text:?} in 'for' loop is not valid")));
    }
    stack.push(Frame::Loop { source_tag: tag, aliases, body: Vec::new() });
    Ok(())
}

fn compile_endfor(stack: &mut Vec<Frame>) -> Result<()> {
    match stack.pop() {
        Some(Frame::Loop { source_tag, aliases, body }) => {
            append_node(stack, Node::Loop(LoopNode { source_tag, aliases, body }));
            Ok(())
        }
        Some(other) => {
            stack.push(other);
            Err(Error::Syntax("'endfor' without matching 'for'".to_string()))
        }
        None => unreachable!("scope stack is never empty"),
    }
}

fn compile_if(stack: &mut Vec<Frame>, rest: &str) -> Result<()> {
    if rest.is_empty() {
        return Err(Error::Syntax("'if' requires an expression".to_string()));
    }
    let expr = parse_expr(rest)?;
    stack.push(Frame::If { branches: vec![(expr, Vec::new())], default: None, current: Vec::new() });
    Ok(())
}

fn compile_elif(stack: &mut Vec<Frame>, rest: &str) -> Result<()> {
    if rest.is_empty() {
        return Err(Error::Syntax("'elif' requires an expression".to_string()));
    }
    match stack.last_mut() {
        Some(Frame::If { branches, default: None, current }) => {
            let expr = parse_expr(rest)?;
            branches.last_mut().unwrap().1 = std::mem::take(current);
            branches.push((expr, Vec::new()));
            Ok(())
        }
        Some(Frame::If { default: Some(_), .. }) => {
            Err(Error::Syntax("'elif' may not follow 'else'".to_string()))
        }
        // A presence check's scope is also opened by the generic
        // conditional machinery (spec.md §4.8's `ConditionalFrame`), so it
        // accepts `elif` the same way its boolean sibling does — each new
        // branch names another tag list to check, not an expression.
        Some(Frame::Presence { branches, default: None, current, .. }) => {
            let tags = parse_tag_list(rest)?;
            if tags.is_empty() {
                return Err(Error::Syntax("presence check requires at least one tag".to_string()));
            }
            branches.last_mut().unwrap().1 = std::mem::take(current);
            branches.push((tags, Vec::new()));
            Ok(())
        }
        Some(Frame::Presence { default: Some(_), .. }) => {
            Err(Error::Syntax("'elif' may not follow 'else'".to_string()))
        }
        _ => Err(Error::Syntax("'elif' without matching 'if'".to_string())),
    }
}

fn compile_else(stack: &mut Vec<Frame>) -> Result<()> {
    match stack.last_mut() {
        Some(Frame::If { branches, default: default @ None, current }) => {
            branches.last_mut().unwrap().1 = std::mem::take(current);
            *default = Some(Vec::new());
            Ok(())
        }
        Some(Frame::If { default: Some(_), .. }) => {
            Err(Error::Syntax("only one 'else' clause is allowed".to_string()))
        }
        Some(Frame::Presence { branches, default: default @ None, current, .. }) => {
            branches.last_mut().unwrap().1 = std::mem::take(current);
            *default = Some(Vec::new());
            Ok(())
        }
        Some(Frame::Presence { default: Some(_), .. }) => {
            Err(Error::Syntax("only one 'else' clause is allowed".to_string()))
        }
        _ => Err(Error::Syntax("'else' without matching 'if'/'ifpresent'".to_string())),
    }
}

fn compile_endif(stack: &mut Vec<Frame>) -> Result<()> {
    match stack.pop() {
        Some(Frame::If { mut branches, default, current }) => {
            if default.is_none() {
                branches.last_mut().unwrap().1 = current;
            }
            append_node(stack, Node::Conditional(CondNode { branches, default }));
            Ok(())
        }
        Some(Frame::Presence { invert, mut branches, default, current }) => {
            if default.is_none() {
                branches.last_mut().unwrap().1 = current;
            }
            append_node(stack, Node::PresenceConditional(PresenceNode { invert, branches, default }));
            Ok(())
        }
        Some(other) => {
            stack.push(other);
            Err(Error::Syntax("'endif' without matching 'if'/'ifpresent'".to_string()))
        }
        None => unreachable!("scope stack is never empty"),
    }
}

fn compile_presence(stack: &mut Vec<Frame>, rest: &str, invert: bool) -> Result<()> {
    let tags = parse_tag_list(rest)?;
    if tags.is_empty() {
        return Err(Error::Syntax("presence check requires at least one tag".to_string()));
    }
    stack.push(Frame::Presence { invert, branches: vec![(tags, Vec::new())], default: None, current: Vec::new() });
    Ok(())
}

fn parse_tag_list(rest: &str) -> Result<Vec<Tag>> {
    rest.split_whitespace()
        .map(|word| {
            let (tag, end) = lex_tag(word, 0)?;
            if end != word.len() {
                return Err(Error::Syntax(format!("{word:?} is not a valid tag")));
            }
            Ok(tag)
        })
        .collect()
}

fn compile_xsrf(stack: &mut Vec<Frame>, value: &str) -> Result<()> {
    // Faithful to the source: the xsrf field is spliced as literal template
    // text and re-compiled as such, so a value containing `[...]` is
    // itself tag-expanded rather than treated as opaque text.
    let spliced = format!("<input type=\"hidden\" value=\"{value}\" name=\"xsrf\" />");
    compile_text(stack, &spliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn nodes(source: &str) -> Vec<Node> {
        compile(source, None).unwrap().nodes
    }

    #[test]
    fn plain_text_compiles_to_single_text_node() {
        let n = nodes("Hello world!");
        assert_eq!(n, vec![Node::Text("Hello world!".to_string())]);
    }

    #[test]
    fn text_and_tag_interleave() {
        let n = nodes("Hello [name]!");
        assert_eq!(
            n,
            vec![
                Node::Text("Hello ".to_string()),
                Node::Tag(Tag { name: "name".into(), indices: vec![], functions: vec![], raw: "[name]".into() }),
                Node::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn unbalanced_for_is_syntax_error() {
        let err = compile("{{ for x in [xs] }}body", None).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn endfor_without_for_is_syntax_error() {
        assert!(compile("{{ endfor }}", None).is_err());
    }

    #[test]
    fn balanced_for_loop_compiles() {
        let n = nodes("{{ for k, v in [m|items] }}[k]=[v];{{ endfor }}");
        assert_eq!(n.len(), 1);
        assert!(matches!(n[0], Node::Loop(_)));
        if let Node::Loop(loop_node) = &n[0] {
            assert_eq!(loop_node.aliases, vec!["k".to_string(), "v".to_string()]);
        }
    }

    #[test]
    fn if_elif_else_endif_compiles() {
        let n = nodes("{{ if [a] }}A{{ elif [b] }}B{{ else }}C{{ endif }}");
        assert_eq!(n.len(), 1);
        match &n[0] {
            Node::Conditional(cond) => {
                assert_eq!(cond.branches.len(), 2);
                assert!(cond.default.is_some());
            }
            _ => panic!("expected Conditional"),
        }
    }

    #[test]
    fn elif_after_else_is_error() {
        let err = compile("{{ if [a] }}A{{ else }}B{{ elif [c] }}C{{ endif }}", None).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn ifpresent_compiles() {
        let n = nodes("{{ ifpresent [x] }}have{{ else }}none{{ endif }}");
        assert_eq!(n.len(), 1);
        assert!(matches!(n[0], Node::PresenceConditional(_)));
    }

    #[test]
    fn xsrf_splices_hidden_input() {
        let n = nodes("{{ xsrf abc123 }}");
        assert_eq!(
            n,
            vec![Node::Text(
                "<input type=\"hidden\" value=\"abc123\" name=\"xsrf\" />".to_string()
            )]
        );
    }

    #[test]
    fn inline_without_loader_is_syntax_error() {
        let err = compile("{{ inline header }}", None).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }
}
