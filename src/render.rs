//! The renderer (`spec.md` §4.6, "C8 Renderer").

use crate::digest::digest_hex;
use crate::error::{Error, Result};
use crate::expr::eval as eval_expr;
use crate::functions::Registry;
use crate::node::{Node, Tag};
use crate::resolver::resolve;
use crate::safestring::SafeString;
use crate::value::Value;
use indexmap::IndexMap;

/// Renders `nodes` against `replacements`, producing an HTML-safe string.
///
/// Render-time `Name`/`Key` errors originating from a single `Tag` node are
/// recovered locally by echoing that tag's literal source text (`spec.md`
/// §7); every other error propagates.
pub fn render(nodes: &[Node], replacements: &Value, functions: &Registry) -> Result<SafeString> {
    let mut out = SafeString::html(String::new());
    render_into(nodes, replacements, functions, &mut out)?;
    Ok(out)
}

fn render_into(
    nodes: &[Node],
    replacements: &Value,
    functions: &Registry,
    out: &mut SafeString,
) -> Result<()> {
    for node in nodes {
        render_node(node, replacements, functions, out)?;
    }
    Ok(())
}

fn render_node(
    node: &Node,
    replacements: &Value,
    functions: &Registry,
    out: &mut SafeString,
) -> Result<()> {
    match node {
        Node::Text(text) => {
            out.push_raw(text);
            Ok(())
        }
        Node::Tag(tag) => {
            out.push(&render_tag(tag, replacements, functions)?);
            Ok(())
        }
        Node::Loop(loop_node) => render_loop(loop_node, replacements, functions, out),
        Node::Conditional(cond) => render_conditional(cond, replacements, functions, out),
        Node::PresenceConditional(presence) => render_presence(presence, replacements, functions, out),
    }
}

/// Resolves and pipelines a single tag, recovering only a `Name`/`Key`
/// failure by echoing the tag's literal source text; any other error
/// (a function type mismatch, say) propagates.
fn render_tag(tag: &Tag, replacements: &Value, functions: &Registry) -> Result<SafeString> {
    match render_tag_value(tag, replacements, functions) {
        Ok(value) => Ok(to_safe_string(value)),
        Err(Error::Name(_) | Error::Key(_)) => {
            log::warn!("tag {:?} did not resolve, echoing literally", tag.raw);
            Ok(SafeString::raw(tag.raw.clone()))
        }
        Err(other) => Err(other),
    }
}

fn render_tag_value(tag: &Tag, replacements: &Value, functions: &Registry) -> Result<Value> {
    let mut value = resolve(tag, replacements)?;
    if tag.functions.is_empty() {
        functions.apply_default_if_unsafe(value)
    } else {
        for call in &tag.functions {
            value = functions.apply(&call.name, call.args.as_deref(), value)?;
        }
        Ok(value)
    }
}

fn to_safe_string(value: Value) -> SafeString {
    match value {
        Value::Safe(s) => s,
        other => SafeString::raw(other.display_text()),
    }
}

fn render_loop(
    loop_node: &crate::node::LoopNode,
    replacements: &Value,
    functions: &Registry,
    out: &mut SafeString,
) -> Result<()> {
    let mut iterable = match resolve(&loop_node.source_tag, replacements) {
        Ok(v) => v,
        // A bad index/key on the source tag just iterates zero times. A
        // missing top-level name is not caught here and propagates like
        // any other render-time error.
        Err(Error::Key(_)) => return Ok(()),
        Err(other) => return Err(other),
    };
    for call in &loop_node.source_tag.functions {
        iterable = functions.apply(&call.name, call.args.as_deref(), iterable)?;
    }
    let items = iterable.as_sequence().unwrap_or_default();

    for item in items {
        let scoped = bind_aliases(replacements, &loop_node.aliases, item)?;
        render_into(&loop_node.body, &scoped, functions, out)?;
    }
    Ok(())
}

/// Augments `replacements` with the loop's alias binding(s) for a single
/// iteration item. The augmentation is local to this call; the caller's
/// mapping is never mutated (`spec.md` §4.6, §5).
fn bind_aliases(replacements: &Value, aliases: &[String], item: Value) -> Result<Value> {
    let Value::Object(base) = replacements else {
        return Err(Error::Value("replacements must be a mapping".to_string()));
    };
    let mut scoped: IndexMap<String, Value> = base.clone();

    if aliases.len() == 1 {
        scoped.insert(aliases[0].clone(), item);
        return Ok(Value::Object(scoped));
    }

    let unpacked = item.as_sequence().ok_or_else(|| {
        Error::Value(format!("cannot unpack {item:?} into {} tags", aliases.len()))
    })?;
    if unpacked.len() != aliases.len() {
        return Err(Error::Value(format!(
            "cannot unpack {} values into {} tags",
            unpacked.len(),
            aliases.len()
        )));
    }
    for (alias, value) in aliases.iter().zip(unpacked) {
        scoped.insert(alias.clone(), value);
    }
    Ok(Value::Object(scoped))
}

fn render_conditional(
    cond: &crate::node::CondNode,
    replacements: &Value,
    functions: &Registry,
    out: &mut SafeString,
) -> Result<()> {
    for (expr, body) in &cond.branches {
        if eval_expr(expr, replacements, functions)?.is_truthy() {
            return render_into(body, replacements, functions, out);
        }
    }
    if let Some(default) = &cond.default {
        render_into(default, replacements, functions, out)?;
    }
    Ok(())
}

fn render_presence(
    presence: &crate::node::PresenceNode,
    replacements: &Value,
    functions: &Registry,
    out: &mut SafeString,
) -> Result<()> {
    for (tags, body) in &presence.branches {
        if check_presence(tags, replacements, presence.invert) {
            return render_into(body, replacements, functions, out);
        }
    }
    if let Some(default) = &presence.default {
        render_into(default, replacements, functions, out)?;
    }
    Ok(())
}

/// `true` if every tag in `tags` resolves successfully (or, if `invert`,
/// if every one of them fails to resolve).
fn check_presence(tags: &[Tag], replacements: &Value, invert: bool) -> bool {
    let all_present = tags.iter().all(|tag| resolve(tag, replacements).is_ok());
    all_present != invert
}

/// The result of [`render_no_parse`]: per-tag values plus content/page
/// digests, instead of a single flat string (`spec.md` §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct NoParseReport {
    /// The fully rendered output.
    pub rendered: String,
    /// `tag source text -> rendered value`, for every `Tag` node, including
    /// those nested inside conditional branches.
    pub replacements: IndexMap<String, String>,
    /// A 128-bit digest of the fully rendered output.
    pub content_hash: String,
    /// A 128-bit digest of the unrendered template source.
    pub page_hash: String,
}

/// Renders in no-parse mode: visits every `Tag` node (including ones
/// nested in conditional branches) to populate a flat tag-text-to-value
/// report, alongside the ordinary rendered output and both digests.
pub fn render_no_parse(
    nodes: &[Node],
    source: &str,
    replacements: &Value,
    functions: &Registry,
) -> Result<NoParseReport> {
    let rendered = render(nodes, replacements, functions)?;
    let rendered_text = rendered.as_str().to_string();
    let mut tag_values = IndexMap::new();
    collect_tag_values(nodes, replacements, functions, &mut tag_values)?;
    Ok(NoParseReport {
        content_hash: digest_hex(&rendered_text),
        page_hash: digest_hex(source),
        rendered: rendered_text,
        replacements: tag_values,
    })
}

fn collect_tag_values(
    nodes: &[Node],
    replacements: &Value,
    functions: &Registry,
    out: &mut IndexMap<String, String>,
) -> Result<()> {
    for node in nodes {
        match node {
            Node::Tag(tag) => {
                let rendered = render_tag(tag, replacements, functions)?;
                out.insert(tag.raw.clone(), rendered.as_str().to_string());
            }
            Node::Loop(loop_node) => collect_tag_values(&loop_node.body, replacements, functions, out)?,
            Node::Conditional(cond) => {
                for (_, body) in &cond.branches {
                    collect_tag_values(body, replacements, functions, out)?;
                }
                if let Some(default) = &cond.default {
                    collect_tag_values(default, replacements, functions, out)?;
                }
            }
            Node::PresenceConditional(presence) => {
                for (_, body) in &presence.branches {
                    collect_tag_values(body, replacements, functions, out)?;
                }
                if let Some(default) = &presence.default {
                    collect_tag_values(default, replacements, functions, out)?;
                }
            }
            Node::Text(_) => {}
        }
    }
    Ok(())
}
