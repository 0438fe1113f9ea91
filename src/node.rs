//! The compiled node tree (`spec.md` §3/§4.2: "C4 Node tree").

use crate::value::Literal;

/// A bracketed placeholder: `[name(:index)*(|func(args)?)*]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// The replacement-mapping key this tag resolves against.
    pub name: String,
    /// Indices applied in order to the resolved value.
    pub indices: Vec<String>,
    /// Functions applied in order after indexing.
    pub functions: Vec<FunctionCall>,
    /// The exact source text this tag was lexed from, e.g. `"[x:0|default]"`.
    /// Used to echo the tag back verbatim on unresolved-name/key failures.
    pub raw: String,
}

/// A single `|name` or `|name(args)` pipeline step.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionCall {
    /// The function's registered name.
    pub name: String,
    /// Closure arguments, if the call used `(args)` syntax.
    pub args: Option<Vec<Literal>>,
}

/// A node in the compiled tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Literal text, copied to output unchanged.
    Text(String),
    /// A tag placeholder.
    Tag(Tag),
    /// A `{{ for .. in .. }} .. {{ endfor }}` loop.
    Loop(LoopNode),
    /// A `{{ if .. }} .. {{ endif }}` boolean conditional.
    Conditional(CondNode),
    /// A `{{ ifpresent/ifnotpresent .. }} .. {{ endif }}` presence check.
    PresenceConditional(PresenceNode),
}

/// A `for` loop: iterates `source_tag`'s resolved value, binding each item
/// to `aliases` (unpacked, if more than one).
#[derive(Clone, Debug, PartialEq)]
pub struct LoopNode {
    /// The tag whose resolved value is iterated.
    pub source_tag: Tag,
    /// One or more binding names for each iteration item.
    pub aliases: Vec<String>,
    /// The loop body, rendered once per item.
    pub body: Vec<Node>,
}

/// A boolean `if`/`elif`/`else` conditional.
#[derive(Clone, Debug, PartialEq)]
pub struct CondNode {
    /// `(expression, body)` pairs in declaration order. Non-empty.
    pub branches: Vec<(Expr, Vec<Node>)>,
    /// The `else` body, if any.
    pub default: Option<Vec<Node>>,
}

/// An `ifpresent`/`ifnotpresent` presence check. Like [`CondNode`], this
/// can gain additional branches via `elif`; each branch names the tags
/// that must all resolve (or all fail to resolve, for `ifnotpresent`) for
/// that branch's body to render.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceNode {
    /// `true` for `ifnotpresent`, `false` for `ifpresent`.
    pub invert: bool,
    /// `(tags, body)` pairs in declaration order. Non-empty.
    pub branches: Vec<(Vec<Tag>, Vec<Node>)>,
    /// The `else` body, if any.
    pub default: Option<Vec<Node>>,
}

/// The safe boolean/relational expression sub-language (`spec.md` §4.5).
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal atom.
    Lit(Literal),
    /// A tag reference, resolved lazily at evaluation time.
    TagRef(Tag),
    /// `not expr`.
    Not(Box<Expr>),
    /// `lhs and rhs`, short-circuiting.
    And(Box<Expr>, Box<Expr>),
    /// `lhs or rhs`, short-circuiting.
    Or(Box<Expr>, Box<Expr>),
    /// A comparison between two atoms.
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

/// A comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

/// A fully compiled template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    /// The root sequence of nodes.
    pub nodes: Vec<Node>,
}
