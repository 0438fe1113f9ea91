//! A template engine that compiles tag-and-directive template source into
//! a reusable node tree and renders it against a replacement mapping.
//!
//! Templates are plain text sprinkled with bracketed tags (`[user:name]`)
//! and `{{ .. }}` directives (`for`, `if`, `ifpresent`, `inline`, `xsrf`).
//! Compiling a template produces a [`node::Template`] once; rendering that
//! tree against any number of replacement mappings is cheap and
//! side-effect free. [`cache::TemplateCache`] wraps this with disk loading
//! and mtime-based reload for templates that live in files.
//!
//! ```
//! use uweb_templates::{compiler::compile, functions::Registry, render::render, value::Value};
//! use indexmap::IndexMap;
//!
//! let template = compile("Hello [name]!", None).unwrap();
//! let mut replacements = IndexMap::new();
//! replacements.insert("name".to_string(), Value::Str("world".to_string()));
//! let rendered = render(&template.nodes, &Value::Object(replacements), &Registry::with_builtins()).unwrap();
//! assert_eq!(rendered.as_str(), "Hello world!");
//! ```

pub mod cache;
pub mod compiler;
pub mod digest;
pub mod error;
pub mod expr;
pub mod functions;
pub mod lexer;
pub mod node;
pub mod render;
pub mod resolver;
pub mod safestring;
pub mod value;

pub use cache::{CacheOptions, ParseOutput, TemplateCache};
pub use error::{Error, Result};
pub use safestring::SafeString;
pub use value::{Literal, Value};
