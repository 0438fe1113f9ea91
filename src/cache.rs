//! The template cache (`spec.md` §4.7, "C9 Template cache").

use crate::compiler::{compile, TemplateLoader};
use crate::error::{Error, Result};
use crate::functions::{FunctionEntry, Registry};
use crate::node::Node;
use crate::render::{render, render_no_parse};
use crate::safestring::SafeString;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

/// Configuration accepted by [`TemplateCache::new`]. This is the entire
/// config surface the engine needs: no file-backed config layer, as the
/// engine itself has nothing else to configure.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheOptions {
    /// When set, [`TemplateCache::parse`] returns [`ParseOutput::NoParse`]
    /// instead of rendering to a flat string.
    pub no_parse_mode: bool,
}

struct Entry {
    mtime: Option<SystemTime>,
    nodes: Rc<Vec<Node>>,
    source: String,
}

struct Inner {
    search_path: PathBuf,
    entries: HashMap<String, Entry>,
    functions: Registry,
}

/// Loads, compiles, and caches templates read from a search path, with
/// disk-mtime-based reload on every [`TemplateCache::parse`] call
/// (`spec.md` §4.7).
///
/// Single-threaded and cooperative (`spec.md` §5): interior mutability is
/// via `RefCell`, not a lock.
pub struct TemplateCache {
    inner: RefCell<Inner>,
    no_parse: bool,
}

impl TemplateCache {
    /// Builds a cache rooted at `search_path`. No templates are loaded
    /// until first requested.
    pub fn new(search_path: impl Into<PathBuf>, options: CacheOptions) -> Self {
        Self {
            inner: RefCell::new(Inner {
                search_path: search_path.into(),
                entries: HashMap::new(),
                functions: Registry::with_builtins(),
            }),
            no_parse: options.no_parse_mode,
        }
    }

    /// Registers (or replaces) a template function, visible to every
    /// subsequent `parse`/`parse_string` call, including templates already
    /// cached.
    pub fn register_function(&self, name: &str, entry: FunctionEntry) {
        self.inner.borrow_mut().functions.register(name, entry);
    }

    /// Parses and renders the named template, loading (and caching) it on
    /// first use and reloading it if its file has changed on disk since
    /// the last load.
    pub fn parse(&self, name: &str, replacements: &Value) -> Result<ParseOutput> {
        self.ensure_loaded(name)?;
        let inner = self.inner.borrow();
        let entry = inner.entries.get(name).expect("just ensured loaded");
        if self.no_parse {
            let report = render_no_parse(entry.nodes.as_slice(), &entry.source, replacements, &inner.functions)?;
            Ok(ParseOutput::NoParse(NoParseReport {
                template_name: name.to_string(),
                replacements: report.replacements,
                content_hash: report.content_hash,
                page_hash: report.page_hash,
            }))
        } else {
            let rendered = render(entry.nodes.as_slice(), replacements, &inner.functions)?;
            Ok(ParseOutput::Rendered(rendered))
        }
    }

    /// Parses and renders `source` directly, without touching the cache.
    /// An `inline` directive inside `source` is a compile error, since
    /// there is no loader here to resolve it against.
    pub fn parse_string(&self, source: &str, replacements: &Value) -> Result<SafeString> {
        let template = compile(source, None)?;
        let inner = self.inner.borrow();
        render(&template.nodes, replacements, &inner.functions)
    }

    /// Loads `name` from disk if not already cached, or reloads it if its
    /// file's mtime has advanced since the last load (`spec.md` §4.7). I/O
    /// failures during a *reload* are swallowed, leaving the previously
    /// loaded template in place; a *first* load failure propagates as
    /// [`Error::Read`].
    fn ensure_loaded(&self, name: &str) -> Result<()> {
        let path = self.resolve_path(name)?;
        let already_cached = self.inner.borrow().entries.contains_key(name);

        if !already_cached {
            let (source, mtime) = read_template(&path)?;
            let nodes = self.compile_with_loader(&source)?;
            self.inner.borrow_mut().entries.insert(
                name.to_string(),
                Entry { mtime, nodes: Rc::new(nodes), source },
            );
            return Ok(());
        }

        let current_mtime = self.inner.borrow().entries[name].mtime;
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(mtime) if Some(mtime) > current_mtime => match read_template(&path) {
                Ok((source, mtime)) => {
                    let nodes = self.compile_with_loader(&source)?;
                    let mut inner = self.inner.borrow_mut();
                    let entry = inner.entries.get_mut(name).expect("checked above");
                    entry.nodes = Rc::new(nodes);
                    entry.source = source;
                    entry.mtime = mtime;
                }
                Err(err) => {
                    log::warn!("reload of template {name:?} failed, keeping cached version: {err}");
                }
            },
            Ok(_) => {}
            Err(err) => {
                log::warn!("could not stat template {name:?} for reload check: {err}");
            }
        }
        Ok(())
    }

    fn compile_with_loader(&self, source: &str) -> Result<Vec<Node>> {
        let loader = CacheLoader { cache: self };
        Ok(compile(source, Some(&loader))?.nodes)
    }

    /// Resolves `name` against the search path, rejecting any resolution
    /// that escapes it (`spec.md` §9's Open Question on path handling,
    /// resolved rather than left open).
    fn resolve_path(&self, name: &str) -> Result<PathBuf> {
        let inner = self.inner.borrow();
        let joined = inner.search_path.join(name);
        let normalized = normalize(&joined);
        let root = normalize(&inner.search_path);
        if !normalized.starts_with(&root) {
            return Err(Error::PathEscape(name.to_string()));
        }
        Ok(joined)
    }
}

/// Lexically normalizes `path` (resolving `.`/`..` components without
/// touching the filesystem), so escape-detection works even for templates
/// that do not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn read_template(path: &Path) -> Result<(String, Option<SystemTime>)> {
    let source = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok((source, mtime))
}

struct CacheLoader<'a> {
    cache: &'a TemplateCache,
}

impl TemplateLoader for CacheLoader<'_> {
    fn load(&self, name: &str) -> Result<Rc<Vec<Node>>> {
        self.cache.ensure_loaded(name)?;
        Ok(self.cache.inner.borrow().entries[name].nodes.clone())
    }
}

/// The result of [`TemplateCache::parse`]: either the rendered output, or
/// (in no-parse mode) a structured report of per-tag values and digests.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutput {
    /// The fully rendered template.
    Rendered(SafeString),
    /// The no-parse-mode structure, for front ends that want to work with
    /// the raw tag values themselves.
    NoParse(NoParseReport),
}

/// A no-parse-mode render: every tag's resolved value alongside the fully
/// rendered output's digest, keyed by template name (`spec.md` §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct NoParseReport {
    /// The name the template was loaded under.
    pub template_name: String,
    /// `tag source text -> rendered value`, for every tag in the template.
    pub replacements: IndexMap<String, String>,
    /// A 128-bit digest of the fully rendered output.
    pub content_hash: String,
    /// A 128-bit digest of the unrendered template source.
    pub page_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_template(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    fn repl(pairs: Vec<(&str, Value)>) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v);
        }
        Value::Object(map)
    }

    #[test]
    fn parses_and_caches_from_disk() {
        let dir = tempdir();
        write_template(&dir, "hello.tmpl", "Hello [name]!");
        let cache = TemplateCache::new(dir.clone(), CacheOptions::default());
        let replacements = repl(vec![("name", Value::Str("world".into()))]);
        let out = cache.parse("hello.tmpl", &replacements).unwrap();
        match out {
            ParseOutput::Rendered(s) => assert_eq!(s.as_str(), "Hello world!"),
            _ => panic!("expected Rendered"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reloads_when_file_changes() {
        let dir = tempdir();
        write_template(&dir, "greet.tmpl", "v1");
        let cache = TemplateCache::new(dir.clone(), CacheOptions::default());
        let replacements = repl(vec![]);
        let first = cache.parse("greet.tmpl", &replacements).unwrap();
        assert!(matches!(first, ParseOutput::Rendered(ref s) if s.as_str() == "v1"));

        // Ensure the new mtime is observably later.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        write_template(&dir, "greet.tmpl", "v2");
        let second = cache.parse("greet.tmpl", &replacements).unwrap();
        assert!(matches!(second, ParseOutput::Rendered(ref s) if s.as_str() == "v2"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn path_escape_is_rejected() {
        let dir = tempdir();
        let cache = TemplateCache::new(dir.clone(), CacheOptions::default());
        let err = cache.parse("../../etc/passwd", &repl(vec![])).unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_template_is_read_error() {
        let dir = tempdir();
        let cache = TemplateCache::new(dir.clone(), CacheOptions::default());
        let err = cache.parse("nope.tmpl", &repl(vec![])).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn no_parse_mode_reports_template_name() {
        let dir = tempdir();
        write_template(&dir, "np.tmpl", "[a]");
        let cache = TemplateCache::new(dir.clone(), CacheOptions { no_parse_mode: true });
        let replacements = repl(vec![("a", Value::Str("x".into()))]);
        let out = cache.parse("np.tmpl", &replacements).unwrap();
        match out {
            ParseOutput::NoParse(report) => assert_eq!(report.template_name, "np.tmpl"),
            _ => panic!("expected NoParse"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn inline_directive_loads_through_cache() {
        let dir = tempdir();
        write_template(&dir, "partial.tmpl", "partial:[x]");
        write_template(&dir, "main.tmpl", "{{ inline partial.tmpl }}");
        let cache = TemplateCache::new(dir.clone(), CacheOptions::default());
        let replacements = repl(vec![("x", Value::Int(7))]);
        let out = cache.parse("main.tmpl", &replacements).unwrap();
        match out {
            ParseOutput::Rendered(s) => assert_eq!(s.as_str(), "partial:7"),
            _ => panic!("expected Rendered"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("uweb-templates-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
