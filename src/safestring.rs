//! `SafeString`: a string tagged with an escaping contract.
//!
//! A value carries one of three safety classes. `Raw` text has not been
//! escaped for any context and must be default-escaped before it reaches
//! output. `Html` text is safe to embed in HTML text or attribute context.
//! `Url` text is safe to embed in a URL query component. Concatenating two
//! `SafeString`s degrades to the weaker of the two classes rather than
//! silently claiming a safety neither side actually has.

use std::fmt;

/// The escaping contract carried by a [`SafeString`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Safety {
    /// Untrusted text; must be escaped before use.
    Raw,
    /// Safe for HTML text/attribute context.
    Html,
    /// Safe for a URL query component.
    Url,
}

/// A string value carrying a [`Safety`] contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeString {
    text: String,
    safety: Safety,
}

impl SafeString {
    /// Wraps `text` as raw, unescaped content.
    pub fn raw(text: impl Into<String>) -> Self {
        Self { text: text.into(), safety: Safety::Raw }
    }

    /// Wraps `text` as already HTML-safe.
    pub fn html(text: impl Into<String>) -> Self {
        Self { text: text.into(), safety: Safety::Html }
    }

    /// Wraps `text` as already URL-query-safe.
    pub fn url(text: impl Into<String>) -> Self {
        Self { text: text.into(), safety: Safety::Url }
    }

    /// Returns the escaping contract carried by this string.
    pub fn safety(&self) -> Safety {
        self.safety
    }

    /// Returns `true` unless this string is still raw/unescaped.
    pub fn is_safe(&self) -> bool {
        !matches!(self.safety, Safety::Raw)
    }

    /// Borrows the underlying text, regardless of safety class.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the wrapper, returning the underlying text.
    pub fn into_string(self) -> String {
        self.text
    }

    /// Appends `other` to `self`, degrading to the weaker of the two safety
    /// classes. `Raw` is weakest, then `Url`, then `Html`.
    pub fn push(&mut self, other: &SafeString) {
        self.text.push_str(&other.text);
        self.safety = weaker(self.safety, other.safety);
    }

    /// Appends a plain (unsafe) string slice, degrading to `Raw`.
    pub fn push_raw(&mut self, other: &str) {
        self.text.push_str(other);
        self.safety = weaker(self.safety, Safety::Raw);
    }
}

fn weaker(a: Safety, b: Safety) -> Safety {
    // Same contract on both sides is preserved; anything else (including
    // Html mixed with Url) is not honestly safe in either context, so it
    // degrades all the way to Raw.
    match (a, b) {
        (Safety::Html, Safety::Html) => Safety::Html,
        (Safety::Url, Safety::Url) => Safety::Url,
        _ => Safety::Raw,
    }
}

impl fmt::Display for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Default for SafeString {
    fn default() -> Self {
        Self::html(String::new())
    }
}
