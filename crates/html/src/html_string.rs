use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::escape::escape_html;

/// Markup that is already safe to emit verbatim.
///
/// Cloning is a reference-count bump, so the same fragment can sit in many
/// queue nodes (and many renders) without copying its bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HtmlString(Arc<str>);

impl HtmlString {
    pub fn empty() -> Self {
        static EMPTY: std::sync::OnceLock<Arc<str>> = std::sync::OnceLock::new();
        Self(Arc::clone(EMPTY.get_or_init(|| Arc::from(""))))
    }

    /// Escape plain text into safe markup.
    pub fn from_text(text: &str) -> Self {
        Self(Arc::from(escape_html(text).as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Shared backing storage, for callers that intern markup.
    pub fn as_arc(&self) -> &Arc<str> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Concatenate safe fragments; the result is safe as well.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a HtmlString>) -> Self {
        let mut out = String::new();
        for part in parts {
            out.push_str(part.as_str());
        }
        Self(Arc::from(out))
    }
}

/// Mark raw markup as safe without escaping it.
///
/// Marking is idempotent: passing an [`HtmlString`] back in returns it as-is.
pub fn mark_html(raw: impl Into<HtmlString>) -> HtmlString {
    raw.into()
}

impl From<&str> for HtmlString {
    fn from(raw: &str) -> Self {
        Self(Arc::from(raw))
    }
}

impl From<String> for HtmlString {
    fn from(raw: String) -> Self {
        Self(Arc::from(raw))
    }
}

impl From<Arc<str>> for HtmlString {
    fn from(raw: Arc<str>) -> Self {
        Self(raw)
    }
}

impl Default for HtmlString {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for HtmlString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HtmlString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for HtmlString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HtmlString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HtmlString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HtmlString({:?})", &*self.0)
    }
}
