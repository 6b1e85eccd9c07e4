//! Markup primitives for the streaming renderer: text escaping, the
//! already-safe [`HtmlString`] wrapper and its cache, and attribute/element
//! rendering.

pub mod attrs;
pub mod cache;
pub mod element;

mod escape;
mod html_string;

pub use crate::attrs::{add_attribute, attribute_value, spread_attributes};
pub use crate::cache::{COMMON_HTML_PATTERNS, CacheStats, HtmlStringCache};
pub use crate::element::{is_void_element, render_element, sanitize_element_name};
pub use crate::escape::{escape_html, escape_html_into};
pub use crate::html_string::{HtmlString, mark_html};

/// Content type the renderer's output should be served with.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
