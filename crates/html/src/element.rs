use serde_json::{Map, Value};

use crate::attrs::spread_attributes;
use crate::{HtmlString, mark_html};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Cut a tag name at the first character that could break out of the tag.
pub fn sanitize_element_name(name: &str) -> &str {
    let trimmed = name.trim();
    let end = trimmed
        .find(|c: char| matches!(c, '&' | '<' | '>' | '\'' | '"') || c.is_whitespace())
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Render `<name attrs>children</name>`; childless void elements self-terminate.
pub fn render_element(name: &str, attrs: &Map<String, Value>, children: &HtmlString) -> HtmlString {
    let name = sanitize_element_name(name);
    let attrs = spread_attributes(attrs);
    if children.is_empty() && is_void_element(name) {
        return mark_html(format!("<{name}{attrs}>"));
    }
    mark_html(format!("<{name}{attrs}>{children}</{name}>"))
}

/// The opening tag alone, for wrappers whose children stream separately.
pub fn open_tag(name: &str, attrs: &Map<String, Value>) -> HtmlString {
    let name = sanitize_element_name(name);
    mark_html(format!("<{name}{}>", spread_attributes(attrs)))
}

pub fn close_tag(name: &str) -> HtmlString {
    mark_html(format!("</{}>", sanitize_element_name(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn renders_children_verbatim() {
        let html = render_element("p", &attrs(json!({ "id": "x" })), &mark_html("<b>hi</b>"));
        assert_eq!(html.as_str(), r#"<p id="x"><b>hi</b></p>"#);
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let html = render_element("IMG", &attrs(json!({ "src": "a.png" })), &HtmlString::empty());
        assert_eq!(html.as_str(), r#"<IMG src="a.png">"#);
    }

    #[test]
    fn hostile_names_are_truncated() {
        assert_eq!(sanitize_element_name("div onclick=alert(1)"), "div");
        assert_eq!(sanitize_element_name(" my-el\"><script>"), "my-el");
        assert_eq!(close_tag("x-y z").as_str(), "</x-y>");
    }

    #[test]
    fn open_tag_spreads_attributes() {
        let tag = open_tag("ssr-island", &attrs(json!({ "uid": "1", "ssr": true })));
        assert_eq!(tag.as_str(), r#"<ssr-island ssr="true" uid="1">"#);
    }
}
