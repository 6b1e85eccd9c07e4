use serde_json::{Map, Value};

use crate::{HtmlString, mark_html};

const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "allowfullscreen", "async", "autofocus", "autoplay", "controls", "default", "defer",
    "disabled", "disablepictureinpicture", "disableremoteplayback", "formnovalidate", "hidden",
    "loop", "nomodule", "novalidate", "open", "playsinline", "readonly", "required",
    "reversed", "scoped", "seamless", "itemscope",
];

// Attributes whose `false` value is meaningful and must be rendered.
const ENUM_ATTRIBUTES: &[&str] = &[
    "contenteditable", "draggable", "spellcheck", "value", "autoreverse",
    "externalresourcesrequired", "focusable", "preservealpha",
];

fn is_one_of(key: &str, table: &[&str]) -> bool {
    table.iter().any(|name| name.eq_ignore_ascii_case(key))
}

/// Escape an attribute value for a double-quoted context.
pub fn attribute_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&#38;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render one ` key="value"` pair (leading space included).
///
/// Returns an empty string when the attribute should be omitted.
pub fn add_attribute(key: &str, value: &Value) -> HtmlString {
    match value {
        Value::Null => HtmlString::empty(),
        Value::Bool(false) => {
            if is_one_of(key, ENUM_ATTRIBUTES) {
                mark_html(format!(" {key}=\"false\""))
            } else {
                HtmlString::empty()
            }
        }
        Value::Bool(true) if key.starts_with("data-") || is_one_of(key, BOOLEAN_ATTRIBUTES) => {
            mark_html(format!(" {key}"))
        }
        _ if key == "class:list" => {
            let list = class_list(value);
            if list.is_empty() {
                return HtmlString::empty();
            }
            mark_html(format!(" class=\"{}\"", attribute_value(&list)))
        }
        Value::Object(styles) if key == "style" => {
            mark_html(format!(" style=\"{}\"", attribute_value(&style_string(styles))))
        }
        _ if key == "className" => {
            mark_html(format!(" class=\"{}\"", attribute_value(&plain(value))))
        }
        _ => mark_html(format!(" {key}=\"{}\"", attribute_value(&plain(value)))),
    }
}

/// Render every entry of `attrs` in map order.
pub fn spread_attributes(attrs: &Map<String, Value>) -> HtmlString {
    let mut out = String::new();
    for (key, value) in attrs {
        out.push_str(add_attribute(key, value).as_str());
    }
    mark_html(out)
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn class_list(value: &Value) -> String {
    let mut classes: Vec<String> = Vec::new();
    let mut stack = vec![value];
    while let Some(item) = stack.pop() {
        match item {
            Value::String(s) => classes.extend(s.split_whitespace().map(str::to_owned)),
            Value::Array(items) => stack.extend(items.iter().rev()),
            Value::Object(entries) => classes.extend(
                entries
                    .iter()
                    .filter(|(_, enabled)| truthy(enabled))
                    .map(|(name, _)| name.clone()),
            ),
            Value::Number(n) => classes.push(n.to_string()),
            Value::Null | Value::Bool(_) => {}
        }
    }
    let mut seen = std::collections::HashSet::new();
    classes.retain(|class| seen.insert(class.clone()));
    classes.join(" ")
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn style_string(styles: &Map<String, Value>) -> String {
    let mut out = Vec::with_capacity(styles.len());
    for (key, value) in styles {
        if value.is_null() {
            continue;
        }
        let property = if key.starts_with("--") { key.clone() } else { kebab(key) };
        out.push(format!("{property}:{}", plain(value)));
    }
    out.join(";")
}

fn kebab(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
