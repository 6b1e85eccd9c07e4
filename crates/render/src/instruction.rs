//! Out-of-band directives, resolved against the result context when the
//! stream reaches them.

use core_types::IslandId;
use html::{HtmlString, attribute_value, mark_html};
use serde_json::{Map, Value};

use crate::config::RenderConfig;
use crate::result::ResultContext;

/// Comment that anchors a server island's client-side swap.
pub const SERVER_ISLAND_MARKER: &str = "<!--[if astro]>server-island-start<![endif]-->";

const HEAD_KEY: &str = "head";
const HYDRATION_RUNTIME_KEY: &str = "hydration-runtime";
const SERVER_ISLAND_RUNTIME_KEY: &str = "server-island-runtime";

const SERVER_ISLAND_RUNTIME: &str = concat!(
    "<script>async function replaceServerIsland(id,r){",
    "let s=document.querySelector(`script[data-island-id=\"${id}\"]`);",
    "if(!s||r.status!==200||r.headers.get('content-type')?.split(';')[0].trim()!=='text/html')return;",
    "let h=(await r.text()).trim();let e=s.previousSibling;",
    "while(e&&!(e.nodeType===8&&e.data==='[if astro]>server-island-start<![endif]')){",
    "let p=e.previousSibling;e.remove();e=p}",
    "e?.remove();s.before(document.createRange().createContextualFragment(h));s.remove()}",
    "</script>",
);

#[derive(Clone, Debug, PartialEq)]
pub enum RenderInstruction {
    /// Hoisted styles, scripts and extra head content.
    Head,
    /// Like [`RenderInstruction::Head`], but skipped for partial renders.
    MaybeHead,
    /// Client bootstrap for a hydrated component: the shared runtime once
    /// per request, then the directive's script once per directive.
    Hydration { directive: String },
    /// Inline markup emitted at most once per `key`.
    Script { key: String, html: HtmlString },
    ServerIslandRuntime,
    /// The deferred fetch that swaps a server island's real content in.
    ServerIslandFetch {
        island: IslandId,
        component: String,
        props: Map<String, Value>,
    },
}

impl RenderInstruction {
    pub fn hydration(directive: impl Into<String>) -> Self {
        Self::Hydration {
            directive: directive.into(),
        }
    }

    pub fn script(key: impl Into<String>, html: impl Into<HtmlString>) -> Self {
        Self::Script {
            key: key.into(),
            html: html.into(),
        }
    }

    /// Markup for this instruction, or `None` when it was already flushed
    /// for this request (or does not apply).
    pub fn resolve(&self, result: &mut ResultContext, config: &RenderConfig) -> Option<HtmlString> {
        match self {
            Self::Head => head(result),
            Self::MaybeHead => {
                if result.is_partial() {
                    None
                } else {
                    head(result)
                }
            }
            Self::Hydration { directive } => {
                let mut out = String::new();
                if result.try_flush(HYDRATION_RUNTIME_KEY) {
                    out.push_str("<style>ssr-island,ssr-slot{display:contents}</style>");
                    out.push_str(&module_script(&format!("{}/runtime.js", config.hydration_path)));
                }
                if result.try_flush(&format!("hydration-directive:{directive}")) {
                    out.push_str(&module_script(&format!(
                        "{}/{directive}.js",
                        config.hydration_path
                    )));
                }
                non_empty(out)
            }
            Self::Script { key, html } => {
                if result.try_flush(&format!("script:{key}")) {
                    Some(html.clone())
                } else {
                    None
                }
            }
            Self::ServerIslandRuntime => {
                if result.try_flush(SERVER_ISLAND_RUNTIME_KEY) {
                    Some(mark_html(SERVER_ISLAND_RUNTIME))
                } else {
                    None
                }
            }
            Self::ServerIslandFetch {
                island,
                component,
                props,
            } => {
                if !result.try_flush(&format!("server-island:{island}")) {
                    return None;
                }
                Some(island_fetch(*island, component, props, config))
            }
        }
    }
}

fn head(result: &mut ResultContext) -> Option<HtmlString> {
    if result.try_flush(HEAD_KEY) {
        non_empty(result.head_html().as_str().to_owned())
    } else {
        None
    }
}

fn non_empty(out: String) -> Option<HtmlString> {
    if out.is_empty() { None } else { Some(mark_html(out)) }
}

fn module_script(src: &str) -> String {
    format!("<script type=\"module\" src=\"{}\"></script>", attribute_value(src))
}

fn island_fetch(
    island: IslandId,
    component: &str,
    props: &Map<String, Value>,
    config: &RenderConfig,
) -> HtmlString {
    let url = format!("{}/{component}", config.server_island_path);
    let body = serde_json::json!({ "componentExport": "default", "props": props });
    mark_html(format!(
        "<script type=\"module\" data-island-id=\"{island}\">\
         let r=await fetch({},{{method:\"POST\",body:JSON.stringify({})}});\
         replaceServerIsland(\"{island}\",r);</script>",
        script_literal(&Value::String(url)),
        script_literal(&body),
    ))
}

// JSON is a valid script literal once it cannot close the surrounding tag.
fn script_literal(value: &Value) -> String {
    value
        .to_string()
        .replace("</", "<\\/")
        .replace("<!--", "<\\!--")
}
