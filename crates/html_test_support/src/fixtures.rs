//! Render fixtures: a tree description plus the exact expected output.
//!
//! ```toml
//! format = "render-fixture-v1"
//!
//! [[case]]
//! id = "hello"
//! expected = "Hello <b>World</b>!"
//! tree = [
//!   { text = "Hello " },
//!   { component = "Greeting", delay_ms = 5, children = [{ html = "<b>World</b>" }] },
//!   { text = "!" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

pub const RENDER_FIXTURE_FORMAT_V1: &str = "render-fixture-v1";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureFile {
    pub format: String,
    #[serde(rename = "case", default)]
    pub cases: Vec<FixtureCase>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureCase {
    pub id: String,
    pub expected: String,
    /// Chunk size to render with; the output must not depend on it.
    #[serde(default)]
    pub chunk_size: Option<usize>,
    pub tree: Vec<FixtureNode>,
}

/// One tree node. Exactly one of `text`, `html`, `component` or `slot` may be
/// set; a node with none of them is a fragment of its `children`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureNode {
    pub text: Option<String>,
    pub html: Option<String>,
    pub component: Option<String>,
    pub slot: Option<String>,
    /// For components: settle the output after this many milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub props: toml::Table,
    #[serde(default)]
    pub children: Vec<FixtureNode>,
    #[serde(default)]
    pub slots: BTreeMap<String, Vec<FixtureNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    Text,
    Html,
    Component,
    Slot,
    Fragment,
}

impl FixtureNode {
    pub fn kind(&self) -> FixtureKind {
        let set = [
            (self.text.is_some(), FixtureKind::Text),
            (self.html.is_some(), FixtureKind::Html),
            (self.component.is_some(), FixtureKind::Component),
            (self.slot.is_some(), FixtureKind::Slot),
        ];
        let mut kinds = set.iter().filter(|(present, _)| *present).map(|(_, kind)| *kind);
        let kind = kinds.next().unwrap_or(FixtureKind::Fragment);
        assert!(
            kinds.next().is_none(),
            "fixture node sets more than one of text/html/component/slot: {self:?}"
        );
        kind
    }
}

pub fn load_fixture_file(path: &Path) -> FixtureFile {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read render fixtures {path:?}: {err}"));
    let file: FixtureFile = toml::from_str(&content)
        .unwrap_or_else(|err| panic!("failed to parse render fixtures {path:?}: {err}"));
    assert_eq!(
        file.format, RENDER_FIXTURE_FORMAT_V1,
        "unsupported format in {path:?}"
    );
    assert!(!file.cases.is_empty(), "render fixtures {path:?} define no cases");
    let mut ids = std::collections::BTreeSet::new();
    for case in &file.cases {
        assert!(ids.insert(case.id.as_str()), "duplicate case id {:?} in {path:?}", case.id);
        for node in &case.tree {
            validate(node);
        }
    }
    file
}

fn validate(node: &FixtureNode) {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if matches!(kind, FixtureKind::Text | FixtureKind::Html | FixtureKind::Slot) {
            assert!(
                node.children.is_empty() && node.slots.is_empty(),
                "leaf fixture node cannot have children: {node:?}"
            );
        }
        if kind != FixtureKind::Component {
            assert!(node.delay_ms == 0, "only components can be delayed: {node:?}");
        }
        stack.extend(&node.children);
        stack.extend(node.slots.values().flatten());
    }
}
