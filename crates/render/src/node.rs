//! Queue node model: the closed set of units the stream adapter encodes.

use std::fmt;

use html::HtmlString;

use crate::instruction::RenderInstruction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    HtmlString,
    Component,
    Instruction,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Text,
        NodeKind::HtmlString,
        NodeKind::Component,
        NodeKind::Instruction,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            NodeKind::Text => 0,
            NodeKind::HtmlString => 1,
            NodeKind::Component => 2,
            NodeKind::Instruction => 3,
        }
    }
}

/// Slot reserved in the queue for output that is produced later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(pub u32);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a component's children live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Branch {
    /// Children were rendered synchronously and follow this node directly.
    #[default]
    Inline,
    /// Children come from a pending computation and are spliced in here once
    /// it settles.
    Reserved(BranchId),
}

/// Plain text; escaped when encoded.
#[derive(Debug, Default)]
pub struct TextNode {
    pub content: String,
}

/// Safe markup; encoded verbatim.
#[derive(Debug, Default)]
pub struct HtmlStringNode {
    pub html: HtmlString,
}

/// Marks the start of a component's output.
///
/// The instance itself is consumed when the builder renders it; what remains
/// is the diagnostic identity and where its children are.
#[derive(Debug, Default)]
pub struct ComponentNode {
    pub display_name: String,
    pub branch: Branch,
}

#[derive(Debug, Default)]
pub struct InstructionNode {
    pub instruction: Option<RenderInstruction>,
}

#[derive(Debug)]
pub enum QueueNode {
    Text(TextNode),
    Html(HtmlStringNode),
    Component(ComponentNode),
    Instruction(InstructionNode),
}

impl QueueNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            QueueNode::Text(_) => NodeKind::Text,
            QueueNode::Html(_) => NodeKind::HtmlString,
            QueueNode::Component(_) => NodeKind::Component,
            QueueNode::Instruction(_) => NodeKind::Instruction,
        }
    }

    /// A fresh node of `kind` with inert contents.
    pub(crate) fn blank(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Text => QueueNode::Text(TextNode::default()),
            NodeKind::HtmlString => QueueNode::Html(HtmlStringNode::default()),
            NodeKind::Component => QueueNode::Component(ComponentNode::default()),
            NodeKind::Instruction => QueueNode::Instruction(InstructionNode::default()),
        }
    }

    /// Return the node to its inert state, keeping any buffer capacity.
    pub(crate) fn reset(&mut self) {
        match self {
            QueueNode::Text(node) => node.content.clear(),
            QueueNode::Html(node) => node.html = HtmlString::empty(),
            QueueNode::Component(node) => {
                node.display_name.clear();
                node.branch = Branch::Inline;
            }
            QueueNode::Instruction(node) => node.instruction = None,
        }
    }

    pub(crate) fn text(content: &str) -> Self {
        QueueNode::Text(TextNode {
            content: content.to_owned(),
        })
    }

    pub(crate) fn html(html: HtmlString) -> Self {
        QueueNode::Html(HtmlStringNode { html })
    }
}

/// One ordered run of queue nodes: the root queue or a settled branch.
pub type Segment = std::collections::VecDeque<QueueNode>;
