//! Visible text extraction from the game's UI scene graph.
//!
//! The graph is owned by the game and may alias nodes through parent, child, sibling and
//! component links. Traversal is iterative with an identity-keyed visited set so it
//! terminates on any shape the accessor hands us.

use std::collections::HashSet;

use tracing::trace;

/// Opaque node identity (the accessor decides what it means, e.g. a node address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    Container,
    /// Composite widget with its own internal node tree.
    Component,
    Other,
}

/// Read-only view of the scene graph. Every link may be absent.
pub trait SceneGraph: Send + Sync {
    /// `None` when the node no longer resolves.
    fn kind(&self, node: NodeId) -> Option<NodeKind>;
    /// Structured text of a text leaf.
    fn text(&self, node: NodeId) -> Option<String>;
    /// Raw encoded text buffer of a text leaf.
    fn raw_text(&self, node: NodeId) -> Option<Vec<u8>>;
    fn first_child(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn component_root(&self, node: NodeId) -> Option<NodeId>;
    fn component_nodes(&self, node: NodeId) -> Vec<NodeId>;
}

/// A mounted UI panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelHandle {
    pub visible: bool,
    pub root: Option<NodeId>,
}

/// Scene graph plus lookup of named panels (the same panel may be mounted twice).
pub trait PlacardAccessor: SceneGraph {
    fn find_panel(&self, name: &str, index: usize) -> Option<PanelHandle>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SceneTextExtractor;

impl SceneTextExtractor {
    /// Ordered, trimmed, non-empty text lines reachable from `root`.
    pub fn extract<G: SceneGraph + ?Sized>(graph: &G, root: Option<NodeId>) -> Vec<String> {
        let mut lines = Vec::new();
        let Some(root) = root else {
            return lines;
        };

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = vec![root];

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            let Some(kind) = graph.kind(node) else {
                continue;
            };

            if kind == NodeKind::Text {
                let text = read_text(graph, node);
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }

            // Pushed in reverse so pop order is: child, component internals, sibling.
            if let Some(sibling) = graph.next_sibling(node) {
                stack.push(sibling);
            }
            if kind == NodeKind::Component {
                for inner in graph.component_nodes(node).into_iter().rev() {
                    stack.push(inner);
                }
                if let Some(inner_root) = graph.component_root(node) {
                    stack.push(inner_root);
                }
            }
            if let Some(child) = graph.first_child(node) {
                stack.push(child);
            }
        }

        trace!(target: "venue::scene", line_count = lines.len(), visited = visited.len(), "scene text extracted");
        lines
    }
}

fn read_text<G: SceneGraph + ?Sized>(graph: &G, node: NodeId) -> String {
    match graph.text(node) {
        Some(text) if !text.trim().is_empty() => text,
        _ => graph
            .raw_text(node)
            .and_then(|raw| decode_encoded_text(&raw))
            .unwrap_or_default(),
    }
}

const MACRO_START: u8 = 0x02;
const MACRO_END: u8 = 0x03;

/// Decode the game's encoded string buffer, dropping inline macro payloads
/// (`0x02 type len payload 0x03`). Returns `None` on malformed input.
pub fn decode_encoded_text(bytes: &[u8]) -> Option<String> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0x00 => break,
            MACRO_START => {
                // skip macro type byte
                i += 2;
                let (len, consumed) = read_packed_int(bytes.get(i..)?)?;
                i = i.checked_add(consumed)?.checked_add(len as usize)?;
                if bytes.get(i) != Some(&MACRO_END) {
                    return None;
                }
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

/// Packed integer: one byte `n + 1` for small values, otherwise a `0xF0 | flags` marker
/// followed by the bytes selected in `flags`, most significant first.
fn read_packed_int(bytes: &[u8]) -> Option<(u32, usize)> {
    let marker = *bytes.first()?;
    match marker {
        0x00 => None,
        m if m < 0xD0 => Some((u32::from(m) - 1, 1)),
        m if m >= 0xF0 => {
            let flags = m.wrapping_add(1) & 0x0F;
            let mut value: u32 = 0;
            let mut consumed = 1;
            for (bit, shift) in [(8u8, 24u32), (4, 16), (2, 8), (1, 0)] {
                if flags & bit != 0 {
                    value |= u32::from(*bytes.get(consumed)?) << shift;
                    consumed += 1;
                }
            }
            Some((value, consumed))
        }
        _ => None,
    }
}
