//! Host tree abstraction.
//!
//! The core never owns document nodes. Everything it knows about the page
//! comes through [`HostTree`]: reads of computed style and layout, plus a
//! deliberately small write surface (style blocks and marker attributes).
//!
//! [`MemoryTree`] is an arena-backed implementation loaded from a JSON
//! document; the CLI and the test-suite drive the pipeline through it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use thiserror::Error;
use umbra_common::NodeId;

/// Errors reported by a host tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The handle no longer refers to a live node.
    #[error("node {0} is no longer attached")]
    Detached(NodeId),

    /// Style or layout data could not be read.
    #[error("node {node} is unreadable: {reason}")]
    Unreadable { node: NodeId, reason: String },

    /// The host refused a write.
    #[error("host rejected write to {target}: {reason}")]
    Rejected { target: String, reason: String },

    #[error("invalid host document: {0}")]
    Document(String),
}

impl From<HostError> for umbra_common::Error {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Rejected { target, reason } => umbra_common::Error::Apply {
                node: target,
                reason,
            },
            other => umbra_common::Error::Host(other.to_string()),
        }
    }
}

/// Computed style as the host reports it: raw CSS strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputedStyle {
    pub background_color: String,
    pub color: String,
    pub border_color: String,
    pub border_width: String,
    pub opacity: String,
    pub visibility: String,
    pub position: String,
    pub z_index: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            background_color: "rgba(0, 0, 0, 0)".to_string(),
            color: "rgb(0, 0, 0)".to_string(),
            border_color: "rgb(0, 0, 0)".to_string(),
            border_width: "0px".to_string(),
            opacity: "1".to_string(),
            visibility: "visible".to_string(),
            position: "static".to_string(),
            z_index: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

/// Element identity and text summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub role: Option<String>,
    /// Length of the trimmed text content.
    pub text_len: usize,
}

/// The live document as seen by the core.
pub trait HostTree {
    fn root(&self) -> NodeId;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Pre-order traversal below `node`, excluding `node` itself.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, HostError>;

    fn bounding_box(&self, node: NodeId) -> Result<BoundingBox, HostError>;

    fn element_info(&self, node: NodeId) -> Result<ElementInfo, HostError>;

    fn viewport(&self) -> Viewport;

    /// Whether the node carries the active-patch marker.
    fn has_marker(&self, node: NodeId) -> bool;

    fn insert_style_block(&mut self, block_id: &str, css: &str) -> Result<(), HostError>;

    fn remove_style_block(&mut self, block_id: &str) -> Result<(), HostError>;

    fn set_marker(&mut self, node: NodeId, on: bool) -> Result<(), HostError>;

    /// Top-level marker indicating the mode is active.
    fn set_mode_marker(&mut self, on: bool) -> Result<(), HostError>;
}

/// Structural path from the root, e.g. `html>body>div#app>ul.menu:2`.
///
/// Segments use the id when present, otherwise tag, classes, and the index
/// among siblings. Unreadable ancestors contribute `?`.
pub fn identity_path(host: &dyn HostTree, node: NodeId) -> String {
    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        let parent = host.parent(n);
        let segment = match host.element_info(n) {
            Ok(info) => match &info.id {
                Some(id) if !id.is_empty() => format!("{}#{}", info.tag, id),
                _ => {
                    let mut s = info.tag.clone();
                    for class in &info.classes {
                        s.push('.');
                        s.push_str(class);
                    }
                    if let Some(p) = parent {
                        let index = host.children(p).iter().position(|c| *c == n).unwrap_or(0);
                        s.push_str(&format!(":{}", index));
                    }
                    s
                }
            },
            Err(_) => "?".to_string(),
        };
        segments.push(segment);
        current = parent;
    }
    segments.reverse();
    segments.join(">")
}

// ── In-memory implementation ────────────────────────────────────────────

/// One element of a serialized host document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDoc {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub style: ComputedStyle,
    #[serde(default, rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub children: Vec<ElementDoc>,
}

/// A serialized host document: viewport plus a nested element tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    #[serde(default)]
    pub viewport: Viewport,
    pub root: ElementDoc,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    info: ElementInfo,
    style: ComputedStyle,
    bbox: BoundingBox,
    attached: bool,
}

/// Arena-backed [`HostTree`]. Node ids are arena indices.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: Vec<MemoryNode>,
    viewport: Viewport,
    markers: BTreeSet<NodeId>,
    style_blocks: BTreeMap<String, String>,
    mode_marker: bool,
    reject_writes: bool,
    unreadable: HashSet<NodeId>,
}

impl MemoryTree {
    pub fn from_document(doc: TreeDocument) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            viewport: doc.viewport,
            markers: BTreeSet::new(),
            style_blocks: BTreeMap::new(),
            mode_marker: false,
            reject_writes: false,
            unreadable: HashSet::new(),
        };
        tree.push_element(doc.root, None);
        tree
    }

    pub fn from_json(json: &str) -> Result<Self, HostError> {
        let doc: TreeDocument =
            serde_json::from_str(json).map_err(|e| HostError::Document(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    pub fn from_file(path: &Path) -> Result<Self, HostError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HostError::Document(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    fn push_element(&mut self, doc: ElementDoc, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(MemoryNode {
            parent,
            children: Vec::new(),
            info: ElementInfo {
                tag: doc.tag.to_ascii_lowercase(),
                id: doc.id,
                classes: doc.classes,
                role: doc.role,
                text_len: doc.text.trim().chars().count(),
            },
            style: doc.style,
            bbox: doc.bbox,
            attached: true,
        });
        for child in doc.children {
            let child_id = self.push_element(child, Some(id));
            self.nodes[id.0 as usize].children.push(child_id);
        }
        id
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, HostError> {
        match self.nodes.get(id.0 as usize) {
            Some(n) if n.attached => Ok(n),
            _ => Err(HostError::Detached(id)),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        match self.nodes.get_mut(id.0 as usize) {
            Some(n) if n.attached => Ok(n),
            _ => Err(HostError::Detached(id)),
        }
    }

    /// Append a new subtree under `parent`, returning the new node.
    pub fn append_child(&mut self, parent: NodeId, doc: ElementDoc) -> Result<NodeId, HostError> {
        self.node(parent)?;
        let id = self.push_element(doc, Some(parent));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Detach a node and its subtree.
    pub fn detach(&mut self, node: NodeId) -> Result<(), HostError> {
        let parent = self.node(node)?.parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.retain(|c| *c != node);
        }
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(entry) = self.nodes.get_mut(n.0 as usize) {
                entry.attached = false;
                stack.extend(entry.children.iter().copied());
            }
            self.markers.remove(&n);
        }
        Ok(())
    }

    pub fn set_style(&mut self, node: NodeId, style: ComputedStyle) -> Result<(), HostError> {
        self.node_mut(node)?.style = style;
        Ok(())
    }

    pub fn style_mut(&mut self, node: NodeId) -> Result<&mut ComputedStyle, HostError> {
        Ok(&mut self.node_mut(node)?.style)
    }

    /// First attached node carrying `class`.
    pub fn find_by_class(&self, class: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .find(|(_, n)| n.attached && n.info.classes.iter().any(|c| c == class))
            .map(|(i, _)| NodeId(i as u64))
    }

    /// Make every write fail with [`HostError::Rejected`].
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    /// Make style reads for `node` fail.
    pub fn mark_unreadable(&mut self, node: NodeId) {
        self.unreadable.insert(node);
    }

    pub fn style_blocks(&self) -> &BTreeMap<String, String> {
        &self.style_blocks
    }

    pub fn marked_nodes(&self) -> Vec<NodeId> {
        self.markers.iter().copied().collect()
    }

    pub fn mode_marker(&self) -> bool {
        self.mode_marker
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.attached).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self, target: &str) -> Result<(), HostError> {
        if self.reject_writes {
            return Err(HostError::Rejected {
                target: target.to_string(),
                reason: "writes disabled by host".to_string(),
            });
        }
        Ok(())
    }
}

impl HostTree for MemoryTree {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).ok().and_then(|n| n.parent)
    }

    fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, HostError> {
        if self.unreadable.contains(&node) {
            return Err(HostError::Unreadable {
                node,
                reason: "computed style unavailable".to_string(),
            });
        }
        Ok(self.node(node)?.style.clone())
    }

    fn bounding_box(&self, node: NodeId) -> Result<BoundingBox, HostError> {
        Ok(self.node(node)?.bbox)
    }

    fn element_info(&self, node: NodeId) -> Result<ElementInfo, HostError> {
        Ok(self.node(node)?.info.clone())
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn has_marker(&self, node: NodeId) -> bool {
        self.markers.contains(&node)
    }

    fn insert_style_block(&mut self, block_id: &str, css: &str) -> Result<(), HostError> {
        self.check_writable(block_id)?;
        self.style_blocks.insert(block_id.to_string(), css.to_string());
        Ok(())
    }

    fn remove_style_block(&mut self, block_id: &str) -> Result<(), HostError> {
        self.check_writable(block_id)?;
        self.style_blocks.remove(block_id);
        Ok(())
    }

    fn set_marker(&mut self, node: NodeId, on: bool) -> Result<(), HostError> {
        self.check_writable(&node.to_string())?;
        if on {
            self.node(node)?;
            self.markers.insert(node);
        } else {
            self.markers.remove(&node);
        }
        Ok(())
    }

    fn set_mode_marker(&mut self, on: bool) -> Result<(), HostError> {
        self.check_writable("mode")?;
        self.mode_marker = on;
        Ok(())
    }
}
