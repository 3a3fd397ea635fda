//! Node domain model.
//!
//! # Responsibility
//! - Define the per-node record stored in the map arena.
//! - Provide icon list helpers with stable ordering.
//!
//! # Invariants
//! - `id` is stable and never reused for another node in the same map.
//! - `parent` is a lookup handle only; ownership lives in the parent's
//!   `children` list inside [`crate::model::map::MapModel`].
//! - `visible` is view state and is never persisted.

use crate::model::extension::ExtensionMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

const NODE_ID_PREFIX: &str = "ID_";

/// Stable identifier for a node, unique within one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generates a fresh random node id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{NODE_ID_PREFIX}{}", self.0.simple())
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    /// Parses the `ID_<hex>` form written by [`Display`].
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.strip_prefix(NODE_ID_PREFIX).unwrap_or(value);
        Uuid::parse_str(raw).map(Self)
    }
}

/// Primary text payload of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeText {
    /// Plain single-run text.
    Plain(String),
    /// Structured markup (HTML fragment) kept verbatim.
    Rich(String),
}

impl NodeText {
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain(value.into())
    }

    pub fn rich(value: impl Into<String>) -> Self {
        Self::Rich(value.into())
    }

    /// Raw stored text, regardless of kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Rich(value) => value.as_str(),
        }
    }

    pub fn is_rich(&self) -> bool {
        matches!(self, Self::Rich(_))
    }
}

impl Default for NodeText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

/// Reference to a built-in icon by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MindIcon(String);

impl MindIcon {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for MindIcon {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Icon list position used by icon mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconPosition {
    /// Zero-based index into the icon list.
    At(usize),
    /// The last icon (remove) or the end of the list (insert).
    Last,
}

/// One node record inside the map arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeModel {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) text: NodeText,
    pub(crate) icons: Vec<MindIcon>,
    pub(crate) extensions: ExtensionMap,
    pub(crate) visible: bool,
}

impl NodeModel {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, text: NodeText) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            text,
            icons: Vec::new(),
            extensions: ExtensionMap::new(),
            visible: true,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent handle; `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn text(&self) -> &NodeText {
        &self.text
    }

    pub fn icons(&self) -> &[MindIcon] {
        &self.icons
    }

    pub fn icon(&self, index: usize) -> Option<&MindIcon> {
        self.icons.get(index)
    }

    pub fn extensions(&self) -> &ExtensionMap {
        &self.extensions
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Resolves a position against the current icon list for removal.
    ///
    /// Returns `None` when the list is empty or the index is out of range.
    pub fn resolve_icon_index(&self, position: IconPosition) -> Option<usize> {
        match position {
            IconPosition::At(index) if index < self.icons.len() => Some(index),
            IconPosition::At(_) => None,
            IconPosition::Last => self.icons.len().checked_sub(1),
        }
    }

    pub(crate) fn insert_icon(&mut self, index: usize, icon: MindIcon) {
        let index = index.min(self.icons.len());
        self.icons.insert(index, icon);
    }

    pub(crate) fn remove_icon(&mut self, index: usize) -> Option<MindIcon> {
        if index < self.icons.len() {
            Some(self.icons.remove(index))
        } else {
            None
        }
    }
}
