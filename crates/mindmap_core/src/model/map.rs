//! Map (document) model and node arena.
//!
//! # Responsibility
//! - Own every node of one document and the document-level extensions.
//! - Provide validated structural mutations used by undoable commands.
//!
//! # Invariants
//! - Exactly one node (the root) has no parent.
//! - A node id appears in exactly one parent's `children` list, except the root.
//! - The parent graph is acyclic; `move_node` rejects cycles before mutating.
//! - Every mutation validates first and mutates second, so a returned error
//!   means the map is unchanged.

use crate::model::extension::{
    ExtensionMap, ExtensionOwner, ExtensionPayload, ExtensionType, LinkTarget,
};
use crate::model::node::{MindIcon, NodeId, NodeModel, NodeText};
use crate::model::snapshot::NodeSnapshot;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Format version written into and read from documents.
pub const FORMAT_VERSION: &str = "1.0.1";

/// Result type for map model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Structural errors from map model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Node id is not part of this map.
    NodeNotFound(NodeId),
    /// Operation is not allowed on the root node.
    RootImmutable(NodeId),
    /// Moving `node` under `parent` would create a cycle.
    CycleDetected { node: NodeId, parent: NodeId },
    /// Child index is past the end of the parent's child list.
    ChildIndexOutOfRange {
        parent: NodeId,
        index: usize,
        len: usize,
    },
    /// Icon index is past the end of the node's icon list.
    IconIndexOutOfRange {
        node: NodeId,
        index: usize,
        len: usize,
    },
    /// Inserted subtree reuses an id that already exists.
    DuplicateNodeId(NodeId),
    /// Attribute tables hold at least one entry; clear the slot instead.
    EmptyAttributeTable(ExtensionOwner),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::RootImmutable(id) => write!(f, "operation not allowed on root node {id}"),
            Self::CycleDetected { node, parent } => {
                write!(f, "move would create cycle: node {node} under parent {parent}")
            }
            Self::ChildIndexOutOfRange { parent, index, len } => write!(
                f,
                "child index {index} out of range for node {parent} with {len} children"
            ),
            Self::IconIndexOutOfRange { node, index, len } => write!(
                f,
                "icon index {index} out of range for node {node} with {len} icons"
            ),
            Self::DuplicateNodeId(id) => write!(f, "node id already present: {id}"),
            Self::EmptyAttributeTable(owner) => {
                write!(f, "attribute table on {owner} has no entries")
            }
        }
    }
}

impl Error for ModelError {}

/// One mind-map document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapModel {
    version: String,
    location: Option<String>,
    root: NodeId,
    nodes: HashMap<NodeId, NodeModel>,
    extensions: ExtensionMap,
}

impl MapModel {
    /// Creates a map holding a single root node.
    pub fn new(root_text: NodeText) -> Self {
        let root = NodeModel::new(NodeId::generate(), None, root_text);
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            version: FORMAT_VERSION.to_string(),
            location: None,
            root: root_id,
            nodes,
            extensions: ExtensionMap::new(),
        }
    }

    /// Builds a map from a detached root snapshot.
    ///
    /// # Errors
    /// - Returns `DuplicateNodeId` when the snapshot repeats an id.
    pub fn from_snapshot(
        version: impl Into<String>,
        location: Option<String>,
        root: &NodeSnapshot,
        extensions: ExtensionMap,
    ) -> ModelResult<Self> {
        let mut map = Self {
            version: version.into(),
            location,
            root: root.id,
            nodes: HashMap::new(),
            extensions,
        };
        map.ensure_ids_free(root)?;
        map.attach_snapshot(None, root);
        Ok(map)
    }

    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Originating location (path or URL), metadata only.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn set_location(&mut self, location: Option<String>) {
        self.location = location;
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &NodeModel {
        // The root entry is created with the map and can never be removed.
        &self.nodes[&self.root]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeModel> {
        self.nodes.get(&id)
    }

    /// Loads one node or reports `NodeNotFound`.
    pub fn require(&self, id: NodeId) -> ModelResult<&NodeModel> {
        self.nodes.get(&id).ok_or(ModelError::NodeNotFound(id))
    }

    fn require_mut(&mut self, id: NodeId) -> ModelResult<&mut NodeModel> {
        self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound(id))
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Returns `(parent, index)` for a non-root node.
    pub fn position_of(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent_of(id)?;
        let index = self
            .nodes
            .get(&parent)?
            .children
            .iter()
            .position(|child| *child == id)?;
        Some((parent, index))
    }

    /// Whether `ancestor` is `node` itself or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = self.parent_of(current);
        }
        false
    }

    /// Ids of the subtree rooted at `id` in pre-order.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Ids that must be persisted because a node link in this map targets them.
    pub fn intrinsic_ids(&self) -> HashSet<NodeId> {
        let slots = self
            .nodes
            .values()
            .map(|node| &node.extensions)
            .chain(std::iter::once(&self.extensions));
        slots
            .flat_map(|extensions| extensions.values())
            .filter_map(|payload| match payload {
                ExtensionPayload::Link(LinkTarget::Node(target)) if self.contains(*target) => {
                    Some(*target)
                }
                _ => None,
            })
            .collect()
    }

    /// Appends (or inserts at `index`) a new leaf child.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        index: Option<usize>,
        text: NodeText,
    ) -> ModelResult<NodeId> {
        let snapshot = NodeSnapshot::leaf(text);
        let len = self.require(parent)?.children.len();
        let index = index.unwrap_or(len);
        self.insert_subtree(parent, index, &snapshot)?;
        Ok(snapshot.id)
    }

    /// Inserts a detached subtree, keeping its ids.
    pub fn insert_subtree(
        &mut self,
        parent: NodeId,
        index: usize,
        subtree: &NodeSnapshot,
    ) -> ModelResult<()> {
        let len = self.require(parent)?.children.len();
        if index > len {
            return Err(ModelError::ChildIndexOutOfRange { parent, index, len });
        }
        self.ensure_ids_free(subtree)?;

        self.attach_snapshot(Some(parent), subtree);
        self.require_mut(parent)?.children.insert(index, subtree.id);
        Ok(())
    }

    /// Detaches a non-root subtree and returns `(parent, index, snapshot)`.
    pub fn remove_subtree(&mut self, id: NodeId) -> ModelResult<(NodeId, usize, NodeSnapshot)> {
        let node = self.require(id)?;
        if node.is_root() {
            return Err(ModelError::RootImmutable(id));
        }
        let (parent, index) = self.position_of(id).ok_or(ModelError::NodeNotFound(id))?;
        let snapshot = self.snapshot(id)?;

        self.require_mut(parent)?.children.remove(index);
        for removed in snapshot.ids() {
            self.nodes.remove(&removed);
        }
        Ok((parent, index, snapshot))
    }

    /// Moves a non-root node to `index` within `new_parent`'s child list.
    ///
    /// `index` addresses the child list after the node has been detached.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, index: usize) -> ModelResult<()> {
        if self.require(id)?.is_root() {
            return Err(ModelError::RootImmutable(id));
        }
        let target = self.require(new_parent)?;
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(ModelError::CycleDetected {
                node: id,
                parent: new_parent,
            });
        }
        let (old_parent, old_index) = self.position_of(id).ok_or(ModelError::NodeNotFound(id))?;
        let len_after_detach = if old_parent == new_parent {
            target.children.len() - 1
        } else {
            target.children.len()
        };
        if index > len_after_detach {
            return Err(ModelError::ChildIndexOutOfRange {
                parent: new_parent,
                index,
                len: len_after_detach,
            });
        }

        self.require_mut(old_parent)?.children.remove(old_index);
        self.require_mut(new_parent)?.children.insert(index, id);
        self.require_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// Replaces node text and returns the previous value.
    pub fn set_text(&mut self, id: NodeId, text: NodeText) -> ModelResult<NodeText> {
        let node = self.require_mut(id)?;
        Ok(std::mem::replace(&mut node.text, text))
    }

    /// Inserts one icon at `index` (`index == len` appends).
    pub fn insert_icon(&mut self, id: NodeId, index: usize, icon: MindIcon) -> ModelResult<()> {
        let node = self.require_mut(id)?;
        let len = node.icons.len();
        if index > len {
            return Err(ModelError::IconIndexOutOfRange {
                node: id,
                index,
                len,
            });
        }
        node.insert_icon(index, icon);
        Ok(())
    }

    /// Removes the icon at `index` and returns it.
    pub fn remove_icon(&mut self, id: NodeId, index: usize) -> ModelResult<MindIcon> {
        let node = self.require_mut(id)?;
        let len = node.icons.len();
        node.remove_icon(index)
            .ok_or(ModelError::IconIndexOutOfRange {
                node: id,
                index,
                len,
            })
    }

    /// Extensions of the map itself.
    pub fn extensions(&self) -> &ExtensionMap {
        &self.extensions
    }

    /// Extensions of either the map or one node.
    pub fn extensions_of(&self, owner: ExtensionOwner) -> ModelResult<&ExtensionMap> {
        match owner {
            ExtensionOwner::Map => Ok(&self.extensions),
            ExtensionOwner::Node(id) => Ok(&self.require(id)?.extensions),
        }
    }

    /// Sets (`Some`) or clears (`None`) one extension slot and returns the
    /// previous payload.
    pub fn set_extension(
        &mut self,
        owner: ExtensionOwner,
        extension_type: ExtensionType,
        payload: Option<ExtensionPayload>,
    ) -> ModelResult<Option<ExtensionPayload>> {
        if matches!(&payload, Some(ExtensionPayload::Properties(entries)) if entries.is_empty()) {
            return Err(ModelError::EmptyAttributeTable(owner));
        }
        let slots = match owner {
            ExtensionOwner::Map => &mut self.extensions,
            ExtensionOwner::Node(id) => &mut self.require_mut(id)?.extensions,
        };
        Ok(match payload {
            Some(payload) => slots.insert(extension_type, payload),
            None => slots.remove(&extension_type),
        })
    }

    /// Updates the view-filter flag. Not an undoable document change.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> ModelResult<()> {
        self.require_mut(id)?.visible = visible;
        Ok(())
    }

    /// Copies the subtree rooted at `id` into a detached snapshot.
    pub fn snapshot(&self, id: NodeId) -> ModelResult<NodeSnapshot> {
        let node = self.require(id)?;
        let children = node
            .children
            .iter()
            .map(|child| self.snapshot(*child))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(NodeSnapshot {
            id: node.id,
            text: node.text.clone(),
            icons: node.icons.clone(),
            extensions: node.extensions.clone(),
            visible: node.visible,
            children,
        })
    }

    fn ensure_ids_free(&self, subtree: &NodeSnapshot) -> ModelResult<()> {
        let mut seen = HashSet::new();
        for id in subtree.ids() {
            if self.nodes.contains_key(&id) || !seen.insert(id) {
                return Err(ModelError::DuplicateNodeId(id));
            }
        }
        Ok(())
    }

    fn attach_snapshot(&mut self, parent: Option<NodeId>, subtree: &NodeSnapshot) {
        let mut node = NodeModel::new(subtree.id, parent, subtree.text.clone());
        node.icons = subtree.icons.clone();
        node.extensions = subtree.extensions.clone();
        node.visible = subtree.visible;
        node.children = subtree.children.iter().map(|child| child.id).collect();
        self.nodes.insert(subtree.id, node);
        for child in &subtree.children {
            self.attach_snapshot(Some(subtree.id), child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MapModel, ModelError};
    use crate::model::extension::{ExtensionOwner, ExtensionPayload, ExtensionType, LinkTarget};
    use crate::model::node::{MindIcon, NodeText};

    fn sample() -> (MapModel, [crate::model::node::NodeId; 3]) {
        let mut map = MapModel::new(NodeText::plain("R"));
        let root = map.root_id();
        let a = map.add_child(root, None, NodeText::plain("A")).unwrap();
        let b = map.add_child(root, None, NodeText::plain("B")).unwrap();
        let c = map.add_child(a, None, NodeText::plain("C")).unwrap();
        (map, [a, b, c])
    }

    #[test]
    fn add_child_keeps_insertion_order_and_parent_handle() {
        let (map, [a, b, c]) = sample();
        assert_eq!(map.root().children(), &[a, b]);
        assert_eq!(map.parent_of(c), Some(a));
        assert_eq!(map.position_of(b), Some((map.root_id(), 1)));
        assert_eq!(map.node_count(), 4);
    }

    #[test]
    fn move_rejects_cycles_and_root() {
        let (mut map, [a, _, c]) = sample();
        let err = map.move_node(a, c, 0).unwrap_err();
        assert_eq!(err, ModelError::CycleDetected { node: a, parent: c });

        let root = map.root_id();
        let err = map.move_node(root, a, 0).unwrap_err();
        assert_eq!(err, ModelError::RootImmutable(root));
    }

    #[test]
    fn move_within_same_parent_uses_detached_index() {
        let (mut map, [a, b, _]) = sample();
        let root = map.root_id();
        map.move_node(b, root, 0).unwrap();
        assert_eq!(map.root().children(), &[b, a]);

        let err = map.move_node(b, root, 2).unwrap_err();
        assert!(matches!(err, ModelError::ChildIndexOutOfRange { len: 1, .. }));
        assert_eq!(map.root().children(), &[b, a]);
    }

    #[test]
    fn remove_and_reinsert_subtree_restores_ids() {
        let (mut map, [a, b, c]) = sample();
        let before = map.clone();
        let (parent, index, snapshot) = map.remove_subtree(a).unwrap();
        assert!(!map.contains(c));
        assert_eq!(map.root().children(), &[b]);

        map.insert_subtree(parent, index, &snapshot).unwrap();
        assert_eq!(map, before);
    }

    #[test]
    fn insert_subtree_rejects_existing_ids() {
        let (mut map, [a, _, _]) = sample();
        let snapshot = map.snapshot(a).unwrap();
        let root = map.root_id();
        let err = map.insert_subtree(root, 0, &snapshot).unwrap_err();
        assert_eq!(err, ModelError::DuplicateNodeId(a));
    }

    #[test]
    fn icon_bounds_are_checked_before_mutation() {
        let (mut map, [a, _, _]) = sample();
        map.insert_icon(a, 0, MindIcon::new("idea")).unwrap();
        let err = map.insert_icon(a, 5, MindIcon::new("help")).unwrap_err();
        assert!(matches!(err, ModelError::IconIndexOutOfRange { len: 1, .. }));
        assert_eq!(map.remove_icon(a, 0).unwrap(), MindIcon::new("idea"));
    }

    #[test]
    fn intrinsic_ids_follow_node_links() {
        let (mut map, [a, b, c]) = sample();
        map.set_extension(
            ExtensionOwner::Node(a),
            ExtensionType::link(),
            Some(ExtensionPayload::Link(LinkTarget::Node(c))),
        )
        .unwrap();
        map.set_extension(
            ExtensionOwner::Node(b),
            ExtensionType::link(),
            Some(ExtensionPayload::Link(LinkTarget::Url("https://example.org".into()))),
        )
        .unwrap();

        let ids = map.intrinsic_ids();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&c));
    }
}
