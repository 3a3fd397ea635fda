//! Value snapshots of node subtrees.
//!
//! Snapshots are detached copies used by commands (to restore deleted
//! subtrees with their original ids) and by the reader (to assemble a map
//! before it is validated).

use crate::model::extension::ExtensionMap;
use crate::model::node::{MindIcon, NodeId, NodeText};

/// Detached, id-preserving copy of one subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub text: NodeText,
    pub icons: Vec<MindIcon>,
    pub extensions: ExtensionMap,
    pub visible: bool,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Creates a leaf snapshot with a fresh id.
    pub fn leaf(text: NodeText) -> Self {
        Self {
            id: NodeId::generate(),
            text,
            icons: Vec::new(),
            extensions: ExtensionMap::new(),
            visible: true,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NodeSnapshot::node_count)
            .sum::<usize>()
    }

    /// Ids of this subtree in pre-order.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_count());
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids(&self, out: &mut Vec<NodeId>) {
        out.push(self.id);
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    /// Id-free structural view used to compare documents whose
    /// non-intrinsic ids were regenerated.
    pub fn shape(&self) -> NodeShape {
        NodeShape {
            text: self.text.clone(),
            icons: self.icons.clone(),
            extensions: self.extensions.clone(),
            children: self.children.iter().map(NodeSnapshot::shape).collect(),
        }
    }
}

/// Structural view of a subtree without ids and view state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeShape {
    pub text: NodeText,
    pub icons: Vec<MindIcon>,
    pub extensions: ExtensionMap,
    pub children: Vec<NodeShape>,
}
