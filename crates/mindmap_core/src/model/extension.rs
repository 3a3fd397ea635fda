//! Typed extension payloads attached to nodes and maps.
//!
//! Extension types are an open set of names; payloads are a closed set of
//! value shapes. A type that no writer is bound to is carried in memory and
//! skipped on save.

use crate::model::map::MapModel;
use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Extension type name for node/map notes.
pub const EXTENSION_NOTE: &str = "note";
/// Extension type name for the key/value attribute table.
pub const EXTENSION_ATTRIBUTES: &str = "attributes";
/// Extension type name for hyperlinks.
pub const EXTENSION_LINK: &str = "link";
/// Extension type name for embedded sub-maps.
pub const EXTENSION_SUBMAP: &str = "submap";

/// Key of one extension slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionType(String);

impl ExtensionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn note() -> Self {
        Self::new(EXTENSION_NOTE)
    }

    pub fn attributes() -> Self {
        Self::new(EXTENSION_ATTRIBUTES)
    }

    pub fn link() -> Self {
        Self::new(EXTENSION_LINK)
    }

    pub fn submap() -> Self {
        Self::new(EXTENSION_SUBMAP)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ExtensionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Target of a link extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Another node in the same map. Makes the target id intrinsic.
    Node(NodeId),
    /// Anything else, stored verbatim.
    Url(String),
}

/// Value stored in one extension slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionPayload {
    Text(String),
    /// Ordered key/value pairs; duplicate keys are allowed.
    Properties(Vec<(String, String)>),
    Link(LinkTarget),
    Submap(Box<MapModel>),
}

impl ExtensionPayload {
    /// Short kind label used in diagnostics and change notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Properties(_) => "properties",
            Self::Link(_) => "link",
            Self::Submap(_) => "submap",
        }
    }

    /// One-line rendering for change notifications.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Properties(entries) => format!("{} entries", entries.len()),
            Self::Link(LinkTarget::Node(id)) => format!("#{id}"),
            Self::Link(LinkTarget::Url(url)) => url.clone(),
            Self::Submap(map) => format!("submap of {} nodes", map.node_count()),
        }
    }
}

/// Extension slots keyed by type; iteration is in type-name order.
pub type ExtensionMap = BTreeMap<ExtensionType, ExtensionPayload>;

/// Owner of an extension slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionOwner {
    Map,
    Node(NodeId),
}

impl Display for ExtensionOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Node(id) => write!(f, "{id}"),
        }
    }
}
