//! Mind-map document model.
//!
//! # Responsibility
//! - Define the node arena, node records, extension payloads and snapshots.
//! - Keep structural invariants (single root, acyclic, ordered children)
//!   inside one owner so commands and writers never hold live references.
//!
//! # Invariants
//! - Every node is identified by a stable `NodeId` unique within its map.
//! - Parent links are handles resolved through `MapModel`, never owners.

pub mod extension;
pub mod map;
pub mod node;
pub mod snapshot;
