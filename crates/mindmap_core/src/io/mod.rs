//! Persistence: writer registry, tree serializer, sinks and the map reader.
//!
//! # Responsibility
//! - Turn a map (or one subtree) into sink events through registered writers.
//! - Read the built-in XML dialect back into a map.
//!
//! # See also
//! - `registry` for the scoped binding protocol.
//! - `builtin` for the XML dialect.

pub mod builtin;
pub mod reader;
pub mod registry;
pub mod sink;
pub mod tree_writer;
pub mod xml_sink;
