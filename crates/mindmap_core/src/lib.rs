//! Core of a mind-map editor: node tree, reentrant tree serialization and
//! command-based undo/redo.
//!
//! Presentation code stays outside this crate; it drives the
//! [`ModeController`] and binds writers in its [`WriterRegistry`].

pub mod config;
pub mod controller;
pub mod io;
pub mod logging;
pub mod model;
pub mod undo;

pub use config::{ConfigError, EngineConfig};
pub use controller::ModeController;
pub use io::reader::{read_map, ReadError, ReadResult};
pub use io::registry::{
    BindingSnapshot, ElementWriter, RegistryError, ScopedBinding, SharedWriter, WriterCapability,
    WriterRegistry,
};
pub use io::sink::{RecordingSink, SinkError, SinkEvent, SinkResult, TreeSink};
pub use io::tree_writer::{
    Element, ModeContext, SerializeOptions, TreeSerializer, TreeWriter, WriteError, WriteResult,
};
pub use io::xml_sink::XmlSink;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::extension::{
    ExtensionMap, ExtensionOwner, ExtensionPayload, ExtensionType, LinkTarget,
};
pub use model::map::{MapModel, ModelError, ModelResult, FORMAT_VERSION};
pub use model::node::{IconPosition, MindIcon, NodeId, NodeModel, NodeText};
pub use model::snapshot::{NodeShape, NodeSnapshot};
pub use undo::command::{Command, CommandError, CommandKind, CommandResult};
pub use undo::engine::{UndoEngine, UndoOutcome, DEFAULT_UNDO_LEVELS};
pub use undo::notify::{ChangeNotifier, NodeChangeEvent, NodeChangeListener};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
