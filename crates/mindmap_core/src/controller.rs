//! Feature-facing mode controller.
//!
//! # Responsibility
//! - Own one map, its undo history and its writer registry.
//! - Turn feature requests into validated commands and run them through the
//!   undo engine.
//! - Persist the map (or a subtree) through the tree serializer.
//!
//! # Invariants
//! - Every document mutation goes through a command and is undoable; only
//!   the view-filter flag is set directly.
//! - Loading a document replaces the map and clears the undo history.

use crate::config::EngineConfig;
use crate::io::reader::{read_map, ReadResult};
use crate::io::registry::WriterRegistry;
use crate::io::sink::{SinkError, TreeSink};
use crate::io::tree_writer::{SerializeOptions, TreeSerializer, WriteResult};
use crate::io::xml_sink::XmlSink;
use crate::model::extension::{ExtensionOwner, ExtensionPayload, ExtensionType};
use crate::model::map::{MapModel, ModelResult};
use crate::model::node::{IconPosition, MindIcon, NodeId, NodeText};
use crate::model::snapshot::NodeSnapshot;
use crate::undo::command::{Command, CommandResult};
use crate::undo::engine::{UndoEngine, UndoOutcome};
use crate::undo::notify::NodeChangeListener;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Entry point features use to edit and persist one map.
pub struct ModeController {
    map: MapModel,
    engine: UndoEngine,
    registry: WriterRegistry,
    config: EngineConfig,
}

impl ModeController {
    /// Controller with default config and the built-in writers.
    pub fn new(map: MapModel) -> Self {
        Self::with_config(map, EngineConfig::default())
    }

    pub fn with_config(map: MapModel, config: EngineConfig) -> Self {
        Self {
            map,
            engine: UndoEngine::new(config.undo_levels),
            registry: WriterRegistry::with_builtin_writers(),
            config,
        }
    }

    pub fn map(&self) -> &MapModel {
        &self.map
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &UndoEngine {
        &self.engine
    }

    /// Registry features bind their writers to.
    pub fn registry(&self) -> &WriterRegistry {
        &self.registry
    }

    pub fn add_change_listener(&mut self, listener: impl NodeChangeListener + 'static) {
        self.engine.add_listener(Box::new(listener));
    }

    pub fn execute(&mut self, command: Command) -> CommandResult<()> {
        self.engine.execute(&mut self.map, command)
    }

    pub fn undo(&mut self) -> CommandResult<UndoOutcome> {
        self.engine.undo(&mut self.map)
    }

    pub fn redo(&mut self) -> CommandResult<UndoOutcome> {
        self.engine.redo(&mut self.map)
    }

    pub fn add_icon(
        &mut self,
        node: NodeId,
        position: IconPosition,
        icon: MindIcon,
    ) -> CommandResult<()> {
        let command = Command::add_icon(&self.map, node, position, icon)?;
        self.execute(command)
    }

    /// Removes the icon at `position` and returns how many icons remain.
    pub fn remove_icon(&mut self, node: NodeId, position: IconPosition) -> CommandResult<usize> {
        let command = Command::remove_icon(&self.map, node, position)?;
        self.execute(command)?;
        Ok(self.map.require(node)?.icons().len())
    }

    pub fn set_node_text(&mut self, node: NodeId, text: NodeText) -> CommandResult<()> {
        let command = Command::set_text(&self.map, node, text)?;
        self.execute(command)
    }

    /// Adds a leaf under `parent` (`None` appends) and returns its id.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        index: Option<usize>,
        text: NodeText,
    ) -> CommandResult<NodeId> {
        let subtree = NodeSnapshot::leaf(text);
        let id = subtree.id;
        let command = Command::insert_node(&self.map, parent, index, subtree)?;
        self.execute(command)?;
        Ok(id)
    }

    pub fn delete_node(&mut self, node: NodeId) -> CommandResult<()> {
        let command = Command::delete_node(&self.map, node)?;
        self.execute(command)
    }

    /// Moves `node` to `index` of `new_parent`, counted after detaching it.
    pub fn move_node(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        index: usize,
    ) -> CommandResult<()> {
        let command = Command::move_node(&self.map, node, new_parent, index)?;
        self.execute(command)
    }

    pub fn set_extension(
        &mut self,
        owner: ExtensionOwner,
        extension_type: ExtensionType,
        payload: ExtensionPayload,
    ) -> CommandResult<()> {
        let command = Command::set_extension(&self.map, owner, extension_type, payload)?;
        self.execute(command)
    }

    pub fn remove_extension(
        &mut self,
        owner: ExtensionOwner,
        extension_type: ExtensionType,
    ) -> CommandResult<()> {
        let command = Command::remove_extension(&self.map, owner, extension_type)?;
        self.execute(command)
    }

    /// Updates the view filter. Not recorded in the undo history.
    pub fn set_node_visible(&mut self, node: NodeId, visible: bool) -> ModelResult<()> {
        self.map.set_visible(node, visible)
    }

    /// Serializes the whole map with the configured save options.
    pub fn save(&self, sink: &mut dyn TreeSink) -> WriteResult<()> {
        TreeSerializer::new(&self.registry).serialize_map(
            sink,
            &self.map,
            self.config.serialize_options(),
        )
    }

    /// Saves the map as XML into `out` and returns it.
    pub fn save_to_writer<W: Write>(&self, out: W) -> WriteResult<W> {
        let mut sink = XmlSink::new(out);
        self.save(&mut sink)?;
        Ok(sink.finish()?)
    }

    /// Saves the map as XML to `path` and records `path` as its location.
    pub fn save_to_path(&mut self, path: &Path) -> WriteResult<()> {
        let file = File::create(path).map_err(SinkError::from)?;
        let writer = self.save_to_writer(BufWriter::new(file))?;
        writer
            .into_inner()
            .map_err(|err| SinkError::from(err.into_error()))?;
        self.map.set_location(Some(path.display().to_string()));
        info!(
            "event=map_saved module=controller status=ok path={} nodes={}",
            path.display(),
            self.map.node_count()
        );
        Ok(())
    }

    /// Serializes one node as a standalone XML fragment (clipboard export).
    pub fn write_node_as_xml(
        &self,
        node: NodeId,
        write_invisible: bool,
        write_children: bool,
    ) -> WriteResult<String> {
        let options = SerializeOptions {
            write_invisible_nodes: write_invisible,
            write_children,
            write_only_intrinsic_ids: false,
        };
        let mut sink = XmlSink::new(Vec::new());
        TreeSerializer::new(&self.registry).serialize_node(
            &mut sink,
            &self.map,
            node,
            options,
        )?;
        let bytes = sink.finish()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replaces the map with the document in `xml` and clears the history.
    pub fn load_from_str(&mut self, xml: &str, location: Option<String>) -> ReadResult<()> {
        self.map = read_map(xml, location)?;
        self.engine.clear();
        Ok(())
    }
}
