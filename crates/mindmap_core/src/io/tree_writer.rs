//! Tree serializer: pre-order traversal driver over the writer registry.
//!
//! # Responsibility
//! - Walk a map (or one subtree) and emit it through the writers bound in a
//!   [`WriterRegistry`].
//! - Install traversal-scoped `map`/`node` writers per element and restore
//!   the previous ones on every exit path, including nested passes.
//! - Buffer each element and each extension contribution, and commit it to
//!   its parent only once it completes.
//!
//! # Invariants
//! - Children are emitted in stored order; writers in registration order;
//!   extensions in type-name order.
//! - The sink receives nothing unless the whole pass succeeds.
//! - A failing extension writer loses only its own output.

use crate::io::builtin::{MapWriter, NodeWriter, MAP_TAG, NODE_TAG};
use crate::io::registry::{RegistryError, SharedWriter, WriterCapability, WriterRegistry};
use crate::io::sink::{SinkError, SinkEvent, TreeSink};
use crate::model::extension::{ExtensionMap, ExtensionOwner, ExtensionPayload, ExtensionType};
use crate::model::map::MapModel;
use crate::model::node::{MindIcon, NodeId, NodeModel};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::time::Instant;

/// Result type for serializer and writer operations.
pub type WriteResult<T> = Result<T, WriteError>;

/// Errors raised while serializing.
#[derive(Debug)]
pub enum WriteError {
    /// Sink failed; aborts the pass.
    Sink(SinkError),
    /// Traversal tried to bind a writer under an invalid key.
    Registry(RegistryError),
    /// Requested node is not part of the map.
    NodeNotFound(NodeId),
    /// A writer rejected its element. Contained at extension granularity.
    Writer { tag: String, message: String },
}

impl WriteError {
    pub fn writer(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Writer {
            tag: tag.into(),
            message: message.into(),
        }
    }

    fn is_contained(&self) -> bool {
        matches!(self, Self::Writer { .. })
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sink(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "node not found while writing: {id}"),
            Self::Writer { tag, message } => write!(f, "writer for `{tag}` failed: {message}"),
        }
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sink(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::NodeNotFound(_) => None,
            Self::Writer { .. } => None,
        }
    }
}

impl From<SinkError> for WriteError {
    fn from(value: SinkError) -> Self {
        Self::Sink(value)
    }
}

impl From<RegistryError> for WriteError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Per-pass traversal options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Emit children whose visibility flag is off.
    pub write_invisible_nodes: bool,
    /// Recurse below the starting node.
    pub write_children: bool,
    /// Emit `ID` only for link targets.
    pub write_only_intrinsic_ids: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            write_invisible_nodes: true,
            write_children: true,
            write_only_intrinsic_ids: false,
        }
    }
}

/// Controller state visible to writers during one map's traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeContext {
    location: Option<String>,
    intrinsic_ids: HashSet<NodeId>,
}

impl ModeContext {
    pub fn for_map(map: &MapModel) -> Self {
        Self {
            location: map.location().map(str::to_string),
            intrinsic_ids: map.intrinsic_ids(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Whether `id` must be written because something links to it.
    pub fn is_intrinsic(&self, id: NodeId) -> bool {
        self.intrinsic_ids.contains(&id)
    }
}

/// Object handed to writers for one element.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Map(&'a MapModel),
    Node {
        map: &'a MapModel,
        node: &'a NodeModel,
    },
    Icon {
        node: &'a NodeModel,
        index: usize,
        icon: &'a MindIcon,
    },
    Extension {
        map: &'a MapModel,
        owner: ExtensionOwner,
        extension_type: &'a ExtensionType,
        payload: &'a ExtensionPayload,
    },
}

impl Element<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Map(_) => "map",
            Self::Node { .. } => "node",
            Self::Icon { .. } => "icon",
            Self::Extension { .. } => "extension",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Attributes,
    Content,
}

impl Phase {
    fn accepts(self, capability: WriterCapability) -> bool {
        match self {
            Self::Attributes => capability.emits_attributes(),
            Self::Content => capability.emits_content(),
        }
    }
}

/// Writer-facing handle of one serialization pass.
pub struct TreeWriter<'r> {
    registry: &'r WriterRegistry,
    committed: Vec<SinkEvent>,
    frames: Vec<Vec<SinkEvent>>,
    map_writer: Option<SharedWriter>,
    node_writer: Option<SharedWriter>,
    options: SerializeOptions,
    context: Rc<ModeContext>,
}

impl<'r> TreeWriter<'r> {
    fn new(registry: &'r WriterRegistry, map: &MapModel, options: SerializeOptions) -> Self {
        Self {
            registry,
            committed: Vec::new(),
            frames: Vec::new(),
            map_writer: None,
            node_writer: None,
            options,
            context: Rc::new(ModeContext::for_map(map)),
        }
    }

    pub fn registry(&self) -> &'r WriterRegistry {
        self.registry
    }

    /// Options of the innermost map/node being written.
    pub fn options(&self) -> SerializeOptions {
        self.options
    }

    /// Controller context of the innermost map being written.
    pub fn context(&self) -> &ModeContext {
        &self.context
    }

    pub fn add_attribute(&mut self, key: &str, value: &str) {
        self.push(SinkEvent::Attribute(key.to_string(), value.to_string()));
    }

    pub fn add_content(&mut self, text: &str) {
        self.push(SinkEvent::Content(text.to_string()));
    }

    pub fn add_comment(&mut self, text: &str) {
        self.push(SinkEvent::Comment(text.to_string()));
    }

    /// Opens a raw element without consulting the registry.
    pub fn begin_element(&mut self, tag: &str) {
        self.push(SinkEvent::Open(tag.to_string()));
    }

    pub fn end_element(&mut self, tag: &str) {
        self.push(SinkEvent::Close(tag.to_string()));
    }

    /// Writes a raw leaf element with fixed attributes and optional text.
    pub fn add_leaf_element(&mut self, tag: &str, attributes: &[(&str, &str)], text: Option<&str>) {
        self.begin_element(tag);
        for (key, value) in attributes {
            self.add_attribute(key, value);
        }
        if let Some(text) = text {
            self.add_content(text);
        }
        self.end_element(tag);
    }

    /// Emits `element` under `tag` through every writer bound to `tag`.
    ///
    /// The element is buffered and committed to its parent only when all
    /// writers succeed.
    pub fn add_element(&mut self, tag: &str, element: &Element<'_>) -> WriteResult<()> {
        let writers = self.registry.resolve(tag);
        self.buffered(|this| {
            this.begin_element(tag);
            for writer in writers
                .iter()
                .filter(|writer| writer.capability().emits_attributes())
            {
                writer.write_attributes(this, element)?;
            }
            for writer in writers
                .iter()
                .filter(|writer| writer.capability().emits_content())
            {
                writer.write_content(this, element)?;
            }
            this.end_element(tag);
            Ok(())
        })
    }

    /// Offers each extension to the attribute-capable writers bound to its type.
    pub fn add_extension_attributes(
        &mut self,
        map: &MapModel,
        owner: ExtensionOwner,
        extensions: &ExtensionMap,
    ) -> WriteResult<()> {
        self.offer_extensions(map, owner, extensions, Phase::Attributes)
    }

    /// Offers each extension to the content-capable writers bound to its type.
    pub fn add_extension_content(
        &mut self,
        map: &MapModel,
        owner: ExtensionOwner,
        extensions: &ExtensionMap,
    ) -> WriteResult<()> {
        self.offer_extensions(map, owner, extensions, Phase::Content)
    }

    /// Writes a whole map element with a traversal-scoped map writer.
    ///
    /// Reentrant: an extension writer may call this for an embedded map; the
    /// outer map writer, node writer, options and context come back
    /// afterwards.
    pub fn write_map(&mut self, map: &MapModel, options: SerializeOptions) -> WriteResult<()> {
        let registry = self.registry;
        let next: SharedWriter = Rc::new(MapWriter::new(options));
        let previous = self.map_writer.replace(Rc::clone(&next));
        let saved_options = std::mem::replace(&mut self.options, options);
        let saved_context =
            std::mem::replace(&mut self.context, Rc::new(ModeContext::for_map(map)));

        let result = match registry.scoped_replace(MAP_TAG, previous.as_ref(), next) {
            Ok(_scope) => self.add_element(MAP_TAG, &Element::Map(map)),
            Err(err) => Err(err.into()),
        };

        self.map_writer = previous;
        self.options = saved_options;
        self.context = saved_context;
        result
    }

    /// Writes one node element with a node writer configured for `options`
    /// and the current map context.
    pub fn write_node(
        &mut self,
        map: &MapModel,
        id: NodeId,
        options: SerializeOptions,
    ) -> WriteResult<()> {
        let node = map.node(id).ok_or(WriteError::NodeNotFound(id))?;
        let registry = self.registry;
        let next: SharedWriter = Rc::new(NodeWriter::new(options, Rc::clone(&self.context)));
        let previous = self.node_writer.replace(Rc::clone(&next));
        let saved_options = std::mem::replace(&mut self.options, options);

        let result = match registry.scoped_replace(NODE_TAG, previous.as_ref(), next) {
            Ok(_scope) => self.add_element(NODE_TAG, &Element::Node { map, node }),
            Err(err) => Err(err.into()),
        };

        self.node_writer = previous;
        self.options = saved_options;
        result
    }

    fn offer_extensions(
        &mut self,
        map: &MapModel,
        owner: ExtensionOwner,
        extensions: &ExtensionMap,
        phase: Phase,
    ) -> WriteResult<()> {
        for (extension_type, payload) in extensions {
            let writers = self.registry.resolve_extension(extension_type);
            if writers.is_empty() {
                if phase == Phase::Content {
                    debug!(
                        "event=extension_skipped module=io status=skipped owner={} type={}",
                        owner, extension_type
                    );
                }
                continue;
            }

            let element = Element::Extension {
                map,
                owner,
                extension_type,
                payload,
            };
            for writer in writers
                .iter()
                .filter(|writer| phase.accepts(writer.capability()))
            {
                let result = self.buffered(|this| match phase {
                    Phase::Attributes => writer.write_attributes(this, &element),
                    Phase::Content => writer.write_content(this, &element),
                });
                match result {
                    Ok(()) => {}
                    Err(err) if err.is_contained() => {
                        warn!(
                            "event=extension_writer_failed module=io status=skipped owner={} type={} error={}",
                            owner, extension_type, err
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    fn buffered<F>(&mut self, body: F) -> WriteResult<()>
    where
        F: FnOnce(&mut Self) -> WriteResult<()>,
    {
        self.frames.push(Vec::new());
        let result = body(self);
        let frame = self.frames.pop().unwrap_or_default();
        if result.is_ok() {
            self.current_frame().extend(frame);
        }
        result
    }

    fn current_frame(&mut self) -> &mut Vec<SinkEvent> {
        self.frames.last_mut().unwrap_or(&mut self.committed)
    }

    fn push(&mut self, event: SinkEvent) {
        self.current_frame().push(event);
    }

    fn flush_into(self, sink: &mut dyn TreeSink) -> WriteResult<usize> {
        for event in &self.committed {
            event.replay(sink)?;
        }
        Ok(self.committed.len())
    }
}

/// Entry point used by controllers and features to persist a map or subtree.
pub struct TreeSerializer<'r> {
    registry: &'r WriterRegistry,
}

impl<'r> TreeSerializer<'r> {
    pub fn new(registry: &'r WriterRegistry) -> Self {
        Self { registry }
    }

    /// Serializes `node` of `map` into `sink`.
    ///
    /// When `node` is the map root, the map element (document attributes,
    /// map extensions) wraps the tree; otherwise only the subtree is written.
    ///
    /// # Errors
    /// - `NodeNotFound` when `node` is not in `map`.
    /// - `Sink` when the sink fails; the sink may hold a prefix of the output.
    pub fn serialize(
        &self,
        sink: &mut dyn TreeSink,
        map: &MapModel,
        node: NodeId,
        options: SerializeOptions,
    ) -> WriteResult<()> {
        if node == map.root_id() {
            self.serialize_map(sink, map, options)
        } else {
            self.serialize_node(sink, map, node, options)
        }
    }

    /// Serializes the whole map, wrapped in the map element.
    pub fn serialize_map(
        &self,
        sink: &mut dyn TreeSink,
        map: &MapModel,
        options: SerializeOptions,
    ) -> WriteResult<()> {
        self.run(sink, map, options, "map", |writer| {
            writer.write_map(map, options)
        })
    }

    /// Serializes one node element (and, per `options`, its subtree) without
    /// the map element, even for the root.
    pub fn serialize_node(
        &self,
        sink: &mut dyn TreeSink,
        map: &MapModel,
        node: NodeId,
        options: SerializeOptions,
    ) -> WriteResult<()> {
        self.run(sink, map, options, "subtree", |writer| {
            writer.write_node(map, node, options)
        })
    }

    fn run<F>(
        &self,
        sink: &mut dyn TreeSink,
        map: &MapModel,
        options: SerializeOptions,
        scope: &str,
        traversal: F,
    ) -> WriteResult<()>
    where
        F: FnOnce(&mut TreeWriter<'r>) -> WriteResult<()>,
    {
        let started_at = Instant::now();
        let mut writer = TreeWriter::new(self.registry, map, options);
        let result = traversal(&mut writer).and_then(|()| writer.flush_into(sink));

        match &result {
            Ok(events) => info!(
                "event=serialize_pass module=io status=ok scope={} events={} duration_ms={}",
                scope,
                events,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=serialize_pass module=io status=error scope={} duration_ms={} error={}",
                scope,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result.map(|_| ())
    }
}
