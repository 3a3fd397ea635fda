//! Built-in writers for the XML mind-map dialect.
//!
//! # Responsibility
//! - Emit `map`, `node` and `icon` elements plus the note, attribute table,
//!   link and sub-map extensions.
//! - Provide the preloaded registry used by the mode controller.
//!
//! # Invariants
//! - `map` and `node` writers are traversal-scoped: they are installed by
//!   [`TreeWriter::write_map`]/[`TreeWriter::write_node`] per element and are
//!   never left bound in the registry.
//! - A writer handed an element of the wrong kind reports a writer error
//!   instead of emitting partial output.

use crate::io::registry::{ElementWriter, WriterCapability, WriterRegistry};
use crate::io::tree_writer::{
    Element, ModeContext, SerializeOptions, TreeWriter, WriteError, WriteResult,
};
use crate::model::extension::{ExtensionOwner, ExtensionPayload, ExtensionType, LinkTarget};
use crate::model::node::NodeText;
use std::rc::Rc;

pub const MAP_TAG: &str = "map";
pub const NODE_TAG: &str = "node";
pub const ICON_TAG: &str = "icon";
pub const RICHCONTENT_TAG: &str = "richcontent";
pub const ATTRIBUTE_TAG: &str = "attribute";
pub const SUBMAP_TAG: &str = "submap";

pub const ATTR_VERSION: &str = "version";
pub const ATTR_LOCATION: &str = "location";
pub const ATTR_ID: &str = "ID";
pub const ATTR_TEXT: &str = "TEXT";
pub const ATTR_TYPE: &str = "TYPE";
pub const ATTR_BUILTIN: &str = "BUILTIN";
pub const ATTR_NAME: &str = "NAME";
pub const ATTR_VALUE: &str = "VALUE";
pub const ATTR_LINK: &str = "LINK";

pub const RICHCONTENT_NODE: &str = "NODE";
pub const RICHCONTENT_NOTE: &str = "NOTE";

/// Comment written at the top of every map element.
pub const MAP_PREAMBLE: &str =
    "This file is a mind map document. Open it with a compatible mind-map editor.";

/// Writes the document element: version, location, map extensions, then the
/// root node.
pub struct MapWriter {
    options: SerializeOptions,
}

impl MapWriter {
    pub fn new(options: SerializeOptions) -> Self {
        Self { options }
    }
}

impl ElementWriter for MapWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Both
    }

    fn write_attributes(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        let Element::Map(map) = element else {
            return Err(unexpected(MAP_TAG, element));
        };
        writer.add_attribute(ATTR_VERSION, map.version());
        if let Some(location) = map.location() {
            writer.add_attribute(ATTR_LOCATION, location);
        }
        writer.add_extension_attributes(map, ExtensionOwner::Map, map.extensions())
    }

    fn write_content(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        let Element::Map(map) = element else {
            return Err(unexpected(MAP_TAG, element));
        };
        writer.add_comment(MAP_PREAMBLE);
        writer.add_extension_content(map, ExtensionOwner::Map, map.extensions())?;
        writer.write_node(map, map.root_id(), self.options)
    }
}

/// Writes one node, configured with the options and context of its pass.
pub struct NodeWriter {
    options: SerializeOptions,
    context: Rc<ModeContext>,
}

impl NodeWriter {
    pub fn new(options: SerializeOptions, context: Rc<ModeContext>) -> Self {
        Self { options, context }
    }
}

impl ElementWriter for NodeWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Both
    }

    fn write_attributes(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        let Element::Node { map, node } = element else {
            return Err(unexpected(NODE_TAG, element));
        };
        if !self.options.write_only_intrinsic_ids || self.context.is_intrinsic(node.id()) {
            writer.add_attribute(ATTR_ID, &node.id().to_string());
        }
        if let NodeText::Plain(text) = node.text() {
            writer.add_attribute(ATTR_TEXT, text);
        }
        writer.add_extension_attributes(map, ExtensionOwner::Node(node.id()), node.extensions())
    }

    fn write_content(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        let Element::Node { map, node } = element else {
            return Err(unexpected(NODE_TAG, element));
        };
        if let NodeText::Rich(markup) = node.text() {
            writer.add_leaf_element(
                RICHCONTENT_TAG,
                &[(ATTR_TYPE, RICHCONTENT_NODE)],
                Some(markup.as_str()),
            );
        }
        writer.add_extension_content(map, ExtensionOwner::Node(node.id()), node.extensions())?;

        for (index, icon) in node.icons().iter().enumerate() {
            writer.add_element(
                ICON_TAG,
                &Element::Icon {
                    node: *node,
                    index,
                    icon,
                },
            )?;
        }

        if !self.options.write_children {
            return Ok(());
        }
        for child in node.children() {
            let visible = map.node(*child).is_some_and(|child| child.is_visible());
            if !visible && !self.options.write_invisible_nodes {
                continue;
            }
            writer.write_node(map, *child, self.options)?;
        }
        Ok(())
    }
}

/// `BUILTIN` attribute of one icon element.
pub struct IconWriter;

impl ElementWriter for IconWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Attributes
    }

    fn write_attributes(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        let Element::Icon { icon, .. } = element else {
            return Err(unexpected(ICON_TAG, element));
        };
        writer.add_attribute(ATTR_BUILTIN, icon.name());
        Ok(())
    }
}

pub struct NoteWriter;

impl ElementWriter for NoteWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Content
    }

    fn write_content(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        match element {
            Element::Extension {
                payload: ExtensionPayload::Text(note),
                ..
            } => {
                writer.add_leaf_element(
                    RICHCONTENT_TAG,
                    &[(ATTR_TYPE, RICHCONTENT_NOTE)],
                    Some(note.as_str()),
                );
                Ok(())
            }
            other => Err(unexpected(RICHCONTENT_TAG, other)),
        }
    }
}

/// One `attribute` element per key/value entry, in stored order.
pub struct AttributeTableWriter;

impl ElementWriter for AttributeTableWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Content
    }

    fn write_content(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        match element {
            Element::Extension {
                payload: ExtensionPayload::Properties(entries),
                ..
            } => {
                for (name, value) in entries {
                    writer.add_leaf_element(
                        ATTRIBUTE_TAG,
                        &[(ATTR_NAME, name.as_str()), (ATTR_VALUE, value.as_str())],
                        None,
                    );
                }
                Ok(())
            }
            other => Err(unexpected(ATTRIBUTE_TAG, other)),
        }
    }
}

pub struct LinkWriter;

impl ElementWriter for LinkWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Attributes
    }

    fn write_attributes(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        match element {
            Element::Extension {
                map,
                payload: ExtensionPayload::Link(LinkTarget::Node(target)),
                ..
            } => {
                if !map.contains(*target) {
                    return Err(WriteError::writer(
                        ATTR_LINK,
                        format!("link target {target} is not part of the map"),
                    ));
                }
                writer.add_attribute(ATTR_LINK, &format!("#{target}"));
                Ok(())
            }
            Element::Extension {
                payload: ExtensionPayload::Link(LinkTarget::Url(url)),
                ..
            } => {
                writer.add_attribute(ATTR_LINK, url);
                Ok(())
            }
            other => Err(unexpected(ATTR_LINK, other)),
        }
    }
}

/// Embeds a whole map inside a `submap` element.
///
/// The embedded map is written through the same registry, so its `map` and
/// `node` writers are swapped in reentrantly and the outer ones come back
/// when it returns.
pub struct SubmapWriter;

impl ElementWriter for SubmapWriter {
    fn capability(&self) -> WriterCapability {
        WriterCapability::Content
    }

    fn write_content(
        &self,
        writer: &mut TreeWriter<'_>,
        element: &Element<'_>,
    ) -> WriteResult<()> {
        let Element::Extension {
            payload: ExtensionPayload::Submap(submap),
            ..
        } = element
        else {
            return Err(unexpected(SUBMAP_TAG, element));
        };
        let options = SerializeOptions {
            write_invisible_nodes: true,
            write_children: true,
            ..writer.options()
        };
        writer.begin_element(SUBMAP_TAG);
        writer.write_map(submap, options)?;
        writer.end_element(SUBMAP_TAG);
        Ok(())
    }
}

impl WriterRegistry {
    /// Registry preloaded with the icon writer and the built-in extension
    /// writers. `map`/`node` writers are installed per traversal.
    pub fn with_builtin_writers() -> Self {
        let registry = Self::new();
        registry.bind_tag(ICON_TAG, Rc::new(IconWriter));
        registry.bind_extension(ExtensionType::note(), Rc::new(NoteWriter));
        registry.bind_extension(ExtensionType::attributes(), Rc::new(AttributeTableWriter));
        registry.bind_extension(ExtensionType::link(), Rc::new(LinkWriter));
        registry.bind_extension(ExtensionType::submap(), Rc::new(SubmapWriter));
        registry
    }
}

fn unexpected(tag: &str, element: &Element<'_>) -> WriteError {
    WriteError::writer(tag, format!("unexpected {} element", element.kind()))
}

#[cfg(test)]
mod tests {
    use crate::io::registry::WriterRegistry;
    use crate::io::sink::{RecordingSink, SinkEvent};
    use crate::io::tree_writer::{SerializeOptions, TreeSerializer};
    use crate::model::extension::{ExtensionOwner, ExtensionPayload, ExtensionType, LinkTarget};
    use crate::model::map::MapModel;
    use crate::model::node::{MindIcon, NodeText};

    #[test]
    fn builtin_registry_binds_icon_and_extensions_only() {
        let registry = WriterRegistry::with_builtin_writers();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.count("tag:icon"), 1);
        assert_eq!(snapshot.count("tag:map"), 0);
        assert_eq!(snapshot.count("tag:node"), 0);
        assert_eq!(snapshot.count("extension:note"), 1);
        assert_eq!(snapshot.count("extension:submap"), 1);
    }

    #[test]
    fn node_writes_rich_text_as_richcontent_and_plain_as_attribute() {
        let mut map = MapModel::new(NodeText::plain("R"));
        let root = map.root_id();
        let child = map
            .add_child(root, None, NodeText::rich("<p>rich</p>"))
            .unwrap();
        map.insert_icon(child, 0, MindIcon::new("idea")).unwrap();

        let registry = WriterRegistry::with_builtin_writers();
        let mut sink = RecordingSink::new();
        TreeSerializer::new(&registry)
            .serialize(&mut sink, &map, child, SerializeOptions::default())
            .unwrap();

        let nodes = sink.attributes_of("node");
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].iter().all(|(key, _)| key != "TEXT"));
        assert!(sink
            .events()
            .contains(&SinkEvent::Content("<p>rich</p>".to_string())));
        assert_eq!(
            sink.attributes_of("icon"),
            vec![vec![("BUILTIN".to_string(), "idea".to_string())]]
        );
    }

    #[test]
    fn only_intrinsic_ids_are_written_when_requested() {
        let mut map = MapModel::new(NodeText::plain("R"));
        let root = map.root_id();
        let a = map.add_child(root, None, NodeText::plain("A")).unwrap();
        let b = map.add_child(root, None, NodeText::plain("B")).unwrap();
        map.set_extension(
            ExtensionOwner::Node(a),
            ExtensionType::link(),
            Some(ExtensionPayload::Link(LinkTarget::Node(b))),
        )
        .unwrap();

        let registry = WriterRegistry::with_builtin_writers();
        let mut sink = RecordingSink::new();
        let options = SerializeOptions {
            write_only_intrinsic_ids: true,
            ..SerializeOptions::default()
        };
        TreeSerializer::new(&registry)
            .serialize_map(&mut sink, &map, options)
            .unwrap();

        let ids: Vec<String> = sink
            .attributes_of("node")
            .into_iter()
            .flatten()
            .filter(|(key, _)| key == "ID")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(ids, vec![b.to_string()]);
    }
}
