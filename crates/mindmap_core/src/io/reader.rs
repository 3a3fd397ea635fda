//! Map reader for the built-in XML dialect.
//!
//! # Responsibility
//! - Parse documents written by the built-in writers back into a `MapModel`.
//! - Resolve `#ID_...` node links once the whole map scope has been read.
//!
//! # Invariants
//! - Unknown elements and attributes are skipped.
//! - Ids in the native `ID_<hex>` form are kept; any other id is replaced by a
//!   fresh one. Link resolution uses the id as written in the document.
//! - Each embedded sub-map is its own id and link scope.
//! - Every node read back is visible.

use crate::io::builtin::{
    ATTRIBUTE_TAG, ATTR_BUILTIN, ATTR_ID, ATTR_LINK, ATTR_LOCATION, ATTR_NAME, ATTR_TEXT,
    ATTR_TYPE, ATTR_VALUE, ATTR_VERSION, ICON_TAG, MAP_TAG, NODE_TAG, RICHCONTENT_NODE,
    RICHCONTENT_NOTE, RICHCONTENT_TAG, SUBMAP_TAG,
};
use crate::model::extension::{ExtensionMap, ExtensionPayload, ExtensionType, LinkTarget};
use crate::model::map::{MapModel, ModelError};
use crate::model::node::{MindIcon, NodeId, NodeText};
use crate::model::snapshot::NodeSnapshot;
use log::{error, info};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Result type for map reading.
pub type ReadResult<T> = Result<T, ReadError>;

/// Errors raised while reading a document.
#[derive(Debug)]
pub enum ReadError {
    /// Malformed XML.
    Xml(quick_xml::Error),
    /// Malformed attribute syntax.
    Attribute(AttrError),
    /// Input holds no element at all.
    EmptyDocument,
    /// Input ended with elements still open.
    UnclosedElement(String),
    /// Document element is not a map.
    UnexpectedRoot(String),
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// Map element has no root node.
    MissingRootNode,
    /// Two nodes in one map scope carry the same `ID`.
    DuplicateNodeId(String),
    Model(ModelError),
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xml(err) => write!(f, "malformed map document: {err}"),
            Self::Attribute(err) => write!(f, "malformed attribute: {err}"),
            Self::EmptyDocument => write!(f, "map document is empty"),
            Self::UnclosedElement(tag) => write!(f, "element `{tag}` is not closed"),
            Self::UnexpectedRoot(tag) => {
                write!(f, "expected `{MAP_TAG}` document element, found `{tag}`")
            }
            Self::MissingAttribute { element, attribute } => {
                write!(f, "element `{element}` is missing attribute `{attribute}`")
            }
            Self::MissingRootNode => write!(f, "map element has no root `{NODE_TAG}`"),
            Self::DuplicateNodeId(id) => write!(f, "node id appears twice: {id}"),
            Self::Model(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Xml(err) => Some(err),
            Self::Attribute(err) => Some(err),
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for ReadError {
    fn from(value: quick_xml::Error) -> Self {
        Self::Xml(value)
    }
}

impl From<AttrError> for ReadError {
    fn from(value: AttrError) -> Self {
        Self::Attribute(value)
    }
}

impl From<ModelError> for ReadError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

/// Reads one map document.
///
/// `location` is where the document came from. When it is `None` the
/// location written in the document is kept; embedded sub-maps always keep
/// their own.
///
/// # Errors
/// - `Xml`/`Attribute`/`UnclosedElement` for malformed input.
/// - `UnexpectedRoot`, `MissingAttribute` or `MissingRootNode` when the
///   document is not a map.
/// - `DuplicateNodeId` when one map scope repeats an `ID`.
pub fn read_map(xml: &str, location: Option<String>) -> ReadResult<MapModel> {
    let started_at = Instant::now();
    let result = parse_document(xml).and_then(|document| {
        if document.name != MAP_TAG {
            return Err(ReadError::UnexpectedRoot(document.name));
        }
        map_from_element(&document, location)
    });

    match &result {
        Ok(map) => info!(
            "event=map_read module=io status=ok nodes={} duration_ms={}",
            map.node_count(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=map_read module=io status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

/// Parsed element with attributes, child elements and concatenated text.
#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> ReadResult<Self> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn parse_document(xml: &str) -> ReadResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<XmlElement> = Vec::new();
    let mut document: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => open.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut open, &mut document, element);
            }
            Event::End(_) => {
                if let Some(element) = open.pop() {
                    attach(&mut open, &mut document, element);
                }
            }
            Event::Text(text) => {
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = open.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(data.into_inner().as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.pop() {
        return Err(ReadError::UnclosedElement(unclosed.name));
    }
    document.ok_or(ReadError::EmptyDocument)
}

fn attach(open: &mut [XmlElement], document: &mut Option<XmlElement>, element: XmlElement) {
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if document.is_none() {
                *document = Some(element);
            }
        }
    }
}

/// Id table of one map scope.
#[derive(Default)]
struct IdScope {
    by_raw: HashMap<String, NodeId>,
}

impl IdScope {
    fn assign(&mut self, raw: Option<&str>) -> ReadResult<NodeId> {
        let Some(raw) = raw else {
            return Ok(NodeId::generate());
        };
        if self.by_raw.contains_key(raw) {
            return Err(ReadError::DuplicateNodeId(raw.to_string()));
        }
        let id = raw.parse::<NodeId>().unwrap_or_else(|_| NodeId::generate());
        self.by_raw.insert(raw.to_string(), id);
        Ok(id)
    }

    /// Rewrites `#<raw id>` URL links that name a node of this scope.
    fn resolve_links(&self, extensions: &mut ExtensionMap) {
        for payload in extensions.values_mut() {
            let resolved = match payload {
                ExtensionPayload::Link(LinkTarget::Url(url)) => url
                    .strip_prefix('#')
                    .and_then(|raw| self.by_raw.get(raw))
                    .copied(),
                _ => None,
            };
            if let Some(target) = resolved {
                *payload = ExtensionPayload::Link(LinkTarget::Node(target));
            }
        }
    }

    fn resolve_subtree_links(&self, snapshot: &mut NodeSnapshot) {
        self.resolve_links(&mut snapshot.extensions);
        for child in &mut snapshot.children {
            self.resolve_subtree_links(child);
        }
    }
}

fn map_from_element(element: &XmlElement, location: Option<String>) -> ReadResult<MapModel> {
    let version = element
        .attribute(ATTR_VERSION)
        .ok_or(ReadError::MissingAttribute {
            element: MAP_TAG,
            attribute: ATTR_VERSION,
        })?;
    let root = element
        .children_named(NODE_TAG)
        .next()
        .ok_or(ReadError::MissingRootNode)?;
    let location = location.or_else(|| element.attribute(ATTR_LOCATION).map(str::to_string));

    let mut scope = IdScope::default();
    let mut extensions = extensions_from_element(element)?;
    let mut root = node_from_element(root, &mut scope)?;

    scope.resolve_links(&mut extensions);
    scope.resolve_subtree_links(&mut root);
    Ok(MapModel::from_snapshot(version, location, &root, extensions)?)
}

fn node_from_element(element: &XmlElement, scope: &mut IdScope) -> ReadResult<NodeSnapshot> {
    let id = scope.assign(element.attribute(ATTR_ID))?;
    let rich = element
        .children_named(RICHCONTENT_TAG)
        .find(|child| child.attribute(ATTR_TYPE) == Some(RICHCONTENT_NODE));
    let text = match rich {
        Some(rich) => NodeText::rich(rich.text.as_str()),
        None => NodeText::plain(element.attribute(ATTR_TEXT).unwrap_or_default()),
    };
    let icons = element
        .children_named(ICON_TAG)
        .filter_map(|icon| icon.attribute(ATTR_BUILTIN))
        .map(MindIcon::new)
        .collect();
    let extensions = extensions_from_element(element)?;
    let children = element
        .children_named(NODE_TAG)
        .map(|child| node_from_element(child, scope))
        .collect::<ReadResult<Vec<_>>>()?;

    Ok(NodeSnapshot {
        id,
        text,
        icons,
        extensions,
        visible: true,
        children,
    })
}

/// Extensions carried by a map or node element.
fn extensions_from_element(element: &XmlElement) -> ReadResult<ExtensionMap> {
    let mut extensions = ExtensionMap::new();

    if let Some(link) = element.attribute(ATTR_LINK) {
        extensions.insert(
            ExtensionType::link(),
            ExtensionPayload::Link(LinkTarget::Url(link.to_string())),
        );
    }
    if let Some(note) = element
        .children_named(RICHCONTENT_TAG)
        .find(|child| child.attribute(ATTR_TYPE) == Some(RICHCONTENT_NOTE))
    {
        extensions.insert(
            ExtensionType::note(),
            ExtensionPayload::Text(note.text.clone()),
        );
    }

    let entries: Vec<(String, String)> = element
        .children_named(ATTRIBUTE_TAG)
        .filter_map(|entry| {
            let name = entry.attribute(ATTR_NAME)?;
            Some((
                name.to_string(),
                entry.attribute(ATTR_VALUE).unwrap_or_default().to_string(),
            ))
        })
        .collect();
    if !entries.is_empty() {
        extensions.insert(
            ExtensionType::attributes(),
            ExtensionPayload::Properties(entries),
        );
    }

    if let Some(submap) = element
        .children_named(SUBMAP_TAG)
        .find_map(|submap| submap.children_named(MAP_TAG).next())
    {
        let embedded = map_from_element(submap, None)?;
        extensions.insert(
            ExtensionType::submap(),
            ExtensionPayload::Submap(Box::new(embedded)),
        );
    }
    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::{read_map, ReadError};
    use crate::model::extension::{ExtensionPayload, ExtensionType, LinkTarget};
    use crate::model::node::NodeText;

    #[test]
    fn reads_foreign_ids_and_resolves_links() {
        let xml = r##"<map version="1.0.1"><node ID="ID_1" TEXT="R"><node ID="ID_2" TEXT="A" LINK="#ID_3"/><node ID="ID_3" TEXT="B"/></node></map>"##;
        let map = read_map(xml, Some("/tmp/a.mm".to_string())).unwrap();

        assert_eq!(map.location(), Some("/tmp/a.mm"));
        assert_eq!(map.node_count(), 3);
        let children = map.root().children();
        let a = map.node(children[0]).unwrap();
        assert_eq!(a.text(), &NodeText::plain("A"));
        assert_eq!(
            a.extensions().get(&ExtensionType::link()),
            Some(&ExtensionPayload::Link(LinkTarget::Node(children[1])))
        );
    }

    #[test]
    fn keeps_unresolved_fragment_links_verbatim() {
        let xml = r##"<map version="1"><node TEXT="R" LINK="#missing"/></map>"##;
        let map = read_map(xml, None).unwrap();
        assert_eq!(
            map.root().extensions().get(&ExtensionType::link()),
            Some(&ExtensionPayload::Link(LinkTarget::Url("#missing".into())))
        );
    }

    #[test]
    fn skips_unknown_elements_and_reads_rich_text() {
        let xml = r#"<map version="1"><!-- c --><node TEXT="ignored"><hook NAME="x"/><richcontent TYPE="NODE">&lt;b&gt;R&lt;/b&gt;</richcontent></node></map>"#;
        let map = read_map(xml, None).unwrap();
        assert_eq!(map.root().text(), &NodeText::rich("<b>R</b>"));
        assert!(map.root().extensions().is_empty());
    }

    #[test]
    fn rejects_non_map_documents() {
        assert!(matches!(
            read_map("<node/>", None).unwrap_err(),
            ReadError::UnexpectedRoot(_)
        ));
        assert!(matches!(
            read_map("<map><node/></map>", None).unwrap_err(),
            ReadError::MissingAttribute { .. }
        ));
        assert!(matches!(
            read_map(r#"<map version="1"/>"#, None).unwrap_err(),
            ReadError::MissingRootNode
        ));
        assert!(matches!(
            read_map("", None).unwrap_err(),
            ReadError::EmptyDocument
        ));
    }

    #[test]
    fn caller_location_overrides_written_one() {
        let xml = r#"<map version="1" location="old.mm"><node TEXT="R"/></map>"#;
        assert_eq!(read_map(xml, None).unwrap().location(), Some("old.mm"));
        let map = read_map(xml, Some("new.mm".to_string())).unwrap();
        assert_eq!(map.location(), Some("new.mm"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let xml = r#"<map version="1"><node ID="n" TEXT="R"><node ID="n" TEXT="A"/></node></map>"#;
        assert!(matches!(
            read_map(xml, None).unwrap_err(),
            ReadError::DuplicateNodeId(id) if id == "n"
        ));
    }
}
