//! Output sink contract for the tree serializer.
//!
//! # Responsibility
//! - Define the markup-agnostic event vocabulary writers emit.
//! - Provide an in-memory recording sink used for per-element buffering.
//!
//! # Invariants
//! - Attributes belong to the most recently opened element and must precede
//!   its content and children.
//! - `close_element` tags match `open_element` tags in LIFO order.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failures reported by a sink while emitting.
#[derive(Debug)]
pub enum SinkError {
    /// Underlying byte destination failed.
    Io(std::io::Error),
    /// XML encoder failure (includes wrapped I/O failures).
    Xml(quick_xml::Error),
    /// Attribute emitted after the element start was already committed.
    AttributeOutsideElement { key: String },
    /// Close tag does not match the innermost open element.
    MismatchedClose {
        expected: Option<String>,
        found: String,
    },
    /// Sink finished with elements still open.
    UnclosedElements(Vec<String>),
    /// Comment text contains `--` or ends with `-`.
    InvalidComment(String),
}

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "sink i/o failure: {err}"),
            Self::Xml(err) => write!(f, "xml sink failure: {err}"),
            Self::AttributeOutsideElement { key } => {
                write!(f, "attribute `{key}` emitted outside an element start")
            }
            Self::MismatchedClose { expected, found } => match expected {
                Some(expected) => {
                    write!(f, "close tag `{found}` does not match open element `{expected}`")
                }
                None => write!(f, "close tag `{found}` without open element"),
            },
            Self::UnclosedElements(tags) => {
                write!(f, "sink finished with open elements: {}", tags.join(","))
            }
            Self::InvalidComment(text) => write!(f, "comment cannot be written: {text:?}"),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Xml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<quick_xml::Error> for SinkError {
    fn from(value: quick_xml::Error) -> Self {
        Self::Xml(value)
    }
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Append-only structured output destination.
pub trait TreeSink {
    fn open_element(&mut self, tag: &str) -> SinkResult<()>;
    fn add_attribute(&mut self, key: &str, value: &str) -> SinkResult<()>;
    /// Adds text content; the sink is responsible for escaping.
    fn add_content(&mut self, text: &str) -> SinkResult<()>;
    /// Adds preamble/comment text.
    fn add_comment(&mut self, text: &str) -> SinkResult<()>;
    fn close_element(&mut self, tag: &str) -> SinkResult<()>;
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Open(String),
    Attribute(String, String),
    Content(String),
    Comment(String),
    Close(String),
}

impl SinkEvent {
    /// Replays this event into another sink.
    pub fn replay(&self, sink: &mut dyn TreeSink) -> SinkResult<()> {
        match self {
            Self::Open(tag) => sink.open_element(tag),
            Self::Attribute(key, value) => sink.add_attribute(key, value),
            Self::Content(text) => sink.add_content(text),
            Self::Comment(text) => sink.add_comment(text),
            Self::Close(tag) => sink.close_element(tag),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SinkEvent> {
        self.events
    }

    /// Attribute pairs of every element named `tag`, in document order.
    pub fn attributes_of(&self, tag: &str) -> Vec<Vec<(String, String)>> {
        let mut out = Vec::new();
        let mut current: Option<Vec<(String, String)>> = None;
        for event in &self.events {
            match event {
                SinkEvent::Open(name) => {
                    if let Some(done) = current.take() {
                        out.push(done);
                    }
                    if name == tag {
                        current = Some(Vec::new());
                    }
                }
                SinkEvent::Attribute(key, value) => {
                    if let Some(attrs) = current.as_mut() {
                        attrs.push((key.clone(), value.clone()));
                    }
                }
                _ => {
                    if let Some(done) = current.take() {
                        out.push(done);
                    }
                }
            }
        }
        if let Some(done) = current {
            out.push(done);
        }
        out
    }
}

impl TreeSink for RecordingSink {
    fn open_element(&mut self, tag: &str) -> SinkResult<()> {
        self.events.push(SinkEvent::Open(tag.to_string()));
        Ok(())
    }

    fn add_attribute(&mut self, key: &str, value: &str) -> SinkResult<()> {
        self.events
            .push(SinkEvent::Attribute(key.to_string(), value.to_string()));
        Ok(())
    }

    fn add_content(&mut self, text: &str) -> SinkResult<()> {
        self.events.push(SinkEvent::Content(text.to_string()));
        Ok(())
    }

    fn add_comment(&mut self, text: &str) -> SinkResult<()> {
        self.events.push(SinkEvent::Comment(text.to_string()));
        Ok(())
    }

    fn close_element(&mut self, tag: &str) -> SinkResult<()> {
        self.events.push(SinkEvent::Close(tag.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordingSink, SinkEvent, TreeSink};

    #[test]
    fn collects_attributes_per_element() {
        let mut sink = RecordingSink::new();
        sink.open_element("node").unwrap();
        sink.add_attribute("TEXT", "R").unwrap();
        sink.open_element("icon").unwrap();
        sink.add_attribute("BUILTIN", "idea").unwrap();
        sink.close_element("icon").unwrap();
        sink.open_element("icon").unwrap();
        sink.close_element("icon").unwrap();
        sink.close_element("node").unwrap();

        let icons = sink.attributes_of("icon");
        assert_eq!(icons.len(), 2);
        assert_eq!(icons[0], vec![("BUILTIN".to_string(), "idea".to_string())]);
        assert!(icons[1].is_empty());
        assert_eq!(sink.events().first(), Some(&SinkEvent::Open("node".into())));
    }
}
