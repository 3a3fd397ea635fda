//! Streaming XML sink backed by `quick-xml`.

use crate::io::sink::{SinkError, SinkResult, TreeSink};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

/// Writes sink events as XML to any byte destination.
///
/// An element start is held back until its first content or child so that
/// attributes can still be appended; childless elements are written as
/// empty elements (`<icon BUILTIN="idea"/>`).
pub struct XmlSink<W: Write> {
    writer: Writer<W>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
}

impl<W: Write> XmlSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
            pending: None,
            open: Vec::new(),
        }
    }

    /// Flushes and returns the destination.
    ///
    /// # Errors
    /// - `UnclosedElements` when the event stream was not balanced.
    /// - `Io` when the final flush fails.
    pub fn finish(mut self) -> SinkResult<W> {
        if !self.open.is_empty() {
            return Err(SinkError::UnclosedElements(std::mem::take(&mut self.open)));
        }
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }

    fn commit_pending(&mut self) -> SinkResult<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }
}

impl<W: Write> TreeSink for XmlSink<W> {
    fn open_element(&mut self, tag: &str) -> SinkResult<()> {
        self.commit_pending()?;
        self.pending = Some(BytesStart::new(tag.to_string()));
        self.open.push(tag.to_string());
        Ok(())
    }

    fn add_attribute(&mut self, key: &str, value: &str) -> SinkResult<()> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((key, value));
                Ok(())
            }
            None => Err(SinkError::AttributeOutsideElement {
                key: key.to_string(),
            }),
        }
    }

    fn add_content(&mut self, text: &str) -> SinkResult<()> {
        self.commit_pending()?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    fn add_comment(&mut self, text: &str) -> SinkResult<()> {
        if text.contains("--") || text.ends_with('-') {
            return Err(SinkError::InvalidComment(text.to_string()));
        }
        self.commit_pending()?;
        self.writer
            .write_event(Event::Comment(BytesText::from_escaped(text)))?;
        Ok(())
    }

    fn close_element(&mut self, tag: &str) -> SinkResult<()> {
        match self.open.pop() {
            Some(expected) if expected == tag => {}
            expected => {
                return Err(SinkError::MismatchedClose {
                    expected,
                    found: tag.to_string(),
                })
            }
        }
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self
                .writer
                .write_event(Event::End(BytesEnd::new(tag.to_string())))?,
        }
        Ok(())
    }
}
