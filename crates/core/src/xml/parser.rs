//! XML parser that builds an [`XmlTree`] arena.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::tree::{NodeId, XmlTree};
use crate::errors::XmlError;

/// Parse XML text into an arena tree.
///
/// Character data follows element-tree semantics: text before an element's
/// first child becomes its `text`, text after a child's end tag becomes that
/// child's `tail`. Whitespace-only runs are indentation and are dropped.
/// Comments, processing instructions, the declaration and DOCTYPE are
/// skipped.
pub fn parse(content: &str) -> Result<XmlTree, XmlError> {
    XmlParser::new(content).parse()
}

/// Internal parser state.
struct XmlParser<'a> {
    reader: Reader<&'a [u8]>,

    /// Tree under construction; created at the first root element.
    tree: Option<XmlTree>,

    /// Open elements, innermost last.
    stack: Vec<NodeId>,
}

impl<'a> XmlParser<'a> {
    fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        Self {
            reader,
            tree: None,
            stack: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<XmlTree, XmlError> {
        loop {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = self.open_element(&e)?;
                    self.stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    self.open_element(&e)?;
                }
                Ok(Event::End(e)) => {
                    let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let id = self.stack.pop().ok_or_else(|| XmlError::Syntax {
                        message: format!("unexpected closing tag </{found}>"),
                        position: self.reader.buffer_position(),
                    })?;
                    let tree = self.tree_mut()?;
                    if tree.tag(id) != found {
                        return Err(XmlError::MismatchedEndTag {
                            expected: tree.tag(id).to_string(),
                            found,
                        });
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| XmlError::Syntax {
                        message: format!("invalid text content: {err}"),
                        position: self.reader.buffer_position(),
                    })?;
                    self.push_text(&text)?;
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    self.push_text(&text)?;
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(XmlError::Syntax {
                        message: e.to_string(),
                        position: self.reader.error_position(),
                    });
                }
            }
        }

        if let Some(&open) = self.stack.last() {
            let tree = self.tree_mut()?;
            return Err(XmlError::UnexpectedEof {
                expected: tree.tag(open).to_string(),
            });
        }

        self.tree.ok_or(XmlError::EmptyDocument)
    }

    fn tree_mut(&mut self) -> Result<&mut XmlTree, XmlError> {
        self.tree.as_mut().ok_or(XmlError::EmptyDocument)
    }

    /// Create an element for a start or empty tag and attach it to the
    /// current parent (or make it the root).
    fn open_element(&mut self, e: &BytesStart<'_>) -> Result<NodeId, XmlError> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let attributes = self.parse_attributes(e)?;

        let id = match self.stack.last().copied() {
            Some(parent) => {
                let tree = self.tree_mut()?;
                let id = tree.new_element(&tag, &[]);
                tree.append_child(parent, id);
                id
            }
            None if self.tree.is_some() => return Err(XmlError::MultipleRoots),
            None => {
                let tree = XmlTree::new(tag);
                let root = tree.root();
                self.tree = Some(tree);
                root
            }
        };
        let tree = self.tree_mut()?;
        for (key, value) in attributes {
            tree.set_attr(id, &key, value);
        }
        Ok(id)
    }

    fn parse_attributes(&self, e: &BytesStart<'_>) -> Result<Vec<(String, String)>, XmlError> {
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| XmlError::Syntax {
                message: err.to_string(),
                position: self.reader.buffer_position(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Syntax {
                    message: format!("invalid value for attribute '{key}': {err}"),
                    position: self.reader.buffer_position(),
                })?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(attributes)
    }

    /// Attach character data as the open element's text or as the tail of
    /// its most recent child.
    fn push_text(&mut self, text: &str) -> Result<(), XmlError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let Some(&open) = self.stack.last() else {
            // Character data outside the root element.
            return Ok(());
        };
        let tree = self.tree_mut()?;
        match tree.children(open).last().copied() {
            Some(last) => {
                let tail = append(tree.tail(last), text);
                tree.set_tail(last, Some(tail));
            }
            None => {
                let body = append(tree.text(open), text);
                tree.set_text(open, Some(body));
            }
        }
        Ok(())
    }
}

fn append(existing: Option<&str>, text: &str) -> String {
    match existing {
        Some(prev) => format!("{prev}{text}"),
        None => text.to_string(),
    }
}
