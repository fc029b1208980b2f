//! Serialise an [`XmlTree`] back to text.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::tree::{NodeId, XmlTree};
use crate::errors::XmlError;

/// Write the whole tree with an XML declaration, tab-indented.
pub fn to_string(tree: &XmlTree) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;
    write_node(&mut writer, tree, tree.root())?;
    finish(writer)
}

/// Write a single subtree without a declaration. Used for conflict records.
pub fn subtree_to_string(tree: &XmlTree, node: NodeId) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, tree, node)?;
    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, XmlError> {
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Encoding(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, tree: &XmlTree, id: NodeId) -> Result<(), XmlError> {
    let tag = tree.tag(id);
    let mut start = BytesStart::new(tag);
    for (key, value) in tree.attributes(id) {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let children = tree.children(id);
    let text = tree.text(id);
    if children.is_empty() && text.is_none() {
        writer.write_event(Event::Empty(start)).map_err(write_err)?;
    } else {
        writer.write_event(Event::Start(start)).map_err(write_err)?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_err)?;
        }
        for &child in children {
            write_node(writer, tree, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(write_err)?;
    }

    if let Some(tail) = tree.tail(id) {
        writer
            .write_event(Event::Text(BytesText::new(tail)))
            .map_err(write_err)?;
    }
    Ok(())
}

fn write_err(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write(e.to_string())
}
