//! A small owned XML tree over quick-xml, used as the content of every XML part.
//!
//! The tree keeps qualified names exactly as written (`p:sldId`) so parts are
//! written back with their original prefixes. Lookups by local name ignore the
//! prefix.

use crate::constants::namespace;
use crate::error::{Error, Result};
use crate::types::RelId;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{HashMap, HashSet};

/// Elements that are pure list entries keyed by a relationship id. When the
/// relationship goes away the whole entry goes with it.
const LIST_ENTRY_ELEMENTS: &[&str] = &[
    "sldId",
    "sldLayoutId",
    "sldMasterId",
    "notesMasterId",
    "handoutMasterId",
];

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A parsed XML part.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    /// Parse a UTF-8 XML document.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    stack.push(element_from_start(e)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::XmlError("Unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::XmlError(format!("Invalid text: {}", e)))?;
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e).into_owned();
                        parent.children.push(XmlNode::CData(text));
                    }
                }
                Ok(Event::Comment(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e).into_owned();
                        parent.children.push(XmlNode::Comment(text));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!(
                        "Error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                // Declarations and processing instructions are regenerated on write.
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::XmlError("Unclosed element at end of document".to_string()));
        }
        root.map(Self::new)
            .ok_or_else(|| Error::XmlError("Document has no root element".to_string()))
    }

    /// Serialize with a standalone UTF-8 declaration.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_write_error)?;
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::XmlError(format!("Invalid attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::XmlError(format!("Invalid attribute value: {}", e)))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::XmlError("Multiple root elements".to_string())),
    }
    Ok(())
}

fn xml_write_error(e: quick_xml::Error) -> Error {
    Error::XmlError(format!("Failed to write XML: {}", e))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_write_error);
    }

    writer.write_event(Event::Start(start)).map_err(xml_write_error)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(xml_write_error)?,
            XmlNode::CData(t) => writer
                .write_event(Event::CData(BytesCData::new(t.as_str())))
                .map_err(xml_write_error)?,
            XmlNode::Comment(t) => writer
                .write_event(Event::Comment(BytesText::from_escaped(t.as_str())))
                .map_err(xml_write_error)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_write_error)
}

fn local_part(name: &str) -> &str {
    match name.find(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.find(':').map(|pos| &self.name[..pos])
    }

    /// Qualify a local name with this element's prefix.
    pub fn qualify(&self, local: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.local_name() == local)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.local_name() == local)
    }

    /// Follow a path of local names from this element.
    pub fn path(&self, locals: &[&str]) -> Option<&XmlElement> {
        locals.iter().try_fold(self, |current, local| current.child(local))
    }

    pub fn path_mut(&mut self, locals: &[&str]) -> Option<&mut XmlElement> {
        let mut current = self;
        for local in locals {
            current = current.child_mut(local)?;
        }
        Some(current)
    }

    /// First descendant (depth first, self excluded) with the given local name.
    pub fn descendant(&self, local: &str) -> Option<&XmlElement> {
        for child in self.elements() {
            if child.local_name() == local {
                return Some(child);
            }
            if let Some(found) = child.descendant(local) {
                return Some(found);
            }
        }
        None
    }

    pub fn descendant_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        for child in self.elements_mut() {
            if child.local_name() == local {
                return Some(child);
            }
            if let Some(found) = child.descendant_mut(local) {
                return Some(found);
            }
        }
        None
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Insert an element child before the `index`-th element child.
    pub fn insert_element(&mut self, index: usize, child: XmlElement) {
        let node_index = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, XmlNode::Element(_)))
            .nth(index)
            .map(|(i, _)| i)
            .unwrap_or(self.children.len());
        self.children.insert(node_index, XmlNode::Element(child));
    }

    /// Return the child with `local` name, creating it right after the last
    /// present sibling named in `after` (or first) when missing.
    pub fn ensure_child(&mut self, local: &str, after: &[&str]) -> &mut XmlElement {
        let existing = self.children.iter().position(
            |node| matches!(node, XmlNode::Element(e) if e.local_name() == local),
        );
        let index = match existing {
            Some(index) => index,
            None => {
                let anchor = self
                    .children
                    .iter()
                    .rposition(|node| {
                        matches!(node, XmlNode::Element(e) if after.contains(&e.local_name()))
                    })
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let name = self.qualify(local);
                self.children
                    .insert(anchor, XmlNode::Element(XmlElement::new(name)));
                anchor
            }
        };
        match &mut self.children[index] {
            XmlNode::Element(e) => e,
            _ => unreachable!("index points at an element node"),
        }
    }

    /// Remove every direct child with the given local name; returns how many went.
    pub fn remove_children(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, XmlNode::Element(e) if e.local_name() == local));
        before - self.children.len()
    }

    /// Keep only the element children for which `keep` returns true.
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&XmlElement) -> bool) {
        self.children.retain(|node| match node {
            XmlNode::Element(e) => keep(e),
            _ => true,
        });
    }

    /// Concatenated text content of the direct children.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => text.push_str(t),
                _ => {}
            }
        }
        text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    /// Visit this element and every descendant element, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a XmlElement)) {
        visit(self);
        for child in self.elements() {
            child.walk(visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut XmlElement)) {
        visit(self);
        for child in self.elements_mut() {
            child.walk_mut(visit);
        }
    }

    /// Drop whitespace-only text nodes in the whole subtree.
    pub fn strip_whitespace(&mut self) {
        self.children
            .retain(|node| !matches!(node, XmlNode::Text(t) if t.trim().is_empty()));
        for child in self.elements_mut() {
            child.strip_whitespace();
        }
    }
}

/// Prefixes bound to the office relationships namespace anywhere in the tree.
pub fn relationship_prefixes(root: &XmlElement) -> HashSet<String> {
    let mut prefixes = HashSet::new();
    root.walk(&mut |element| {
        for (key, value) in &element.attributes {
            if value == namespace::OFC_RELATIONSHIPS {
                if let Some(prefix) = key.strip_prefix("xmlns:") {
                    prefixes.insert(prefix.to_string());
                }
            }
        }
    });
    prefixes
}

fn is_relationship_attr(key: &str, prefixes: &HashSet<String>) -> bool {
    match key.find(':') {
        Some(pos) => prefixes.contains(&key[..pos]),
        None => false,
    }
}

/// Every relationship id referenced from an attribute in the tree.
pub fn relationship_refs(root: &XmlElement) -> Vec<RelId> {
    let prefixes = relationship_prefixes(root);
    let mut refs = Vec::new();
    root.walk(&mut |element| {
        for (key, value) in &element.attributes {
            if !value.is_empty() && is_relationship_attr(key, &prefixes) {
                refs.push(RelId::new(value.as_str()));
            }
        }
    });
    refs
}

/// Rewrite relationship-id attributes through `mapping`.
///
/// `Some(new)` replaces the id. `None` means the relationship was dropped: list
/// entries such as `p:sldLayoutId` are removed, any other attribute is blanked.
/// Ids missing from the mapping are left untouched.
pub fn rewrite_relationship_refs(root: &mut XmlElement, mapping: &HashMap<RelId, Option<RelId>>) {
    let prefixes = relationship_prefixes(root);
    rewrite_element(root, mapping, &prefixes);
}

fn rewrite_element(
    element: &mut XmlElement,
    mapping: &HashMap<RelId, Option<RelId>>,
    prefixes: &HashSet<String>,
) {
    element.retain_elements(|child| {
        !(LIST_ENTRY_ELEMENTS.contains(&child.local_name())
            && child.attributes.iter().any(|(key, value)| {
                is_relationship_attr(key, prefixes)
                    && matches!(mapping.get(&RelId::new(value.as_str())), Some(None))
            }))
    });

    for (key, value) in element.attributes.iter_mut() {
        if !is_relationship_attr(key, prefixes) {
            continue;
        }
        match mapping.get(&RelId::new(value.as_str())) {
            Some(Some(new_id)) => *value = new_id.to_string(),
            Some(None) => value.clear(),
            None => {}
        }
    }

    for child in element.elements_mut() {
        rewrite_element(child, mapping, prefixes);
    }
}

/// The prefix to use for new relationship attributes, declaring `r` on the
/// root when the namespace is not bound yet.
pub fn ensure_relationship_prefix(root: &mut XmlElement) -> String {
    let mut prefixes: Vec<String> = relationship_prefixes(root).into_iter().collect();
    prefixes.sort();
    if let Some(prefix) = prefixes.into_iter().next() {
        return prefix;
    }
    root.set_attr("xmlns:r", namespace::OFC_RELATIONSHIPS);
    "r".to_string()
}
