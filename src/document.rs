//! Owned document tree produced from a fetched resource.
//!
//! HTML goes through `scraper` (html5ever), XML through `quick-xml`. Both end
//! up in the same arena of typed nodes so the rest of the crate never cares
//! which parser built the tree.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::Event;
use scraper::{ElementRef, Html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
    Xml,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Root,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    children: Vec<NodeId>,
}

/// Replacement of one attribute value on one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRewrite {
    pub node: NodeId,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

/// Parses UTF-8 bytes.
pub fn parse(bytes: &[u8], mode: ParseMode) -> Document {
    parse_resource(bytes, None, mode)
}

/// Parses a fetched body, decoding it with the `charset` from its
/// `Content-Type` (UTF-8 when absent or unknown; a BOM wins over both).
pub fn parse_resource(bytes: &[u8], content_type: Option<&str>, mode: ParseMode) -> Document {
    let text = decode_body(bytes, content_type);
    match mode {
        ParseMode::Html => parse_html(&text),
        ParseMode::Xml => parse_xml(&text),
    }
}

fn decode_body<'a>(bytes: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let encoding = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = used.name(), "body had undecodable bytes");
    }
    text
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\''))
    })
}

fn parse_html(text: &str) -> Document {
    let html = Html::parse_document(text);
    let mut doc = Document::empty();
    let root = doc.root();
    doc.import_element(root, html.root_element());
    doc
}

fn parse_xml(text: &str) -> Document {
    let mut doc = Document::empty();
    let mut stack = vec![doc.root()];
    let mut reader = quick_xml::Reader::from_str(text);
    let mut buf = Vec::new();

    loop {
        let parent = stack.last().copied().unwrap_or_else(|| doc.root());
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let id = doc.push(parent, xml_element(e));
                stack.push(id);
            }
            Ok(Event::Empty(ref e)) => {
                doc.push(parent, xml_element(e));
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(e).into_owned(),
                };
                doc.push(parent, NodeData::Text(text));
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                doc.push(parent, NodeData::Text(text));
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::debug!(
                    position = reader.buffer_position(),
                    %err,
                    "xml parse stopped early; keeping partial tree"
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    doc
}

fn xml_element(e: &quick_xml::events::BytesStart<'_>) -> NodeData {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_ascii_lowercase();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect();
    NodeData::Element { name, attrs }
}

impl Document {
    fn empty() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Root,
                children: Vec::new(),
            }],
        }
    }

    fn push(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn import_element(&mut self, parent: NodeId, element: ElementRef<'_>) {
        let value = element.value();
        let data = NodeData::Element {
            name: value.name().to_ascii_lowercase(),
            attrs: value
                .attrs()
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
                .collect(),
        };
        let id = self.push(parent, data);

        for child in element.children() {
            match child.value() {
                scraper::Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.import_element(id, child);
                    }
                }
                scraper::Node::Text(text) => {
                    self.push(id, NodeData::Text(String::from(&**text)));
                }
                _ => {}
            }
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The first `body` element in document order, if any.
    pub fn body(&self) -> Option<NodeId> {
        self.elements_named(self.root(), "body").next()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Every node below `id` in depth-first document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = self.children(id).iter().rev().copied().collect();
        Descendants { doc: self, stack }
    }

    pub fn elements_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(id)
            .filter(move |&node| self.name(node) == Some(name))
    }

    /// All descendant text joined, with whitespace runs collapsed and trimmed.
    /// Text runs are not stripped one by one, so `a <b>b</b>` reads `a b`
    /// rather than the run-stripped `ab`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut raw = String::new();
        for node in self.descendants(id) {
            if let NodeData::Text(text) = &self.nodes[node.0].data {
                raw.push_str(text);
            }
        }
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// A copy of this document with the given attribute values replaced.
    pub fn with_attributes(&self, rewrites: &[AttributeRewrite]) -> Document {
        let mut doc = self.clone();
        for rewrite in rewrites {
            let Some(node) = doc.nodes.get_mut(rewrite.node.0) else {
                continue;
            };
            if let NodeData::Element { attrs, .. } = &mut node.data {
                match attrs
                    .iter_mut()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&rewrite.name))
                {
                    Some((_, value)) => *value = rewrite.value.clone(),
                    None => attrs.push((rewrite.name.clone(), rewrite.value.clone())),
                }
            }
        }
        doc
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(id).iter().rev().copied());
        Some(id)
    }
}
