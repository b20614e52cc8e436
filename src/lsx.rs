//! Minimal element tree for Larian `.lsx` documents.
//!
//! The tree keeps every piece of markup it was parsed from (declaration,
//! whitespace, comments, verbatim start tags) so that a document which is
//! loaded and saved without edits comes back byte-for-byte. Only elements
//! whose attributes were changed are re-rendered.
//!
//! Edits go through [`Document::root_mut`] and the `Node` editors
//! (`set_attr`, `set_attribute_value`, `push_element`,
//! `find_descendant_mut`). The installer itself swaps settings files whole,
//! so these are library surface for callers that patch a document in place.

use anyhow::{Context, Result};
use quick_xml::{
    escape::escape,
    events::{BytesStart, Event},
    Reader,
};
use std::{fs, path::Path};

const BOM: char = '\u{feff}';

#[derive(Debug, thiserror::Error)]
pub enum LsxError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed markup at byte {position}: {source}")]
    Parse {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("malformed attribute at byte {position}: {source}")]
    Attribute {
        position: usize,
        #[source]
        source: quick_xml::events::attributes::AttrError,
    },
    #[error("malformed document at byte {position}: {reason}")]
    Malformed { position: usize, reason: String },
    #[error("document has no root element")]
    NoRoot,
    #[error("no matching element below {within}")]
    NotFound { within: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

/// A piece of markup inside an element or around the root.
///
/// Everything but `Element` is stored exactly as it appeared in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Element(Node),
    Text(String),
    Comment(String),
    CData(String),
    Decl(String),
    Instruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    attrs: Vec<Attr>,
    children: Vec<Content>,
    self_closing: bool,
    // Start tag as written in the source; dropped once attributes change.
    verbatim: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    bom: bool,
    prolog: Vec<Content>,
    root: Node,
    epilog: Vec<Content>,
}

impl Document {
    pub fn parse(bytes: &[u8]) -> Result<Self, LsxError> {
        let text = std::str::from_utf8(bytes)?;
        let (bom, text) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Node> = Vec::new();
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|source| LsxError::Parse { position, source })?;
            let content = match event {
                Event::Start(start) => {
                    stack.push(Node::from_start(&start, false, position)?);
                    continue;
                }
                Event::Empty(start) => Content::Element(Node::from_start(&start, true, position)?),
                Event::End(end) => {
                    let node = stack.pop().ok_or_else(|| LsxError::Malformed {
                        position,
                        reason: format!("unexpected </{}>", raw(end.name().as_ref())),
                    })?;
                    Content::Element(node)
                }
                Event::Text(text) => Content::Text(raw(&text)),
                Event::Comment(text) => Content::Comment(raw(&text)),
                Event::CData(text) => Content::CData(raw(&text)),
                Event::Decl(decl) => Content::Decl(raw(&decl)),
                Event::PI(text) => Content::Instruction(raw(&text)),
                Event::DocType(text) => Content::DocType(raw(&text)),
                Event::Eof => break,
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(content);
                continue;
            }
            match content {
                Content::Element(node) if root.is_none() => root = Some(node),
                Content::Element(node) => {
                    return Err(LsxError::Malformed {
                        position,
                        reason: format!("second root element <{}>", node.name),
                    })
                }
                Content::Text(text) if !text.trim().is_empty() => {
                    return Err(LsxError::Malformed {
                        position,
                        reason: "text outside the root element".to_string(),
                    })
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(open) = stack.last() {
            return Err(LsxError::Malformed {
                position: reader.buffer_position(),
                reason: format!("unclosed <{}>", open.name),
            });
        }

        let root = root.ok_or(LsxError::NoRoot)?;
        Ok(Self {
            bom,
            prolog,
            root,
            epilog,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let document =
            Self::parse(&bytes).with_context(|| format!("parse {}", path.display()))?;
        Ok(document)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        for content in &self.prolog {
            write_content(&mut out, content);
        }
        write_node(&mut out, &self.root);
        for content in &self.epilog {
            write_content(&mut out, content);
        }
        out.into_bytes()
    }

    /// Writes the document next to `path` and renames it into place, so a
    /// failed write never leaves a truncated settings file behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().context("settings file parent")?;
        fs::create_dir_all(parent).context("create settings dir")?;
        let file_name = path.file_name().context("settings file name")?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(".tmp");
        let temp_path = parent.join(temp_name);
        fs::write(&temp_path, self.to_bytes())
            .with_context(|| format!("write {}", temp_path.display()))?;
        fs::rename(&temp_path, path).with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: true,
            verbatim: None,
        }
    }

    fn from_start(start: &BytesStart<'_>, self_closing: bool, position: usize) -> Result<Self, LsxError> {
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|source| LsxError::Attribute { position, source })?;
            let value = attr
                .unescape_value()
                .map_err(|source| LsxError::Parse { position, source })?;
            attrs.push(Attr {
                key: raw(attr.key.as_ref()),
                value: value.into_owned(),
            });
        }
        Ok(Self {
            name: raw(start.name().as_ref()),
            attrs,
            children: Vec::new(),
            self_closing,
            verbatim: Some(raw(start)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|attr| attr.key == key) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attr {
                key: key.to_string(),
                value,
            }),
        }
        self.verbatim = None;
    }

    /// The identity this schema keys nodes by: the `id` attribute.
    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn elements(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|content| match content {
            Content::Element(node) => Some(node),
            _ => None,
        })
    }

    pub fn first_element(&self) -> Option<&Node> {
        self.elements().next()
    }

    pub fn push_element(&mut self, node: Node) {
        self.children.push(Content::Element(node));
    }

    /// All elements below this one, depth-first in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.children.iter()],
        }
    }

    /// First descendant (document order) matching `pred`. A miss is an
    /// error; callers are expected to treat the shape as broken.
    pub fn find_descendant<P>(&self, pred: P) -> Result<&Node, LsxError>
    where
        P: Fn(&Node) -> bool,
    {
        self.descendants()
            .find(|node| pred(node))
            .ok_or_else(|| LsxError::NotFound {
                within: self.label(),
            })
    }

    pub fn find_descendant_mut<P>(&mut self, pred: P) -> Result<&mut Node, LsxError>
    where
        P: Fn(&Node) -> bool,
    {
        let within = self.label();
        find_mut(self, &pred).ok_or(LsxError::NotFound { within })
    }

    /// Value of the `<attribute id="{id}" value="…"/>` child, the way this
    /// format spells per-node properties.
    pub fn attribute_value(&self, id: &str) -> Option<&str> {
        self.elements()
            .find(|child| child.id() == Some(id))
            .and_then(|child| child.attr("value"))
    }

    /// Updates the value of an existing attribute-node. Returns `false` when
    /// no attribute-node with that id is present.
    pub fn set_attribute_value(&mut self, id: &str, value: &str) -> bool {
        let child = self.children.iter_mut().find_map(|content| match content {
            Content::Element(node) if node.id() == Some(id) => Some(node),
            _ => None,
        });
        match child {
            Some(node) => {
                node.set_attr("value", value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn label(&self) -> String {
        match self.id() {
            Some(id) => format!("<{} id=\"{id}\">", self.name),
            None => format!("<{}>", self.name),
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<std::slice::Iter<'a, Content>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(iter) = self.stack.last_mut() {
            match iter.next() {
                Some(Content::Element(node)) => {
                    self.stack.push(node.children.iter());
                    return Some(node);
                }
                Some(_) => {}
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}

fn find_mut<'a>(node: &'a mut Node, pred: &dyn Fn(&Node) -> bool) -> Option<&'a mut Node> {
    for content in node.children.iter_mut() {
        if let Content::Element(child) = content {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = find_mut(child, pred) {
                return Some(found);
            }
        }
    }
    None
}

fn raw(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn write_content(out: &mut String, content: &Content) {
    match content {
        Content::Element(node) => write_node(out, node),
        Content::Text(text) => out.push_str(text),
        Content::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Content::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        Content::Decl(text) | Content::Instruction(text) => {
            out.push_str("<?");
            out.push_str(text);
            out.push_str("?>");
        }
        Content::DocType(text) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(text.trim_start());
            out.push('>');
        }
    }
}

fn write_node(out: &mut String, node: &Node) {
    out.push('<');
    match &node.verbatim {
        Some(tag) => out.push_str(tag),
        None => {
            out.push_str(&node.name);
            for attr in &node.attrs {
                out.push(' ');
                out.push_str(&attr.key);
                out.push_str("=\"");
                out.push_str(&escape(attr.value.as_str()));
                out.push('"');
            }
            if node.self_closing && node.children.is_empty() {
                out.push(' ');
            }
        }
    }

    if node.self_closing && node.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &node.children {
        write_content(out, child);
    }
    out.push_str("</");
    out.push_str(&node.name);
    out.push('>');
}
