//! HTML5 Parser implementation
//!
//! Uses html5ever's RcDom and converts it to a Tether document.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use tether_dom::{Document, NodeId};

use crate::ParseError;

/// HTML5 parser
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse HTML string into a Document
    pub fn parse(&self, html: &str) -> Result<Document, ParseError> {
        let dom = Self::parse_rcdom(html)?;

        let mut document = Document::empty();
        for child in dom.document.children.borrow().iter() {
            self.convert_node(child, &mut document, Some(NodeId::ROOT))?;
        }
        document.finalize();

        tracing::debug!(nodes = document.tree().len(), "parsed HTML document");
        Ok(document)
    }

    /// Parse body-level markup into detached nodes of `document`
    pub fn parse_fragment(&self, document: &mut Document, html: &str) -> Result<Vec<NodeId>, ParseError> {
        let dom = Self::parse_rcdom(html)?;
        let Some(body) = find_body(&dom.document) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for child in body.children.borrow().iter() {
            if let Some(id) = self.convert_node(child, document, None)? {
                out.push(id);
            }
        }
        Ok(out)
    }

    fn parse_rcdom(html: &str) -> Result<RcDom, ParseError> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())?;
        Ok(dom)
    }

    /// Convert an RcDom node, attaching it to `parent` when given
    fn convert_node(
        &self,
        handle: &Handle,
        document: &mut Document,
        parent: Option<NodeId>,
    ) -> Result<Option<NodeId>, ParseError> {
        let id = match &handle.data {
            RcNodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if text.trim().is_empty() {
                    return Ok(None);
                }
                document.create_text(&text)
            }
            RcNodeData::Comment { contents } => document.create_comment(&contents.to_string()),
            RcNodeData::Element { name, attrs, .. } => {
                let id = document.create_element(&name.local);
                for attr in attrs.borrow().iter() {
                    document.set_attribute(id, &attr.name.local, &attr.value)?;
                }
                for child in handle.children.borrow().iter() {
                    self.convert_node(child, document, Some(id))?;
                }
                id
            }
            // Doctype and processing instructions carry nothing controllers use
            _ => return Ok(None),
        };

        if let Some(parent) = parent {
            document.append_child(parent, id)?;
        }
        Ok(Some(id))
    }
}

fn find_body(document: &Handle) -> Option<Handle> {
    let html = document
        .children
        .borrow()
        .iter()
        .find(|h| is_element(h, "html"))
        .cloned()?;
    let body = html.children.borrow().iter().find(|h| is_element(h, "body")).cloned();
    body
}

fn is_element(handle: &Handle, tag: &str) -> bool {
    matches!(&handle.data, RcNodeData::Element { name, .. } if &*name.local == tag)
}
