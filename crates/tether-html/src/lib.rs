//! Tether HTML loader
//!
//! Builds [`tether_dom::Document`] trees from markup using html5ever.

mod parser;

pub use parser::HtmlParser;
pub use tether_dom::{Document, NodeId};

/// Parse an HTML string into a document
pub fn parse(html: &str) -> Result<Document, ParseError> {
    HtmlParser::new().parse(html)
}

/// Parse body-level markup into detached nodes owned by `document`
pub fn parse_fragment(document: &mut Document, html: &str) -> Result<Vec<NodeId>, ParseError> {
    HtmlParser::new().parse_fragment(document, html)
}

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read HTML input: {0}")]
    Io(#[from] std::io::Error),

    #[error("DOM construction failed: {0}")]
    Dom(#[from] tether_dom::DomError),
}
