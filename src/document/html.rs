//! HTML documents built from html5ever's parse tree.

use scraper::{ElementRef, Html, Node};

use super::{Document, DocumentBuilder, DocumentError, TreeBuilder};

/// Lenient HTML tree builder. The root element is `<html>`.
#[derive(Debug, Clone, Copy)]
pub struct HtmlTree;

impl TreeBuilder for HtmlTree {
    fn build(content: &[u8]) -> Result<Document, DocumentError> {
        let markup = String::from_utf8_lossy(content);
        let html = Html::parse_document(&markup);

        let mut builder = DocumentBuilder::new();
        append_element(&mut builder, html.root_element());
        builder.finish()
    }
}

fn append_element(builder: &mut DocumentBuilder, element: ElementRef<'_>) {
    let value = element.value();
    let attributes = value
        .attrs()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    builder.start(value.name(), attributes);
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            append_element(builder, child_element);
        } else if let Node::Text(text) = child.value() {
            builder.text(text);
        }
    }
    builder.end();
}
