//! XML documents (RSS and Torznab style feeds).

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{Document, DocumentBuilder, DocumentError, TreeBuilder};

/// Strict XML tree builder. Tag and attribute names keep their prefixes.
#[derive(Debug, Clone, Copy)]
pub struct XmlTree;

impl TreeBuilder for XmlTree {
    fn build(content: &[u8]) -> Result<Document, DocumentError> {
        let mut reader = Reader::from_reader(content);
        let mut builder = DocumentBuilder::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => {
                    let (tag, attributes) = element_parts(&start)?;
                    builder.start(tag, attributes);
                }
                Ok(Event::Empty(start)) => {
                    let (tag, attributes) = element_parts(&start)?;
                    builder.start(tag, attributes);
                    builder.end();
                }
                Ok(Event::End(_)) => builder.end(),
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|e| DocumentError::malformed("xml", e))?;
                    builder.text(&text);
                }
                Ok(Event::CData(data)) => {
                    builder.text(&String::from_utf8_lossy(&data.into_inner()));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(DocumentError::malformed(
                        "xml",
                        format!("{e} at byte {}", reader.buffer_position()),
                    ));
                }
            }
            buf.clear();
        }

        builder.finish()
    }
}

fn element_parts(start: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>), DocumentError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| DocumentError::malformed("xml", e))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| DocumentError::malformed("xml", e))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok((tag, attributes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FEED: &[u8] = br#"<?xml version="1.0"?>
<rss><channel>
  <item><title>Movie &amp; Co</title><enclosure url="magnet:?xt=1" length="42"/></item>
  <item><title><![CDATA[Other <Title>]]></title></item>
</channel></rss>"#;

    #[test]
    fn test_xml_builds_nested_items() {
        let doc = XmlTree::build(FEED).unwrap();
        assert_eq!(doc.element(doc.root()).tag(), "rss");
        let items: Vec<_> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|id| doc.element(*id).tag() == "item")
            .collect();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_xml_unescapes_text_attributes_and_cdata() {
        let doc = XmlTree::build(FEED).unwrap();
        let titles: Vec<_> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|id| doc.element(*id).tag() == "title")
            .map(|id| doc.element(id).text().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Movie & Co", "Other <Title>"]);

        let enclosure = doc
            .descendants(doc.root())
            .into_iter()
            .find(|id| doc.element(*id).tag() == "enclosure")
            .unwrap();
        assert_eq!(doc.element(enclosure).attribute("length"), Some("42"));
    }

    #[test]
    fn test_xml_mismatched_tags_rejected() {
        let err = XmlTree::build(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { kind: "xml", .. }));
    }
}
