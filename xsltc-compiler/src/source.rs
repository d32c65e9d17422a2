//! Stylesheet sources: the event stream the compiler consumes, and the
//! resolver that supplies imported and included stylesheets.

use ahash::{HashMap, HashMapExt};
use xot::{NodeEdge, SpanInfoKey, Value, Xot};
use xsltc_name::QName;

/// One event of a streaming parse of a stylesheet. Comments are not
/// reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    StartElement {
        name: QName,
        attributes: Vec<(QName, String)>,
        /// Namespace declarations made on this element, as
        /// `(prefix, uri)`. The empty prefix is the default namespace.
        namespaces: Vec<(String, String)>,
        line: u32,
    },
    EndElement,
    Text(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("stylesheet is not well-formed: {0}")]
    Parse(String),
}

/// Anything that can produce the events of one stylesheet document.
pub trait StylesheetSource {
    fn events(&self) -> Result<Vec<SourceEvent>, SourceError>;
}

/// Looks up the text of imported and included stylesheets by `href`.
pub trait StylesheetResolver {
    fn resolve(&self, href: &str) -> Option<String>;
}

/// Parses stylesheet text with `xot`.
#[derive(Debug, Clone)]
pub struct XotSource {
    text: String,
}

impl XotSource {
    pub fn new(text: impl Into<String>) -> Self {
        XotSource { text: text.into() }
    }
}

impl StylesheetSource for XotSource {
    fn events(&self) -> Result<Vec<SourceEvent>, SourceError> {
        let mut xot = Xot::new();
        let (root, span_info) = xot
            .parse_with_span_info(&self.text)
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        let lines = LineIndex::new(&self.text);
        let mut events = Vec::new();
        for edge in xot.traverse(root) {
            match edge {
                NodeEdge::Start(node) => match xot.value(node) {
                    Value::Element(element) => {
                        let name = QName::from_xot_with_prefix(element.name(), node, &xot);
                        let mut attributes = Vec::new();
                        for attribute_node in xot.axis(xot::Axis::Attribute, node) {
                            if let Value::Attribute(attribute) = xot.value(attribute_node) {
                                attributes.push((
                                    QName::from_xot_with_prefix(attribute.name(), node, &xot),
                                    attribute.value().to_string(),
                                ));
                            }
                        }
                        let namespaces = xot
                            .namespaces(node)
                            .iter()
                            .map(|(prefix, namespace)| {
                                (
                                    xot.prefix_str(prefix).to_string(),
                                    xot.namespace_str(*namespace).to_string(),
                                )
                            })
                            .collect();
                        let line = span_info
                            .get(SpanInfoKey::ElementStart(node))
                            .map(|span| lines.line(span.start))
                            .unwrap_or(0);
                        events.push(SourceEvent::StartElement {
                            name,
                            attributes,
                            namespaces,
                            line,
                        });
                    }
                    Value::Text(text) => events.push(SourceEvent::Text(text.get().to_string())),
                    Value::ProcessingInstruction(pi) => {
                        events.push(SourceEvent::ProcessingInstruction {
                            target: xot.local_name_str(pi.target()).to_string(),
                            data: pi.data().unwrap_or("").to_string(),
                        })
                    }
                    _ => {}
                },
                NodeEdge::End(node) => {
                    if xot.is_element(node) {
                        events.push(SourceEvent::EndElement);
                    }
                }
            }
        }
        Ok(events)
    }
}

/// Byte offset to line number.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(index, _)| index + 1));
        LineIndex { starts }
    }

    fn line(&self, offset: usize) -> u32 {
        match self.starts.binary_search(&offset) {
            Ok(index) => index as u32 + 1,
            Err(index) => index as u32,
        }
    }
}

/// Stylesheets kept in memory, keyed by `href`.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    stylesheets: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        MemoryResolver {
            stylesheets: HashMap::new(),
        }
    }

    pub fn add(&mut self, href: &str, text: &str) {
        self.stylesheets.insert(href.to_string(), text.to_string());
    }

    pub fn with(mut self, href: &str, text: &str) -> Self {
        self.add(href, text);
        self
    }
}

impl StylesheetResolver for MemoryResolver {
    fn resolve(&self, href: &str) -> Option<String> {
        self.stylesheets.get(href).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_carry_lines_and_namespaces() {
        let source = XotSource::new("<a xmlns:p=\"urn:p\">\n  <p:b x=\"1\"/>text</a>");
        let events = source.events().unwrap();
        assert_eq!(events.len(), 6);
        match &events[0] {
            SourceEvent::StartElement {
                name,
                namespaces,
                line,
                ..
            } => {
                assert_eq!(name.local_name(), "a");
                assert_eq!(namespaces, &vec![("p".to_string(), "urn:p".to_string())]);
                assert_eq!(*line, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[2] {
            SourceEvent::StartElement {
                name,
                attributes,
                line,
                ..
            } => {
                assert_eq!(name.namespace(), Some("urn:p"));
                assert_eq!(attributes[0].1, "1");
                assert_eq!(*line, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[4], SourceEvent::Text("text".to_string()));
        assert_eq!(events[5], SourceEvent::EndElement);
    }

    #[test]
    fn test_malformed_stylesheet() {
        assert!(XotSource::new("<a>").events().is_err());
    }

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new("a\nb\nc");
        assert_eq!(lines.line(0), 1);
        assert_eq!(lines.line(2), 2);
        assert_eq!(lines.line(3), 2);
        assert_eq!(lines.line(4), 3);
    }
}
