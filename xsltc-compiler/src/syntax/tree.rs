use xsltc_name::{Namespaces, QName, XSLT_NAMESPACE};

use crate::source::SourceEvent;

/// A stylesheet element with the namespaces in scope on it.
#[derive(Debug, Clone)]
pub(crate) struct SourceElement {
    pub(crate) name: QName,
    pub(crate) attributes: Vec<(QName, String)>,
    pub(crate) namespaces: Namespaces,
    pub(crate) line: u32,
    pub(crate) children: Vec<SourceNode>,
}

#[derive(Debug, Clone)]
pub(crate) enum SourceNode {
    Element(SourceElement),
    Text(String),
}

impl SourceElement {
    pub(crate) fn is_xsl(&self, local: &str) -> bool {
        self.name.namespace() == Some(XSLT_NAMESPACE) && self.name.local_name() == local
    }

    pub(crate) fn is_in_xsl_namespace(&self) -> bool {
        self.name.namespace() == Some(XSLT_NAMESPACE)
    }

    pub(crate) fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.namespace().is_none() && name.local_name() == local)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn child_elements(&self) -> impl Iterator<Item = &SourceElement> {
        self.children.iter().filter_map(|child| match child {
            SourceNode::Element(element) => Some(element),
            SourceNode::Text(_) => None,
        })
    }
}

fn is_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Build the element tree from the events of one stylesheet. Adjacent text
/// is merged; whitespace-only text is dropped except inside `xsl:text`.
pub(crate) fn build_tree(events: Vec<SourceEvent>) -> Option<SourceElement> {
    let mut stack: Vec<SourceElement> = Vec::new();
    let mut document_element = None;
    for event in events {
        match event {
            SourceEvent::StartElement {
                name,
                attributes,
                namespaces: declared,
                line,
            } => {
                let mut namespaces = stack
                    .last()
                    .map(|parent| parent.namespaces.clone())
                    .unwrap_or_default();
                for (prefix, uri) in &declared {
                    namespaces.add(prefix, uri);
                }
                stack.push(SourceElement {
                    name,
                    attributes,
                    namespaces,
                    line,
                    children: Vec::new(),
                });
            }
            SourceEvent::EndElement => {
                let mut element = stack.pop()?;
                if !element.is_xsl("text") {
                    element.children.retain(|child| match child {
                        SourceNode::Text(text) => !is_whitespace(text),
                        SourceNode::Element(_) => true,
                    });
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(SourceNode::Element(element)),
                    None => document_element = Some(element),
                }
            }
            SourceEvent::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    match parent.children.last_mut() {
                        Some(SourceNode::Text(previous)) => previous.push_str(&text),
                        _ => parent.children.push(SourceNode::Text(text)),
                    }
                }
            }
            SourceEvent::ProcessingInstruction { .. } => {}
        }
    }
    document_element
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{StylesheetSource, XotSource};

    #[test]
    fn test_whitespace_is_stripped_outside_xsl_text() {
        let events = XotSource::new(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/"> <xsl:text> </xsl:text> </xsl:template>
</xsl:stylesheet>"#,
        )
        .events()
        .unwrap();
        let root = build_tree(events).unwrap();
        assert_eq!(root.children.len(), 1);
        let template = root.child_elements().next().unwrap();
        assert_eq!(template.line, 2);
        assert_eq!(template.children.len(), 1);
        let text = template.child_elements().next().unwrap();
        assert!(text.is_xsl("text"));
        assert!(matches!(&text.children[0], SourceNode::Text(t) if t == " "));
    }
}
