//! Result tree output.
//!
//! Translets produce a stream of [`OutputEvent`]s. A [`Recorder`] keeps
//! them, for the main result as well as for result tree fragments, and
//! [`serialize`] turns the main result into text.

use xsltc_bytecode::OutputProperties;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// An element by its lexical name; `namespace` is `None` for no
    /// namespace.
    StartElement {
        name: String,
        namespace: Option<String>,
    },
    EndElement,
    Attribute {
        name: String,
        namespace: Option<String>,
        value: String,
    },
    Characters(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

/// Something that consumes output events.
pub trait OutputHandler {
    fn handle(&mut self, event: &OutputEvent) -> Result<()>;

    fn replay(&mut self, events: &[OutputEvent]) -> Result<()> {
        for event in events {
            self.handle(event)?;
        }
        Ok(())
    }
}

/// The string value of a result tree fragment.
pub fn text(events: &[OutputEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            OutputEvent::Characters(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn prefix_of(name: &str) -> &str {
    name.split_once(':').map(|(prefix, _)| prefix).unwrap_or("")
}

pub fn local_of(name: &str) -> &str {
    name.split_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Records events and the namespaces of the elements it has open.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Vec<OutputEvent>,
    /// Prefix and URI bound by each open element.
    scopes: Vec<(String, String)>,
    open: Vec<usize>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<OutputEvent> {
        self.events
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// The URI a prefix is bound to by the open elements.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find(|(bound, _)| bound == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

impl OutputHandler for Recorder {
    fn handle(&mut self, event: &OutputEvent) -> Result<()> {
        match event {
            OutputEvent::StartElement { name, namespace } => {
                self.open.push(self.scopes.len());
                self.scopes.push((
                    prefix_of(name).to_string(),
                    namespace.clone().unwrap_or_default(),
                ));
            }
            OutputEvent::EndElement => {
                let mark = self
                    .open
                    .pop()
                    .ok_or_else(|| Error::Output("end of element that was never started".into()))?;
                self.scopes.truncate(mark);
            }
            OutputEvent::Characters(text) => {
                if let Some(OutputEvent::Characters(previous)) = self.events.last_mut() {
                    previous.push_str(text);
                    return Ok(());
                }
            }
            _ => {}
        }
        self.events.push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Xml,
    Html,
    Text,
}

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source",
];

#[derive(Debug)]
struct PendingTag {
    name: String,
    declarations: Vec<(String, String)>,
    attributes: Vec<(String, String)>,
}

#[derive(Debug)]
struct OpenElement {
    name: String,
    /// Number of entries in `XmlSerializer::bindings` before this element.
    mark: usize,
    has_text: bool,
    has_elements: bool,
}

/// Writes output events as XML, HTML or text.
#[derive(Debug)]
pub struct XmlSerializer {
    output: String,
    method: Option<Method>,
    properties: OutputProperties,
    pending: Option<PendingTag>,
    elements: Vec<OpenElement>,
    bindings: Vec<(String, String)>,
    generated: usize,
}

impl XmlSerializer {
    pub fn new(properties: &OutputProperties) -> Self {
        let method = match properties.method.as_deref() {
            Some("html") => Some(Method::Html),
            Some("text") => Some(Method::Text),
            Some(_) => Some(Method::Xml),
            None => None,
        };
        XmlSerializer {
            output: String::new(),
            method,
            properties: properties.clone(),
            pending: None,
            elements: Vec::new(),
            bindings: vec![("xml".to_string(), xsltc_name::XML_NAMESPACE.to_string())],
            generated: 0,
        }
    }

    pub fn finish(mut self) -> Result<String> {
        if !self.elements.is_empty() {
            return Err(Error::Output("element left open".into()));
        }
        self.decide_method(None);
        Ok(self.output)
    }

    /// Without an explicit method, the first element decides: `html` in
    /// no namespace selects HTML output.
    fn decide_method(&mut self, first_element: Option<(&str, Option<&str>)>) {
        if self.method.is_some() {
            return;
        }
        let method = match first_element {
            Some((name, None)) if name.eq_ignore_ascii_case("html") => Method::Html,
            _ => Method::Xml,
        };
        self.method = Some(method);
        if method == Method::Xml && self.properties.omit_xml_declaration == Some(false) {
            let encoding = self.properties.encoding.as_deref().unwrap_or("UTF-8");
            let declaration = format!("<?xml version=\"1.0\" encoding=\"{}\"?>", encoding);
            self.output.insert_str(0, &declaration);
        }
    }

    fn method(&self) -> Method {
        self.method.unwrap_or(Method::Xml)
    }

    fn bound(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.push((prefix.to_string(), uri.to_string()));
        if let Some(pending) = &mut self.pending {
            pending
                .declarations
                .push((prefix.to_string(), uri.to_string()));
        }
    }

    fn flush_tag(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.output.push('<');
        self.output.push_str(&pending.name);
        for (prefix, uri) in &pending.declarations {
            if prefix.is_empty() {
                self.output.push_str(" xmlns=\"");
            } else {
                self.output.push_str(" xmlns:");
                self.output.push_str(prefix);
                self.output.push_str("=\"");
            }
            escape_attribute(&mut self.output, uri);
            self.output.push('"');
        }
        for (name, value) in &pending.attributes {
            self.output.push(' ');
            self.output.push_str(name);
            self.output.push_str("=\"");
            escape_attribute(&mut self.output, value);
            self.output.push('"');
        }
        self.output.push('>');
    }

    /// Start a new line for markup inside an element without text.
    fn indent(&mut self) {
        if !self.properties.indent || self.method() == Method::Text {
            return;
        }
        match self.elements.last() {
            Some(parent) if !parent.has_text => self.newline(self.elements.len()),
            _ => {}
        }
    }

    fn newline(&mut self, depth: usize) {
        self.output.push('\n');
        for _ in 0..depth {
            self.output.push_str("  ");
        }
    }

    fn start_element(&mut self, name: &str, namespace: Option<&str>) {
        self.decide_method(Some((name, namespace)));
        self.flush_tag();
        if self.method() == Method::Text {
            self.elements.push(OpenElement {
                name: name.to_string(),
                mark: self.bindings.len(),
                has_text: false,
                has_elements: false,
            });
            return;
        }
        self.indent();
        if let Some(parent) = self.elements.last_mut() {
            parent.has_elements = true;
        }
        let mark = self.bindings.len();
        let prefix = prefix_of(name);
        let uri = namespace.unwrap_or("");
        let name = if uri.is_empty() { local_of(name) } else { name };
        self.pending = Some(PendingTag {
            name: name.to_string(),
            declarations: Vec::new(),
            attributes: Vec::new(),
        });
        let current = self.bound(if uri.is_empty() { "" } else { prefix }).unwrap_or("");
        if current != uri {
            self.bind(if uri.is_empty() { "" } else { prefix }, uri);
        }
        self.elements.push(OpenElement {
            name: name.to_string(),
            mark,
            has_text: false,
            has_elements: false,
        });
    }

    fn end_element(&mut self) -> Result<()> {
        let element = self
            .elements
            .pop()
            .ok_or_else(|| Error::Output("end of element that was never started".into()))?;
        match self.method() {
            Method::Text => {}
            method => {
                if self.pending.is_some() {
                    let void = HTML_VOID_ELEMENTS.contains(&element.name.to_ascii_lowercase().as_str());
                    if method == Method::Xml {
                        self.flush_tag();
                        // replace '>' with '/>'
                        self.output.pop();
                        self.output.push_str("/>");
                    } else if void {
                        self.flush_tag();
                    } else {
                        self.flush_tag();
                        self.close_tag(&element.name);
                    }
                } else {
                    if self.properties.indent && element.has_elements && !element.has_text {
                        self.newline(self.elements.len());
                    }
                    self.close_tag(&element.name);
                }
            }
        }
        self.bindings.truncate(element.mark);
        Ok(())
    }

    fn close_tag(&mut self, name: &str) {
        self.output.push_str("</");
        self.output.push_str(name);
        self.output.push('>');
    }

    fn attribute(&mut self, name: &str, namespace: Option<&str>, value: &str) {
        if self.pending.is_none() {
            log::debug!("attribute {} outside of a start tag ignored", name);
            return;
        }
        let name = match namespace {
            None | Some("") => local_of(name).to_string(),
            Some(uri) => self.attribute_prefix(prefix_of(name), uri) + ":" + local_of(name),
        };
        if let Some(pending) = &mut self.pending {
            match pending.attributes.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value.to_string(),
                None => pending.attributes.push((name, value.to_string())),
            }
        }
    }

    /// A prefix bound to `uri` for an attribute, declaring one when
    /// needed. Attributes never use the default namespace.
    fn attribute_prefix(&mut self, prefix: &str, uri: &str) -> String {
        if !prefix.is_empty() {
            match self.bound(prefix) {
                Some(bound) if bound == uri => return prefix.to_string(),
                None => {
                    self.bind(prefix, uri);
                    return prefix.to_string();
                }
                Some(_) => {}
            }
        }
        let existing = self
            .bindings
            .iter()
            .rev()
            .find(|(p, u)| !p.is_empty() && u == uri && self.bound(p) == Some(uri))
            .map(|(p, _)| p.clone());
        if let Some(existing) = existing {
            return existing;
        }
        loop {
            let candidate = format!("ns{}", self.generated);
            self.generated += 1;
            if self.bound(&candidate).is_none() {
                self.bind(&candidate, uri);
                return candidate;
            }
        }
    }

    fn characters(&mut self, text: &str) {
        self.flush_tag();
        if let Some(element) = self.elements.last_mut() {
            element.has_text = true;
        }
        if self.method == Some(Method::Text) {
            self.output.push_str(text);
        } else {
            escape_text(&mut self.output, text);
        }
    }
}

impl OutputHandler for XmlSerializer {
    fn handle(&mut self, event: &OutputEvent) -> Result<()> {
        match event {
            OutputEvent::StartElement { name, namespace } => {
                self.start_element(name, namespace.as_deref())
            }
            OutputEvent::EndElement => self.end_element()?,
            OutputEvent::Attribute {
                name,
                namespace,
                value,
            } => {
                if self.method() != Method::Text {
                    self.attribute(name, namespace.as_deref(), value)
                }
            }
            OutputEvent::Characters(text) => self.characters(text),
            OutputEvent::Comment(text) => {
                if self.method() != Method::Text {
                    self.flush_tag();
                    self.indent();
                    self.output.push_str("<!--");
                    self.output.push_str(&text.replace("--", "- -"));
                    self.output.push_str("-->");
                }
            }
            OutputEvent::ProcessingInstruction { target, data } => {
                if self.method() != Method::Text {
                    self.flush_tag();
                    self.indent();
                    self.output.push_str("<?");
                    self.output.push_str(target);
                    if !data.is_empty() {
                        self.output.push(' ');
                        self.output.push_str(&data.replace("?>", "? >"));
                    }
                    self.output.push_str("?>");
                }
            }
        }
        Ok(())
    }
}

fn escape_text(output: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            c => output.push(c),
        }
    }
}

fn escape_attribute(output: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '"' => output.push_str("&quot;"),
            '\n' => output.push_str("&#10;"),
            '\t' => output.push_str("&#9;"),
            c => output.push(c),
        }
    }
}

/// Serialize a complete result.
pub fn serialize(events: &[OutputEvent], properties: &OutputProperties) -> Result<String> {
    let mut serializer = XmlSerializer::new(properties);
    serializer.replay(events)?;
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str, namespace: Option<&str>) -> OutputEvent {
        OutputEvent::StartElement {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    fn attribute(name: &str, namespace: Option<&str>, value: &str) -> OutputEvent {
        OutputEvent::Attribute {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            value: value.to_string(),
        }
    }

    fn characters(text: &str) -> OutputEvent {
        OutputEvent::Characters(text.to_string())
    }

    fn xml(events: &[OutputEvent]) -> String {
        serialize(events, &OutputProperties::default()).unwrap()
    }

    #[test]
    fn test_empty_elements_close_themselves() {
        let events = [
            start("a", None),
            attribute("x", None, "1 < 2"),
            start("b", None),
            OutputEvent::EndElement,
            characters("&"),
            OutputEvent::EndElement,
        ];
        assert_eq!(xml(&events), r#"<a x="1 &lt; 2"><b/>&amp;</a>"#);
    }

    #[test]
    fn test_namespaces_are_declared_where_needed() {
        let events = [
            start("p:a", Some("urn:p")),
            start("p:b", Some("urn:p")),
            attribute("q:x", Some("urn:q"), "1"),
            OutputEvent::EndElement,
            start("c", None),
            OutputEvent::EndElement,
            OutputEvent::EndElement,
        ];
        assert_eq!(
            xml(&events),
            r#"<p:a xmlns:p="urn:p"><p:b xmlns:q="urn:q" q:x="1"/><c/></p:a>"#
        );
    }

    #[test]
    fn test_default_namespace_is_undeclared_for_children() {
        let events = [
            start("a", Some("urn:d")),
            start("b", None),
            OutputEvent::EndElement,
            OutputEvent::EndElement,
        ];
        assert_eq!(xml(&events), r#"<a xmlns="urn:d"><b xmlns=""/></a>"#);
    }

    #[test]
    fn test_unprefixed_namespaced_attribute_gets_a_prefix() {
        let events = [
            start("a", None),
            attribute("x", Some("urn:x"), "1"),
            OutputEvent::EndElement,
        ];
        assert_eq!(xml(&events), r#"<a xmlns:ns0="urn:x" ns0:x="1"/>"#);
    }

    #[test]
    fn test_later_attribute_replaces_earlier() {
        let events = [
            start("a", None),
            attribute("x", None, "1"),
            attribute("x", None, "2"),
            OutputEvent::EndElement,
        ];
        assert_eq!(xml(&events), r#"<a x="2"/>"#);
    }

    #[test]
    fn test_text_method_writes_characters_only() {
        let properties = OutputProperties {
            method: Some("text".to_string()),
            ..Default::default()
        };
        let events = [start("a", None), characters("1 < 2"), OutputEvent::EndElement];
        assert_eq!(serialize(&events, &properties).unwrap(), "1 < 2");
    }

    #[test]
    fn test_html_is_chosen_by_first_element() {
        let events = [
            start("html", None),
            start("br", None),
            OutputEvent::EndElement,
            start("p", None),
            OutputEvent::EndElement,
            OutputEvent::EndElement,
        ];
        assert_eq!(xml(&events), "<html><br><p></p></html>");
    }

    #[test]
    fn test_xml_declaration_when_not_omitted() {
        let properties = OutputProperties {
            omit_xml_declaration: Some(false),
            ..Default::default()
        };
        let events = [start("a", None), OutputEvent::EndElement];
        assert_eq!(
            serialize(&events, &properties).unwrap(),
            r#"<?xml version="1.0" encoding="UTF-8"?><a/>"#
        );
    }

    #[test]
    fn test_indent_skips_mixed_content() {
        let properties = OutputProperties {
            indent: true,
            ..Default::default()
        };
        let events = [
            start("a", None),
            start("b", None),
            characters("x"),
            OutputEvent::EndElement,
            OutputEvent::EndElement,
        ];
        insta::assert_snapshot!(serialize(&events, &properties).unwrap(), @r###"
        <a>
          <b>x</b>
        </a>
        "###);
    }

    #[test]
    fn test_recorder_tracks_scope_and_merges_text() {
        let mut recorder = Recorder::new();
        recorder.handle(&start("p:a", Some("urn:p"))).unwrap();
        assert_eq!(recorder.resolve("p"), Some("urn:p"));
        recorder.handle(&characters("a")).unwrap();
        recorder.handle(&characters("b")).unwrap();
        recorder.handle(&OutputEvent::EndElement).unwrap();
        assert_eq!(recorder.resolve("p"), None);
        assert_eq!(text(recorder.events()), "ab");
        assert!(recorder.handle(&OutputEvent::EndElement).is_err());
    }
}
