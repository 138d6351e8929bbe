//! Owned XML element tree over `quick-xml` events.
//!
//! Package parts are small enough to hold in memory, and rewriting paragraphs
//! needs structural edits (remove runs, insert hyperlinks) that a streaming
//! writer cannot express. Anything that is not an element or text (comments,
//! processing instructions, CDATA) is kept as an owned event and written back
//! unchanged.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesRef, BytesStart, BytesText, Event};

use crate::error::Error;

/// A parsed XML part: the root element plus whatever surrounds it.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    /// Events after the root element (comments, processing instructions).
    epilog: Vec<Event<'static>>,
    /// Events before the root element (declaration, comments, doctype).
    prolog: Vec<Event<'static>>,
    /// The document element.
    pub root: Element,
}

/// An element with its qualified name, attributes in source order, and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Attributes as (qualified key, unescaped value) pairs.
    pub attrs: Vec<(String, String)>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
    /// Qualified name, e.g. `w:p`.
    pub name: String,
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Anything that is neither element nor text, written back verbatim.
    Other(Event<'static>),
    /// Unescaped character data.
    Text(String),
}

impl Element {
    /// Value of the attribute with this exact qualified key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        return self
            .attrs
            .iter()
            .find(|(k, _)| return k == key)
            .map(|(_, v)| return v.as_str());
    }

    /// Value of the first attribute whose local name matches, ignoring prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        return self
            .attrs
            .iter()
            .find(|(k, _)| return local_part(k) == local)
            .map(|(_, v)| return v.as_str());
    }

    /// First child element with this exact qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        return self.elements().find(|e| return e.name == name);
    }

    /// First child element whose local name matches, ignoring prefix.
    pub fn child_local(&self, local: &str) -> Option<&Element> {
        return self.elements().find(|e| return e.is(local));
    }

    /// Iterate over child elements, skipping text and other nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        return self.children.iter().filter_map(|n| {
            return match n {
                Node::Element(e) => Some(e),
                Node::Other(_) | Node::Text(_) => None,
            };
        });
    }

    /// Mutable variant of [`Element::elements`].
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        return self.children.iter_mut().filter_map(|n| {
            return match n {
                Node::Element(e) => Some(e),
                Node::Other(_) | Node::Text(_) => None,
            };
        });
    }

    /// True when the local part of the name equals `local`.
    pub fn is(&self, local: &str) -> bool {
        return local_part(&self.name) == local;
    }

    /// Empty element with the given qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        return Self { attrs: Vec::new(), children: Vec::new(), name: name.into() };
    }

    /// Append a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
        return;
    }

    /// Append text, merging with a trailing text node.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
            return;
        }
        self.children.push(Node::Text(text.to_string()));
        return;
    }

    /// Set an attribute, replacing an existing value with the same key.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| return k == key) {
            slot.1 = value.to_string();
            return;
        }
        self.attrs.push((key.to_string(), value.to_string()));
        return;
    }

    /// Concatenated text of this element and all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        return out;
    }

    /// Builder form of [`Element::set_attr`].
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        return self;
    }

    /// Builder form of [`Element::push`].
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.push(child);
        return self;
    }

    /// Builder form of [`Element::push_text`].
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.push_text(text);
        return self;
    }
}

impl XmlDocument {
    /// Parse a complete XML part. `part` names the part in error messages.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedXml` for syntax errors, unbalanced tags,
    /// unknown entities, or a missing root element.
    pub fn parse(part: &str, bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut doc = PartialDocument::default();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| return malformed(part, e.to_string()))?;
            match event {
                Event::Eof => break,
                Event::Start(start) => stack.push(element_from_start(part, &start)?),
                Event::Empty(start) => {
                    let element = element_from_start(part, &start)?;
                    doc.attach(&mut stack, Node::Element(element));
                },
                Event::End(_) => {
                    let Some(done) = stack.pop() else {
                        return Err(malformed(part, "unbalanced end tag".to_string()));
                    };
                    doc.attach(&mut stack, Node::Element(done));
                },
                Event::Text(text) => {
                    let decoded = decode_text(part, &text)?;
                    if let Some(open) = stack.last_mut() {
                        open.push_text(&decoded);
                    }
                },
                Event::GeneralRef(reference) => {
                    let resolved = resolve_reference(part, &reference)?;
                    if let Some(open) = stack.last_mut() {
                        open.push_text(&resolved);
                    }
                },
                other => doc.attach(&mut stack, Node::Other(other.into_owned())),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(malformed(part, "unexpected end of input".to_string()));
        }
        let Some(root) = doc.root else {
            return Err(malformed(part, "no root element".to_string()));
        };
        return Ok(Self { epilog: doc.epilog, prolog: doc.prolog, root });
    }

    /// Serialize back to bytes without reformatting.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the in-memory writer fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.prolog {
            writer.write_event(event.clone())?;
        }
        write_element(&mut writer, &self.root)?;
        for event in &self.epilog {
            writer.write_event(event.clone())?;
        }
        return Ok(writer.into_inner());
    }

    /// A standalone part around `root` with a UTF-8 declaration.
    pub fn with_declaration(root: Element) -> Self {
        let decl = Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes")));
        return Self { epilog: Vec::new(), prolog: vec![decl], root };
    }
}

/// Root and surrounding events collected while parsing.
#[derive(Default)]
struct PartialDocument {
    /// Events seen after the root closed.
    epilog: Vec<Event<'static>>,
    /// Events seen before the root opened.
    prolog: Vec<Event<'static>>,
    /// The root element once closed.
    root: Option<Element>,
}

impl PartialDocument {
    /// Attach a finished node to the open element, or to the document level.
    fn attach(&mut self, stack: &mut [Element], node: Node) {
        if let Some(open) = stack.last_mut() {
            open.children.push(node);
            return;
        }
        match node {
            Node::Element(element) if self.root.is_none() => self.root = Some(element),
            Node::Other(event) if self.root.is_none() => self.prolog.push(event),
            Node::Other(event) => self.epilog.push(event),
            // A second top-level element or stray text cannot occur in a
            // well-formed part; quick-xml reports the former as an error.
            Node::Element(_) | Node::Text(_) => {},
        }
        return;
    }
}

/// Depth-first text collection.
fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Element(e) => collect_text(e, out),
            Node::Text(t) => out.push_str(t),
            Node::Other(Event::CData(data)) => out.push_str(&String::from_utf8_lossy(data)),
            Node::Other(_) => {},
        }
    }
    return;
}

/// Decode a text event as UTF-8 and resolve any escapes left in it.
///
/// # Errors
///
/// Returns `Error::MalformedXml` for invalid UTF-8 or bad escapes.
fn decode_text(part: &str, text: &BytesText<'_>) -> Result<String, Error> {
    let raw = std::str::from_utf8(text).map_err(|e| return malformed(part, e.to_string()))?;
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let unescaped = quick_xml::escape::unescape(raw).map_err(|e| return malformed(part, e.to_string()))?;
    return Ok(unescaped.into_owned());
}

/// Build an element from a start or empty tag.
///
/// # Errors
///
/// Returns `Error::MalformedXml` for invalid attributes or encodings.
fn element_from_start(part: &str, start: &BytesStart<'_>) -> Result<Element, Error> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| return malformed(part, e.to_string()))?
        .to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| return malformed(part, e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|e| return malformed(part, e.to_string()))?;
        let raw = std::str::from_utf8(&attr.value).map_err(|e| return malformed(part, e.to_string()))?;
        let value: Cow<'_, str> =
            quick_xml::escape::unescape(raw).map_err(|e| return malformed(part, e.to_string()))?;
        element.attrs.push((key.to_string(), value.into_owned()));
    }
    return Ok(element);
}

/// Local part of a qualified name (`w:p` -> `p`).
fn local_part(name: &str) -> &str {
    return name.rsplit_once(':').map_or(name, |(_, local)| return local);
}

/// Shorthand for a parse error in `part`.
fn malformed(part: &str, reason: String) -> Error {
    return Error::MalformedXml { part: part.to_string(), reason };
}

/// Resolve `&amp;`-style and `&#NN;` references reported outside text events.
///
/// # Errors
///
/// Returns `Error::MalformedXml` for unknown entities or invalid code points.
fn resolve_reference(part: &str, reference: &BytesRef<'_>) -> Result<String, Error> {
    let name = std::str::from_utf8(reference).map_err(|e| return malformed(part, e.to_string()))?;
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| return number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => number.parse::<u32>(),
        };
        return code
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .ok_or_else(|| return malformed(part, format!("invalid character reference &{name};")));
    }
    return quick_xml::escape::resolve_predefined_entity(name)
        .map(str::to_string)
        .ok_or_else(|| return malformed(part, format!("unknown entity &{name};")));
}

/// Write an element and its subtree. Childless elements become empty tags.
///
/// # Errors
///
/// Returns `Error::Io` if the underlying writer fails.
fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), Error> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Other(event) => writer.write_event(event.clone())?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    return Ok(());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<w:document xmlns:w="urn:w"><w:body><!-- note -->"#,
        r#"<w:p><w:r><w:t xml:space="preserve">A &amp; B </w:t></w:r></w:p>"#,
        r#"<w:sectPr/></w:body></w:document>"#,
    );

    #[test]
    fn parses_elements_text_and_entities() {
        let doc = XmlDocument::parse("word/document.xml", SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.root.name, "w:document");
        let body = doc.root.child("w:body").unwrap();
        let p = body.child_local("p").unwrap();
        assert_eq!(p.text_content(), "A & B ");
        let t = p.child("w:r").unwrap().child("w:t").unwrap();
        assert_eq!(t.attr("xml:space"), Some("preserve"));
        assert_eq!(t.attr_local("space"), Some("preserve"));
    }

    #[test]
    fn serialization_round_trips_structure() {
        let doc = XmlDocument::parse("part", SAMPLE.as_bytes()).unwrap();
        let bytes = doc.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<!-- note -->"));
        assert!(text.contains("A &amp; B "));
        assert!(text.contains("<w:sectPr/>"));

        let again = XmlDocument::parse("part", &bytes).unwrap();
        assert_eq!(again.root, doc.root);
    }

    #[test]
    fn escapes_attribute_values_on_write() {
        let root = Element::new("a").with_attr("title", "x < \"y\" & z").with_text("1 < 2");
        let doc = XmlDocument { epilog: Vec::new(), prolog: Vec::new(), root };
        let bytes = doc.to_bytes().unwrap();
        let again = XmlDocument::parse("part", &bytes).unwrap();
        assert_eq!(again.root.attr("title"), Some("x < \"y\" & z"));
        assert_eq!(again.root.text_content(), "1 < 2");
    }

    #[test]
    fn numeric_character_references() {
        let doc = XmlDocument::parse("part", b"<a>&#65;&#x42;</a>").unwrap();
        assert_eq!(doc.root.text_content(), "AB");
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(matches!(
            XmlDocument::parse("part", b"<a><b></a>"),
            Err(Error::MalformedXml { .. })
        ));
        assert!(matches!(XmlDocument::parse("part", b"<a>"), Err(Error::MalformedXml { .. })));
        assert!(matches!(XmlDocument::parse("part", b""), Err(Error::MalformedXml { .. })));
    }

    #[test]
    fn push_text_merges_adjacent_runs() {
        let mut e = Element::new("t");
        e.push_text("ab");
        e.push_text("cd");
        assert_eq!(e.children, vec![Node::Text("abcd".to_string())]);
    }
}
