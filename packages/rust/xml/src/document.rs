//! In-memory XML tree built on `quick-xml` events.
//!
//! The tree keeps exactly what re-serialization needs: elements with their
//! raw (prefixed) names and attributes in source order, text segments with
//! entities already resolved, comments, and processing instructions. CDATA
//! sections are folded into the surrounding text.

use std::borrow::Cow;
use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use xmlscrub_shared::{Result, ScrubError};

use crate::dtd;

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data with entities resolved.
    Text(String),
    /// `<!-- ... -->` body.
    Comment(String),
    /// `<?target data?>` body.
    ProcessingInstruction(String),
}

/// An element and everything inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `r:Content`.
    pub name: String,
    /// Attributes in source order, values resolved.
    pub attributes: Vec<(String, String)>,
    /// Children in document order. Adjacent text is always merged.
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Concatenated text of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<&Node> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => stack.extend(e.children.iter().rev()),
                Node::Comment(_) | Node::ProcessingInstruction(_) => {}
            }
        }
        out
    }

    /// First descendant element (depth-first) named `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        let mut stack: Vec<&Element> = vec![self];
        while let Some(element) = stack.pop() {
            if element.name == name {
                return Some(element);
            }
            for child in element.children.iter().rev() {
                if let Node::Element(e) = child {
                    stack.push(e);
                }
            }
        }
        None
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }
}

/// Comment or processing instruction outside the root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misc {
    Comment(String),
    ProcessingInstruction(String),
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// `<!DOCTYPE ...>` body, if present.
    pub doctype: Option<String>,
    /// Comments and PIs before the root.
    pub prolog: Vec<Misc>,
    /// The document element.
    pub root: Element,
    /// Comments and PIs after the root.
    pub epilog: Vec<Misc>,
}

impl XmlDocument {
    /// Parse `input`, resolving predefined entities, character references,
    /// and general entities declared in the internal DTD subset.
    ///
    /// Fails on anything that is not well-formed: mismatched or unclosed
    /// tags, unknown or unterminated entities, text outside the root, or a
    /// missing or repeated root element.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);

        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut entities: HashMap<String, String> = HashMap::new();
        let mut doctype = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| {
                ScrubError::parse(reader.error_position() as u64, e.to_string())
            })?;
            let position = reader.buffer_position() as u64;

            match event {
                Event::Start(start) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(ScrubError::parse(position, "junk after document element"));
                    }
                    stack.push(start_element(&start, &entities, position)?);
                }
                Event::Empty(start) => {
                    let element = start_element(&start, &entities, position)?;
                    close_element(element, &mut stack, &mut root, position)?;
                }
                Event::End(_) => {
                    // quick-xml has already matched the end name.
                    let element = stack
                        .pop()
                        .ok_or_else(|| ScrubError::parse(position, "unexpected end tag"))?;
                    close_element(element, &mut stack, &mut root, position)?;
                }
                Event::Text(text) => {
                    let raw = utf8(&text, position)?;
                    let raw = normalize_line_endings(raw);
                    let resolved = unescape_with(&raw, |name| lookup_entity(&entities, name))
                        .map_err(|e| ScrubError::parse(position, e.to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(&resolved),
                        None if resolved.trim().is_empty() => {}
                        None => {
                            return Err(ScrubError::parse(
                                position,
                                "character data outside the root element",
                            ));
                        }
                    }
                }
                Event::CData(cdata) => {
                    let raw = utf8(&cdata, position)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(&normalize_line_endings(raw)),
                        None => {
                            return Err(ScrubError::parse(
                                position,
                                "CDATA section outside the root element",
                            ));
                        }
                    }
                }
                Event::Comment(comment) => {
                    let body = normalize_line_endings(utf8(&comment, position)?).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Comment(body)),
                        None if root.is_none() => prolog.push(Misc::Comment(body)),
                        None => epilog.push(Misc::Comment(body)),
                    }
                }
                Event::PI(pi) => {
                    let body = normalize_line_endings(utf8(&pi, position)?).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::ProcessingInstruction(body)),
                        None if root.is_none() => prolog.push(Misc::ProcessingInstruction(body)),
                        None => epilog.push(Misc::ProcessingInstruction(body)),
                    }
                }
                Event::DocType(dt) => {
                    if root.is_some() || !stack.is_empty() {
                        return Err(ScrubError::parse(position, "DOCTYPE after the root element"));
                    }
                    let body = utf8(&dt, position)?.trim().to_string();
                    entities = dtd::internal_entities(&body, position)?;
                    debug!(declared = entities.len(), "internal DTD entities");
                    doctype = Some(body);
                }
                Event::Eof => break,
                // The XML declaration is rewritten on output.
                _ => {}
            }
        }

        let position = reader.buffer_position() as u64;
        if let Some(open) = stack.last() {
            return Err(ScrubError::parse(
                position,
                format!("unclosed element <{}>", open.name),
            ));
        }
        let root = root.ok_or_else(|| ScrubError::parse(position, "no root element"))?;

        Ok(Self {
            doctype,
            prolog,
            root,
            epilog,
        })
    }
}

fn start_element(
    start: &BytesStart<'_>,
    entities: &HashMap<String, String>,
    position: u64,
) -> Result<Element> {
    let name = utf8(start.name().as_ref(), position)?.to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ScrubError::parse(position, e.to_string()))?;
        let key = utf8(attr.key.as_ref(), position)?.to_string();
        let raw = normalize_attribute_whitespace(utf8(&attr.value, position)?);
        let value = unescape_with(&raw, |name| lookup_entity(entities, name))
            .map_err(|e| ScrubError::parse(position, format!("attribute {key}: {e}")))?;
        attributes.push((key, value.into_owned()));
    }

    Ok(Element::new(name, attributes))
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
    position: u64,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_some() => {
            return Err(ScrubError::parse(position, "junk after document element"));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn lookup_entity<'a>(entities: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    if let Some(predefined) = resolve_predefined_entity(name) {
        return Some(predefined);
    }
    entities.get(name).map(String::as_str)
}

fn utf8(bytes: &[u8], position: u64) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| ScrubError::parse(position, e.to_string()))
}

/// Literal `\r\n` and lone `\r` become `\n`, as an XML processor must do
/// before anything else sees the text.
pub(crate) fn normalize_line_endings(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\r') {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Literal whitespace in an attribute value becomes a single space each
/// (`\r\n` counts as one). Character references are untouched.
fn normalize_attribute_whitespace(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\r', '\n', '\t']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(
        normalize_line_endings(raw)
            .chars()
            .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
            .collect(),
    )
}
