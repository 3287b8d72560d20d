//! Ruleset XML reader.
//!
//! Reads the document with `quick-xml` into a small element tree. Text,
//! comments and processing instructions carry no meaning in a ruleset and are
//! dropped; every element keeps the line it started on.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use dt_core::SyntaxError;

use crate::CompileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub line: u32,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Start tag as written, for error messages.
    pub fn start_tag(&self) -> String {
        let mut out = format!("<{}", self.name);
        for (k, v) in &self.attributes {
            out.push_str(&format!(" {k}=\"{v}\""));
        }
        out.push('>');
        out
    }
}

/// Maps byte offsets to 1-based line numbers. Offsets must not decrease.
struct LineCounter<'a> {
    text: &'a str,
    offset: usize,
    line: u32,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, offset: 0, line: 1 }
    }

    fn line_at(&mut self, pos: usize) -> u32 {
        let pos = pos.min(self.text.len());
        if pos > self.offset {
            let newlines = self.text.as_bytes()[self.offset..pos].iter().filter(|b| **b == b'\n').count();
            self.line += newlines as u32;
            self.offset = pos;
        }
        self.line
    }
}

/// Parse `xml` and return its root element.
pub fn parse_xml(xml: &str) -> Result<XmlElement, CompileError> {
    let mut reader = Reader::from_str(xml);
    let mut lines = LineCounter::new(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) => {
                let element = read_element(&e, lines.line_at(start))?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = read_element(&e, lines.line_at(start))?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(SyntaxError::new(format!("unclosed element <{}> at line {}", open.name, open.line)).into());
    }
    root.ok_or_else(|| SyntaxError::new("the document has no root element").into())
}

fn read_element(start: &BytesStart<'_>, line: u32) -> Result<XmlElement, CompileError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        line,
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree_with_lines() {
        let xml = "<?xml version=\"1.0\"?>\n<ruleset>\n  <!-- note -->\n  <rule class=\"a b\">\n    <replace content=\"#x\" theme=\"#y\"/>\n  </rule>\n</ruleset>\n";
        let root = parse_xml(xml).unwrap();
        assert_eq!(root.name, "ruleset");
        assert_eq!(root.line, 2);
        let rule = &root.children[0];
        assert_eq!(rule.attr("class"), Some("a b"));
        assert_eq!(rule.line, 4);
        assert_eq!(rule.children[0].name, "replace");
        assert_eq!(rule.children[0].line, 5);
        assert_eq!(rule.children[0].attr("theme"), Some("#y"));
    }

    #[test]
    fn test_entities_unescaped() {
        let root = parse_xml("<rule><drop theme=\"a[title=&quot;x&quot;] &amp; b\"/></rule>").unwrap();
        assert_eq!(root.children[0].attr("theme"), Some("a[title=\"x\"] & b"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse_xml("<ruleset><rule></ruleset>").is_err());
        assert!(parse_xml("<ruleset>").is_err());
        assert!(parse_xml("   ").is_err());
    }
}
