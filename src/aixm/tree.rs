use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};

/// An owned XML element. Namespace prefixes are dropped from names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        let t = self.text.trim();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }

    pub fn descendant(&self, name: &str) -> Option<&Element> {
        for c in &self.children {
            if c.name == name {
                return Some(c);
            }
            if let Some(d) = c.descendant(name) {
                return Some(d);
            }
        }
        None
    }

    pub fn descendant_text(&self, name: &str) -> Option<&str> {
        self.descendant(name).and_then(Element::text)
    }
}

fn open(start: &BytesStart) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.local_name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::document(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::document(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(Error::document(format!(
                "second root element <{}>",
                element.name
            )))
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn append_text(stack: &mut [Element], text: Cow<str>) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(&text);
    }
}

/// Decodes a whole document into its root element. Mismatched or unterminated
/// tags fail the document.
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(open(e)?),
            Ok(Event::Empty(ref e)) => {
                let element = open(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let element = stack.pop().ok_or_else(|| {
                    Error::document(format!("closing </{}> without opening tag", name))
                })?;
                if element.name != name {
                    return Err(Error::document(format!(
                        "<{}> closed by </{}>",
                        element.name, name
                    )));
                }
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| Error::document(err.to_string()))?;
                append_text(&mut stack, text);
            }
            Ok(Event::CData(ref e)) => append_text(&mut stack, String::from_utf8_lossy(e)),
            Ok(Event::Eof) => break,
            Ok(_) => (),
            Err(e) => {
                return Err(Error::document(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::document(format!(
            "unterminated element <{}>",
            open.name
        )));
    }
    root.ok_or_else(|| Error::document("no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree() {
        let root = parse(
            r#"<?xml version="1.0"?>
            <AIXM-Snapshot effective="2025-11-27T00:00:00">
                <Ahp><AhpUid mid="1"><codeId>LFST</codeId></AhpUid><txtName>STRASBOURG ENTZHEIM</txtName></Ahp>
                <Empty/>
            </AIXM-Snapshot>"#,
        )
        .unwrap();

        assert_eq!(root.name, "AIXM-Snapshot");
        assert_eq!(root.attribute("effective"), Some("2025-11-27T00:00:00"));
        assert_eq!(root.children.len(), 2);

        let ahp = root.child("Ahp").unwrap();
        assert_eq!(ahp.child_text("txtName"), Some("STRASBOURG ENTZHEIM"));
        assert_eq!(ahp.descendant_text("codeId"), Some("LFST"));
        assert_eq!(ahp.child("AhpUid").unwrap().attribute("mid"), Some("1"));
        assert!(root.child("Empty").unwrap().text().is_none());
    }

    #[test]
    fn strips_namespace_prefixes_and_unescapes() {
        let root = parse(r#"<a:root xmlns:a="urn:x"><a:txt>R&amp;D</a:txt></a:root>"#).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.child_text("txt"), Some("R&D"));
    }

    #[test]
    fn unterminated_element_fails() {
        let err = parse("<root><Ase><txtName>X</txtName></root>").unwrap_err();
        assert!(matches!(err, Error::Document { .. }));

        let err = parse("<root><Ase>").unwrap_err();
        assert!(matches!(err, Error::Document { .. }));

        let err = parse("<root><Ase").unwrap_err();
        assert!(matches!(err, Error::Document { .. }));
    }

    #[test]
    fn text_without_markup_fails() {
        assert!(parse("not xml at all").is_err());
        assert!(parse("").is_err());
    }
}
