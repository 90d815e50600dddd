//! The element tree.

use crate::{Result, XmlError};

/// A single XML attribute.
///
/// The attribute name carries the same rewritten namespace prefix as
/// element names do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

impl Attr {
    /// Creates an attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A node of the XML element tree.
///
/// `name` is the namespace-prefixed local name (`"s:Envelope"`); `text`
/// is the element body stripped of surrounding whitespace; `children`
/// are the direct children in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<Element>,
}

impl Element {
    /// Creates an element without text or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates an element whose body is the given text.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Adds a child element, builder style.
    pub fn child_elem(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Adds an attribute, builder style.
    pub fn attr_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push(Attr::new(name, value));
        self
    }

    /// Appends a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Returns the first direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns the first direct child with the given name, or a
    /// [`XmlError::Missed`] error naming the missing element.
    ///
    /// This is the primary decode primitive of the wire protocols: a
    /// codec looks up the children it needs and the first missing
    /// required one aborts the decode with its name in the error.
    pub fn required_child(&self, name: &str) -> Result<&Element> {
        self.child(name).ok_or_else(|| XmlError::missed(name))
    }

    /// Iterates over all direct children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Returns the trimmed element body.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Returns the value of the named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns the namespace prefix of the element name, if any.
    pub fn prefix(&self) -> Option<&str> {
        ns_prefix(&self.name)
    }

    /// Decodes the element body as a non-negative integer.
    pub fn text_uint(&self) -> Result<u32> {
        self.text()
            .parse::<u32>()
            .map_err(|_| XmlError::value(&self.name, self.text()))
    }

    /// Decodes the element body as a signed integer.
    pub fn text_int(&self) -> Result<i32> {
        self.text()
            .parse::<i32>()
            .map_err(|_| XmlError::value(&self.name, self.text()))
    }

    /// Decodes the element body as an xsd:boolean.
    pub fn text_bool(&self) -> Result<bool> {
        match self.text() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(XmlError::value(&self.name, other)),
        }
    }
}

/// Returns the namespace prefix of a prefixed name, if present.
pub(crate) fn ns_prefix(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        Element::new("s:Envelope")
            .child_elem(Element::new("s:Header").child_elem(Element::with_text("a:Action", "urn:x")))
            .child_elem(Element::new("s:Body"))
    }

    #[test]
    fn test_child_lookup() {
        let root = sample();
        assert!(root.child("s:Header").is_some());
        assert!(root.child("s:Missing").is_none());
        assert!(root.required_child("s:Body").is_ok());

        let err = root.required_child("s:Fault").unwrap_err();
        assert_eq!(err.to_string(), "s:Fault: missed");
    }

    #[test]
    fn test_children_named() {
        let mut root = Element::new("d:ProbeMatches");
        root.push(Element::new("d:ProbeMatch"));
        root.push(Element::new("d:ProbeMatch"));
        root.push(Element::new("d:Other"));

        assert_eq!(root.children_named("d:ProbeMatch").count(), 2);
    }

    #[test]
    fn test_scalar_decode() {
        assert_eq!(Element::with_text("n", " 42 ").text_uint().unwrap(), 42);
        assert_eq!(Element::with_text("n", "-7").text_int().unwrap(), -7);
        assert!(Element::with_text("n", "true").text_bool().unwrap());
        assert!(Element::with_text("n", "nope").text_uint().is_err());
    }

    #[test]
    fn test_prefix() {
        assert_eq!(sample().prefix(), Some("s"));
        assert_eq!(Element::new("bare").prefix(), None);
    }
}
