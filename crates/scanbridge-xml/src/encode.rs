//! XML encoder.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::element::ns_prefix;
use crate::{Element, Namespace, Result, XmlError};

impl Element {
    /// Writes the tree as compact XML.
    ///
    /// The output starts with the `<?xml version="1.0"?>` declaration
    /// and the root element carries `xmlns:prefix="url"` attributes for
    /// the subset of `ns` prefixes actually referenced by element or
    /// attribute names in the tree.
    pub fn encode<W: Write>(&self, w: W, ns: &Namespace) -> Result<()> {
        self.encode_impl(Writer::new(w), ns)
    }

    /// Writes the tree as compact XML and returns it as a string.
    pub fn encode_string(&self, ns: &Namespace) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.encode(&mut buf, ns);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Writes the tree as indented XML.
    pub fn encode_indent<W: Write>(&self, w: W, ns: &Namespace, indent: usize) -> Result<()> {
        self.encode_impl(Writer::new_with_indent(w, b' ', indent), ns)
    }

    /// Writes the tree as indented XML and returns it as a string.
    pub fn encode_indent_string(&self, ns: &Namespace, indent: usize) -> String {
        let mut buf = Vec::new();
        let _ = self.encode_indent(&mut buf, ns, indent);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn encode_impl<W: Write>(&self, mut writer: Writer<W>, ns: &Namespace) -> Result<()> {
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .map_err(|e| XmlError::Malformed(e.to_string()))?;

        let nsattrs = self.namespace_used(ns);
        self.encode_recursive(&mut writer, &nsattrs)
    }

    fn encode_recursive<W: Write>(
        &self,
        writer: &mut Writer<W>,
        nsattrs: &[(String, String)],
    ) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());

        // xmlns declarations go on the root only; nsattrs is empty on
        // all recursive calls.
        for (name, value) in nsattrs {
            start.push_attribute((name.as_str(), value.as_str()));
        }
        for attr in &self.attrs {
            start.push_attribute((attr.name.as_str(), attr.value.as_str()));
        }

        let text = self.text.trim();
        if text.is_empty() && self.children.is_empty() {
            writer
                .write_event(Event::Empty(start))
                .map_err(|e| XmlError::Malformed(e.to_string()))?;
            return Ok(());
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| XmlError::Malformed(e.to_string()))?;

        if !text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| XmlError::Malformed(e.to_string()))?;
        }

        for child in &self.children {
            child.encode_recursive(writer, &[])?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| XmlError::Malformed(e.to_string()))?;

        Ok(())
    }

    // Collects xmlns attributes for the prefixes this tree uses, in
    // first-use order.
    fn namespace_used(&self, ns: &Namespace) -> Vec<(String, String)> {
        let mut used: Vec<&str> = Vec::new();
        self.collect_prefixes(&mut used);

        used.into_iter()
            .filter_map(|prefix| {
                ns.by_prefix(prefix)
                    .map(|url| (format!("xmlns:{}", prefix), url.to_string()))
            })
            .collect()
    }

    fn collect_prefixes<'a>(&'a self, used: &mut Vec<&'a str>) {
        if let Some(prefix) = ns_prefix(&self.name) {
            if !used.contains(&prefix) {
                used.push(prefix);
            }
        }
        for attr in &self.attrs {
            if let Some(prefix) = ns_prefix(&attr.name) {
                if !used.contains(&prefix) {
                    used.push(prefix);
                }
            }
        }
        for child in &self.children {
            child.collect_prefixes(used);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_str;

    fn test_ns() -> Namespace {
        [
            ("http://www.w3.org/2003/05/soap-envelope", "s"),
            ("http://schemas.xmlsoap.org/ws/2004/08/addressing", "a"),
            ("http://schemas.xmlsoap.org/ws/2005/04/discovery", "d"),
        ]
        .into_iter()
        .collect()
    }

    fn sample() -> Element {
        Element::new("s:Envelope")
            .child_elem(
                Element::new("s:Header")
                    .child_elem(Element::with_text("a:Action", "urn:example:action"))
                    .child_elem(Element::with_text("a:MessageID", "urn:uuid:1234")),
            )
            .child_elem(
                Element::new("s:Body")
                    .child_elem(Element::new("d:Probe").child_elem(Element::with_text(
                        "d:Types",
                        "devprof:Device",
                    ))),
            )
    }

    #[test]
    fn test_encode_declares_used_namespaces_only() {
        let out = sample().encode_string(&test_ns());

        assert!(out.starts_with("<?xml version=\"1.0\"?>"));
        assert!(out.contains("xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\""));
        assert!(out.contains("xmlns:a=\"http://schemas.xmlsoap.org/ws/2004/08/addressing\""));
        assert!(out.contains("xmlns:d=\"http://schemas.xmlsoap.org/ws/2005/04/discovery\""));
    }

    #[test]
    fn test_encode_skips_unused_namespaces() {
        let tree = Element::with_text("s:Envelope", "x");
        let out = tree.encode_string(&test_ns());

        assert!(out.contains("xmlns:s="));
        assert!(!out.contains("xmlns:a="));
        assert!(!out.contains("xmlns:d="));
    }

    #[test]
    fn test_roundtrip() {
        let ns = test_ns();
        let tree = sample();

        let compact = tree.encode_string(&ns);
        let decoded = decode_str(&ns, &compact).unwrap().into_root();
        assert_eq!(decoded, tree);

        let indented = tree.encode_indent_string(&ns, 2);
        let decoded = decode_str(&ns, &indented).unwrap().into_root();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_encode_escapes_text() {
        let tree = Element::with_text("s:Body", "a < b & c");
        let out = tree.encode_string(&test_ns());
        assert!(out.contains("a &lt; b &amp; c"));

        let decoded = decode_str(&test_ns(), &out).unwrap().into_root();
        assert_eq!(decoded.text(), "a < b & c");
    }

    #[test]
    fn test_empty_element_self_closes() {
        let tree = Element::new("s:Body");
        let out = tree.encode_string(&test_ns());
        assert!(out.ends_with("/>"));
    }
}
