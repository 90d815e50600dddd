//! XML decoder.

use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::element::{Attr, Element};
use crate::{Namespace, Result, XmlError};

/// A decoded XML document.
///
/// Besides the element tree itself, the document keeps the linear
/// document order of element paths (root first, then its first child
/// and so on). Paths are root-anchored, `/`-joined sequences of
/// rewritten names (`"/s:Envelope/s:Body"`) and are used for error
/// reporting and diagnostics.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
    paths: Vec<String>,
}

impl Document {
    /// Returns the root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Consumes the document and returns the root element.
    pub fn into_root(self) -> Element {
        self.root
    }

    /// Returns element paths in linear document order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

// Decoder arena node. Parent back-references stay inside the decoder;
// the assembled tree owns its children outright.
#[derive(Default)]
struct RawNode {
    name: String,
    text: String,
    attrs: Vec<Attr>,
    children: Vec<usize>,
    parent: Option<usize>,
}

/// Decodes an XML document from a reader.
///
/// Element and attribute namespaces are rewritten through the `ns` map:
/// the full URL found in the document is replaced with the registered
/// short prefix, and URLs missing from the map are replaced with `"-"`.
/// Character data is trimmed of surrounding whitespace and assigned to
/// the most recently opened element.
pub fn decode<R: BufRead>(ns: &Namespace, reader: R) -> Result<Document> {
    let mut reader = NsReader::from_reader(reader);
    let mut buf = Vec::new();

    let mut nodes: Vec<RawNode> = Vec::new();
    let mut paths: Vec<String> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut path = String::new();

    loop {
        let (resolve, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| XmlError::Malformed(e.to_string()))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                let name = rewrite_name(ns, &resolve, e.local_name().as_ref())?;

                let mut attrs = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;

                    // xmlns declarations are consumed by the resolver.
                    let key = attr.key.as_ref();
                    if key == b"xmlns" || key.starts_with(b"xmlns:") {
                        continue;
                    }

                    let (attr_resolve, attr_local) = reader.resolve_attribute(attr.key);
                    let attr_name = match attr_resolve {
                        ResolveResult::Unbound => {
                            String::from_utf8_lossy(attr.key.as_ref()).into_owned()
                        }
                        other => rewrite_name(ns, &other, attr_local.as_ref())?,
                    };
                    let value = attr
                        .unescape_value()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    attrs.push(Attr::new(attr_name, value.into_owned()));
                }

                path.push('/');
                path.push_str(&name);

                let parent = stack.last().copied();
                let idx = nodes.len();
                nodes.push(RawNode {
                    name,
                    attrs,
                    parent,
                    ..RawNode::default()
                });
                paths.push(path.clone());

                if let Some(p) = parent {
                    nodes[p].children.push(idx);
                }

                if empty {
                    truncate_path(&mut path, &nodes, parent);
                } else {
                    stack.push(idx);
                }
            }

            Event::End(_) => {
                stack.pop();
                truncate_path(&mut path, &nodes, stack.last().copied());
            }

            Event::Text(t) => {
                if let Some(&cur) = stack.last() {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    append_text(&mut nodes[cur].text, text.trim());
                }
            }

            Event::CData(t) => {
                if let Some(&cur) = stack.last() {
                    let raw = t.into_inner();
                    let text = String::from_utf8_lossy(&raw);
                    append_text(&mut nodes[cur].text, text.trim());
                }
            }

            Event::Eof => break,

            // Declarations, comments and processing instructions carry
            // no document content.
            _ => {}
        }

        buf.clear();
    }

    if nodes.is_empty() {
        return Err(XmlError::Malformed("empty document".into()));
    }

    let root = assemble(&mut nodes, 0);
    Ok(Document { root, paths })
}

/// Decodes an XML document from a string.
pub fn decode_str(ns: &Namespace, input: &str) -> Result<Document> {
    decode(ns, input.as_bytes())
}

// Rebuilds the path prefix after closing an element.
fn truncate_path(path: &mut String, nodes: &[RawNode], top: Option<usize>) {
    path.clear();
    // Path of the new top element, rebuilt parent-first.
    let mut chain = Vec::new();
    let mut cur = top;
    while let Some(idx) = cur {
        chain.push(idx);
        cur = nodes[idx].parent;
    }
    for idx in chain.into_iter().rev() {
        path.push('/');
        path.push_str(&nodes[idx].name);
    }
}

fn append_text(dst: &mut String, fragment: &str) {
    if !fragment.is_empty() {
        dst.push_str(fragment);
    }
}

fn rewrite_name(ns: &Namespace, resolve: &ResolveResult, local: &[u8]) -> Result<String> {
    let local =
        std::str::from_utf8(local).map_err(|_| XmlError::Malformed("non-UTF8 name".into()))?;

    let name = match resolve {
        ResolveResult::Bound(url) => {
            let url = std::str::from_utf8(url.0)
                .map_err(|_| XmlError::Malformed("non-UTF8 namespace".into()))?;
            match ns.by_url(url) {
                Some(prefix) => format!("{}:{}", prefix, local),
                None => format!("-:{}", local),
            }
        }
        ResolveResult::Unknown(_) => format!("-:{}", local),
        ResolveResult::Unbound => local.to_string(),
    };

    Ok(name)
}

// Moves the arena subtree rooted at idx into an owned Element.
fn assemble(nodes: &mut [RawNode], idx: usize) -> Element {
    let name = std::mem::take(&mut nodes[idx].name);
    let text = std::mem::take(&mut nodes[idx].text);
    let attrs = std::mem::take(&mut nodes[idx].attrs);
    let child_ids = std::mem::take(&mut nodes[idx].children);

    let children = child_ids
        .into_iter()
        .map(|c| assemble(nodes, c))
        .collect();

    Element {
        name,
        text,
        attrs,
        children,
    }
}
