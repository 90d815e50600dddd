//! # scanbridge XML
//!
//! A small XML document model shared by the scanbridge wire protocols
//! (WS-Discovery SOAP envelopes, eSCL request/response bodies and the
//! WSD metadata exchange).
//!
//! The model is deliberately simpler than a full DOM:
//!
//! - An [`Element`] is a value-type tree of `(name, text, attrs, children)`.
//! - Element and attribute names carry a short namespace prefix
//!   (`"s:Envelope"`). On decode, the full namespace URL found in the
//!   document is rewritten to the short prefix registered in a
//!   [`Namespace`] map; URLs that are not registered are rewritten to
//!   the `"-"` prefix so that unknown elements can never be confused
//!   with known ones.
//! - [`decode`] returns a [`Document`] that also exposes the linear
//!   document order and a root-anchored path per element, used for
//!   error context.
//! - [`Element::encode`] writes standard XML back, emitting
//!   `xmlns:prefix="url"` declarations for exactly the subset of
//!   prefixes the tree actually uses.
//!
//! Decoding and re-encoding a tree yields an equivalent tree modulo
//! whitespace normalization and namespace-prefix canonicalization.

mod decode;
mod element;
mod encode;
mod ns;

pub use decode::{decode, decode_str, Document};
pub use element::{Attr, Element};
pub use ns::Namespace;

use thiserror::Error;

/// Errors produced by the XML document model.
///
/// Lookup errors carry the namespace-prefixed name (or root-anchored
/// path) of the offending element so that wire-protocol errors point at
/// the exact spot in the document.
#[derive(Debug, Error)]
pub enum XmlError {
    /// A required element was not found.
    #[error("{0}: missed")]
    Missed(String),

    /// An element body failed to parse as the expected value.
    #[error("{name}: invalid value {value:?}")]
    Value { name: String, value: String },

    /// The input is not well-formed XML.
    #[error("malformed XML: {0}")]
    Malformed(String),
}

impl XmlError {
    /// Creates a missed-element error.
    pub fn missed(name: impl Into<String>) -> Self {
        Self::Missed(name.into())
    }

    /// Creates an invalid-value error for the named element.
    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Value {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Prepends the name of an enclosing element to the error context,
    /// turning `"s:Body: missed"` into `"s:Envelope/s:Body: missed"`.
    pub fn wrap(self, outer: &str) -> Self {
        match self {
            Self::Missed(name) => Self::Missed(format!("{}/{}", outer, name)),
            Self::Value { name, value } => Self::Value {
                name: format!("{}/{}", outer, name),
                value,
            },
            other => other,
        }
    }
}

/// Result type alias for XML operations.
pub type Result<T> = std::result::Result<T, XmlError>;
