//! Namespace map: full namespace URL to short prefix.

/// A single namespace binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NsEntry {
    pub url: String,
    pub prefix: String,
}

/// Ordered map between full namespace URLs and the short prefixes used
/// in element and attribute names.
///
/// The same map is used in both directions: the decoder rewrites URLs
/// found in the document to prefixes, the encoder emits
/// `xmlns:prefix="url"` declarations for the prefixes a tree uses.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: Vec<NsEntry>,
}

impl Namespace {
    /// Creates an empty namespace map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `(url, prefix)` binding.
    pub fn append(&mut self, url: impl Into<String>, prefix: impl Into<String>) {
        self.entries.push(NsEntry {
            url: url.into(),
            prefix: prefix.into(),
        });
    }

    /// Returns the prefix registered for the URL.
    pub fn by_url(&self, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.url == url)
            .map(|e| e.prefix.as_str())
    }

    /// Returns the URL registered for the prefix.
    pub fn by_prefix(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.prefix == prefix)
            .map(|e| e.url.as_str())
    }

    /// Number of bindings in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(url, prefix)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.url.as_str(), e.prefix.as_str()))
    }
}

impl<U, P> FromIterator<(U, P)> for Namespace
where
    U: Into<String>,
    P: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (U, P)>>(iter: T) -> Self {
        let mut ns = Namespace::new();
        for (url, prefix) in iter {
            ns.append(url, prefix);
        }
        ns
    }
}
