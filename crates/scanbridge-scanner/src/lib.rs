//! # scanbridge scanner
//!
//! The abstract scanner model the eSCL server is built on: a scan
//! request with optional parameters, a capability descriptor, request
//! validation against capabilities, and the [`Scanner`] / [`Document`]
//! traits that a concrete device driver implements.
//!
//! All request parameters are optional; an unset parameter means "use
//! the scanner default". The image processing adjustments are
//! `Option<i32>` because 0 is a legal value and must be
//! distinguishable from "not requested".

mod caps;
mod request;
mod testutil;
mod types;
mod validate;

pub use caps::{InputCapabilities, Range, ScannerCapabilities, SettingProfile};
pub use request::ScannerRequest;
pub use testutil::{TestDocument, TestScanner};
pub use types::{
    AdfMode, BinaryRendering, CcdChannel, ColorMode, Depth, InputSource, Intent, Region,
    Resolution,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Scanner operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    /// A request parameter value is invalid (outside the acceptable
    /// value range).
    #[error("invalid parameter {field}: {value}")]
    InvalidParam { field: &'static str, value: String },

    /// A request parameter value is well-formed but the device does
    /// not support it.
    #[error("unsupported parameter {field}: {value}")]
    UnsupportedParam { field: &'static str, value: String },

    /// The scanner is busy with another job.
    #[error("device is busy")]
    Busy,

    /// The scanner failed to execute the request.
    #[error("scanner failure: {0}")]
    Failed(String),
}

impl ScanError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString) -> Self {
        Self::InvalidParam {
            field,
            value: value.to_string(),
        }
    }

    pub(crate) fn unsupported(field: &'static str, value: impl ToString) -> Self {
        Self::UnsupportedParam {
            field,
            value: value.to_string(),
        }
    }
}

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

/// One file of a scanned document (one page, usually).
pub struct DocumentFile {
    format: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl DocumentFile {
    /// Wraps a reader producing the file bytes in the given MIME
    /// format.
    pub fn new(format: impl Into<String>, reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self {
            format: format.into(),
            reader,
        }
    }

    /// Returns the file MIME type.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Consumes the file and returns the byte reader.
    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}

impl std::fmt::Debug for DocumentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFile")
            .field("format", &self.format)
            .finish()
    }
}

/// A scanned document: a sequence of files consumed page by page.
///
/// Dropping the document releases the underlying scan.
#[async_trait]
pub trait Document: Send {
    /// Returns the next file, or `None` at the end of the document.
    async fn next(&mut self) -> std::io::Result<Option<DocumentFile>>;
}

/// The abstract scanner a protocol server drives.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Returns the scanner capability descriptor.
    fn capabilities(&self) -> ScannerCapabilities;

    /// Starts a scan. The request has already passed
    /// [`ScannerRequest::validate`] by the time a server calls this,
    /// but a driver is free to re-check.
    async fn scan(&self, request: ScannerRequest) -> Result<Box<dyn Document>>;
}
