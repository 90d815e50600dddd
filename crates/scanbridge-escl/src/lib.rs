//! # scanbridge eSCL
//!
//! The eSCL (driverless scanning) protocol: XML types under the `scan`
//! and `pwg` namespaces, codecs for ScannerCapabilities, ScannerStatus
//! and ScanSettings, and [`EsclServer`], a scan-job lifecycle server
//! on top of the abstract [`scanbridge_scanner::Scanner`].
//!
//! The server exposes, under a configurable base path:
//!
//! | Method | Path | Effect |
//! |--------|------|--------|
//! | GET    | `/ScannerCapabilities` | capability document |
//! | GET    | `/ScannerStatus` | status + job history |
//! | POST   | `/ScanJobs` | start a scan job |
//! | GET    | `/ScanJobs/{uuid}/NextDocument` | stream the next page |
//! | GET    | `/ScanJobs/{uuid}/ScanImageInfo` | 501, not implemented |
//! | DELETE | `/ScanJobs/{uuid}` | cancel the job |

mod capsxml;
mod server;
mod settings;
mod status;
mod types;

pub use server::{EsclServer, EsclServerOptions};
pub use settings::ScanSettings;
pub use status::{JobInfo, ScannerStatus};
pub use types::{AdfState, JobState, JobStateReason, ScannerState, Version};

use scanbridge_xml::Namespace;
use thiserror::Error;

/// eSCL namespace URL, prefixed `scan`.
pub const NS_SCAN: &str = "http://schemas.hp.com/imaging/escl/2011/05/03";

/// PWG Semantic Model namespace URL, prefixed `pwg`.
pub const NS_PWG: &str = "http://www.pwg.org/schemas/2010/12/sm";

/// Content type of eSCL XML bodies.
pub const HTTP_CONTENT_TYPE: &str = "text/xml";

/// Returns the namespace map used by all eSCL documents.
pub fn ns_map() -> Namespace {
    [(NS_SCAN, "scan"), (NS_PWG, "pwg")].into_iter().collect()
}

/// eSCL protocol errors.
#[derive(Debug, Error)]
pub enum EsclError {
    /// A malformed or incomplete XML document.
    #[error(transparent)]
    Xml(#[from] scanbridge_xml::XmlError),

    /// An element carried an unknown enumeration value.
    #[error("{element}: unknown value {value:?}")]
    BadValue { element: String, value: String },
}

impl EsclError {
    pub(crate) fn bad_value(element: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BadValue {
            element: element.into(),
            value: value.into(),
        }
    }
}

/// Result type alias for eSCL operations.
pub type Result<T> = std::result::Result<T, EsclError>;
