//! eSCL enumerations and the protocol version.

use std::fmt;
use std::str::FromStr;

use scanbridge_xml::Element;

use crate::{EsclError, Result};

/// eSCL protocol version, `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// The version this implementation speaks by default.
    pub const DEFAULT: Version = Version {
        major: 2,
        minor: 63,
    };

    pub(crate) fn to_xml(self, name: &str) -> Element {
        Element::with_text(name, self.to_string())
    }

    pub(crate) fn from_xml(elem: &Element) -> Result<Self> {
        elem.text()
            .parse()
            .map_err(|_| EsclError::bad_value(&elem.name, elem.text()))
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let (major, minor) = s.split_once('.').ok_or(())?;
        Ok(Version {
            major: major.parse().map_err(|_| ())?,
            minor: minor.parse().map_err(|_| ())?,
        })
    }
}

macro_rules! escl_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// Returns the wire spelling.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parses the wire spelling.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub(crate) fn to_xml(self, name: &str) -> Element {
                Element::with_text(name, self.as_str())
            }

            pub(crate) fn from_xml(elem: &Element) -> Result<Self> {
                Self::parse(elem.text())
                    .ok_or_else(|| EsclError::bad_value(&elem.name, elem.text()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

escl_enum! {
    /// Overall scanner state.
    ScannerState {
        Idle => "Idle",
        Processing => "Processing",
        Testing => "Testing",
        Stopped => "Stopped",
        Down => "Down",
    }
}

escl_enum! {
    /// Automatic document feeder state.
    AdfState {
        Processing => "ScannerAdfProcessing",
        Empty => "ScannerAdfEmpty",
        Loaded => "ScannerAdfLoaded",
        Jam => "ScannerAdfJam",
    }
}

escl_enum! {
    /// Scan job state.
    JobState {
        Canceled => "Canceled",
        Aborted => "Aborted",
        Completed => "Completed",
        Pending => "Pending",
        Processing => "Processing",
    }
}

escl_enum! {
    /// Why a job reached its terminal state.
    JobStateReason {
        CompletedSuccessfully => "JobCompletedSuccessfully",
        CanceledByUser => "JobCanceledByUser",
        AbortedBySystem => "AbortedBySystem",
        Scanning => "JobScanning",
    }
}
