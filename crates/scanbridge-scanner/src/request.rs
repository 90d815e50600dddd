//! Scan request.

use crate::types::{
    AdfMode, BinaryRendering, CcdChannel, ColorMode, Depth, InputSource, Intent, Region,
    Resolution,
};

/// Scan request parameters.
///
/// Every parameter is optional; `None` means the scanner default is
/// used. The image processing adjustments are optional integers so
/// that an explicit 0 is distinguishable from "not requested".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannerRequest {
    /// Input source (platen or ADF).
    pub input: Option<InputSource>,

    /// ADF mode; only meaningful when `input` is the ADF.
    pub adf_mode: Option<AdfMode>,

    /// Color mode.
    pub color_mode: Option<ColorMode>,

    /// Image depth; meaningful for mono and color modes.
    pub depth: Option<Depth>,

    /// 1-bit rendering; meaningful for the binary color mode.
    pub binary_rendering: Option<BinaryRendering>,

    /// CCD channel for mono/grayscale scans.
    pub ccd_channel: Option<CcdChannel>,

    /// Requested document MIME type.
    pub document_format: Option<String>,

    /// Scan region.
    pub region: Option<Region>,

    /// Scan resolution.
    pub resolution: Option<Resolution>,

    /// Scan intent hint.
    pub intent: Option<Intent>,

    // Image processing adjustments.
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    /// Gamma correction, y = x^(1/g), scaled by 1000.
    pub gamma: Option<i32>,
    pub highlight: Option<i32>,
    pub noise_removal: Option<i32>,
    /// The lower, the darker.
    pub shadow: Option<i32>,
    pub sharpen: Option<i32>,
    /// Binary threshold; meaningful with the threshold rendering.
    pub threshold: Option<i32>,
    /// Compression factor; lower means better image.
    pub compression: Option<i32>,
}
