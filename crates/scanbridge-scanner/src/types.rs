//! Scan parameter enumerations.

use std::fmt;

/// Document input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// Flatbed glass.
    Platen,
    /// Automatic document feeder.
    Adf,
}

/// ADF scanning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdfMode {
    Simplex,
    Duplex,
}

/// Color mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    /// 1-bit black and white.
    Binary,
    /// Grayscale.
    Mono,
    /// Full color.
    Color,
}

/// Image depth, bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    Bits8,
    Bits16,
}

/// How 1-bit black and white is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryRendering {
    Halftone,
    Threshold,
}

/// CCD channel used for monochrome or grayscale scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CcdChannel {
    Red,
    Green,
    Blue,
    /// NTSC-weighted luminance.
    Ntsc,
    /// Hardware gray channel.
    GrayCcd,
    /// Gray emulated from RGB.
    GrayCcdEmulated,
}

/// Scan intent hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Document,
    TextAndGraphic,
    Photo,
    Preview,
    Object,
    BusinessCard,
}

/// Scan region, in 1/300 inch units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Region {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
}

/// Scan resolution, DPI per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

impl Resolution {
    /// A square resolution.
    pub fn dpi(res: u32) -> Self {
        Self { x: res, y: res }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

macro_rules! display_as_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self)
            }
        })*
    };
}

display_as_debug!(InputSource, AdfMode, ColorMode, Depth, BinaryRendering, CcdChannel, Intent);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(InputSource::Adf.to_string(), "Adf");
        assert_eq!(Resolution::dpi(300).to_string(), "300x300");
    }
}
