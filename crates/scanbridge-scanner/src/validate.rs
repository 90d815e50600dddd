//! Request validation against capabilities.

use crate::caps::{Range, ScannerCapabilities};
use crate::request::ScannerRequest;
use crate::types::{
    AdfMode, BinaryRendering, CcdChannel, ColorMode, Depth, InputSource, Intent,
};
use crate::{Result, ScanError};

impl ScannerRequest {
    /// Checks the request against the scanner capabilities.
    ///
    /// Checks are applied in a fixed order and the first failure is
    /// returned: input source, ADF mode, color mode (with rendering
    /// and threshold for binary, depth for mono/color), CCD channel,
    /// then the image processing adjustments against their capability
    /// ranges.
    ///
    /// An adjustment whose capability range is absent is acceptable
    /// only when the request leaves it unset.
    pub fn validate(&self, caps: &ScannerCapabilities) -> Result<()> {
        // Gather overall scanner parameters across the present inputs.
        let mut inputs: Vec<InputSource> = Vec::new();
        let mut adf_modes: Vec<AdfMode> = Vec::new();
        let mut color_modes: Vec<ColorMode> = Vec::new();
        let mut depths: Vec<Depth> = Vec::new();
        let mut renderings: Vec<BinaryRendering> = Vec::new();
        let mut ccd_channels: Vec<CcdChannel> = Vec::new();
        let mut intents: Vec<Intent> = Vec::new();

        if caps.platen.is_some() {
            inputs.push(InputSource::Platen);
        }
        if caps.has_adf() {
            inputs.push(InputSource::Adf);
            if caps.adf_simplex.is_some() {
                adf_modes.push(AdfMode::Simplex);
            }
            if caps.adf_duplex.is_some() {
                adf_modes.push(AdfMode::Duplex);
            }
        }

        for input in caps.inputs() {
            intents.extend(&input.intents);
            for profile in &input.profiles {
                color_modes.extend(&profile.color_modes);
                depths.extend(&profile.depths);
                renderings.extend(&profile.binary_renderings);
                ccd_channels.extend(&profile.ccd_channels);
            }
        }

        // Input and ADF mode.
        if let Some(input) = self.input {
            if !inputs.contains(&input) {
                return Err(ScanError::unsupported("Input", input));
            }
        }

        if self.input == Some(InputSource::Adf) {
            if let Some(mode) = self.adf_mode {
                if !adf_modes.contains(&mode) {
                    return Err(ScanError::unsupported("ADFMode", mode));
                }
            }
        }

        // Color mode, with its dependent parameters.
        if let Some(mode) = self.color_mode {
            if !color_modes.contains(&mode) {
                return Err(ScanError::unsupported("ColorMode", mode));
            }
        }

        match self.color_mode {
            Some(ColorMode::Binary) => {
                if let Some(rendering) = self.binary_rendering {
                    if !renderings.contains(&rendering) {
                        return Err(ScanError::unsupported("BinaryRendering", rendering));
                    }
                }
                validate_range("Threshold", caps.threshold_range, self.threshold)?;
            }
            Some(ColorMode::Mono) | Some(ColorMode::Color) => {
                if let Some(depth) = self.depth {
                    if !depths.contains(&depth) {
                        return Err(ScanError::unsupported("Depth", depth));
                    }
                }
            }
            None => {}
        }

        // CCD channel.
        if let Some(channel) = self.ccd_channel {
            if !ccd_channels.contains(&channel) {
                return Err(ScanError::unsupported("CCDChannel", channel));
            }
        }

        // Image processing adjustments.
        validate_range("Brightness", caps.brightness_range, self.brightness)?;
        validate_range("Contrast", caps.contrast_range, self.contrast)?;
        validate_range("Gamma", caps.gamma_range, self.gamma)?;
        validate_range("Highlight", caps.highlight_range, self.highlight)?;
        validate_range("NoiseRemoval", caps.noise_removal_range, self.noise_removal)?;
        validate_range("Shadow", caps.shadow_range, self.shadow)?;
        validate_range("Sharpen", caps.sharpen_range, self.sharpen)?;
        validate_range("Compression", caps.compression_range, self.compression)?;

        Ok(())
    }
}

/// Validates an optional adjustment against its capability range.
///
/// Unset values always pass. A set value with no capability range is
/// unsupported; a set value outside the range (or off its step grid)
/// is invalid.
fn validate_range(field: &'static str, range: Option<Range>, value: Option<i32>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };

    let Some(range) = range else {
        return Err(ScanError::unsupported(field, value));
    };

    if !range.contains(value) {
        return Err(ScanError::invalid(field, value));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{InputCapabilities, SettingProfile};
    use crate::types::Resolution;

    fn caps() -> ScannerCapabilities {
        let profile = SettingProfile {
            color_modes: vec![ColorMode::Binary, ColorMode::Mono, ColorMode::Color],
            depths: vec![Depth::Bits8],
            binary_renderings: vec![BinaryRendering::Threshold],
            ccd_channels: vec![CcdChannel::Ntsc],
            document_formats: vec!["image/jpeg".into(), "application/pdf".into()],
            resolutions: vec![Resolution::dpi(200), Resolution::dpi(300)],
        };

        ScannerCapabilities {
            make_and_model: "Test Scanner 9000".into(),
            platen: Some(InputCapabilities {
                intents: vec![Intent::Document, Intent::Photo],
                profiles: vec![profile.clone()],
                ..Default::default()
            }),
            adf_simplex: Some(InputCapabilities {
                intents: vec![Intent::Document],
                profiles: vec![profile],
                ..Default::default()
            }),
            brightness_range: Some(Range::new(-100, 100, 0)),
            threshold_range: Some(Range::new(0, 255, 128)),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_request_passes() {
        assert!(ScannerRequest::default().validate(&caps()).is_ok());
    }

    #[test]
    fn test_supported_inputs() {
        let caps = caps();

        let request = ScannerRequest {
            input: Some(InputSource::Platen),
            ..Default::default()
        };
        assert!(request.validate(&caps).is_ok());

        let request = ScannerRequest {
            input: Some(InputSource::Adf),
            adf_mode: Some(AdfMode::Simplex),
            ..Default::default()
        };
        assert!(request.validate(&caps).is_ok());
    }

    #[test]
    fn test_unsupported_adf_mode() {
        let request = ScannerRequest {
            input: Some(InputSource::Adf),
            adf_mode: Some(AdfMode::Duplex),
            ..Default::default()
        };

        assert_eq!(
            request.validate(&caps()).unwrap_err(),
            ScanError::UnsupportedParam {
                field: "ADFMode",
                value: "Duplex".into()
            }
        );
    }

    #[test]
    fn test_adf_mode_ignored_for_platen() {
        // ADFMode is only checked when the ADF is selected.
        let request = ScannerRequest {
            input: Some(InputSource::Platen),
            adf_mode: Some(AdfMode::Duplex),
            ..Default::default()
        };
        assert!(request.validate(&caps()).is_ok());
    }

    #[test]
    fn test_unsupported_input_without_platen() {
        let mut caps = caps();
        caps.platen = None;

        let request = ScannerRequest {
            input: Some(InputSource::Platen),
            ..Default::default()
        };
        assert_eq!(
            request.validate(&caps).unwrap_err(),
            ScanError::UnsupportedParam {
                field: "Input",
                value: "Platen".into()
            }
        );
    }

    #[test]
    fn test_binary_mode_checks_rendering_and_threshold() {
        let caps = caps();

        let ok = ScannerRequest {
            color_mode: Some(ColorMode::Binary),
            binary_rendering: Some(BinaryRendering::Threshold),
            threshold: Some(128),
            ..Default::default()
        };
        assert!(ok.validate(&caps).is_ok());

        let bad_rendering = ScannerRequest {
            color_mode: Some(ColorMode::Binary),
            binary_rendering: Some(BinaryRendering::Halftone),
            ..Default::default()
        };
        assert!(matches!(
            bad_rendering.validate(&caps),
            Err(ScanError::UnsupportedParam { field: "BinaryRendering", .. })
        ));

        let bad_threshold = ScannerRequest {
            color_mode: Some(ColorMode::Binary),
            threshold: Some(300),
            ..Default::default()
        };
        assert_eq!(
            bad_threshold.validate(&caps).unwrap_err(),
            ScanError::InvalidParam {
                field: "Threshold",
                value: "300".into()
            }
        );
    }

    #[test]
    fn test_depth_checked_for_mono_and_color() {
        let caps = caps();

        let bad = ScannerRequest {
            color_mode: Some(ColorMode::Color),
            depth: Some(Depth::Bits16),
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(&caps),
            Err(ScanError::UnsupportedParam { field: "Depth", .. })
        ));

        // Depth is not checked for binary scans.
        let binary = ScannerRequest {
            color_mode: Some(ColorMode::Binary),
            depth: Some(Depth::Bits16),
            ..Default::default()
        };
        assert!(binary.validate(&caps).is_ok());
    }

    #[test]
    fn test_ccd_channel() {
        let caps = caps();

        let ok = ScannerRequest {
            ccd_channel: Some(CcdChannel::Ntsc),
            ..Default::default()
        };
        assert!(ok.validate(&caps).is_ok());

        let bad = ScannerRequest {
            ccd_channel: Some(CcdChannel::Red),
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(&caps),
            Err(ScanError::UnsupportedParam { field: "CCDChannel", .. })
        ));
    }

    #[test]
    fn test_adjustment_ranges() {
        let caps = caps();

        let ok = ScannerRequest {
            brightness: Some(0),
            ..Default::default()
        };
        assert!(ok.validate(&caps).is_ok());

        // Out of range: invalid.
        let out_of_range = ScannerRequest {
            brightness: Some(1000),
            ..Default::default()
        };
        assert_eq!(
            out_of_range.validate(&caps).unwrap_err(),
            ScanError::InvalidParam {
                field: "Brightness",
                value: "1000".into()
            }
        );

        // No capability range at all: unsupported, even for 0.
        let unsupported = ScannerRequest {
            sharpen: Some(0),
            ..Default::default()
        };
        assert_eq!(
            unsupported.validate(&caps).unwrap_err(),
            ScanError::UnsupportedParam {
                field: "Sharpen",
                value: "0".into()
            }
        );
    }

    #[test]
    fn test_first_failure_wins() {
        // Both the input and the brightness are bad; the input check
        // runs first.
        let mut caps = caps();
        caps.platen = None;

        let request = ScannerRequest {
            input: Some(InputSource::Platen),
            brightness: Some(99999),
            ..Default::default()
        };

        assert!(matches!(
            request.validate(&caps),
            Err(ScanError::UnsupportedParam { field: "Input", .. })
        ));
    }
}
