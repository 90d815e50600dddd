//! ScannerCapabilities XML serialization.

use scanbridge_scanner::{
    BinaryRendering, Depth, InputCapabilities, Range, ScannerCapabilities, SettingProfile,
};
use scanbridge_xml::Element;

use crate::settings::{ccd_channel_name, color_mode_name, intent_name};
use crate::types::Version;

/// Serializes the capability descriptor into the eSCL
/// `<scan:ScannerCapabilities>` document.
pub(crate) fn caps_to_xml(version: Version, caps: &ScannerCapabilities) -> Element {
    let mut root = Element::new("scan:ScannerCapabilities")
        .child_elem(version.to_xml("pwg:Version"))
        .child_elem(Element::with_text("pwg:MakeAndModel", &caps.make_and_model));

    if !caps.serial_number.is_empty() {
        root.push(Element::with_text("pwg:SerialNumber", &caps.serial_number));
    }
    if !caps.uuid.is_empty() {
        root.push(Element::with_text("scan:UUID", &caps.uuid));
    }
    if !caps.admin_uri.is_empty() {
        root.push(Element::with_text("scan:AdminURI", &caps.admin_uri));
    }

    if let Some(platen) = &caps.platen {
        root.push(
            Element::new("scan:Platen")
                .child_elem(input_caps_to_xml("scan:PlatenInputCaps", platen)),
        );
    }

    if caps.adf_simplex.is_some() || caps.adf_duplex.is_some() {
        let mut adf = Element::new("scan:Adf");
        if let Some(simplex) = &caps.adf_simplex {
            adf.push(input_caps_to_xml("scan:AdfSimplexInputCaps", simplex));
        }
        if let Some(duplex) = &caps.adf_duplex {
            adf.push(input_caps_to_xml("scan:AdfDuplexInputCaps", duplex));
        }
        root.push(adf);
    }

    push_range(&mut root, "scan:BrightnessSupport", caps.brightness_range);
    push_range(&mut root, "scan:ContrastSupport", caps.contrast_range);
    push_range(&mut root, "scan:GammaSupport", caps.gamma_range);
    push_range(&mut root, "scan:HighlightSupport", caps.highlight_range);
    push_range(&mut root, "scan:NoiseRemovalSupport", caps.noise_removal_range);
    push_range(&mut root, "scan:ShadowSupport", caps.shadow_range);
    push_range(&mut root, "scan:SharpenSupport", caps.sharpen_range);
    push_range(&mut root, "scan:ThresholdSupport", caps.threshold_range);
    push_range(
        &mut root,
        "scan:CompressionFactorSupport",
        caps.compression_range,
    );

    root
}

fn push_range(parent: &mut Element, name: &str, range: Option<Range>) {
    if let Some(range) = range {
        parent.push(range_to_xml(name, range));
    }
}

fn range_to_xml(name: &str, range: Range) -> Element {
    let mut elem = Element::new(name)
        .child_elem(Element::with_text("scan:Min", range.min.to_string()))
        .child_elem(Element::with_text("scan:Max", range.max.to_string()))
        .child_elem(Element::with_text("scan:Normal", range.normal.to_string()));

    if let Some(step) = range.step {
        elem.push(Element::with_text("scan:Step", step.to_string()));
    }

    elem
}

fn input_caps_to_xml(name: &str, input: &InputCapabilities) -> Element {
    let mut elem = Element::new(name)
        .child_elem(Element::with_text("scan:MinWidth", input.min_width.to_string()))
        .child_elem(Element::with_text("scan:MaxWidth", input.max_width.to_string()))
        .child_elem(Element::with_text("scan:MinHeight", input.min_height.to_string()))
        .child_elem(Element::with_text("scan:MaxHeight", input.max_height.to_string()));

    if !input.profiles.is_empty() {
        let mut profiles = Element::new("scan:SettingProfiles");
        for profile in &input.profiles {
            profiles.push(profile_to_xml(profile));
        }
        elem.push(profiles);
    }

    if !input.intents.is_empty() {
        let mut intents = Element::new("scan:SupportedIntents");
        for intent in &input.intents {
            intents.push(Element::with_text("scan:Intent", intent_name(*intent)));
        }
        elem.push(intents);
    }

    elem
}

fn profile_to_xml(profile: &SettingProfile) -> Element {
    let mut elem = Element::new("scan:SettingProfile");

    if !profile.color_modes.is_empty() {
        let mut modes = Element::new("scan:ColorModes");
        // The eSCL color mode names carry the depth; emit one entry
        // per supported (mode, depth) combination.
        for mode in &profile.color_modes {
            let depths: &[Depth] = if profile.depths.is_empty() {
                &[Depth::Bits8]
            } else {
                &profile.depths
            };
            match mode {
                scanbridge_scanner::ColorMode::Binary => {
                    modes.push(Element::with_text(
                        "scan:ColorMode",
                        color_mode_name(*mode, Depth::Bits8),
                    ));
                }
                _ => {
                    for depth in depths {
                        modes.push(Element::with_text(
                            "scan:ColorMode",
                            color_mode_name(*mode, *depth),
                        ));
                    }
                }
            }
        }
        elem.push(modes);
    }

    if !profile.document_formats.is_empty() {
        let mut formats = Element::new("scan:DocumentFormats");
        for format in &profile.document_formats {
            formats.push(Element::with_text("pwg:DocumentFormat", format));
        }
        elem.push(formats);
    }

    if !profile.resolutions.is_empty() {
        let mut discrete = Element::new("scan:DiscreteResolutions");
        for resolution in &profile.resolutions {
            discrete.push(
                Element::new("scan:DiscreteResolution")
                    .child_elem(Element::with_text(
                        "scan:XResolution",
                        resolution.x.to_string(),
                    ))
                    .child_elem(Element::with_text(
                        "scan:YResolution",
                        resolution.y.to_string(),
                    )),
            );
        }
        elem.push(Element::new("scan:SupportedResolutions").child_elem(discrete));
    }

    if !profile.ccd_channels.is_empty() {
        let mut channels = Element::new("scan:CcdChannels");
        for channel in &profile.ccd_channels {
            channels.push(Element::with_text(
                "scan:CcdChannel",
                ccd_channel_name(*channel),
            ));
        }
        elem.push(channels);
    }

    if !profile.binary_renderings.is_empty() {
        let mut renderings = Element::new("scan:BinaryRenderings");
        for rendering in &profile.binary_renderings {
            let name = match rendering {
                BinaryRendering::Halftone => "Halftone",
                BinaryRendering::Threshold => "Threshold",
            };
            renderings.push(Element::with_text("scan:BinaryRendering", name));
        }
        elem.push(renderings);
    }

    elem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns_map;
    use scanbridge_scanner::TestScanner;
    use scanbridge_scanner::Scanner;

    #[test]
    fn test_caps_document_shape() {
        let scanner = TestScanner::new();
        let xml = caps_to_xml(Version::DEFAULT, &scanner.capabilities());

        assert_eq!(xml.name, "scan:ScannerCapabilities");
        assert!(xml.child("pwg:Version").is_some());
        assert!(xml.child("pwg:MakeAndModel").is_some());
        assert!(xml.child("scan:Platen").is_some());

        let adf = xml.child("scan:Adf").unwrap();
        assert!(adf.child("scan:AdfSimplexInputCaps").is_some());
        assert!(adf.child("scan:AdfDuplexInputCaps").is_none());

        assert!(xml.child("scan:BrightnessSupport").is_some());
        assert!(xml.child("scan:GammaSupport").is_none());
    }

    #[test]
    fn test_caps_color_modes_carry_depth() {
        let scanner = TestScanner::new();
        let xml = caps_to_xml(Version::DEFAULT, &scanner.capabilities());

        let encoded = xml.encode_string(&ns_map());
        assert!(encoded.contains("BlackAndWhite1"));
        assert!(encoded.contains("Grayscale8"));
        assert!(encoded.contains("RGB24"));
    }

    #[test]
    fn test_caps_encode_parses_back() {
        let scanner = TestScanner::new();
        let xml = caps_to_xml(Version::DEFAULT, &scanner.capabilities());
        let encoded = xml.encode_indent_string(&ns_map(), 2);

        let decoded = scanbridge_xml::decode_str(&ns_map(), &encoded).unwrap();
        assert_eq!(decoded.root().name, "scan:ScannerCapabilities");
    }
}
