//! ScanSettings: the POST /ScanJobs request body.

use scanbridge_scanner::{
    AdfMode, BinaryRendering, CcdChannel, ColorMode, Depth, InputSource, Intent, Region,
    Resolution, ScannerRequest,
};
use scanbridge_xml::Element;

use crate::types::Version;
use crate::{EsclError, Result};

/// The decoded `<scan:ScanSettings>` document.
///
/// Field spellings follow the wire protocol; [`ScanSettings::to_request`]
/// translates into the scanner abstraction's request model (the eSCL
/// color mode encodes both the color mode and the depth, the
/// duplex flag becomes the ADF mode, and so on).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSettings {
    pub version: Option<Version>,
    pub intent: Option<Intent>,
    pub input_source: Option<InputSource>,
    pub duplex: Option<bool>,
    pub color_mode: Option<ColorMode>,
    pub depth: Option<Depth>,
    pub binary_rendering: Option<BinaryRendering>,
    pub ccd_channel: Option<CcdChannel>,
    pub document_format: Option<String>,
    pub region: Option<Region>,
    pub resolution: Option<Resolution>,

    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub gamma: Option<i32>,
    pub highlight: Option<i32>,
    pub noise_removal: Option<i32>,
    pub shadow: Option<i32>,
    pub sharpen: Option<i32>,
    pub threshold: Option<i32>,
    pub compression: Option<i32>,
}

impl ScanSettings {
    /// Decodes the settings from the request body XML tree.
    pub fn from_xml(root: &Element) -> Result<Self> {
        if root.name != "scan:ScanSettings" {
            return Err(EsclError::Xml(scanbridge_xml::XmlError::missed(
                "scan:ScanSettings",
            )));
        }

        let mut settings = ScanSettings {
            version: match root.child("pwg:Version") {
                Some(elem) => Some(Version::from_xml(elem)?),
                None => None,
            },
            ..Default::default()
        };

        if let Some(elem) = root.child("scan:Intent") {
            settings.intent = Some(decode_intent(elem)?);
        }

        if let Some(elem) = root.child("pwg:InputSource") {
            settings.input_source = decode_input_source(elem)?;
        }

        if let Some(elem) = root.child("scan:Duplex") {
            settings.duplex = Some(elem.text_bool()?);
        }

        if let Some(elem) = root.child("scan:ColorMode") {
            let (mode, depth) = decode_color_mode(elem)?;
            settings.color_mode = Some(mode);
            settings.depth = depth;
        }

        if let Some(elem) = root.child("scan:BinaryRendering") {
            settings.binary_rendering = Some(decode_binary_rendering(elem)?);
        }

        if let Some(elem) = root.child("scan:CcdChannel") {
            settings.ccd_channel = Some(decode_ccd_channel(elem)?);
        }

        settings.document_format = root
            .child("scan:DocumentFormatExt")
            .or_else(|| root.child("pwg:DocumentFormat"))
            .map(|elem| elem.text().to_string());

        if let Some(regions) = root.child("pwg:ScanRegions") {
            if let Some(region) = regions.child("pwg:ScanRegion") {
                settings.region = Some(decode_region(region)?);
            }
        }

        let x_res = root.child("scan:XResolution");
        let y_res = root.child("scan:YResolution");
        if let (Some(x), Some(y)) = (x_res, y_res) {
            settings.resolution = Some(Resolution {
                x: x.text_uint()?,
                y: y.text_uint()?,
            });
        }

        settings.brightness = opt_int(root, "scan:Brightness")?;
        settings.contrast = opt_int(root, "scan:Contrast")?;
        settings.gamma = opt_int(root, "scan:Gamma")?;
        settings.highlight = opt_int(root, "scan:Highlight")?;
        settings.noise_removal = opt_int(root, "scan:NoiseRemoval")?;
        settings.shadow = opt_int(root, "scan:Shadow")?;
        settings.sharpen = opt_int(root, "scan:Sharpen")?;
        settings.threshold = opt_int(root, "scan:Threshold")?;
        settings.compression = opt_int(root, "scan:CompressionFactor")?;

        Ok(settings)
    }

    /// Translates the settings into a [`ScannerRequest`].
    pub fn to_request(&self) -> ScannerRequest {
        // The duplex flag only makes sense for the feeder.
        let adf_mode = match (self.input_source, self.duplex) {
            (Some(InputSource::Adf), Some(true)) => Some(AdfMode::Duplex),
            (Some(InputSource::Adf), Some(false)) => Some(AdfMode::Simplex),
            _ => None,
        };

        ScannerRequest {
            input: self.input_source,
            adf_mode,
            color_mode: self.color_mode,
            depth: self.depth,
            binary_rendering: self.binary_rendering,
            ccd_channel: self.ccd_channel,
            document_format: self.document_format.clone(),
            region: self.region,
            resolution: self.resolution,
            intent: self.intent,
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
            highlight: self.highlight,
            noise_removal: self.noise_removal,
            shadow: self.shadow,
            sharpen: self.sharpen,
            threshold: self.threshold,
            compression: self.compression,
        }
    }
}

fn opt_int(root: &Element, name: &str) -> Result<Option<i32>> {
    match root.child(name) {
        Some(elem) => Ok(Some(elem.text_int()?)),
        None => Ok(None),
    }
}

fn decode_input_source(elem: &Element) -> Result<Option<InputSource>> {
    match elem.text() {
        "Platen" => Ok(Some(InputSource::Platen)),
        "Feeder" => Ok(Some(InputSource::Adf)),
        // Cameras exist in the schema but not in this toolkit's
        // scanner model; treat as "scanner default".
        "Camera" => Ok(None),
        other => Err(EsclError::bad_value(&elem.name, other)),
    }
}

// The eSCL color mode encodes both color mode and depth.
fn decode_color_mode(elem: &Element) -> Result<(ColorMode, Option<Depth>)> {
    match elem.text() {
        "BlackAndWhite1" => Ok((ColorMode::Binary, None)),
        "Grayscale8" => Ok((ColorMode::Mono, Some(Depth::Bits8))),
        "Grayscale16" => Ok((ColorMode::Mono, Some(Depth::Bits16))),
        "RGB24" => Ok((ColorMode::Color, Some(Depth::Bits8))),
        "RGB48" => Ok((ColorMode::Color, Some(Depth::Bits16))),
        other => Err(EsclError::bad_value(&elem.name, other)),
    }
}

pub(crate) fn color_mode_name(mode: ColorMode, depth: Depth) -> &'static str {
    match (mode, depth) {
        (ColorMode::Binary, _) => "BlackAndWhite1",
        (ColorMode::Mono, Depth::Bits8) => "Grayscale8",
        (ColorMode::Mono, Depth::Bits16) => "Grayscale16",
        (ColorMode::Color, Depth::Bits8) => "RGB24",
        (ColorMode::Color, Depth::Bits16) => "RGB48",
    }
}

fn decode_binary_rendering(elem: &Element) -> Result<BinaryRendering> {
    match elem.text() {
        "Halftone" => Ok(BinaryRendering::Halftone),
        "Threshold" => Ok(BinaryRendering::Threshold),
        other => Err(EsclError::bad_value(&elem.name, other)),
    }
}

fn decode_ccd_channel(elem: &Element) -> Result<CcdChannel> {
    match elem.text() {
        "Red" => Ok(CcdChannel::Red),
        "Green" => Ok(CcdChannel::Green),
        "Blue" => Ok(CcdChannel::Blue),
        "NTSC" => Ok(CcdChannel::Ntsc),
        "GrayCcd" => Ok(CcdChannel::GrayCcd),
        "GrayCcdEmulated" => Ok(CcdChannel::GrayCcdEmulated),
        other => Err(EsclError::bad_value(&elem.name, other)),
    }
}

pub(crate) fn ccd_channel_name(channel: CcdChannel) -> &'static str {
    match channel {
        CcdChannel::Red => "Red",
        CcdChannel::Green => "Green",
        CcdChannel::Blue => "Blue",
        CcdChannel::Ntsc => "NTSC",
        CcdChannel::GrayCcd => "GrayCcd",
        CcdChannel::GrayCcdEmulated => "GrayCcdEmulated",
    }
}

fn decode_intent(elem: &Element) -> Result<Intent> {
    match elem.text() {
        "Document" => Ok(Intent::Document),
        "TextAndGraphic" => Ok(Intent::TextAndGraphic),
        "Photo" => Ok(Intent::Photo),
        "Preview" => Ok(Intent::Preview),
        "Object" => Ok(Intent::Object),
        "BusinessCard" => Ok(Intent::BusinessCard),
        other => Err(EsclError::bad_value(&elem.name, other)),
    }
}

pub(crate) fn intent_name(intent: Intent) -> &'static str {
    match intent {
        Intent::Document => "Document",
        Intent::TextAndGraphic => "TextAndGraphic",
        Intent::Photo => "Photo",
        Intent::Preview => "Preview",
        Intent::Object => "Object",
        Intent::BusinessCard => "BusinessCard",
    }
}

fn decode_region(elem: &Element) -> Result<Region> {
    Ok(Region {
        x_offset: elem.required_child("pwg:XOffset")?.text_uint()?,
        y_offset: elem.required_child("pwg:YOffset")?.text_uint()?,
        width: elem.required_child("pwg:Width")?.text_uint()?,
        height: elem.required_child("pwg:Height")?.text_uint()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns_map;
    use scanbridge_xml::decode_str;

    const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<scan:ScanSettings
    xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"
    xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm">
  <pwg:Version>2.63</pwg:Version>
  <scan:Intent>Document</scan:Intent>
  <pwg:ScanRegions>
    <pwg:ScanRegion>
      <pwg:XOffset>0</pwg:XOffset>
      <pwg:YOffset>0</pwg:YOffset>
      <pwg:Width>2550</pwg:Width>
      <pwg:Height>3508</pwg:Height>
    </pwg:ScanRegion>
  </pwg:ScanRegions>
  <pwg:InputSource>Feeder</pwg:InputSource>
  <scan:Duplex>true</scan:Duplex>
  <scan:ColorMode>RGB24</scan:ColorMode>
  <scan:XResolution>300</scan:XResolution>
  <scan:YResolution>300</scan:YResolution>
  <scan:DocumentFormatExt>image/jpeg</scan:DocumentFormatExt>
  <scan:Brightness>10</scan:Brightness>
  <scan:Contrast>0</scan:Contrast>
</scan:ScanSettings>"#;

    #[test]
    fn test_decode_settings() {
        let doc = decode_str(&ns_map(), SETTINGS).unwrap();
        let settings = ScanSettings::from_xml(doc.root()).unwrap();

        assert_eq!(settings.version, Some(Version::DEFAULT));
        assert_eq!(settings.intent, Some(Intent::Document));
        assert_eq!(settings.input_source, Some(InputSource::Adf));
        assert_eq!(settings.duplex, Some(true));
        assert_eq!(settings.color_mode, Some(ColorMode::Color));
        assert_eq!(settings.depth, Some(Depth::Bits8));
        assert_eq!(settings.resolution, Some(Resolution::dpi(300)));
        assert_eq!(settings.document_format.as_deref(), Some("image/jpeg"));
        assert_eq!(settings.brightness, Some(10));
        // An explicit zero is not "unset".
        assert_eq!(settings.contrast, Some(0));
        assert_eq!(settings.gamma, None);

        let region = settings.region.unwrap();
        assert_eq!(region.width, 2550);
        assert_eq!(region.height, 3508);
    }

    #[test]
    fn test_to_request_maps_duplex_feeder() {
        let doc = decode_str(&ns_map(), SETTINGS).unwrap();
        let request = ScanSettings::from_xml(doc.root()).unwrap().to_request();

        assert_eq!(request.input, Some(InputSource::Adf));
        assert_eq!(request.adf_mode, Some(AdfMode::Duplex));
        assert_eq!(request.color_mode, Some(ColorMode::Color));
        assert_eq!(request.depth, Some(Depth::Bits8));
        assert_eq!(request.brightness, Some(10));
    }

    #[test]
    fn test_duplex_without_feeder_is_ignored() {
        let settings = ScanSettings {
            input_source: Some(InputSource::Platen),
            duplex: Some(true),
            ..Default::default()
        };
        assert_eq!(settings.to_request().adf_mode, None);
    }

    #[test]
    fn test_decode_rejects_unknown_color_mode() {
        let input = r#"<scan:ScanSettings
            xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03">
            <scan:ColorMode>Sepia</scan:ColorMode>
        </scan:ScanSettings>"#;

        let doc = decode_str(&ns_map(), input).unwrap();
        let err = ScanSettings::from_xml(doc.root()).unwrap_err();
        assert!(err.to_string().contains("Sepia"));
    }

    #[test]
    fn test_decode_rejects_wrong_root() {
        let doc = decode_str(&ns_map(), "<scan:Other xmlns:scan=\"http://schemas.hp.com/imaging/escl/2011/05/03\"/>").unwrap();
        assert!(ScanSettings::from_xml(doc.root()).is_err());
    }
}
