//! WSD metadata exchange.
//!
//! Discovery multicast only carries the device's stable identifier and
//! transfer addresses. The device description (friendly name, model,
//! firmware, hosted services) is fetched separately: a WS-Transfer Get
//! request POSTed to one of the device's XAddrs.
//!
//! Specification: Devices Profile for Web Services.

use scanbridge_xml::Element;
use tracing::debug;

use crate::msg::{EndpointReference, Types};
use crate::{action, ns_map, Result, WsdError};

/// Dialect attribute values of the metadata sections.
pub const THIS_DEVICE_DIALECT: &str =
    "http://schemas.xmlsoap.org/ws/2006/02/devprof/ThisDevice";
pub const THIS_MODEL_DIALECT: &str =
    "http://schemas.xmlsoap.org/ws/2006/02/devprof/ThisModel";
pub const RELATIONSHIP_DIALECT: &str = "http://schemas.xmlsoap.org/ws/2006/02/devprof/host";

/// Information about the particular device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThisDeviceMetadata {
    pub friendly_name: String,
    pub firmware_version: String,
    pub serial_number: String,
}

/// Information about the device model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThisModelMetadata {
    pub manufacturer: String,
    pub manufacturer_url: String,
    pub model_name: String,
    pub model_number: String,
    pub model_url: String,
    pub presentation_url: String,
}

/// Description of the host or one hosted service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub endpoint_references: Vec<EndpointReference>,
    pub types: Types,
    pub service_id: String,
}

/// Relationship between the device and the services it hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationship {
    pub host: Option<ServiceMetadata>,
    pub hosted: Vec<ServiceMetadata>,
}

/// The device description assembled from the metadata sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub this_device: ThisDeviceMetadata,
    pub this_model: ThisModelMetadata,
    pub relationship: Relationship,
}

impl DeviceMetadata {
    /// Decodes the metadata from a GetResponse envelope or a bare
    /// `mex:Metadata` element.
    pub fn decode(root: &Element) -> Result<Self> {
        let metadata = if root.name == "mex:Metadata" {
            root
        } else {
            root.required_child("s:Body")?
                .required_child("mex:Metadata")?
        };

        let mut out = DeviceMetadata::default();

        for section in metadata.children_named("mex:MetadataSection") {
            match section.attr("Dialect") {
                Some(THIS_DEVICE_DIALECT) => {
                    if let Some(elem) = section.child("devprof:ThisDevice") {
                        out.this_device = decode_this_device(elem);
                    }
                }
                Some(THIS_MODEL_DIALECT) => {
                    if let Some(elem) = section.child("devprof:ThisModel") {
                        out.this_model = decode_this_model(elem);
                    }
                }
                Some(RELATIONSHIP_DIALECT) => {
                    if let Some(elem) = section.child("devprof:Relationship") {
                        out.relationship = decode_relationship(elem)?;
                    }
                }
                _ => {}
            }
        }

        Ok(out)
    }
}

fn decode_this_device(elem: &Element) -> ThisDeviceMetadata {
    ThisDeviceMetadata {
        // FriendlyName is a localized string list; the first entry is
        // good enough for discovery purposes.
        friendly_name: child_text(elem, "devprof:FriendlyName"),
        firmware_version: child_text(elem, "devprof:FirmwareVersion"),
        serial_number: child_text(elem, "devprof:SerialNumber"),
    }
}

fn decode_this_model(elem: &Element) -> ThisModelMetadata {
    ThisModelMetadata {
        manufacturer: child_text(elem, "devprof:Manufacturer"),
        manufacturer_url: child_text(elem, "devprof:ManufacturerUrl"),
        model_name: child_text(elem, "devprof:ModelName"),
        model_number: child_text(elem, "devprof:ModelNumber"),
        model_url: child_text(elem, "devprof:ModelUrl"),
        presentation_url: child_text(elem, "devprof:PresentationUrl"),
    }
}

fn decode_relationship(elem: &Element) -> Result<Relationship> {
    let mut relationship = Relationship::default();

    for child in &elem.children {
        match child.name.as_str() {
            "devprof:Host" => {
                if relationship.host.is_none() {
                    relationship.host = Some(decode_service_metadata(child)?);
                }
            }
            "devprof:Hosted" => {
                relationship.hosted.push(decode_service_metadata(child)?);
            }
            _ => {}
        }
    }

    Ok(relationship)
}

fn decode_service_metadata(elem: &Element) -> Result<ServiceMetadata> {
    let mut endpoint_references = Vec::new();
    for child in elem.children_named("a:EndpointReference") {
        endpoint_references.push(EndpointReference::from_xml(child)?);
    }

    let types = elem
        .child("d:Types")
        .or_else(|| elem.child("devprof:Types"))
        .map(|e| Types::parse(e.text()))
        .unwrap_or_default();

    let service_id = child_text(elem, "devprof:ServiceId");

    Ok(ServiceMetadata {
        endpoint_references,
        types,
        service_id,
    })
}

fn child_text(elem: &Element, name: &str) -> String {
    elem.child(name).map(|e| e.text().to_string()).unwrap_or_default()
}

/// Builds the WS-Transfer Get envelope for the device address.
pub fn get_request(device_address: &str) -> Element {
    Element::new("s:Envelope")
        .child_elem(
            Element::new("s:Header")
                .child_elem(Element::with_text("a:Action", action::GET))
                .child_elem(Element::with_text(
                    "a:MessageID",
                    format!("urn:uuid:{}", uuid::Uuid::new_v4()),
                ))
                .child_elem(Element::with_text("a:To", device_address)),
        )
        .child_elem(Element::new("s:Body"))
}

/// Fetches and decodes the device metadata from one of its transfer
/// addresses.
pub async fn fetch(xaddr: &str, device_address: &str) -> Result<DeviceMetadata> {
    let envelope = get_request(device_address).encode_string(&ns_map());

    debug!(xaddr = xaddr, "fetching device metadata");

    let client = reqwest::Client::new();
    let response = client
        .post(xaddr)
        .header("Content-Type", "application/soap+xml; charset=utf-8")
        .body(envelope)
        .send()
        .await
        .map_err(|err| WsdError::Http(err.to_string()))?;

    let body = response
        .text()
        .await
        .map_err(|err| WsdError::Http(err.to_string()))?;

    let doc = scanbridge_xml::decode_str(&ns_map(), &body)?;
    DeviceMetadata::decode(doc.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanbridge_xml::decode_str;

    const GET_RESPONSE: &str = r#"<?xml version="1.0"?>
<soap:Envelope
    xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
    xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
    xmlns:wsd="http://schemas.xmlsoap.org/ws/2005/04/discovery"
    xmlns:wsx="http://schemas.xmlsoap.org/ws/2004/09/mex"
    xmlns:wsdp="http://schemas.xmlsoap.org/ws/2006/02/devprof">
  <soap:Header>
    <wsa:Action>http://schemas.xmlsoap.org/ws/2004/09/transfer/GetResponse</wsa:Action>
    <wsa:MessageID>urn:uuid:6e8e8132-39dd-4d06-b39e-7e65e338a64b</wsa:MessageID>
  </soap:Header>
  <soap:Body>
    <wsx:Metadata>
      <wsx:MetadataSection Dialect="http://schemas.xmlsoap.org/ws/2006/02/devprof/ThisDevice">
        <wsdp:ThisDevice>
          <wsdp:FriendlyName>Office MFP</wsdp:FriendlyName>
          <wsdp:FirmwareVersion>3.14</wsdp:FirmwareVersion>
          <wsdp:SerialNumber>QX55512</wsdp:SerialNumber>
        </wsdp:ThisDevice>
      </wsx:MetadataSection>
      <wsx:MetadataSection Dialect="http://schemas.xmlsoap.org/ws/2006/02/devprof/ThisModel">
        <wsdp:ThisModel>
          <wsdp:Manufacturer>Example Corp</wsdp:Manufacturer>
          <wsdp:ModelName>MFP-9000</wsdp:ModelName>
          <wsdp:ModelNumber>9000</wsdp:ModelNumber>
          <wsdp:PresentationUrl>http://192.168.1.50/</wsdp:PresentationUrl>
        </wsdp:ThisModel>
      </wsx:MetadataSection>
      <wsx:MetadataSection Dialect="http://schemas.xmlsoap.org/ws/2006/02/devprof/host">
        <wsdp:Relationship Type="http://schemas.xmlsoap.org/ws/2006/02/devprof/host">
          <wsdp:Hosted>
            <wsa:EndpointReference>
              <wsa:Address>http://192.168.1.50:80/wsd/print</wsa:Address>
            </wsa:EndpointReference>
            <wsdp:Types>ns1:PrinterServiceType</wsdp:Types>
            <wsdp:ServiceId>uri:4024e2b0-print</wsdp:ServiceId>
          </wsdp:Hosted>
          <wsdp:Hosted>
            <wsa:EndpointReference>
              <wsa:Address>http://192.168.1.50:80/wsd/scan</wsa:Address>
            </wsa:EndpointReference>
            <wsdp:Types>ns2:ScannerServiceType</wsdp:Types>
            <wsdp:ServiceId>uri:4024e2b0-scan</wsdp:ServiceId>
          </wsdp:Hosted>
        </wsdp:Relationship>
      </wsx:MetadataSection>
    </wsx:Metadata>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_decode_metadata() {
        let doc = decode_str(&ns_map(), GET_RESPONSE).unwrap();
        let meta = DeviceMetadata::decode(doc.root()).unwrap();

        assert_eq!(meta.this_device.friendly_name, "Office MFP");
        assert_eq!(meta.this_device.firmware_version, "3.14");
        assert_eq!(meta.this_device.serial_number, "QX55512");

        assert_eq!(meta.this_model.manufacturer, "Example Corp");
        assert_eq!(meta.this_model.model_name, "MFP-9000");
        assert_eq!(meta.this_model.presentation_url, "http://192.168.1.50/");

        assert_eq!(meta.relationship.hosted.len(), 2);

        let print = &meta.relationship.hosted[0];
        assert!(print.types.is_print());
        // The service id comes from the ServiceId element itself.
        assert_eq!(print.service_id, "uri:4024e2b0-print");
        assert_eq!(
            print.endpoint_references[0].address,
            "http://192.168.1.50:80/wsd/print"
        );

        let scan = &meta.relationship.hosted[1];
        assert!(scan.types.is_scan());
        assert_eq!(scan.service_id, "uri:4024e2b0-scan");
    }

    #[test]
    fn test_get_request_shape() {
        let request = get_request("urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6");

        let header = request.required_child("s:Header").unwrap();
        assert_eq!(
            header.required_child("a:Action").unwrap().text(),
            action::GET
        );
        assert_eq!(
            header.required_child("a:To").unwrap().text(),
            "urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6"
        );

        // Get carries an empty body.
        let body = request.required_child("s:Body").unwrap();
        assert!(body.children.is_empty());
    }
}
