//! WSD message model and codecs.

use scanbridge_xml::Element;
use uuid::Uuid;

use crate::{action, Result, WsdError, NS_DEVPROF, TO_DISCOVERY};

/// SOAP message header: WS-Addressing fields used by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub action: String,
    pub message_id: String,
    pub to: Option<String>,
    pub relates_to: Option<String>,
}

impl Header {
    /// Creates a header with a fresh random MessageID.
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            message_id: format!("urn:uuid:{}", Uuid::new_v4()),
            to: Some(TO_DISCOVERY.to_string()),
            relates_to: None,
        }
    }

    fn to_xml(&self) -> Element {
        let mut elem = Element::new("s:Header")
            .child_elem(Element::with_text("a:Action", &self.action))
            .child_elem(Element::with_text("a:MessageID", &self.message_id));

        if let Some(to) = &self.to {
            elem.push(Element::with_text("a:To", to));
        }
        if let Some(relates_to) = &self.relates_to {
            elem.push(Element::with_text("a:RelatesTo", relates_to));
        }

        elem
    }

    fn from_xml(root: &Element) -> Result<Self> {
        let action = root.required_child("a:Action")?.text().to_string();
        let message_id = root.required_child("a:MessageID")?.text().to_string();

        Ok(Self {
            action,
            message_id,
            to: root.child("a:To").map(|e| e.text().to_string()),
            relates_to: root.child("a:RelatesTo").map(|e| e.text().to_string()),
        })
    }
}

/// A WS-Addressing endpoint reference: the stable device identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointReference {
    /// The endpoint address, typically a `urn:uuid:...` URI.
    pub address: String,
}

impl EndpointReference {
    pub(crate) fn to_xml(&self, name: &str) -> Element {
        Element::new(name).child_elem(Element::with_text("a:Address", &self.address))
    }

    pub(crate) fn from_xml(root: &Element) -> Result<Self> {
        let address = root.required_child("a:Address")?.text().to_string();
        Ok(Self { address })
    }

    /// Extracts the device UUID from a `urn:uuid:` address.
    pub fn uuid(&self) -> Option<Uuid> {
        let raw = self
            .address
            .strip_prefix("urn:uuid:")
            .or_else(|| self.address.strip_prefix("uuid:"))
            .unwrap_or(&self.address);
        Uuid::parse_str(raw).ok()
    }
}

/// A list of service type QNames, carried space-separated on the wire.
///
/// The QName prefixes are bound in the sender's document and are not
/// resolvable after decode, so matching is done by the local part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Types(pub Vec<String>);

impl Types {
    /// The device type probed for.
    pub fn device() -> Self {
        Self(vec!["devprof:Device".to_string()])
    }

    /// Parses the space-separated form.
    pub fn parse(text: &str) -> Self {
        Self(
            text.split_whitespace()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// Returns true if any QName has the given local part.
    pub fn has_local(&self, local: &str) -> bool {
        self.0
            .iter()
            .any(|qname| qname.rsplit(':').next() == Some(local))
    }

    /// Returns true if the types mention a print service.
    pub fn is_print(&self) -> bool {
        self.0
            .iter()
            .any(|qname| qname.rsplit(':').next().is_some_and(|l| l.contains("Print")))
    }

    /// Returns true if the types mention a scan service.
    pub fn is_scan(&self) -> bool {
        self.0
            .iter()
            .any(|qname| qname.rsplit(':').next().is_some_and(|l| l.contains("Scan")))
    }

    fn text(&self) -> String {
        self.0.join(" ")
    }

    pub(crate) fn to_xml(&self, name: &str) -> Element {
        // The devprof prefix appears in the element text, invisible to
        // the name-based xmlns collection; declare it explicitly.
        Element::with_text(name, self.text()).attr_pair("xmlns:devprof", NS_DEVPROF)
    }
}

/// Hello: a device entered the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hello {
    pub endpoint_reference: EndpointReference,
    pub types: Types,
    pub xaddrs: Vec<String>,
    pub metadata_version: u64,
}

/// Bye: a device is leaving the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bye {
    pub endpoint_reference: EndpointReference,
}

/// Probe: who is out there?
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    pub types: Types,
}

/// One match inside ProbeMatches / ResolveMatches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMatch {
    pub endpoint_reference: EndpointReference,
    pub types: Types,
    pub xaddrs: Vec<String>,
    pub metadata_version: u64,
}

/// ProbeMatches: responses to a Probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMatches {
    pub matches: Vec<ProbeMatch>,
}

/// Resolve: where exactly is this endpoint?
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolve {
    pub endpoint_reference: EndpointReference,
}

/// ResolveMatches: the response to a Resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveMatches {
    pub match_: Option<ProbeMatch>,
}

/// A message body, dispatched by the header action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Hello(Hello),
    Bye(Bye),
    Probe(Probe),
    ProbeMatches(ProbeMatches),
    Resolve(Resolve),
    ResolveMatches(ResolveMatches),
}

/// A WSD protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub header: Header,
    pub body: Body,
}

impl Msg {
    /// Builds a Probe message with a fresh MessageID.
    pub fn probe(types: Types) -> Self {
        Self {
            header: Header::new(action::PROBE),
            body: Body::Probe(Probe { types }),
        }
    }

    /// Builds a Resolve message for the endpoint.
    pub fn resolve(endpoint_reference: EndpointReference) -> Self {
        Self {
            header: Header::new(action::RESOLVE),
            body: Body::Resolve(Resolve { endpoint_reference }),
        }
    }

    /// Decodes a message from the XML tree.
    pub fn decode(root: &Element) -> Result<Self> {
        if root.name != "s:Envelope" {
            return Err(WsdError::Xml(scanbridge_xml::XmlError::missed("s:Envelope")));
        }

        let header = Header::from_xml(root.required_child("s:Header")?)?;
        let body_elem = root.required_child("s:Body")?;

        let body = match header.action.as_str() {
            action::HELLO => {
                let elem = body_elem.required_child("d:Hello")?;
                let (endpoint_reference, types, xaddrs, metadata_version) =
                    decode_match_fields(elem)?;
                Body::Hello(Hello {
                    endpoint_reference,
                    types,
                    xaddrs,
                    metadata_version,
                })
            }

            action::BYE => {
                let elem = body_elem.required_child("d:Bye")?;
                let endpoint_reference =
                    EndpointReference::from_xml(elem.required_child("a:EndpointReference")?)?;
                Body::Bye(Bye { endpoint_reference })
            }

            action::PROBE => {
                let elem = body_elem.required_child("d:Probe")?;
                let types = elem
                    .child("d:Types")
                    .map(|e| Types::parse(e.text()))
                    .unwrap_or_default();
                Body::Probe(Probe { types })
            }

            action::PROBE_MATCHES => {
                let elem = body_elem.required_child("d:ProbeMatches")?;
                let mut matches = Vec::new();
                for child in elem.children_named("d:ProbeMatch") {
                    matches.push(decode_probe_match(child)?);
                }
                Body::ProbeMatches(ProbeMatches { matches })
            }

            action::RESOLVE => {
                let elem = body_elem.required_child("d:Resolve")?;
                let endpoint_reference =
                    EndpointReference::from_xml(elem.required_child("a:EndpointReference")?)?;
                Body::Resolve(Resolve { endpoint_reference })
            }

            action::RESOLVE_MATCHES => {
                let elem = body_elem.required_child("d:ResolveMatches")?;
                let match_ = match elem.child("d:ResolveMatch") {
                    Some(child) => Some(decode_probe_match(child)?),
                    None => None,
                };
                Body::ResolveMatches(ResolveMatches { match_ })
            }

            other => return Err(WsdError::UnhandledAction(other.to_string())),
        };

        Ok(Self { header, body })
    }

    /// Generates the XML tree for the message.
    pub fn to_xml(&self) -> Element {
        let body = match &self.body {
            Body::Hello(hello) => {
                let mut elem = Element::new("d:Hello")
                    .child_elem(hello.endpoint_reference.to_xml("a:EndpointReference"));
                if !hello.types.0.is_empty() {
                    elem.push(hello.types.to_xml("d:Types"));
                }
                if !hello.xaddrs.is_empty() {
                    elem.push(Element::with_text("d:XAddrs", hello.xaddrs.join(" ")));
                }
                elem.push(Element::with_text(
                    "d:MetadataVersion",
                    hello.metadata_version.to_string(),
                ));
                elem
            }

            Body::Bye(bye) => Element::new("d:Bye")
                .child_elem(bye.endpoint_reference.to_xml("a:EndpointReference")),

            Body::Probe(probe) => {
                Element::new("d:Probe").child_elem(probe.types.to_xml("d:Types"))
            }

            Body::ProbeMatches(matches) => {
                let mut elem = Element::new("d:ProbeMatches");
                for m in &matches.matches {
                    elem.push(probe_match_to_xml("d:ProbeMatch", m));
                }
                elem
            }

            Body::Resolve(resolve) => Element::new("d:Resolve")
                .child_elem(resolve.endpoint_reference.to_xml("a:EndpointReference")),

            Body::ResolveMatches(matches) => {
                let mut elem = Element::new("d:ResolveMatches");
                if let Some(m) = &matches.match_ {
                    elem.push(probe_match_to_xml("d:ResolveMatch", m));
                }
                elem
            }
        };

        Element::new("s:Envelope")
            .child_elem(self.header.to_xml())
            .child_elem(Element::new("s:Body").child_elem(body))
    }

    /// Encodes the message into wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_xml().encode_string(&crate::ns_map()).into_bytes()
    }
}

fn probe_match_to_xml(name: &str, m: &ProbeMatch) -> Element {
    let mut elem = Element::new(name)
        .child_elem(m.endpoint_reference.to_xml("a:EndpointReference"));
    if !m.types.0.is_empty() {
        elem.push(m.types.to_xml("d:Types"));
    }
    if !m.xaddrs.is_empty() {
        elem.push(Element::with_text("d:XAddrs", m.xaddrs.join(" ")));
    }
    elem.push(Element::with_text(
        "d:MetadataVersion",
        m.metadata_version.to_string(),
    ));
    elem
}

fn decode_probe_match(elem: &Element) -> Result<ProbeMatch> {
    let (endpoint_reference, types, xaddrs, metadata_version) = decode_match_fields(elem)?;
    Ok(ProbeMatch {
        endpoint_reference,
        types,
        xaddrs,
        metadata_version,
    })
}

// Hello, ProbeMatch and ResolveMatch share the same field layout.
fn decode_match_fields(
    elem: &Element,
) -> Result<(EndpointReference, Types, Vec<String>, u64)> {
    let endpoint_reference =
        EndpointReference::from_xml(elem.required_child("a:EndpointReference")?)?;

    let types = elem
        .child("d:Types")
        .map(|e| Types::parse(e.text()))
        .unwrap_or_default();

    let xaddrs = elem
        .child("d:XAddrs")
        .map(|e| {
            e.text()
                .split_whitespace()
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    let metadata_version = elem
        .child("d:MetadataVersion")
        .and_then(|e| e.text().parse().ok())
        .unwrap_or(0);

    Ok((endpoint_reference, types, xaddrs, metadata_version))
}
