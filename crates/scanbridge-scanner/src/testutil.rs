//! An in-memory scanner for server tests and demos.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::caps::{InputCapabilities, Range, ScannerCapabilities, SettingProfile};
use crate::request::ScannerRequest;
use crate::types::{BinaryRendering, CcdChannel, ColorMode, Depth, Intent, Resolution};
use crate::{Document, DocumentFile, Result, ScanError, Scanner};

/// A scanner that produces fixed in-memory pages.
///
/// Validates incoming requests against its capabilities, so server
/// code exercised against it sees the same rejection behavior a real
/// driver would produce.
pub struct TestScanner {
    caps: ScannerCapabilities,
    pages: Vec<Bytes>,
    format: String,
    fail_scans: AtomicBool,
}

impl TestScanner {
    /// Creates a scanner with a platen, a simplex ADF and two small
    /// JPEG pages.
    pub fn new() -> Arc<Self> {
        let profile = SettingProfile {
            color_modes: vec![ColorMode::Binary, ColorMode::Mono, ColorMode::Color],
            depths: vec![Depth::Bits8],
            binary_renderings: vec![BinaryRendering::Halftone, BinaryRendering::Threshold],
            ccd_channels: vec![CcdChannel::Ntsc],
            document_formats: vec!["image/jpeg".into(), "application/pdf".into()],
            resolutions: vec![Resolution::dpi(200), Resolution::dpi(300)],
        };

        let input = InputCapabilities {
            min_width: 118,
            max_width: 2550,
            min_height: 118,
            max_height: 3508,
            intents: vec![Intent::Document, Intent::Photo, Intent::Preview],
            profiles: vec![profile],
        };

        let caps = ScannerCapabilities {
            make_and_model: "scanbridge virtual scanner".into(),
            serial_number: "SB-0001".into(),
            uuid: "e8b803b9-117c-4786-8f9d-1f4a0a8bead2".into(),
            admin_uri: "http://localhost/admin".into(),
            platen: Some(input.clone()),
            adf_simplex: Some(input),
            adf_duplex: None,
            brightness_range: Some(Range::new(-100, 100, 0)),
            contrast_range: Some(Range::new(-100, 100, 0)),
            threshold_range: Some(Range::new(0, 255, 128)),
            ..Default::default()
        };

        // A minimal JPEG header is enough for protocol-level tests.
        let page = Bytes::from_static(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0xff, 0xd9]);

        Arc::new(Self {
            caps,
            pages: vec![page.clone(), page],
            format: "image/jpeg".into(),
            fail_scans: AtomicBool::new(false),
        })
    }

    /// Makes subsequent scans fail, to exercise error paths.
    pub fn set_fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Scanner for TestScanner {
    fn capabilities(&self) -> ScannerCapabilities {
        self.caps.clone()
    }

    async fn scan(&self, request: ScannerRequest) -> Result<Box<dyn Document>> {
        request.validate(&self.caps)?;

        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(ScanError::Failed("simulated lamp failure".into()));
        }

        Ok(Box::new(TestDocument {
            pages: self.pages.clone(),
            format: self.format.clone(),
            next: 0,
        }))
    }
}

/// The document produced by [`TestScanner`].
pub struct TestDocument {
    pages: Vec<Bytes>,
    format: String,
    next: usize,
}

#[async_trait]
impl Document for TestDocument {
    async fn next(&mut self) -> std::io::Result<Option<DocumentFile>> {
        let Some(page) = self.pages.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        Ok(Some(DocumentFile::new(
            self.format.clone(),
            Box::new(Cursor::new(page.to_vec())),
        )))
    }
}
