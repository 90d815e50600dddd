//! The eSCL scan-job server.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::Response;
use axum::Router;
use scanbridge_scanner::{Document, Scanner};
use scanbridge_transport::clean_url_path;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capsxml::caps_to_xml;
use crate::settings::ScanSettings;
use crate::status::{JobInfo, ScannerStatus};
use crate::types::{AdfState, JobState, JobStateReason, ScannerState, Version};
use crate::{ns_map, HTTP_CONTENT_TYPE};

/// How many scan jobs the server keeps in its status history.
const JOB_HISTORY_SIZE: usize = 10;

/// Upper bound for request bodies. ScanSettings documents are tiny.
const MAX_REQUEST_BODY: usize = 256 * 1024;

/// eSCL server construction options.
#[derive(Debug, Clone)]
pub struct EsclServerOptions {
    /// Base path the endpoints live under. A standard hardware-like
    /// server uses `/eSCL`.
    pub base_path: String,

    /// Protocol version to report.
    pub version: Version,
}

impl Default for EsclServerOptions {
    fn default() -> Self {
        Self {
            base_path: "/eSCL".to_string(),
            version: Version::DEFAULT,
        }
    }
}

/// The eSCL scan-job lifecycle server.
///
/// Wraps an abstract [`Scanner`] and drives a single-job state
/// machine:
///
/// ```text
/// Idle ── POST ScanJobs ─▶ Processing
/// Processing ── NextDocument(EOF) ─▶ Completed ─▶ Idle
/// Processing ── NextDocument(err) ─▶ Aborted   ─▶ Idle
/// Processing ── DELETE {JobUri}  ─▶ Canceled  ─▶ Idle
/// ```
///
/// All job-state transitions happen behind the status lock; document
/// bytes are streamed to the client after the lock is released. A
/// second POST while a job is processing is rejected with 503.
pub struct EsclServer {
    base: String,
    version: Version,
    scanner: Arc<dyn Scanner>,
    caps: scanbridge_scanner::ScannerCapabilities,
    status: Mutex<ScannerStatus>,
    document: tokio::sync::Mutex<Option<Box<dyn Document>>>,
}

impl EsclServer {
    /// Creates a server over the scanner.
    pub fn new(scanner: Arc<dyn Scanner>, options: EsclServerOptions) -> Arc<Self> {
        let caps = scanner.capabilities();

        let mut status = ScannerStatus::idle(options.version);
        if caps.has_adf() {
            status.adf_state = Some(AdfState::Processing);
        }

        let mut base = clean_url_path(&options.base_path);
        if base.len() > 1 && base.ends_with('/') {
            base.pop();
        }

        Arc::new(Self {
            base,
            version: options.version,
            scanner,
            caps,
            status: Mutex::new(status),
            document: tokio::sync::Mutex::new(None),
        })
    }

    /// Returns the base path the endpoints live under.
    pub fn base_path(&self) -> &str {
        &self.base
    }

    /// Returns an axum router serving the endpoints for plaintext
    /// connections.
    pub fn router(self: &Arc<Self>) -> Router {
        self.router_with_scheme(false)
    }

    /// Returns an axum router; `secure` selects the URL scheme used in
    /// the `Location` header of job creation responses.
    pub fn router_with_scheme(self: &Arc<Self>, secure: bool) -> Router {
        // The fallback handler matches every method and path; routing
        // is done by hand because job URIs are dynamic.
        Router::new()
            .fallback(dispatch)
            .with_state((Arc::clone(self), secure))
    }

    /// Returns a copy of the current scanner status.
    pub fn status(&self) -> ScannerStatus {
        self.status.lock().unwrap().clone()
    }

    async fn handle(&self, secure: bool, req: Request) -> Response {
        let method = req.method().clone();
        let path = clean_url_path(req.uri().path());
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost")
            .to_string();

        debug!(method = %method, path = %path, "request");

        let Some(rel) = path.strip_prefix(self.base.as_str()) else {
            return reject(StatusCode::NOT_FOUND, None);
        };
        if !rel.is_empty() && !rel.starts_with('/') {
            // "/eSCLx/..." is not under "/eSCL".
            return reject(StatusCode::NOT_FOUND, None);
        }

        match rel.trim_matches('/') {
            "ScannerCapabilities" if method == Method::GET => self.get_capabilities(),
            "ScannerStatus" if method == Method::GET => self.get_status(),
            "ScanJobs" if method == Method::POST => self.post_scan_jobs(req, secure, &host).await,
            _ => self.handle_job_uri(method, &path).await,
        }
    }

    fn get_capabilities(&self) -> Response {
        send_xml(caps_to_xml(self.version, &self.caps))
    }

    fn get_status(&self) -> Response {
        let xml = self.status.lock().unwrap().to_xml();
        send_xml(xml)
    }

    async fn post_scan_jobs(&self, req: Request, secure: bool, host: &str) -> Response {
        // Fetch and decode the ScanSettings body.
        let body = match axum::body::to_bytes(req.into_body(), MAX_REQUEST_BODY).await {
            Ok(body) => body,
            Err(err) => return reject(StatusCode::BAD_REQUEST, Some(&err.to_string())),
        };

        let doc = match scanbridge_xml::decode(&ns_map(), body.as_ref()) {
            Ok(doc) => doc,
            Err(err) => return reject(StatusCode::BAD_REQUEST, Some(&err.to_string())),
        };

        let settings = match ScanSettings::from_xml(doc.root()) {
            Ok(settings) => settings,
            Err(err) => return reject(StatusCode::BAD_REQUEST, Some(&err.to_string())),
        };

        // Reserve the scanner. A single job may be in flight.
        {
            let mut status = self.status.lock().unwrap();
            if status.state == ScannerState::Processing {
                return reject(
                    StatusCode::SERVICE_UNAVAILABLE,
                    Some("Device is busy with the previous request"),
                );
            }
            status.state = ScannerState::Processing;
        }

        // Validate against the capabilities.
        let request = settings.to_request();
        if let Err(err) = request.validate(&self.caps) {
            self.status.lock().unwrap().state = ScannerState::Idle;
            return reject(StatusCode::CONFLICT, Some(&err.to_string()));
        }

        // Hand the request to the scanner.
        let document = match self.scanner.scan(request).await {
            Ok(document) => document,
            Err(err) => {
                self.status.lock().unwrap().state = ScannerState::Idle;
                return reject(StatusCode::SERVICE_UNAVAILABLE, Some(&err.to_string()));
            }
        };

        let job_uuid = format!("urn:uuid:{}", Uuid::new_v4());
        let job_uri = format!("{}/ScanJobs/{}", self.base, job_uuid);

        *self.document.lock().await = Some(document);

        {
            let mut status = self.status.lock().unwrap();
            status.push_job_info(
                JobInfo {
                    job_uri: job_uri.clone(),
                    job_uuid: Some(job_uuid),
                    job_state: JobState::Processing,
                    job_state_reasons: Vec::new(),
                },
                JOB_HISTORY_SIZE,
            );
        }

        let scheme = if secure { "https" } else { "http" };
        let location = format!("{}://{}{}", scheme, host, job_uri);

        Response::builder()
            .status(StatusCode::CREATED)
            .header(header::LOCATION, location)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::empty())
            .unwrap()
    }

    async fn handle_job_uri(&self, method: Method, path: &str) -> Response {
        // {JobUri}-relative requests are only routed while a document
        // is being served.
        let document = self.document.lock().await;
        if document.is_none() {
            return reject(StatusCode::NOT_FOUND, None);
        }
        drop(document);

        let job_uri = {
            let status = self.status.lock().unwrap();
            match status.jobs.first() {
                Some(job) if job.job_state == JobState::Processing => job.job_uri.clone(),
                _ => return reject(StatusCode::NOT_FOUND, None),
            }
        };

        if method == Method::GET && path == format!("{}/NextDocument", job_uri) {
            self.next_document().await
        } else if method == Method::GET && path == format!("{}/ScanImageInfo", job_uri) {
            reject(StatusCode::NOT_IMPLEMENTED, None)
        } else if method == Method::DELETE && path == job_uri {
            self.delete_job().await
        } else {
            reject(StatusCode::NOT_FOUND, None)
        }
    }

    async fn next_document(&self) -> Response {
        let mut guard = self.document.lock().await;

        let Some(document) = guard.as_mut() else {
            return reject(StatusCode::NOT_FOUND, None);
        };

        match document.next().await {
            Ok(Some(file)) => {
                // Stream the file bytes outside of any lock.
                drop(guard);

                let format = file.format().to_string();
                let reader = file.into_reader();

                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, format)
                    .header(header::CACHE_CONTROL, "no-cache")
                    .body(Body::from_stream(ReaderStream::new(reader)))
                    .unwrap()
            }

            Ok(None) => {
                self.finish(
                    &mut guard,
                    JobState::Completed,
                    JobStateReason::CompletedSuccessfully,
                );
                reject(StatusCode::NOT_FOUND, None)
            }

            Err(err) => {
                warn!(error = %err, "document read failed");
                self.finish(&mut guard, JobState::Aborted, JobStateReason::AbortedBySystem);
                reject(StatusCode::SERVICE_UNAVAILABLE, Some(&err.to_string()))
            }
        }
    }

    async fn delete_job(&self) -> Response {
        let mut guard = self.document.lock().await;

        if guard.is_none() {
            return reject(StatusCode::NOT_FOUND, None);
        }

        self.finish(&mut guard, JobState::Canceled, JobStateReason::CanceledByUser);

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::empty())
            .unwrap()
    }

    /// Finishes the current job: releases the document and moves the
    /// state machine back to idle.
    fn finish(
        &self,
        document: &mut tokio::sync::MutexGuard<'_, Option<Box<dyn Document>>>,
        state: JobState,
        reason: JobStateReason,
    ) {
        **document = None;

        let mut status = self.status.lock().unwrap();
        status.state = ScannerState::Idle;
        if let Some(job) = status.jobs.first_mut() {
            job.job_state = state;
            job.job_state_reasons = vec![reason];
        }
    }
}

async fn dispatch(
    State((server, secure)): State<(Arc<EsclServer>, bool)>,
    req: Request,
) -> Response {
    server.handle(secure, req).await
}

fn send_xml(xml: scanbridge_xml::Element) -> Response {
    let body = xml.encode_indent_string(&ns_map(), 2);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HTTP_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .unwrap()
}

fn reject(status: StatusCode, message: Option<&str>) -> Response {
    let message = message.unwrap_or_else(|| status.canonical_reason().unwrap_or("error"));
    let body = format!("{:03} {}\n", status.as_u16(), message);

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use scanbridge_scanner::TestScanner;
    use tower::ServiceExt;

    const SCAN_SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<scan:ScanSettings
    xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"
    xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm">
  <pwg:Version>2.63</pwg:Version>
  <pwg:InputSource>Platen</pwg:InputSource>
  <scan:ColorMode>RGB24</scan:ColorMode>
  <scan:XResolution>300</scan:XResolution>
  <scan:YResolution>300</scan:YResolution>
</scan:ScanSettings>"#;

    fn server() -> (Arc<EsclServer>, Router) {
        let scanner = TestScanner::new();
        let server = EsclServer::new(scanner, EsclServerOptions::default());
        let router = server.router();
        (server, router)
    }

    fn get(uri: &str) -> Request {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_settings(body: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/eSCL/ScanJobs")
            .header(header::HOST, "10.0.0.2:8080")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn start_job(router: &Router) -> String {
        let response = router
            .clone()
            .oneshot(post_settings(SCAN_SETTINGS))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        // Strip scheme://host, keep the job URI path.
        let idx = location.find("/eSCL").unwrap();
        location[idx..].to_string()
    }

    #[tokio::test]
    async fn test_fresh_status_is_idle_with_adf() {
        let (_, router) = server();

        let response = router.oneshot(get("/eSCL/ScannerStatus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache"
        );

        let body = body_string(response).await;
        let doc = scanbridge_xml::decode_str(&ns_map(), &body).unwrap();
        let status = ScannerStatus::from_xml(doc.root()).unwrap();

        assert_eq!(status.state, ScannerState::Idle);
        assert_eq!(status.adf_state, Some(AdfState::Processing));
        assert!(status.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_capabilities_document() {
        let (_, router) = server();

        let response = router
            .oneshot(get("/eSCL/ScannerCapabilities"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("scan:ScannerCapabilities"));
        assert!(body.contains("scanbridge virtual scanner"));
    }

    #[tokio::test]
    async fn test_post_creates_job_with_location() {
        let (server, router) = server();

        let response = router
            .clone()
            .oneshot(post_settings(SCAN_SETTINGS))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(location.starts_with("http://10.0.0.2:8080/eSCL/ScanJobs/urn:uuid:"));

        let status = server.status();
        assert_eq!(status.state, ScannerState::Processing);
        assert_eq!(status.jobs.len(), 1);
        assert_eq!(status.jobs[0].job_state, JobState::Processing);
    }

    #[tokio::test]
    async fn test_second_post_while_processing_is_rejected() {
        let (_, router) = server();

        let _job = start_job(&router).await;

        let response = router
            .clone()
            .oneshot(post_settings(SCAN_SETTINGS))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_string(response).await;
        assert!(body.contains("busy"));
    }

    #[tokio::test]
    async fn test_next_document_streams_then_completes() {
        let (server, router) = server();
        let job_uri = start_job(&router).await;
        let next = format!("{}/NextDocument", job_uri);

        // Two pages.
        for _ in 0..2 {
            let response = router.clone().oneshot(get(&next)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE).unwrap(),
                "image/jpeg"
            );
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&bytes[..2], &[0xff, 0xd8]);
        }

        // EOF: the job completes and the scanner goes idle.
        let response = router.clone().oneshot(get(&next)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let status = server.status();
        assert_eq!(status.state, ScannerState::Idle);
        assert_eq!(status.jobs[0].job_state, JobState::Completed);
        assert_eq!(
            status.jobs[0].job_state_reasons,
            vec![JobStateReason::CompletedSuccessfully]
        );

        // The job URI is gone now.
        let response = router.clone().oneshot(get(&next)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_cancels_job() {
        let (server, router) = server();
        let job_uri = start_job(&router).await;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri(&job_uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status = server.status();
        assert_eq!(status.state, ScannerState::Idle);
        assert_eq!(status.jobs[0].job_state, JobState::Canceled);
        assert_eq!(
            status.jobs[0].job_state_reasons,
            vec![JobStateReason::CanceledByUser]
        );

        // A new job may start immediately.
        let response = router
            .clone()
            .oneshot(post_settings(SCAN_SETTINGS))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_scan_image_info_not_implemented() {
        let (_, router) = server();
        let job_uri = start_job(&router).await;

        let response = router
            .clone()
            .oneshot(get(&format!("{}/ScanImageInfo", job_uri)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_malformed_xml_is_bad_request() {
        let (_, router) = server();

        let response = router
            .clone()
            .oneshot(post_settings("this is not XML"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_capability_conflict_is_409() {
        let (server, router) = server();

        // The test scanner has no duplex ADF.
        let settings = r#"<?xml version="1.0"?>
<scan:ScanSettings
    xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"
    xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm">
  <pwg:InputSource>Feeder</pwg:InputSource>
  <scan:Duplex>true</scan:Duplex>
</scan:ScanSettings>"#;

        let response = router.clone().oneshot(post_settings(settings)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // The reservation was rolled back.
        assert_eq!(server.status().state, ScannerState::Idle);
    }

    #[tokio::test]
    async fn test_scanner_failure_is_503() {
        let scanner = TestScanner::new();
        scanner.set_fail_scans(true);
        let server = EsclServer::new(scanner, EsclServerOptions::default());
        let router = server.router();

        let response = router
            .clone()
            .oneshot(post_settings(SCAN_SETTINGS))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(server.status().state, ScannerState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_paths_are_404() {
        let (_, router) = server();

        let response = router.clone().oneshot(get("/eSCL/Nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.clone().oneshot(get("/other/root")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_job_linearity_across_interleavings() {
        let (server, router) = server();

        // POST, drain one page, cancel, POST again, drain to EOF. At
        // every observation point at most one job is processing and it
        // is jobs[0].
        let job1 = start_job(&router).await;

        let processing = |status: &ScannerStatus| {
            status
                .jobs
                .iter()
                .filter(|j| j.job_state == JobState::Processing)
                .count()
        };

        assert_eq!(processing(&server.status()), 1);

        let _ = router
            .clone()
            .oneshot(get(&format!("{}/NextDocument", job1)))
            .await
            .unwrap();
        assert_eq!(processing(&server.status()), 1);

        let request = Request::builder()
            .method(Method::DELETE)
            .uri(&job1)
            .body(Body::empty())
            .unwrap();
        let _ = router.clone().oneshot(request).await.unwrap();
        assert_eq!(processing(&server.status()), 0);

        let job2 = start_job(&router).await;
        let status = server.status();
        assert_eq!(processing(&status), 1);
        assert_eq!(status.jobs[0].job_uri, job2);
        assert_eq!(status.jobs.len(), 2);

        let next = format!("{}/NextDocument", job2);
        loop {
            let response = router.clone().oneshot(get(&next)).await.unwrap();
            if response.status() == StatusCode::NOT_FOUND {
                break;
            }
        }
        assert_eq!(processing(&server.status()), 0);
    }
}
