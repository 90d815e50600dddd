//! ScannerStatus and its XML codec.

use scanbridge_xml::Element;

use crate::types::{AdfState, JobState, JobStateReason, ScannerState, Version};
use crate::Result;

/// State of one scan job, kept in the status job history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Job URI, relative to the server root.
    pub job_uri: String,

    /// Job UUID in URN form.
    pub job_uuid: Option<String>,

    /// Current job state.
    pub job_state: JobState,

    /// Reasons for the current state.
    pub job_state_reasons: Vec<JobStateReason>,
}

impl JobInfo {
    pub(crate) fn to_xml(&self) -> Element {
        let mut elem = Element::new("scan:JobInfo")
            .child_elem(Element::with_text("pwg:JobUri", &self.job_uri));

        if let Some(uuid) = &self.job_uuid {
            elem.push(Element::with_text("pwg:JobUuid", uuid));
        }

        elem.push(self.job_state.to_xml("scan:JobState"));

        if !self.job_state_reasons.is_empty() {
            let mut reasons = Element::new("pwg:JobStateReasons");
            for reason in &self.job_state_reasons {
                reasons.push(reason.to_xml("pwg:JobStateReason"));
            }
            elem.push(reasons);
        }

        elem
    }

    pub(crate) fn from_xml(elem: &Element) -> Result<Self> {
        let job_uri = elem.required_child("pwg:JobUri")?.text().to_string();
        let job_uuid = elem.child("pwg:JobUuid").map(|e| e.text().to_string());
        let job_state = JobState::from_xml(elem.required_child("scan:JobState")?)?;

        let mut job_state_reasons = Vec::new();
        if let Some(reasons) = elem.child("pwg:JobStateReasons") {
            for reason in reasons.children_named("pwg:JobStateReason") {
                if let Some(parsed) = JobStateReason::parse(reason.text()) {
                    job_state_reasons.push(parsed);
                }
            }
        }

        Ok(Self {
            job_uri,
            job_uuid,
            job_state,
            job_state_reasons,
        })
    }
}

/// The scanner status document.
///
/// `jobs` is ordered newest first, so when a job is being processed it
/// is always `jobs[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerStatus {
    pub version: Version,
    pub state: ScannerState,
    pub adf_state: Option<AdfState>,
    pub jobs: Vec<JobInfo>,
}

impl ScannerStatus {
    /// Creates an idle status.
    pub fn idle(version: Version) -> Self {
        Self {
            version,
            state: ScannerState::Idle,
            adf_state: None,
            jobs: Vec::new(),
        }
    }

    /// Pushes a job to the front of the history, trimming it to
    /// `history_size` entries.
    pub fn push_job_info(&mut self, info: JobInfo, history_size: usize) {
        self.jobs.insert(0, info);
        self.jobs.truncate(history_size);
    }

    /// Serializes the status document.
    pub fn to_xml(&self) -> Element {
        let mut elem = Element::new("scan:ScannerStatus")
            .child_elem(self.version.to_xml("pwg:Version"))
            .child_elem(self.state.to_xml("pwg:State"));

        if let Some(adf_state) = self.adf_state {
            elem.push(adf_state.to_xml("scan:AdfState"));
        }

        if !self.jobs.is_empty() {
            let mut jobs = Element::new("scan:Jobs");
            for job in &self.jobs {
                jobs.push(job.to_xml());
            }
            elem.push(jobs);
        }

        elem
    }

    /// Parses a status document.
    pub fn from_xml(root: &Element) -> Result<Self> {
        let version = Version::from_xml(root.required_child("pwg:Version")?)?;
        let state = ScannerState::from_xml(root.required_child("pwg:State")?)?;

        let adf_state = match root.child("scan:AdfState") {
            Some(elem) => Some(AdfState::from_xml(elem)?),
            None => None,
        };

        let mut jobs = Vec::new();
        if let Some(jobs_elem) = root.child("scan:Jobs") {
            for job in jobs_elem.children_named("scan:JobInfo") {
                jobs.push(JobInfo::from_xml(job)?);
            }
        }

        Ok(Self {
            version,
            state,
            adf_state,
            jobs,
        })
    }
}
