// In-memory portal backend
//
// Behaves like the real API for the calls the wizard makes: sections are
// stored in canonical form (strings trimmed), uploads get sequential ids.
// Failures and latency can be scripted for proof runs and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ApplicationApi, ClientError, DocumentApi};
use crate::models::document::StagedFile;
use crate::models::requests::SubmitSectionRequest;
use crate::models::responses::{
    ApplicationStatus, ApplicationSummary, CurrentApplicationResponse, SubmitSectionResponse,
    TrackStatusResponse, UploadedDocumentDto,
};
use crate::models::section::{MembershipType, SectionData};

#[derive(Debug, Default)]
struct MemoryState {
    application_id: Option<String>,
    membership_type: MembershipType,
    status: ApplicationStatus,
    sections: HashMap<String, Value>,
    documents: BTreeMap<i64, (String, Vec<u8>)>,
    next_document_id: i64,
    submit_failures: VecDeque<String>,
    failing_uploads: HashSet<String>,
}

#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    latency: Duration,
    current_application_calls: AtomicU32,
    submit_calls: AtomicU32,
    upload_calls: AtomicU32,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// No application on record yet.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_document_id: 1,
                ..MemoryState::default()
            }),
            latency: Duration::ZERO,
            current_application_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            upload_calls: AtomicU32::new(0),
        }
    }

    /// Start from an existing application (sections as the server would return them).
    pub fn with_application(
        self,
        application_id: &str,
        membership_type: MembershipType,
        sections: HashMap<String, Value>,
    ) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.application_id = Some(application_id.to_string());
            state.membership_type = membership_type;
            state.sections = sections;
        }
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The next `count` submits are rejected with `message`.
    pub fn fail_next_submits(&self, count: usize, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .submit_failures
                .extend(std::iter::repeat(message.to_string()).take(count));
        }
    }

    /// Uploads of files with this name fail with HTTP 500.
    pub fn fail_uploads_named(&self, file_name: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_uploads.insert(file_name.to_string());
        }
    }

    pub fn set_status(&self, status: ApplicationStatus) {
        if let Ok(mut state) = self.state.lock() {
            state.status = status;
        }
    }

    pub fn current_application_calls(&self) -> u32 {
        self.current_application_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Stored body of a section, as the server holds it.
    pub fn stored_section(&self, key: &str) -> Option<Value> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.sections.get(key).cloned())
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().map(|s| s.documents.len()).unwrap_or(0)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, ClientError> {
        self.state
            .lock()
            .map_err(|_| ClientError::Decode("in-memory backend state poisoned".to_string()))
    }
}

/// Server-side normalisation: trim every string.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        }
        other => other,
    }
}

#[async_trait]
impl ApplicationApi for InMemoryBackend {
    async fn current_application(
        &self,
    ) -> Result<Option<CurrentApplicationResponse>, ClientError> {
        self.current_application_calls
            .fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let state = self.lock()?;
        Ok(state
            .application_id
            .as_ref()
            .map(|id| CurrentApplicationResponse {
                application_id: Some(id.clone()),
                membership_type: state.membership_type,
                current_step: None,
                is_completed: false,
                status: state.status,
                sections: state.sections.clone(),
            }))
    }

    async fn submit_section(
        &self,
        request: &SubmitSectionRequest,
    ) -> Result<SubmitSectionResponse, ClientError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let mut state = self.lock()?;
        if let Some(message) = state.submit_failures.pop_front() {
            return Err(ClientError::Rejected(message));
        }
        if !state.status.is_editable() {
            return Err(ClientError::Rejected(
                "The application has already been submitted".to_string(),
            ));
        }

        let canonical = canonicalize(request.payload.clone());
        let section = SectionData::from_payload(request.section_id, canonical)
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        let stored = section
            .payload()
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if state.application_id.is_none() {
            state.application_id = Some(format!("APP-{}", uuid::Uuid::new_v4().simple()));
        }
        state
            .sections
            .insert(request.section_id.as_str().to_string(), stored.clone());

        Ok(SubmitSectionResponse {
            section_id: request.section_id,
            data: stored,
        })
    }

    async fn track_status(&self) -> Result<TrackStatusResponse, ClientError> {
        self.simulate_latency().await;
        let state = self.lock()?;
        Ok(TrackStatusResponse {
            application: ApplicationSummary {
                application_id: state.application_id.clone(),
                status: state.status,
                membership_type: Some(state.membership_type),
                submitted_at: None,
            },
            special_consideration: None,
        })
    }
}

#[async_trait]
impl DocumentApi for InMemoryBackend {
    async fn upload(&self, file: &StagedFile) -> Result<UploadedDocumentDto, ClientError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        // Missing local files are stored empty; only the name matters here.
        let bytes = tokio::fs::read(&file.path).await.unwrap_or_default();

        let mut state = self.lock()?;
        if state.failing_uploads.contains(&file.file_name) {
            return Err(ClientError::Server {
                status: 500,
                body: "storage unavailable".to_string(),
            });
        }
        let id = state.next_document_id;
        state.next_document_id += 1;
        state
            .documents
            .insert(id, (file.file_name.clone(), bytes));
        Ok(UploadedDocumentDto {
            document_id: id,
            path: format!(
                "https://files.portal.local/documents/{}_{}?X-Amz-Signature=stub",
                id,
                file.file_name.replace(' ', "%20")
            ),
        })
    }

    async fn download(&self, document_id: i64) -> Result<Vec<u8>, ClientError> {
        self.simulate_latency().await;
        let state = self.lock()?;
        state
            .documents
            .get(&document_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(ClientError::UnknownDocument(document_id))
    }
}
