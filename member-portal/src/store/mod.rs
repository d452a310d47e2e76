// Draft state store
//
// Single source of truth for the in-progress application. All reads and
// writes of the draft go through these operations; the backend is reached
// only from here.
//
// Phases: Uninitialized -> Loading -> Ready -> Saving -> Ready, with
// Saving -> Error on a failed save (the draft itself is left untouched).
//
// Requests are not cancelled on unmount. Each mount has a generation number;
// a response that arrives after `unmount()` is dropped without touching state.

use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::client::{ClientError, PortalBackend};
use crate::models::document::StagedFile;
use crate::models::draft::ApplicationDraft;
use crate::models::requests::SubmitSectionRequest;
use crate::models::responses::{TrackStatusResponse, UploadedDocumentDto};
use crate::models::section::{MembershipType, SectionData, SectionError, SectionId};
use crate::widgets::upload::UploadTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorePhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Saving,
    Error,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("the application draft has not been loaded")]
    NotLoaded,
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error("step {step} is outside 1..={total}")]
    StepOutOfRange { step: usize, total: usize },
    #[error("{0} is not part of this application")]
    SectionNotInFlow(SectionId),
    #[error("sections not saved yet: {0:?}")]
    IncompleteSections(Vec<SectionId>),
    #[error("the draft was closed while the request was in flight")]
    Unmounted,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Section(#[from] SectionError),
}

impl StoreError {
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Client(e) => e.user_message(),
            StoreError::Section(_) => {
                "The portal returned data in an unexpected format. Please try again.".to_string()
            }
            StoreError::IncompleteSections(missing) => format!(
                "Please complete: {}",
                missing
                    .iter()
                    .map(|s| s.title())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    phase: StorePhase,
    draft: Option<ApplicationDraft>,
    last_error: Option<String>,
}

pub struct DraftStore {
    backend: Arc<dyn PortalBackend>,
    default_membership: MembershipType,
    inner: Mutex<StoreInner>,
    /// Generation whose draft has been loaded. Held across the fetch so that
    /// concurrent callers wait for the one in-flight request.
    load_gate: Mutex<Option<u64>>,
    generation: AtomicU64,
}

impl DraftStore {
    pub fn new(backend: Arc<dyn PortalBackend>) -> Self {
        Self {
            backend,
            default_membership: MembershipType::default(),
            inner: Mutex::new(StoreInner::default()),
            load_gate: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Membership used for a brand-new application (no draft on the server).
    pub fn with_default_membership(mut self, membership_type: MembershipType) -> Self {
        self.default_membership = membership_type;
        self
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fetch the current application once per mount.
    ///
    /// Concurrent and repeated calls share that one fetch. A failed fetch is
    /// not remembered, so the next call tries again.
    pub async fn load_draft(&self) -> Result<ApplicationDraft, StoreError> {
        let mut gate = self.load_gate.lock().await;
        let generation = self.current_generation();
        if *gate == Some(generation) {
            if let Some(draft) = self.inner.lock().await.draft.clone() {
                return Ok(draft);
            }
        }

        self.inner.lock().await.phase = StorePhase::Loading;
        info!("[PHASE: draft] [STEP: load] Fetching current application");
        let result = self.backend.current_application().await;

        if generation != self.current_generation() {
            warn!("[PHASE: draft] [STEP: load] Dropping response for a closed draft");
            return Err(StoreError::Unmounted);
        }

        let mut inner = self.inner.lock().await;
        match result {
            Ok(response) => {
                let draft = match response {
                    Some(r) => ApplicationDraft::from_response(r),
                    None => ApplicationDraft::empty(self.default_membership),
                };
                info!(
                    "[PHASE: draft] [STEP: load] Draft ready: {} section(s) on record, step {}/{}",
                    draft.sections.len(),
                    draft.current_step,
                    draft.total_steps()
                );
                inner.draft = Some(draft.clone());
                inner.phase = StorePhase::Ready;
                inner.last_error = None;
                *gate = Some(generation);
                Ok(draft)
            }
            Err(e) => {
                error!("[PHASE: draft] [STEP: load] Failed to load draft: {}", e);
                inner.phase = StorePhase::Error;
                inner.last_error = Some(e.user_message());
                Err(e.into())
            }
        }
    }

    /// Submit one section and store the server's canonical copy.
    ///
    /// On failure the draft keeps its previous value for the section and the
    /// error is recorded. There is no automatic retry.
    pub async fn save_section(&self, data: &SectionData) -> Result<SectionData, StoreError> {
        let id = data.id();
        let request = SubmitSectionRequest::from_section(data)?;
        let generation = self.current_generation();
        {
            let mut inner = self.inner.lock().await;
            if inner.phase == StorePhase::Saving {
                return Err(StoreError::SaveInProgress);
            }
            let draft = inner.draft.as_mut().ok_or(StoreError::NotLoaded)?;
            if draft.membership_type.step_of(id).is_none() {
                return Err(StoreError::SectionNotInFlow(id));
            }
            draft.is_saving = true;
            inner.phase = StorePhase::Saving;
        }

        info!("[PHASE: draft] [STEP: save] Submitting {}", id);
        let result = self.backend.submit_section(&request).await;

        if generation != self.current_generation() {
            warn!(
                "[PHASE: draft] [STEP: save] Dropping {} response for a closed draft",
                id
            );
            return Err(StoreError::Unmounted);
        }

        let canonical = result
            .map_err(StoreError::from)
            .and_then(|saved| SectionData::from_payload(saved.section_id, saved.data).map_err(StoreError::from));

        let mut inner = self.inner.lock().await;
        if let Some(draft) = inner.draft.as_mut() {
            draft.is_saving = false;
        }
        match canonical {
            Ok(section) => {
                if let Some(draft) = inner.draft.as_mut() {
                    draft.sections.insert(id, section.clone());
                }
                inner.phase = StorePhase::Ready;
                inner.last_error = None;
                info!("[PHASE: draft] [STEP: save] {} saved", id);
                Ok(section)
            }
            Err(e) => {
                error!("[PHASE: draft] [STEP: save] Saving {} failed: {}", id, e);
                inner.phase = StorePhase::Error;
                inner.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Move the step pointer. Does not save or validate anything.
    pub async fn set_current_step(&self, step: usize) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let draft = inner.draft.as_mut().ok_or(StoreError::NotLoaded)?;
        let total = draft.total_steps();
        if !(1..=total).contains(&step) {
            return Err(StoreError::StepOutOfRange { step, total });
        }
        draft.current_step = step;
        Ok(())
    }

    /// Flag the draft complete. Every section of the membership must be saved first.
    pub async fn mark_completed(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let draft = inner.draft.as_mut().ok_or(StoreError::NotLoaded)?;
        let missing: Vec<SectionId> = draft
            .membership_type
            .sections()
            .iter()
            .copied()
            .filter(|id| !draft.sections.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::IncompleteSections(missing));
        }
        draft.is_completed = true;
        info!("[PHASE: draft] [STEP: complete] Application draft completed");
        Ok(())
    }

    /// Upload one file through the document API. No retry.
    pub async fn upload_document(&self, file: &StagedFile) -> Result<UploadedDocumentDto, StoreError> {
        let generation = self.current_generation();
        let result = self.backend.upload(file).await;
        if generation != self.current_generation() {
            warn!(
                "[PHASE: draft] [STEP: upload] Dropping upload result for {} (draft closed)",
                file.file_name
            );
            return Err(StoreError::Unmounted);
        }
        Ok(result?)
    }

    pub async fn download_document(&self, document_id: i64) -> Result<Vec<u8>, StoreError> {
        Ok(self.backend.download(document_id).await?)
    }

    /// Current review status; also refreshes the draft's status.
    pub async fn track_status(&self) -> Result<TrackStatusResponse, StoreError> {
        let generation = self.current_generation();
        let status = self.backend.track_status().await?;
        if generation == self.current_generation() {
            if let Some(draft) = self.inner.lock().await.draft.as_mut() {
                draft.status = status.application.status;
            }
        }
        Ok(status)
    }

    pub async fn snapshot(&self) -> Option<ApplicationDraft> {
        self.inner.lock().await.draft.clone()
    }

    pub async fn section(&self, id: SectionId) -> Option<SectionData> {
        self.inner
            .lock()
            .await
            .draft
            .as_ref()
            .and_then(|d| d.sections.get(&id).cloned())
    }

    pub async fn phase(&self) -> StorePhase {
        self.inner.lock().await.phase
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    /// Acknowledge a failed save: Error -> Ready.
    pub async fn clear_error(&self) {
        let mut inner = self.inner.lock().await;
        if inner.phase == StorePhase::Error && inner.draft.is_some() {
            inner.phase = StorePhase::Ready;
        }
        inner.last_error = None;
    }

    /// Discard the draft (logout). In-flight responses for this mount are dropped.
    pub async fn unmount(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        *inner = StoreInner::default();
        info!("[PHASE: draft] [STEP: unmount] Draft discarded");
    }
}

#[async_trait]
impl UploadTarget for DraftStore {
    async fn upload_file(&self, file: &StagedFile) -> Result<UploadedDocumentDto, String> {
        self.upload_document(file).await.map_err(|e| e.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryBackend;
    use crate::widgets::fields::FieldValue;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn store_with(backend: &Arc<InMemoryBackend>) -> DraftStore {
        DraftStore::new(backend.clone())
    }

    fn company(name: &str) -> SectionData {
        let mut data = SectionData::empty(SectionId::CompanyDetails);
        data.set_field("companyName", FieldValue::text(name)).unwrap();
        data
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_request() {
        let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(20)));
        let store = store_with(&backend);

        let results = futures::future::join_all((0..5).map(|_| store.load_draft())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(backend.current_application_calls(), 1);

        store.load_draft().await.unwrap();
        assert_eq!(backend.current_application_calls(), 1);
        assert_eq!(store.phase().await, StorePhase::Ready);
    }

    #[tokio::test]
    async fn remount_fetches_again() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(&backend);
        store.load_draft().await.unwrap();
        store.unmount().await;
        assert_eq!(store.phase().await, StorePhase::Uninitialized);
        assert!(store.snapshot().await.is_none());
        store.load_draft().await.unwrap();
        assert_eq!(backend.current_application_calls(), 2);
    }

    #[tokio::test]
    async fn saved_section_is_the_server_copy() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(&backend);
        store.load_draft().await.unwrap();

        let local = company("  Acme Bullion LLC  ");
        store.save_section(&local).await.unwrap();

        let stored = store.section(SectionId::CompanyDetails).await.unwrap();
        assert_ne!(stored, local);
        assert_eq!(
            stored.field("companyName"),
            Some(FieldValue::text("Acme Bullion LLC"))
        );
    }

    #[tokio::test]
    async fn failed_save_leaves_draft_unchanged() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(&backend);
        store.load_draft().await.unwrap();
        store.save_section(&company("First")).await.unwrap();
        let before = store.snapshot().await.unwrap();

        backend.fail_next_submits(1, "Service unavailable");
        let err = store.save_section(&company("Second")).await.unwrap_err();
        assert_eq!(err.user_message(), "Service unavailable");

        let after = store.snapshot().await.unwrap();
        assert_eq!(after, before);
        assert_eq!(store.phase().await, StorePhase::Error);
        assert_eq!(store.last_error().await.as_deref(), Some("Service unavailable"));

        // No retry happened behind the caller's back.
        assert_eq!(backend.submit_calls(), 2);

        store.save_section(&company("Second")).await.unwrap();
        assert_eq!(store.phase().await, StorePhase::Ready);
        assert!(store.last_error().await.is_none());
    }

    #[tokio::test]
    async fn second_save_while_saving_is_rejected() {
        let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(20)));
        let store = store_with(&backend);
        store.load_draft().await.unwrap();

        let first = company("A");
        let second = company("B");
        let (a, b) = tokio::join!(store.save_section(&first), store.save_section(&second));
        assert!(a.is_ok());
        assert!(matches!(b, Err(StoreError::SaveInProgress)));
    }

    #[tokio::test]
    async fn response_after_unmount_is_dropped() {
        let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(30)));
        let store = store_with(&backend);
        store.load_draft().await.unwrap();

        let data = company("Late");
        let (saved, _) = tokio::join!(store.save_section(&data), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            store.unmount().await;
        });

        assert!(matches!(saved, Err(StoreError::Unmounted)));
        assert!(store.snapshot().await.is_none());
        assert_eq!(store.phase().await, StorePhase::Uninitialized);
        // The request itself still reached the server.
        assert!(backend.stored_section("companyDetails").is_some());
    }

    #[tokio::test]
    async fn step_changes_are_bounds_checked() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(&backend).with_default_membership(MembershipType::Associate);
        assert!(matches!(
            store.set_current_step(2).await,
            Err(StoreError::NotLoaded)
        ));
        store.load_draft().await.unwrap();
        store.set_current_step(4).await.unwrap();
        assert!(matches!(
            store.set_current_step(5).await,
            Err(StoreError::StepOutOfRange { step: 5, total: 4 })
        ));
        assert!(store.set_current_step(0).await.is_err());
        assert_eq!(store.snapshot().await.unwrap().current_step, 4);
    }

    #[tokio::test]
    async fn associate_cannot_save_financial_thresholds() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_with(&backend).with_default_membership(MembershipType::Associate);
        store.load_draft().await.unwrap();
        assert!(matches!(
            store
                .save_section(&SectionData::empty(SectionId::FinancialThresholds))
                .await,
            Err(StoreError::SectionNotInFlow(SectionId::FinancialThresholds))
        ));
        assert_eq!(backend.submit_calls(), 0);
    }

    #[tokio::test]
    async fn completion_requires_every_section() {
        let mut sections = HashMap::new();
        sections.insert("companyDetails".to_string(), json!({ "companyName": "Acme" }));
        let backend = Arc::new(InMemoryBackend::new().with_application(
            "APP-1",
            MembershipType::Principal,
            sections,
        ));
        let store = store_with(&backend);
        store.load_draft().await.unwrap();
        match store.mark_completed().await {
            Err(StoreError::IncompleteSections(missing)) => assert_eq!(missing.len(), 4),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn upload_target_reports_user_message() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.fail_uploads_named("scan.pdf");
        let store = store_with(&backend);
        let file = StagedFile::new("/nonexistent/scan.pdf", "scan.pdf", "application/pdf", 3);
        let err = store.upload_file(&file).await.unwrap_err();
        assert!(err.contains("temporarily unavailable"));
    }
}
