// Step controller
//
// Drives the section wizard: one `SectionHook` per step, Back without saving,
// and Save & Next = validate -> upload staged files -> save section -> advance.
// Any failure keeps the applicant on the same step.

pub mod sample;

use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::hooks::SectionHook;
use crate::models::document::StagedFile;
use crate::models::section::{
    DocumentSlot, FieldErrors, MembershipType, SectionError, SectionId,
};
use crate::store::{DraftStore, StoreError};
use crate::widgets::upload::{
    screen_batch, MultiFileBox, MultiUploadResult, UploadConfig, UploadFailure, UploadQueue,
    UploadStatus,
};

#[derive(Error, Debug)]
pub enum StepError {
    #[error("{} field(s) need attention", .0.len())]
    Validation(FieldErrors),
    #[error("{} document(s) could not be uploaded", .0.len())]
    Upload(Vec<UploadFailure>),
    #[error("{0}")]
    Save(String),
    #[error("{0}")]
    Document(String),
    #[error("the wizard has not been started")]
    NotStarted,
    #[error("the application has already been completed")]
    AlreadyCompleted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Section(#[from] SectionError),
}

impl StepError {
    /// Message for the applicant; store failures are translated, never shown raw.
    pub fn user_message(&self) -> String {
        match self {
            StepError::Store(e) => e.user_message(),
            StepError::Section(_) => {
                "This step could not be updated. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced(usize),
    Completed,
}

pub struct WizardController {
    store: Arc<DraftStore>,
    upload_config: UploadConfig,
    membership: MembershipType,
    current_step: usize,
    hooks: BTreeMap<SectionId, SectionHook>,
    field_errors: FieldErrors,
    banner: Option<String>,
    completed: bool,
    started: bool,
}

impl WizardController {
    pub fn new(store: Arc<DraftStore>, upload_config: UploadConfig) -> Self {
        Self {
            store,
            upload_config,
            membership: MembershipType::default(),
            current_step: 1,
            hooks: BTreeMap::new(),
            field_errors: FieldErrors::new(),
            banner: None,
            completed: false,
            started: false,
        }
    }

    /// Load the draft and hydrate one hook per section.
    ///
    /// Calling this again re-applies server data to hooks without local edits.
    pub async fn start(&mut self) -> Result<usize, StepError> {
        let draft = self.store.load_draft().await?;
        self.membership = draft.membership_type;
        for id in self.membership.sections() {
            let hook = self
                .hooks
                .entry(*id)
                .or_insert_with(|| SectionHook::new(*id));
            if let Some(saved) = draft.section(*id) {
                hook.apply_prefill(saved.clone())?;
            }
        }
        self.current_step = draft.current_step;
        self.completed = draft.is_completed;
        self.started = true;
        info!(
            "[PHASE: wizard] [STEP: start] {:?} application at step {}/{}",
            self.membership,
            self.current_step,
            self.total_steps()
        );
        Ok(self.current_step)
    }

    pub fn store(&self) -> &Arc<DraftStore> {
        &self.store
    }

    pub fn membership_type(&self) -> MembershipType {
        self.membership
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.membership.total_steps()
    }

    pub fn current_section(&self) -> Option<SectionId> {
        self.membership.section_for_step(self.current_step)
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    /// Top-level message for the current step (save or upload failure).
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn hook(&self, id: SectionId) -> Option<&SectionHook> {
        self.hooks.get(&id)
    }

    pub fn current_hook(&self) -> Option<&SectionHook> {
        self.current_section().and_then(|id| self.hooks.get(&id))
    }

    pub fn current_hook_mut(&mut self) -> Option<&mut SectionHook> {
        let id = self.current_section()?;
        self.hooks.get_mut(&id)
    }

    fn clear_messages(&mut self) {
        self.field_errors.clear();
        self.banner = None;
    }

    /// Previous step, without saving. No-op on step 1.
    pub async fn back(&mut self) -> Result<usize, StepError> {
        if !self.started {
            return Err(StepError::NotStarted);
        }
        self.clear_messages();
        if self.current_step > 1 {
            self.store.set_current_step(self.current_step - 1).await?;
            self.current_step -= 1;
        }
        Ok(self.current_step)
    }

    /// Stage a file from disk for a single-file slot of the current section.
    pub fn stage_document(
        &mut self,
        slot: DocumentSlot,
        path: &Path,
    ) -> Result<StagedFile, StepError> {
        let file = StagedFile::from_path(path)
            .map_err(|e| StepError::Document(format!("Could not read {}: {}", path.display(), e)))?;
        let screening = screen_batch(&self.upload_config.single(), vec![file], 0);
        if let Some(rejection) = screening.rejected.into_iter().next() {
            return Err(StepError::Document(rejection.reason.to_string()));
        }
        let hook = self.current_hook_mut().ok_or(StepError::NotStarted)?;
        Ok(hook.handle_select_file(screening.accepted, &slot)?)
    }

    /// Upload files straight into a multi-file slot of the current section.
    pub async fn upload_multi(
        &mut self,
        key: &str,
        paths: &[PathBuf],
    ) -> Result<MultiUploadResult, StepError> {
        let id = self.current_section().ok_or(StepError::NotStarted)?;
        let hook = self.hooks.get(&id).ok_or(StepError::NotStarted)?;
        let spec = hook
            .data()
            .multi_document_specs()
            .iter()
            .find(|s| s.key == key)
            .copied()
            .ok_or_else(|| SectionError::UnknownDocumentSlot {
                section: id,
                slot: key.to_string(),
            })?;

        let mut unreadable = Vec::new();
        let mut files = Vec::new();
        for path in paths {
            match StagedFile::from_path(path) {
                Ok(f) => files.push(f),
                Err(e) => unreadable.push(UploadFailure {
                    file_name: path.display().to_string(),
                    message: format!("Could not read the file: {}", e),
                }),
            }
        }

        // The configured limit may be tighter than the slot's own maximum.
        let max_files = self.upload_config.max_files.min(spec.max_files);
        let mut slot = MultiFileBox::new(
            self.upload_config.with_max_files(max_files),
            hook.multi_documents(key),
        );
        let store = Arc::clone(&self.store);
        let mut result = slot.on_files_selected(files, store.as_ref()).await;
        result.outcome.failures.extend(unreadable);

        if let Some(hook) = self.hooks.get_mut(&id) {
            hook.set_multi_documents(key, slot.into_documents())?;
        }
        self.banner = result
            .screening
            .warnings
            .first()
            .cloned()
            .or_else(|| {
                (!result.outcome.failures.is_empty()).then(|| {
                    format!(
                        "{} file(s) could not be uploaded.",
                        result.outcome.failures.len()
                    )
                })
            });
        Ok(result)
    }

    /// Unlink a document from a multi-file slot. Nothing is deleted server-side.
    pub fn remove_multi_document(&mut self, key: &str, index: usize) -> Result<(), StepError> {
        let hook = self.current_hook_mut().ok_or(StepError::NotStarted)?;
        let mut docs = hook.multi_documents(key);
        if index < docs.len() {
            docs.remove(index);
            hook.set_multi_documents(key, docs)?;
        }
        Ok(())
    }

    /// Validate, upload staged files, save the section and advance.
    pub async fn save_and_next(&mut self) -> Result<StepOutcome, StepError> {
        if !self.started {
            return Err(StepError::NotStarted);
        }
        if self.completed {
            return Err(StepError::AlreadyCompleted);
        }
        let id = self.current_section().ok_or(StepError::NotStarted)?;
        self.clear_messages();

        let errors = self
            .hooks
            .get(&id)
            .map(|h| h.validate())
            .ok_or(StepError::NotStarted)?;
        if !errors.is_empty() {
            warn!(
                "[PHASE: wizard] [STEP: {}] Validation failed: {:?}",
                id,
                errors.keys().collect::<Vec<_>>()
            );
            self.field_errors = errors.clone();
            return Err(StepError::Validation(errors));
        }

        self.upload_staged(id).await?;

        let data = self
            .hooks
            .get(&id)
            .map(|h| h.data().clone())
            .ok_or(StepError::NotStarted)?;
        let canonical = match self.store.save_section(&data).await {
            Ok(saved) => saved,
            Err(e) => {
                let msg = e.user_message();
                self.banner = Some(msg.clone());
                return Err(StepError::Save(msg));
            }
        };
        if let Some(hook) = self.hooks.get_mut(&id) {
            hook.accept_saved(canonical)?;
        }

        if self.current_step >= self.total_steps() {
            if let Err(e) = self.store.mark_completed().await {
                warn!("[PHASE: wizard] [STEP: {}] Could not complete: {}", id, e);
                self.banner = Some(e.user_message());
                return Err(e.into());
            }
            self.completed = true;
            info!("[PHASE: wizard] [STEP: {}] Application completed", id);
            return Ok(StepOutcome::Completed);
        }

        let next = self.current_step + 1;
        self.store.set_current_step(next).await?;
        self.current_step = next;
        info!("[PHASE: wizard] [STEP: {}] Advanced to step {}", id, next);
        Ok(StepOutcome::Advanced(next))
    }

    /// Upload every staged file of a section, one at a time. Files that made it
    /// are marked persisted even when others fail.
    async fn upload_staged(&mut self, id: SectionId) -> Result<(), StepError> {
        let staged = self
            .hooks
            .get(&id)
            .map(|h| h.staged_documents())
            .unwrap_or_default();
        if staged.is_empty() {
            return Ok(());
        }

        let config = self.upload_config.single();
        let mut failures = Vec::new();
        let mut queue = UploadQueue::new();
        for (slot, file) in staged {
            let screening = screen_batch(&config, vec![file], 0);
            for rejection in screening.rejected {
                failures.push(UploadFailure {
                    file_name: rejection.file.file_name,
                    message: rejection.reason.to_string(),
                });
            }
            for file in screening.accepted {
                queue.push(slot.clone(), file);
            }
        }

        let store = Arc::clone(&self.store);
        queue.run(store.as_ref()).await;

        let hook = self.hooks.get_mut(&id).ok_or(StepError::NotStarted)?;
        for task in queue.into_tasks() {
            match task.status {
                UploadStatus::Uploaded(doc) => {
                    hook.mark_uploaded(&task.key, &doc)?;
                }
                UploadStatus::Failed(message) => failures.push(UploadFailure {
                    file_name: task.file.file_name,
                    message,
                }),
                UploadStatus::Pending | UploadStatus::Uploading => {}
            }
        }

        if !failures.is_empty() {
            self.banner = Some(format!(
                "{} document(s) could not be uploaded. Fix them and try again.",
                failures.len()
            ));
            return Err(StepError::Upload(failures));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryBackend;
    use crate::models::document::DocumentRef;
    use crate::models::section::SectionData;
    use crate::widgets::fields::{FieldValue, YesNo};
    use serde_json::json;
    use std::collections::HashMap;

    fn wizard_for(backend: &Arc<InMemoryBackend>) -> WizardController {
        let store = Arc::new(DraftStore::new(backend.clone()));
        WizardController::new(store, UploadConfig::default())
    }

    #[tokio::test]
    async fn validation_failure_keeps_step_and_skips_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();

        let before = wizard.current_step();
        let err = wizard.save_and_next().await.unwrap_err();
        assert!(matches!(err, StepError::Validation(ref e) if e.contains_key("companyName")));
        assert_eq!(wizard.current_step(), before);
        assert!(wizard.field_errors().contains_key("contactEmail"));
        assert_eq!(backend.submit_calls(), 0);
        assert_eq!(backend.upload_calls(), 0);
        assert_eq!(wizard.store().snapshot().await.unwrap().current_step, before);
    }

    #[tokio::test]
    async fn full_principal_pass_completes_the_draft() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();

        let mut outcomes = Vec::new();
        while !wizard.is_completed() {
            let id = wizard.current_section().unwrap();
            sample::fill_section(&mut wizard, id, dir.path()).await.unwrap();
            outcomes.push(wizard.save_and_next().await.unwrap());
        }

        assert_eq!(
            outcomes,
            vec![
                StepOutcome::Advanced(2),
                StepOutcome::Advanced(3),
                StepOutcome::Advanced(4),
                StepOutcome::Advanced(5),
                StepOutcome::Completed
            ]
        );
        let draft = wizard.store().snapshot().await.unwrap();
        assert!(draft.is_completed);
        assert_eq!(draft.sections.len(), 5);
        assert_eq!(backend.submit_calls(), 5);
        assert!(backend.upload_calls() > 0);
        // Nothing left staged once a section is saved.
        for id in SectionId::ALL {
            assert!(wizard.hook(id).unwrap().staged_documents().is_empty());
        }
        assert!(matches!(
            wizard.save_and_next().await,
            Err(StepError::AlreadyCompleted)
        ));
    }

    #[tokio::test]
    async fn upload_failure_blocks_advance_but_keeps_successful_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        sample::fill_section(&mut wizard, SectionId::CompanyDetails, dir.path())
            .await
            .unwrap();
        backend.fail_uploads_named("trade-licence.pdf");

        let err = wizard.save_and_next().await.unwrap_err();
        match err {
            StepError::Upload(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].file_name, "trade-licence.pdf");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(wizard.current_step(), 1);
        assert_eq!(backend.submit_calls(), 0);
        assert!(wizard.banner().is_some());

        let staged = wizard.current_hook().unwrap().staged_documents();
        assert_eq!(staged.len(), 1, "only the failed file stays staged");
    }

    #[tokio::test]
    async fn save_failure_is_a_single_message_and_keeps_step() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        sample::fill_section(&mut wizard, SectionId::CompanyDetails, dir.path())
            .await
            .unwrap();
        backend.fail_next_submits(1, "Service unavailable");

        let err = wizard.save_and_next().await.unwrap_err();
        assert!(matches!(err, StepError::Save(ref m) if m == "Service unavailable"));
        assert_eq!(wizard.current_step(), 1);
        assert_eq!(wizard.banner(), Some("Service unavailable"));
        assert!(wizard.store().section(SectionId::CompanyDetails).await.is_none());

        // Retrying is the applicant's call; uploads already done are not repeated.
        let uploads = backend.upload_calls();
        assert_eq!(
            wizard.save_and_next().await.unwrap(),
            StepOutcome::Advanced(2)
        );
        assert_eq!(backend.upload_calls(), uploads);
    }

    #[tokio::test]
    async fn back_never_saves() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        assert_eq!(wizard.back().await.unwrap(), 1);

        sample::fill_section(&mut wizard, SectionId::CompanyDetails, dir.path())
            .await
            .unwrap();
        wizard.save_and_next().await.unwrap();
        let submits = backend.submit_calls();
        assert_eq!(wizard.back().await.unwrap(), 1);
        assert_eq!(backend.submit_calls(), submits);
        assert_eq!(wizard.store().snapshot().await.unwrap().current_step, 1);
    }

    #[tokio::test]
    async fn answering_no_keeps_uploaded_proof_until_save() {
        let mut sections = HashMap::new();
        sections.insert(
            "financialThresholds".to_string(),
            json!({
                "annualTurnover": "12,500,000",
                "bullionTurnoverExceedsThreshold": "yes",
                "bullionTurnoverProof": { "documentId": 77, "path": "https://files/77_proof.pdf" },
                "cashTransactionsAboveThreshold": "no",
                "auditedFinancialStatements": { "documentId": 78, "path": "https://files/78_afs.pdf" }
            }),
        );
        let backend = Arc::new(InMemoryBackend::new().with_application(
            "APP-3",
            MembershipType::Principal,
            sections,
        ));
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        wizard.store().set_current_step(2).await.unwrap();
        wizard.start().await.unwrap();
        assert_eq!(wizard.current_section(), Some(SectionId::FinancialThresholds));

        let proof = DocumentSlot::field("bullionTurnoverProof");
        let hook = wizard.current_hook_mut().unwrap();
        hook.set_field(
            "bullionTurnoverExceedsThreshold",
            FieldValue::YesNo(Some(YesNo::No)),
        )
        .unwrap();
        assert_eq!(
            hook.data().document(&proof).unwrap(),
            &DocumentRef::persisted(77, "https://files/77_proof.pdf")
        );
        assert!(!hook.data().is_enabled("bullionTurnoverProof"));

        wizard.save_and_next().await.unwrap();
        let saved = wizard
            .store()
            .section(SectionId::FinancialThresholds)
            .await
            .unwrap();
        assert!(!saved.document(&proof).unwrap().is_set());
        assert!(saved
            .document(&DocumentSlot::field("auditedFinancialStatements"))
            .unwrap()
            .is_set());
    }

    #[tokio::test]
    async fn multi_upload_respects_remaining_slots() {
        let dir = tempfile::tempdir().unwrap();
        let existing: Vec<serde_json::Value> = (1..=4)
            .map(|i| json!({ "documentId": i, "path": format!("https://files/{}_doc.pdf", i) }))
            .collect();
        let mut sections = HashMap::new();
        sections.insert(
            "supportingDocuments".to_string(),
            json!({ "additionalDocuments": existing }),
        );
        let backend = Arc::new(InMemoryBackend::new().with_application(
            "APP-4",
            MembershipType::Associate,
            sections,
        ));
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        wizard.store().set_current_step(4).await.unwrap();
        wizard.start().await.unwrap();

        let paths: Vec<PathBuf> = (1..=3)
            .map(|i| {
                let p = dir.path().join(format!("extra-{}.pdf", i));
                std::fs::write(&p, b"%PDF-1.4").unwrap();
                p
            })
            .collect();
        let result = wizard
            .upload_multi("additionalDocuments", &paths)
            .await
            .unwrap();

        assert_eq!(result.outcome.new_document_ids.len(), 1);
        assert_eq!(result.screening.rejected.len(), 2);
        assert_eq!(
            wizard
                .current_hook()
                .unwrap()
                .multi_documents("additionalDocuments")
                .len(),
            5
        );
        assert!(wizard.banner().unwrap().contains("Maximum 5 documents"));
    }

    #[tokio::test]
    async fn configured_file_limit_caps_multi_upload() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_application(
            "APP-5",
            MembershipType::Associate,
            HashMap::new(),
        ));
        let store = Arc::new(DraftStore::new(backend.clone()));
        let mut wizard = WizardController::new(store, UploadConfig::default().with_max_files(2));
        wizard.start().await.unwrap();
        wizard.store().set_current_step(4).await.unwrap();
        wizard.start().await.unwrap();
        assert_eq!(wizard.current_section(), Some(SectionId::SupportingDocuments));

        let paths: Vec<PathBuf> = (1..=3)
            .map(|i| {
                let p = dir.path().join(format!("annex-{}.pdf", i));
                std::fs::write(&p, b"%PDF-1.4").unwrap();
                p
            })
            .collect();
        let result = wizard
            .upload_multi("additionalDocuments", &paths)
            .await
            .unwrap();

        assert_eq!(result.outcome.new_document_ids.len(), 2);
        assert_eq!(result.screening.rejected.len(), 1);
        assert_eq!(backend.upload_calls(), 2);
        assert_eq!(
            wizard
                .current_hook()
                .unwrap()
                .multi_documents("additionalDocuments")
                .len(),
            2
        );
        assert!(wizard.banner().unwrap().contains("Maximum 2 documents"));
    }

    #[tokio::test]
    async fn completing_with_unsaved_sections_names_them_in_the_banner() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new().with_application(
            "APP-6",
            MembershipType::Principal,
            HashMap::new(),
        ));
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        wizard.store().set_current_step(5).await.unwrap();
        wizard.start().await.unwrap();
        sample::fill_section(&mut wizard, SectionId::SupportingDocuments, dir.path())
            .await
            .unwrap();

        let err = wizard.save_and_next().await.unwrap_err();
        assert!(matches!(
            err,
            StepError::Store(StoreError::IncompleteSections(ref missing)) if missing.len() == 4
        ));
        let banner = wizard.banner().unwrap();
        assert!(banner.starts_with("Please complete: Company Details"), "{}", banner);
        assert!(!banner.contains("CompanyDetails"));
        assert_eq!(err.user_message(), banner);
        assert!(!wizard.is_completed());
        assert_eq!(wizard.current_step(), 5);
    }

    #[tokio::test]
    async fn staging_rejects_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let mut wizard = wizard_for(&backend);
        wizard.start().await.unwrap();
        let exe = dir.path().join("setup.exe");
        std::fs::write(&exe, b"MZ").unwrap();
        assert!(matches!(
            wizard.stage_document(DocumentSlot::field("tradeLicenseFile"), &exe),
            Err(StepError::Document(_))
        ));
        assert!(wizard.current_hook().unwrap().staged_documents().is_empty());
        assert_eq!(
            SectionData::empty(SectionId::CompanyDetails),
            wizard.current_hook().unwrap().data().clone()
        );
    }
}
