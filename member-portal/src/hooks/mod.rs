// Section hooks
//
// A `SectionHook` owns the editable state of one wizard section: scalar
// fields, repeating records and staged files. Mutations go through named
// operations; cross-field validation runs only at submission time.

use log::{debug, error, info, warn};

use crate::models::document::{DocumentRef, StagedFile};
use crate::models::responses::UploadedDocumentDto;
use crate::models::section::{
    DocumentSlot, FieldErrors, RepeatingList, SectionData, SectionError, SectionId,
};
use crate::widgets::fields::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefillOutcome {
    Applied,
    /// The applicant already edited this section; server data was not applied.
    IgnoredLocalEdits,
}

#[derive(Debug, Clone)]
pub struct SectionHook {
    data: SectionData,
    dirty: bool,
}

impl SectionHook {
    pub fn new(id: SectionId) -> Self {
        Self::from_saved(SectionData::empty(id))
    }

    pub fn from_saved(data: SectionData) -> Self {
        Self { data, dirty: false }
    }

    pub fn id(&self) -> SectionId {
        self.data.id()
    }

    pub fn data(&self) -> &SectionData {
        &self.data
    }

    /// True once the applicant changed anything since the last prefill/save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        self.data.set_field(name, value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn add_repeating_item(&mut self, list: RepeatingList) -> Result<usize, SectionError> {
        let index = self.data.add_item(list)?;
        self.dirty = true;
        debug!(
            "[PHASE: section] [STEP: {}] Added {} #{}",
            self.id(),
            list.item_label(),
            index + 1
        );
        Ok(index)
    }

    /// Remove a record; later records shift down by one.
    ///
    /// A staged file on the removed record is discarded. An already uploaded
    /// document is only unlinked; nothing is deleted on the server.
    pub fn remove_repeating_item(
        &mut self,
        list: RepeatingList,
        index: usize,
    ) -> Result<(), SectionError> {
        let removed = self.data.remove_item(list, index).map_err(|e| {
            error!("[PHASE: section] [STEP: {}] remove_repeating_item: {}", self.id(), e);
            e
        })?;
        self.dirty = true;
        if let Some(file) = &removed.local_file {
            info!(
                "[PHASE: section] [STEP: {}] Discarded staged file {} with removed {}",
                self.id(),
                file.file_name,
                list.item_label()
            );
        }
        if let Some(id) = removed.document_id {
            info!(
                "[PHASE: section] [STEP: {}] Unlinked document {} from removed {}",
                self.id(),
                id,
                list.item_label()
            );
        }
        Ok(())
    }

    /// Out-of-range indices are caller bugs: logged and returned, never shown to users.
    pub fn set_repeating_item_field(
        &mut self,
        list: RepeatingList,
        index: usize,
        field: &str,
        value: FieldValue,
    ) -> Result<(), SectionError> {
        match self.data.set_item_field(list, index, field, value) {
            Ok(()) => {
                self.dirty = true;
                Ok(())
            }
            Err(e) => {
                if matches!(e, SectionError::IndexOutOfRange { .. }) {
                    error!(
                        "[PHASE: section] [STEP: {}] set_repeating_item_field: {}",
                        self.id(),
                        e
                    );
                }
                Err(e)
            }
        }
    }

    /// Stage the first file of a selection under `slot`. Nothing is uploaded yet.
    pub fn handle_select_file(
        &mut self,
        files: Vec<StagedFile>,
        slot: &DocumentSlot,
    ) -> Result<StagedFile, SectionError> {
        let file = files
            .into_iter()
            .next()
            .ok_or(SectionError::NoFileSelected)?;
        if let DocumentSlot::Field(key) = slot {
            if !self.data.is_enabled(key) {
                return Err(SectionError::FieldDisabled { field: key.clone() });
            }
        }
        self.data.document_mut(slot)?.stage(file.clone());
        self.dirty = true;
        info!(
            "[PHASE: section] [STEP: {}] Staged {} for {}",
            self.id(),
            file.file_name,
            slot
        );
        Ok(file)
    }

    /// Same as a selection; only the first dropped file is used.
    pub fn handle_drop_file(
        &mut self,
        files: Vec<StagedFile>,
        slot: &DocumentSlot,
    ) -> Result<StagedFile, SectionError> {
        if files.len() > 1 {
            warn!(
                "[PHASE: section] [STEP: {}] {} files dropped on {}; using the first",
                self.id(),
                files.len(),
                slot
            );
        }
        self.handle_select_file(files, slot)
    }

    pub fn clear_staged_file(&mut self, slot: &DocumentSlot) -> Result<Option<StagedFile>, SectionError> {
        let cleared = self.data.document_mut(slot)?.clear_staged();
        if cleared.is_some() {
            self.dirty = true;
        }
        Ok(cleared)
    }

    /// Hydrate from saved server data.
    ///
    /// Scalars and repeating lists are replaced wholesale. Once the applicant
    /// has edited the section (staging a file counts), late prefills are ignored.
    pub fn apply_prefill(&mut self, data: SectionData) -> Result<PrefillOutcome, SectionError> {
        if data.id() != self.id() {
            return Err(SectionError::SectionMismatch {
                expected: self.id(),
                actual: data.id(),
            });
        }
        if self.dirty {
            warn!(
                "[PHASE: section] [STEP: {}] Prefill ignored: section has local edits",
                self.id()
            );
            return Ok(PrefillOutcome::IgnoredLocalEdits);
        }
        self.data = data;
        Ok(PrefillOutcome::Applied)
    }

    /// Adopt the server's canonical data after a successful save.
    pub fn accept_saved(&mut self, data: SectionData) -> Result<(), SectionError> {
        if data.id() != self.id() {
            return Err(SectionError::SectionMismatch {
                expected: self.id(),
                actual: data.id(),
            });
        }
        self.data = data;
        self.dirty = false;
        Ok(())
    }

    pub fn staged_documents(&self) -> Vec<(DocumentSlot, StagedFile)> {
        self.data.staged_files()
    }

    /// Record a finished upload. Returns `false` if the slot no longer holds a staged file.
    pub fn mark_uploaded(
        &mut self,
        slot: &DocumentSlot,
        uploaded: &UploadedDocumentDto,
    ) -> Result<bool, SectionError> {
        Ok(self
            .data
            .document_mut(slot)?
            .mark_persisted(uploaded.document_id, uploaded.path.clone()))
    }

    pub fn multi_documents(&self, key: &str) -> Vec<DocumentRef> {
        self.data.multi_documents(key).cloned().unwrap_or_default()
    }

    pub fn set_multi_documents(
        &mut self,
        key: &str,
        documents: Vec<DocumentRef>,
    ) -> Result<(), SectionError> {
        *self.data.multi_documents_mut(key)? = documents;
        self.dirty = true;
        Ok(())
    }

    pub fn validate(&self) -> FieldErrors {
        self.data.validate()
    }

    /// Data to submit; values behind a closed Yes/No gate are dropped.
    pub fn submission(&self) -> SectionData {
        self.data.submission()
    }
}
