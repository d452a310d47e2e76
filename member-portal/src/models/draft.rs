// In-memory application draft

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::responses::{ApplicationStatus, CurrentApplicationResponse};
use super::section::{MembershipType, SectionData, SectionId};

/// The in-progress application. Sections are absent until the server has one
/// on record or the applicant saves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDraft {
    pub application_id: Option<String>,
    pub membership_type: MembershipType,
    pub status: ApplicationStatus,
    /// 1-indexed.
    pub current_step: usize,
    pub is_saving: bool,
    pub is_completed: bool,
    pub sections: BTreeMap<SectionId, SectionData>,
}

impl Default for ApplicationDraft {
    fn default() -> Self {
        Self::empty(MembershipType::default())
    }
}

impl ApplicationDraft {
    pub fn empty(membership_type: MembershipType) -> Self {
        Self {
            application_id: None,
            membership_type,
            status: ApplicationStatus::Draft,
            current_step: 1,
            is_saving: false,
            is_completed: false,
            sections: BTreeMap::new(),
        }
    }

    /// Build from the server's current application.
    ///
    /// Unknown section keys are skipped and sections that fail coercion are
    /// dropped with a warning so the applicant can re-enter them.
    pub fn from_response(response: CurrentApplicationResponse) -> Self {
        let mut draft = Self::empty(response.membership_type);
        draft.application_id = response.application_id;
        draft.status = response.status;
        draft.is_completed = response.is_completed;
        draft.current_step = response
            .current_step
            .unwrap_or(1)
            .clamp(1, draft.total_steps());

        for (key, payload) in response.sections {
            let Some(id) = SectionId::parse(&key) else {
                log::warn!(
                    "[PHASE: draft] [STEP: hydrate] Ignoring unknown section '{}'",
                    key
                );
                continue;
            };
            match SectionData::from_payload(id, payload) {
                Ok(data) => {
                    draft.sections.insert(id, data);
                }
                Err(e) => log::warn!("[PHASE: draft] [STEP: hydrate] Dropping {}: {}", id, e),
            }
        }
        draft
    }

    pub fn total_steps(&self) -> usize {
        self.membership_type.total_steps()
    }

    pub fn current_section(&self) -> Option<SectionId> {
        self.membership_type.section_for_step(self.current_step)
    }

    pub fn section(&self, id: SectionId) -> Option<&SectionData> {
        self.sections.get(&id)
    }

    /// Saved data for a section, or an empty section if none is on record.
    pub fn section_or_empty(&self, id: SectionId) -> SectionData {
        self.sections
            .get(&id)
            .cloned()
            .unwrap_or_else(|| SectionData::empty(id))
    }
}
