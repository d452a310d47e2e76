// API response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::section::{MembershipType, SectionId};

// =========================
// Generic wrapper
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            message: None,
        }
    }

    /// Unwrap the envelope. A failed envelope yields its `error` (or `message`).
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Request failed".to_string()))
        }
    }
}

// =========================
// Application
// =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl ApplicationStatus {
    /// Once submitted the application can no longer be edited through the wizard.
    pub fn is_editable(&self) -> bool {
        matches!(self, ApplicationStatus::Draft)
    }
}

/// `GET /applications/current`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentApplicationResponse {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub membership_type: MembershipType,
    #[serde(default)]
    pub current_step: Option<usize>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub status: ApplicationStatus,
    /// Raw section bodies keyed by section id; coerced by the store.
    #[serde(default)]
    pub sections: HashMap<String, Value>,
}

/// `POST /applications/sections`: the canonical section as stored by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSectionResponse {
    pub section_id: SectionId,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub membership_type: Option<MembershipType>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialConsideration {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /applications/track-status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatusResponse {
    pub application: ApplicationSummary,
    #[serde(default)]
    pub special_consideration: Option<SpecialConsideration>,
}

// =========================
// Documents
// =========================

/// `POST /documents/upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocumentDto {
    pub document_id: i64,
    pub path: String,
}
