// Backend boundary: the Application API and the Document API.
//
// `HttpBackend` talks to the portal REST API; `InMemoryBackend` is a
// deterministic stand-in used by the proof mode and tests. Neither retries.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::document::StagedFile;
use crate::models::requests::SubmitSectionRequest;
use crate::models::responses::{
    CurrentApplicationResponse, SubmitSectionResponse, TrackStatusResponse, UploadedDocumentDto,
};

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("document {0} not found")]
    UnknownDocument(i64),
    #[error("failed to read {path}: {message}")]
    File { path: String, message: String },
    #[error("session expired or not authorized")]
    Unauthorized,
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ClientError {
    /// Message safe to show to the applicant (no URLs, bodies or internals).
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http(e) if e.is_timeout() => {
                "The server took too long to respond. Please try again.".to_string()
            }
            ClientError::Http(_) => {
                "Unable to reach the portal. Check your connection and try again.".to_string()
            }
            ClientError::Server { status, .. } if *status >= 500 => {
                "The portal is temporarily unavailable. Please try again later.".to_string()
            }
            ClientError::Server { status, .. } => {
                format!("The request was not accepted (HTTP {}).", status)
            }
            ClientError::Rejected(msg) => msg.clone(),
            ClientError::Json(_) | ClientError::Decode(_) => {
                "The portal sent an unexpected response. Please try again.".to_string()
            }
            ClientError::UnknownDocument(_) => "The document could not be found.".to_string(),
            ClientError::File { path, .. } => format!("Could not read the file {}.", path),
            ClientError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ClientError::InvalidBaseUrl(_) => {
                "The portal address is not configured correctly.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait ApplicationApi: Send + Sync {
    /// The applicant's current application, or `None` if none has been started.
    async fn current_application(
        &self,
    ) -> Result<Option<CurrentApplicationResponse>, ClientError>;

    /// Partial update of one section; returns the section as stored.
    async fn submit_section(
        &self,
        request: &SubmitSectionRequest,
    ) -> Result<SubmitSectionResponse, ClientError>;

    async fn track_status(&self) -> Result<TrackStatusResponse, ClientError>;
}

#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn upload(&self, file: &StagedFile) -> Result<UploadedDocumentDto, ClientError>;

    async fn download(&self, document_id: i64) -> Result<Vec<u8>, ClientError>;
}

/// Both backend capabilities behind one object.
pub trait PortalBackend: ApplicationApi + DocumentApi {}

impl<T: ApplicationApi + DocumentApi> PortalBackend for T {}
