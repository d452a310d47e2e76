// reqwest implementation of the portal backend

use async_trait::async_trait;
use log::{info, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use super::{ApplicationApi, ClientError, DocumentApi};
use crate::models::document::StagedFile;
use crate::models::requests::SubmitSectionRequest;
use crate::models::responses::{
    ApiResponse, CurrentApplicationResponse, SubmitSectionResponse, TrackStatusResponse,
    UploadedDocumentDto,
};
use crate::security::crypto::sha256_hex;
use crate::utils::logging::mask_bearer_token;

/// Portal REST client. Every request carries the bearer token and a correlation id.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    /// `base_url` is the API root, e.g. `https://portal.example.org/api`.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl(format!(
                "{}: unsupported scheme",
                base_url
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let token = token.into();
        info!(
            "[PHASE: client] [STEP: init] API base {} (token {})",
            parsed,
            mask_bearer_token(&token)
        );
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ClientError> {
        let correlation_id = Uuid::new_v4().simple().to_string();
        info!(
            "[PHASE: client] [STEP: {}] Sending request (correlation_id={})",
            what, correlation_id
        );
        let resp = request
            .bearer_auth(&self.token)
            .header("X-Correlation-Id", &correlation_id)
            .send()
            .await?;
        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(
                "[PHASE: client] [STEP: {}] Not authorized (HTTP {}, correlation_id={})",
                what,
                status.as_u16(),
                correlation_id
            );
            return Err(ClientError::Unauthorized);
        }
        Ok(resp)
    }

    /// Unwrap the `ApiResponse` envelope. A successful envelope may carry no data.
    async fn decode_optional<T: DeserializeOwned>(
        resp: Response,
        what: &str,
    ) -> Result<Option<T>, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                "[PHASE: client] [STEP: {}] Server returned HTTP {}",
                what,
                status.as_u16()
            );
            return Err(ClientError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes)?;
        envelope.into_result().map_err(ClientError::Rejected)
    }

    /// Same as `decode_optional` for calls that must return data.
    async fn decode_envelope<T: DeserializeOwned>(
        resp: Response,
        what: &str,
    ) -> Result<T, ClientError> {
        Self::decode_optional(resp, what)
            .await?
            .ok_or_else(|| ClientError::Decode(format!("{} response carried no data", what)))
    }
}

#[async_trait]
impl ApplicationApi for HttpBackend {
    async fn current_application(
        &self,
    ) -> Result<Option<CurrentApplicationResponse>, ClientError> {
        let what = "current_application";
        let resp = self
            .send(self.client.get(self.url("applications/current")), what)
            .await?;
        let current = if resp.status() == StatusCode::NOT_FOUND {
            None
        } else {
            Self::decode_optional(resp, what).await?
        };
        if current.is_none() {
            info!("[PHASE: client] [STEP: {}] No application on record", what);
        }
        Ok(current)
    }

    async fn submit_section(
        &self,
        request: &SubmitSectionRequest,
    ) -> Result<SubmitSectionResponse, ClientError> {
        let what = "submit_section";
        let resp = self
            .send(
                self.client
                    .post(self.url("applications/sections"))
                    .json(request),
                what,
            )
            .await?;
        let saved: SubmitSectionResponse = Self::decode_envelope(resp, what).await?;
        if saved.section_id != request.section_id {
            return Err(ClientError::Decode(format!(
                "saved {} but server answered for {}",
                request.section_id, saved.section_id
            )));
        }
        Ok(saved)
    }

    async fn track_status(&self) -> Result<TrackStatusResponse, ClientError> {
        let what = "track_status";
        let resp = self
            .send(self.client.post(self.url("applications/track-status")), what)
            .await?;
        Self::decode_envelope(resp, what).await
    }
}

#[async_trait]
impl DocumentApi for HttpBackend {
    async fn upload(&self, file: &StagedFile) -> Result<UploadedDocumentDto, ClientError> {
        let what = "upload_document";
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| ClientError::File {
                path: file.path.display().to_string(),
                message: e.to_string(),
            })?;
        info!(
            "[PHASE: client] [STEP: {}] {} ({} bytes, sha256 {})",
            what,
            file.file_name,
            bytes.len(),
            sha256_hex(&bytes)
        );
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .send(
                self.client.post(self.url("documents/upload")).multipart(form),
                what,
            )
            .await?;
        Self::decode_envelope(resp, what).await
    }

    async fn download(&self, document_id: i64) -> Result<Vec<u8>, ClientError> {
        let what = "download_document";
        let resp = self
            .send(
                self.client
                    .get(self.url(&format!("documents/{}/download", document_id))),
                what,
            )
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::UnknownDocument(document_id));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::responses::ApplicationStatus;
    use crate::models::section::{MembershipType, SectionId};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer exactly one request with `status` and `body`. The join handle
    /// yields the raw request (lowercased) as the server received it.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_ascii_lowercase();
                let Some(header_end) = text.find("\r\n\r\n") else {
                    continue;
                };
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_ascii_lowercase()
        });
        (format!("http://{}/api", addr), handle)
    }

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(base_url, "test-token", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            HttpBackend::new("not a url", "t", Duration::from_secs(5)),
            Err(ClientError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            HttpBackend::new("ftp://portal.example.org", "t", Duration::from_secs(5)),
            Err(ClientError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn joins_paths_without_double_slashes() {
        let backend =
            HttpBackend::new("https://portal.example.org/api/", "t", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            backend.url("/applications/current"),
            "https://portal.example.org/api/applications/current"
        );
    }

    #[tokio::test]
    async fn new_applicant_without_data_gets_no_application() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"success":true,"data":null,"message":"No application found"}"#,
        )
        .await;
        let current = backend(&url).current_application().await.unwrap();
        assert!(current.is_none());

        let request = server.await.unwrap();
        assert!(request.starts_with("get /api/applications/current "));
        assert!(request.contains("authorization: bearer test-token"));
        assert!(request.contains("x-correlation-id: "));
    }

    #[tokio::test]
    async fn not_found_means_no_application() {
        let (url, _server) = serve_once("404 Not Found", "{}").await;
        assert!(backend(&url).current_application().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn current_application_decodes_the_envelope() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"success":true,"data":{"applicationId":"APP-1","membershipType":"associate","sections":{"companyDetails":{"companyName":"Acme"}}}}"#,
        )
        .await;
        let current = backend(&url).current_application().await.unwrap().unwrap();
        assert_eq!(current.application_id.as_deref(), Some("APP-1"));
        assert_eq!(current.membership_type, MembershipType::Associate);
        assert!(current.sections.contains_key("companyDetails"));
    }

    #[tokio::test]
    async fn failed_envelope_carries_the_server_message() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"success":false,"error":"Application is locked for review"}"#,
        )
        .await;
        match backend(&url).track_status().await {
            Err(ClientError::Rejected(msg)) => assert_eq!(msg, "Application is locked for review"),
            other => panic!("unexpected: {:?}", other.map(|s| s.application.status)),
        }
    }

    #[tokio::test]
    async fn calls_that_need_data_reject_an_empty_envelope() {
        let (url, _server) = serve_once("200 OK", r#"{"success":true,"data":null}"#).await;
        assert!(matches!(
            backend(&url).track_status().await,
            Err(ClientError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn track_status_decodes() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"success":true,"data":{"application":{"applicationId":"APP-2","status":"submitted"}}}"#,
        )
        .await;
        let status = backend(&url).track_status().await.unwrap();
        assert_eq!(status.application.status, ApplicationStatus::Submitted);
        assert!(server
            .await
            .unwrap()
            .starts_with("post /api/applications/track-status "));
    }

    #[tokio::test]
    async fn unauthorized_and_forbidden_are_session_errors() {
        for status in ["401 Unauthorized", "403 Forbidden"] {
            let (url, _server) = serve_once(status, "{}").await;
            assert!(
                matches!(
                    backend(&url).current_application().await,
                    Err(ClientError::Unauthorized)
                ),
                "{}",
                status
            );
        }
    }

    #[tokio::test]
    async fn server_errors_keep_status_and_body() {
        let (url, _server) = serve_once("500 Internal Server Error", "boom").await;
        match backend(&url).track_status().await {
            Err(ClientError::Server { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected: {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn submit_section_posts_the_tagged_payload() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"success":true,"data":{"sectionId":"companyDetails","data":{"companyName":"Acme"}}}"#,
        )
        .await;
        let request = SubmitSectionRequest {
            section_id: SectionId::CompanyDetails,
            payload: json!({ "companyName": " Acme " }),
        };
        let saved = backend(&url).submit_section(&request).await.unwrap();
        assert_eq!(saved.section_id, SectionId::CompanyDetails);
        assert_eq!(saved.data["companyName"], "Acme");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("post /api/applications/sections "));
        assert!(raw.contains(r#""sectionid":"companydetails""#));
    }

    #[tokio::test]
    async fn submit_section_rejects_an_answer_for_another_section() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"success":true,"data":{"sectionId":"supportingDocuments","data":{}}}"#,
        )
        .await;
        let request = SubmitSectionRequest {
            section_id: SectionId::CompanyDetails,
            payload: json!({}),
        };
        assert!(matches!(
            backend(&url).submit_section(&request).await,
            Err(ClientError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn upload_sends_a_multipart_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("licence.pdf");
        std::fs::write(&path, b"%PDF-1.4 licence").unwrap();
        let file = StagedFile::from_path(&path).unwrap();

        let (url, server) = serve_once(
            "200 OK",
            r#"{"success":true,"data":{"documentId":12,"path":"https://files/12_licence.pdf"}}"#,
        )
        .await;
        let uploaded = backend(&url).upload(&file).await.unwrap();
        assert_eq!(uploaded.document_id, 12);
        assert_eq!(uploaded.path, "https://files/12_licence.pdf");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("post /api/documents/upload "));
        assert!(raw.contains("content-type: multipart/form-data"));
        assert!(raw.contains(r#"name="file"; filename="licence.pdf""#));
        assert!(raw.contains("content-type: application/pdf"));
        assert!(raw.contains("%pdf-1.4 licence"));
    }

    #[tokio::test]
    async fn upload_of_a_missing_file_never_reaches_the_server() {
        let file = StagedFile::new("/nonexistent/scan.pdf", "scan.pdf", "application/pdf", 3);
        assert!(matches!(
            backend("http://127.0.0.1:9/api").upload(&file).await,
            Err(ClientError::File { .. })
        ));
    }

    #[tokio::test]
    async fn download_returns_bytes_or_unknown_document() {
        let (url, server) = serve_once("200 OK", "PDFBYTES").await;
        assert_eq!(backend(&url).download(7).await.unwrap(), b"PDFBYTES".to_vec());
        assert!(server
            .await
            .unwrap()
            .starts_with("get /api/documents/7/download "));

        let (url, _server) = serve_once("404 Not Found", "").await;
        assert!(matches!(
            backend(&url).download(8).await,
            Err(ClientError::UnknownDocument(8))
        ));
    }
}
