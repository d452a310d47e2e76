// Document references attached to application sections

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::widgets::upload::filename_from_url;

/// Lifecycle of a file attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Unset,
    /// A local file is selected but not uploaded yet.
    Staged,
    /// The backend issued an identifier for the file.
    Persisted,
}

/// A local file selected by the applicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl StagedFile {
    pub fn new(
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
        }
    }

    /// Build from a path on disk (size from metadata, MIME type from the extension).
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} is not a file", path),
            ));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = guess_mime_type(&file_name).to_string();
        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            mime_type,
            size_bytes: meta.len(),
        })
    }
}

/// MIME type from a file extension. Unknown extensions map to `application/octet-stream`.
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Three-state attachment: unset, staged locally, or persisted on the backend.
///
/// Only `documentId` and `path` travel over the wire; the staged file is local state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    #[serde(default, deserialize_with = "deserialize_document_id")]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(skip)]
    pub local_file: Option<StagedFile>,
}

// Some endpoints send ids as strings ("42").
fn deserialize_document_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Id(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Id(id)) => Ok(Some(id)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid document id '{}'", s))),
    }
}

impl DocumentRef {
    pub fn persisted(document_id: i64, path: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id),
            path: Some(path.into()),
            local_file: None,
        }
    }

    /// A staged file wins over a persisted reference: the applicant picked a replacement.
    pub fn state(&self) -> DocumentState {
        if self.local_file.is_some() {
            DocumentState::Staged
        } else if self.document_id.is_some() || self.path.is_some() {
            DocumentState::Persisted
        } else {
            DocumentState::Unset
        }
    }

    pub fn is_set(&self) -> bool {
        self.state() != DocumentState::Unset
    }

    pub fn stage(&mut self, file: StagedFile) {
        self.local_file = Some(file);
    }

    /// Drop a staged file without touching the persisted reference.
    pub fn clear_staged(&mut self) -> Option<StagedFile> {
        self.local_file.take()
    }

    /// Staged -> persisted. Returns `false` (and changes nothing) when no file was staged.
    pub fn mark_persisted(&mut self, document_id: i64, path: impl Into<String>) -> bool {
        if self.local_file.is_none() {
            return false;
        }
        self.document_id = Some(document_id);
        self.path = Some(path.into());
        self.local_file = None;
        true
    }

    /// Human-readable name for the attachment.
    pub fn display_name(&self) -> String {
        if let Some(f) = &self.local_file {
            return f.file_name.clone();
        }
        match &self.path {
            Some(p) => filename_from_url(p),
            None => match self.document_id {
                Some(id) => format!("Document #{}", id),
                None => String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str) -> StagedFile {
        StagedFile::new(format!("/tmp/{}", name), name, "application/pdf", 1024)
    }

    #[test]
    fn document_ref_lifecycle() {
        let mut doc = DocumentRef::default();
        assert_eq!(doc.state(), DocumentState::Unset);

        doc.stage(pdf("licence.pdf"));
        assert_eq!(doc.state(), DocumentState::Staged);

        assert!(doc.mark_persisted(42, "https://files/42_licence.pdf"));
        assert_eq!(doc.state(), DocumentState::Persisted);
        assert!(doc.local_file.is_none());
        assert_eq!(doc.document_id, Some(42));
    }

    #[test]
    fn mark_persisted_requires_staged_file() {
        let mut doc = DocumentRef::persisted(7, "a/7_x.pdf");
        assert!(!doc.mark_persisted(8, "a/8_y.pdf"));
        assert_eq!(doc.document_id, Some(7));
    }

    #[test]
    fn clearing_staged_keeps_persisted_reference() {
        let mut doc = DocumentRef::persisted(7, "a/7_x.pdf");
        doc.stage(pdf("replacement.pdf"));
        assert_eq!(doc.state(), DocumentState::Staged);
        doc.clear_staged();
        assert_eq!(doc.state(), DocumentState::Persisted);
        assert_eq!(doc.document_id, Some(7));
    }

    #[test]
    fn local_file_is_not_serialized() {
        let mut doc = DocumentRef::default();
        doc.stage(pdf("secret.pdf"));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({ "documentId": null, "path": null }));
    }

    #[test]
    fn display_name_prefers_staged_file() {
        let mut doc = DocumentRef::persisted(3, "https://x/3_old.pdf?sig=1");
        assert_eq!(doc.display_name(), "old.pdf");
        doc.stage(pdf("new.pdf"));
        assert_eq!(doc.display_name(), "new.pdf");
    }

    #[test]
    fn mime_guess_by_extension() {
        assert_eq!(guess_mime_type("a.PDF"), "application/pdf");
        assert_eq!(guess_mime_type("scan.jpeg"), "image/jpeg");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
    }

    #[test]
    fn staged_file_from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("statement.pdf");
        std::fs::write(&p, b"%PDF-1.7 test").unwrap();
        let f = StagedFile::from_path(&p).unwrap();
        assert_eq!(f.file_name, "statement.pdf");
        assert_eq!(f.mime_type, "application/pdf");
        assert_eq!(f.size_bytes, 13);
        assert!(StagedFile::from_path(dir.path()).is_err());
    }
}
