// Upload widgets: client-side screening, the sequential upload queue and
// the multi-file box used by slots that hold several documents.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::fmt;

use crate::models::document::{DocumentRef, StagedFile};
use crate::models::responses::UploadedDocumentDto;

pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_DOCUMENT_LABEL: &str = "Document";

/// Human-readable file name from a stored document path or signed URL.
///
/// Strips query/fragment, URL-decodes the last segment and removes the numeric
/// id prefix the backend adds (`123_report.pdf` -> `report.pdf`).
pub fn filename_from_url(path: &str) -> String {
    let without_query = path.trim().split(['?', '#']).next().unwrap_or("");
    let segment = without_query.rsplit('/').next().unwrap_or("");
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = match Regex::new(r"^\d+_") {
        Ok(re) => re.replace(&decoded, "").into_owned(),
        Err(_) => decoded,
    };
    let name = name.trim();
    if name.is_empty() {
        DEFAULT_DOCUMENT_LABEL.to_string()
    } else {
        name.to_string()
    }
}

// =========================
// Screening
// =========================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub max_files: usize,
    pub allowed_types: Vec<String>,
    pub max_size_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            allowed_types: vec![
                "application/pdf".to_string(),
                "image/png".to_string(),
                "image/jpeg".to_string(),
            ],
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl UploadConfig {
    /// Same limits, one file per slot.
    pub fn single(&self) -> Self {
        Self {
            max_files: 1,
            ..self.clone()
        }
    }

    pub fn with_max_files(&self, max_files: usize) -> Self {
        Self {
            max_files,
            ..self.clone()
        }
    }

    pub fn allows(&self, mime_type: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(mime_type))
    }

    pub fn remaining_slots(&self, current_count: usize) -> usize {
        self.max_files.saturating_sub(current_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnsupportedType { mime_type: String },
    TooLarge { size_bytes: u64, max_bytes: u64 },
    MaxDocuments { max_files: usize },
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnsupportedType { mime_type } => write!(
                f,
                "File type {} is not allowed. Upload a PDF or an image (PNG/JPEG).",
                mime_type
            ),
            RejectReason::TooLarge {
                size_bytes,
                max_bytes,
            } => write!(
                f,
                "File is {:.1} MB; the limit is {:.0} MB.",
                megabytes(*size_bytes),
                megabytes(*max_bytes)
            ),
            RejectReason::MaxDocuments { max_files } => {
                write!(f, "Maximum {} documents allowed.", max_files)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file: StagedFile,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchScreening {
    pub accepted: Vec<StagedFile>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<String>,
}

/// Split a selection into files to upload and files rejected with a reason.
///
/// Type and size are checked first; whatever passes is truncated to the slots
/// left under `max_files`.
pub fn screen_batch(
    config: &UploadConfig,
    files: Vec<StagedFile>,
    current_count: usize,
) -> BatchScreening {
    let remaining = config.remaining_slots(current_count);
    let mut screening = BatchScreening::default();
    let mut over_limit = 0usize;

    for file in files {
        let reason = if !config.allows(&file.mime_type) {
            Some(RejectReason::UnsupportedType {
                mime_type: file.mime_type.clone(),
            })
        } else if file.size_bytes > config.max_size_bytes {
            Some(RejectReason::TooLarge {
                size_bytes: file.size_bytes,
                max_bytes: config.max_size_bytes,
            })
        } else if screening.accepted.len() >= remaining {
            over_limit += 1;
            Some(RejectReason::MaxDocuments {
                max_files: config.max_files,
            })
        } else {
            None
        };

        match reason {
            Some(reason) => {
                log::warn!(
                    "[PHASE: upload] [STEP: screen] Rejected {}: {}",
                    file.file_name,
                    reason
                );
                screening.rejected.push(Rejection { file, reason });
            }
            None => screening.accepted.push(file),
        }
    }

    if over_limit > 0 {
        screening.warnings.push(format!(
            "Maximum {} documents allowed; {} file(s) were not added.",
            config.max_files, over_limit
        ));
    }
    screening
}

// =========================
// Upload queue
// =========================

/// Anything that can turn a staged file into a persisted document.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Upload one file. The error is a user-facing message.
    async fn upload_file(&self, file: &StagedFile) -> Result<UploadedDocumentDto, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded(UploadedDocumentDto),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UploadTask<K> {
    pub key: K,
    pub file: StagedFile,
    pub status: UploadStatus,
}

/// Ordered list of uploads processed one at a time.
///
/// A failed task is recorded and the queue moves on to the next one.
#[derive(Debug, Clone)]
pub struct UploadQueue<K> {
    tasks: Vec<UploadTask<K>>,
}

impl<K> Default for UploadQueue<K> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<K: Send + Sync> UploadQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: K, file: StagedFile) {
        self.tasks.push(UploadTask {
            key,
            file,
            status: UploadStatus::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[UploadTask<K>] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<UploadTask<K>> {
        self.tasks
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadTask<K>> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, UploadStatus::Failed(_)))
    }

    /// Upload every pending task in order, awaiting each before starting the next.
    pub async fn run(&mut self, target: &dyn UploadTarget) {
        let total = self.tasks.len();
        stream::iter(self.tasks.iter_mut().enumerate())
            .filter(|(_, task)| futures::future::ready(task.status == UploadStatus::Pending))
            .for_each(|(i, task)| async move {
                task.status = UploadStatus::Uploading;
                log::info!(
                    "[PHASE: upload] [STEP: file {}/{}] Uploading {} ({} bytes)",
                    i + 1,
                    total,
                    task.file.file_name,
                    task.file.size_bytes
                );
                task.status = match target.upload_file(&task.file).await {
                    Ok(doc) => {
                        log::info!(
                            "[PHASE: upload] [STEP: file {}/{}] Uploaded {} as document {}",
                            i + 1,
                            total,
                            task.file.file_name,
                            doc.document_id
                        );
                        UploadStatus::Uploaded(doc)
                    }
                    Err(msg) => {
                        log::error!(
                            "[PHASE: upload] [STEP: file {}/{}] Upload of {} failed: {}",
                            i + 1,
                            total,
                            task.file.file_name,
                            msg
                        );
                        UploadStatus::Failed(msg)
                    }
                };
            })
            .await;
    }
}

// =========================
// Multi-file box
// =========================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub file_name: String,
    pub message: String,
}

/// Reported once every accepted file of a batch has resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub new_document_ids: Vec<i64>,
    pub unchanged_prefilled_paths: Vec<String>,
    pub failures: Vec<UploadFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiUploadResult {
    pub screening: BatchScreening,
    pub outcome: UploadOutcome,
}

/// A slot holding up to `max_files` persisted documents.
#[derive(Debug, Clone)]
pub struct MultiFileBox {
    config: UploadConfig,
    documents: Vec<DocumentRef>,
}

impl MultiFileBox {
    pub fn new(config: UploadConfig, existing: Vec<DocumentRef>) -> Self {
        Self {
            config,
            documents: existing,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn documents(&self) -> &[DocumentRef] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<DocumentRef> {
        self.documents
    }

    pub fn remaining_slots(&self) -> usize {
        self.config.remaining_slots(self.documents.len())
    }

    /// Remove an attachment from the slot. Nothing is deleted server-side.
    pub fn remove(&mut self, index: usize) -> Option<DocumentRef> {
        (index < self.documents.len()).then(|| self.documents.remove(index))
    }

    /// Screen the selection, upload what was accepted and append the results.
    pub async fn on_files_selected(
        &mut self,
        files: Vec<StagedFile>,
        target: &dyn UploadTarget,
    ) -> MultiUploadResult {
        let unchanged_prefilled_paths: Vec<String> = self
            .documents
            .iter()
            .filter_map(|d| d.path.clone())
            .collect();

        let screening = screen_batch(&self.config, files, self.documents.len());

        let mut queue = UploadQueue::new();
        for (i, file) in screening.accepted.iter().enumerate() {
            queue.push(i, file.clone());
        }
        queue.run(target).await;

        let mut outcome = UploadOutcome {
            unchanged_prefilled_paths,
            ..UploadOutcome::default()
        };
        for task in queue.into_tasks() {
            match task.status {
                UploadStatus::Uploaded(doc) => {
                    outcome.new_document_ids.push(doc.document_id);
                    self.documents
                        .push(DocumentRef::persisted(doc.document_id, doc.path));
                }
                UploadStatus::Failed(message) => outcome.failures.push(UploadFailure {
                    file_name: task.file.file_name,
                    message,
                }),
                UploadStatus::Pending | UploadStatus::Uploading => {}
            }
        }

        log::info!(
            "[PHASE: upload] [STEP: batch] {} uploaded, {} failed, {} rejected; slot holds {}/{}",
            outcome.new_document_ids.len(),
            outcome.failures.len(),
            screening.rejected.len(),
            self.documents.len(),
            self.config.max_files
        );

        MultiUploadResult { screening, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn pdf(name: &str) -> StagedFile {
        StagedFile::new(format!("/tmp/{}", name), name, "application/pdf", 4096)
    }

    /// Issues sequential ids; fails files whose name contains "broken".
    struct StubTarget {
        calls: AtomicU32,
        next_id: AtomicI64,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
        order: Mutex<Vec<String>>,
    }

    impl StubTarget {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                next_id: AtomicI64::new(100),
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UploadTarget for StubTarget {
        async fn upload_file(&self, file: &StagedFile) -> Result<UploadedDocumentDto, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.order.lock().unwrap().push(file.file_name.clone());
            self.in_flight.store(false, Ordering::SeqCst);

            if file.file_name.contains("broken") {
                return Err("Upload failed: server returned 500".to_string());
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(UploadedDocumentDto {
                document_id: id,
                path: format!("https://files/{}_{}", id, file.file_name),
            })
        }
    }

    #[test]
    fn filename_strips_query_and_id_prefix() {
        assert_eq!(
            filename_from_url("https://x/123_report.pdf?X-Amz=abc"),
            "report.pdf"
        );
        assert_eq!(
            filename_from_url("uploads/55_annual%20report%202024.pdf"),
            "annual report 2024.pdf"
        );
        assert_eq!(filename_from_url("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn filename_falls_back_to_generic_label() {
        assert_eq!(filename_from_url(""), DEFAULT_DOCUMENT_LABEL);
        assert_eq!(filename_from_url("https://x/"), DEFAULT_DOCUMENT_LABEL);
        assert_eq!(filename_from_url("?only=query"), DEFAULT_DOCUMENT_LABEL);
        assert_eq!(filename_from_url("https://x/123_"), DEFAULT_DOCUMENT_LABEL);
    }

    #[test]
    fn screening_accounts_for_every_file() {
        let config = UploadConfig::default();
        let files = vec![
            pdf("a.pdf"),
            StagedFile::new("/tmp/b.exe", "b.exe", "application/octet-stream", 10),
            StagedFile::new("/tmp/c.pdf", "c.pdf", "application/pdf", 11 * 1024 * 1024),
            pdf("d.pdf"),
            pdf("e.pdf"),
        ];
        for current in 0..=6 {
            let s = screen_batch(&config, files.clone(), current);
            assert_eq!(s.accepted.len() + s.rejected.len(), files.len());
            assert!(s.accepted.len() <= config.remaining_slots(current));
        }
    }

    #[test]
    fn screening_reports_reasons() {
        let config = UploadConfig::default();
        let s = screen_batch(
            &config,
            vec![
                StagedFile::new("/tmp/x.zip", "x.zip", "application/zip", 10),
                StagedFile::new("/tmp/big.png", "big.png", "image/png", 20 * 1024 * 1024),
            ],
            0,
        );
        assert!(s.accepted.is_empty());
        assert!(matches!(
            s.rejected[0].reason,
            RejectReason::UnsupportedType { .. }
        ));
        assert!(matches!(s.rejected[1].reason, RejectReason::TooLarge { .. }));
        assert!(s.warnings.is_empty());
    }

    #[tokio::test]
    async fn four_existing_plus_three_new_fills_the_last_slot() {
        let existing: Vec<DocumentRef> = (1..=4)
            .map(|i| DocumentRef::persisted(i, format!("https://files/{}_doc{}.pdf", i, i)))
            .collect();
        let mut slot = MultiFileBox::new(UploadConfig::default().with_max_files(5), existing);
        let target = StubTarget::new();

        let result = slot
            .on_files_selected(vec![pdf("n1.pdf"), pdf("n2.pdf"), pdf("n3.pdf")], &target)
            .await;

        assert_eq!(result.outcome.new_document_ids.len(), 1);
        assert_eq!(result.screening.rejected.len(), 2);
        assert!(result
            .screening
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::MaxDocuments { max_files: 5 }));
        assert!(result.screening.warnings[0].contains("Maximum 5 documents"));
        assert_eq!(slot.documents().len(), 5);
        assert_eq!(result.outcome.unchanged_prefilled_paths.len(), 4);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_uploads_run_in_order() {
        let mut slot = MultiFileBox::new(UploadConfig::default(), Vec::new());
        let target = StubTarget::new();

        let result = slot
            .on_files_selected(
                vec![pdf("first.pdf"), pdf("broken.pdf"), pdf("third.pdf")],
                &target,
            )
            .await;

        assert_eq!(target.calls.load(Ordering::SeqCst), 3);
        assert!(!target.overlapped.load(Ordering::SeqCst));
        assert_eq!(
            *target.order.lock().unwrap(),
            vec!["first.pdf", "broken.pdf", "third.pdf"]
        );
        assert_eq!(result.outcome.new_document_ids, vec![100, 101]);
        assert_eq!(result.outcome.failures.len(), 1);
        assert_eq!(result.outcome.failures[0].file_name, "broken.pdf");
        assert_eq!(slot.documents().len(), 2);
    }

    #[tokio::test]
    async fn queue_skips_tasks_that_already_resolved() {
        let target = StubTarget::new();
        let mut queue = UploadQueue::new();
        queue.push("a", pdf("a.pdf"));
        queue.push("b", pdf("broken-b.pdf"));
        queue.run(&target).await;
        assert_eq!(queue.failures().count(), 1);

        queue.run(&target).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut slot = MultiFileBox::new(
            UploadConfig::default(),
            vec![DocumentRef::persisted(1, "p/1_a.pdf")],
        );
        assert!(slot.remove(3).is_none());
        assert!(slot.remove(0).is_some());
        assert_eq!(slot.remaining_slots(), 5);
    }
}
