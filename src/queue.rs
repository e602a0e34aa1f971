//! Staged batch processing of source documents.
//!
//! Every [`QueueItem`] walks the same fixed sequence of stages:
//!
//! ```text
//! NotStarted → ContentExtraction → AISummaryGeneration → MarkdownCreation
//!            → ShareLinkGeneration → Completed
//! ```
//!
//! Any stage may fail, which ends the item with status `Failed` while the
//! rest of the batch carries on. Stages are validated against a transition
//! table, so an item's stage only ever moves forward.
//!
//! # Concurrency
//!
//! [`ProcessingQueue::run_batch`] feeds item indices through an mpsc channel
//! to a fixed number of worker tasks. A worker owns an item from the moment it
//! receives the index until the item is terminal; it is the only writer of
//! that slot. Batch counters are atomics.
//!
//! Every state change is published as a [`QueueChanged`] on a broadcast
//! channel. Slots hold `Arc<QueueItem>`, so a snapshot copies pointers, not
//! items. Slow subscribers lose old events; they never block a worker.
//!
//! Cancellation is cooperative: the token is checked at each stage boundary,
//! and items abandoned there are failed with `cancelled before <stage>`. A
//! batch that ends cancelled leaves a fresh token behind for the next one.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::ChunkPlan;
use crate::config::ChunkingConfig;
use crate::error::{Result, VaultError};
use crate::extract::Extractor;
use crate::frontmatter::MetadataStore;
use crate::metadata::PathLocks;
use crate::note::NoteBuilder;
use crate::share::ShareLinkProvider;
use crate::summarize::{Summarizer, Summary};
use crate::vault::VaultContext;

/// Capacity of the change-notification channel.
const EVENT_CAPACITY: usize = 1024;

/// Kind of source document; picks the extractor and the note type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Video,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Video => "video",
        }
    }

    /// File extensions (lowercase, no dot) collected for this type.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DocumentType::Pdf => &["pdf"],
            DocumentType::Video => &["mp4", "mov", "mkv", "avi", "webm", "m4v"],
        }
    }

    /// Frontmatter `type` of the generated note.
    pub fn note_type(self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf-reference",
            DocumentType::Video => "video-reference",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "video" => Ok(DocumentType::Video),
            other => Err(VaultError::Validation(format!(
                "unknown document type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// Pipeline stage, ordered as executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessingStage {
    NotStarted,
    ContentExtraction,
    #[serde(rename = "AISummaryGeneration")]
    AiSummaryGeneration,
    MarkdownCreation,
    ShareLinkGeneration,
    Completed,
}

/// Allowed `(from, to)` stage moves.
const TRANSITIONS: [(ProcessingStage, ProcessingStage); 5] = [
    (ProcessingStage::NotStarted, ProcessingStage::ContentExtraction),
    (ProcessingStage::ContentExtraction, ProcessingStage::AiSummaryGeneration),
    (ProcessingStage::AiSummaryGeneration, ProcessingStage::MarkdownCreation),
    (ProcessingStage::MarkdownCreation, ProcessingStage::ShareLinkGeneration),
    (ProcessingStage::ShareLinkGeneration, ProcessingStage::Completed),
];

impl ProcessingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStage::NotStarted => "NotStarted",
            ProcessingStage::ContentExtraction => "ContentExtraction",
            ProcessingStage::AiSummaryGeneration => "AISummaryGeneration",
            ProcessingStage::MarkdownCreation => "MarkdownCreation",
            ProcessingStage::ShareLinkGeneration => "ShareLinkGeneration",
            ProcessingStage::Completed => "Completed",
        }
    }

    pub fn can_advance_to(self, next: ProcessingStage) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    pub fn next(self) -> Option<ProcessingStage> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source document moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub file_path: PathBuf,
    pub document_type: DocumentType,
    pub status: QueueStatus,
    pub stage: ProcessingStage,
    pub status_message: String,
    pub processing_start_time: Option<DateTime<Utc>>,
    /// Set only once the item is terminal.
    pub processing_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl QueueItem {
    pub fn new(file_path: impl Into<PathBuf>, document_type: DocumentType) -> Self {
        Self {
            file_path: file_path.into(),
            document_type,
            status: QueueStatus::Waiting,
            stage: ProcessingStage::NotStarted,
            status_message: "waiting".to_string(),
            processing_start_time: None,
            processing_end_time: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Back to `Waiting`/`NotStarted` for another attempt.
    pub fn reset(&mut self) {
        self.status = QueueStatus::Waiting;
        self.stage = ProcessingStage::NotStarted;
        self.status_message = "waiting".to_string();
        self.processing_start_time = None;
        self.processing_end_time = None;
        self.metadata.clear();
    }

    /// Move to `next`, rejecting anything the transition table does not allow.
    pub fn advance(&mut self, next: ProcessingStage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(VaultError::Validation(format!(
                "invalid stage transition {} -> {} for {}",
                self.stage,
                next,
                self.file_path.display()
            )));
        }
        self.stage = next;
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        self.advance(ProcessingStage::Completed)?;
        self.status = QueueStatus::Completed;
        self.status_message = "completed".to_string();
        self.processing_end_time = Some(Utc::now());
        Ok(())
    }

    fn fail(&mut self, err: &VaultError) {
        self.status = QueueStatus::Failed;
        self.status_message = match err {
            VaultError::Cancelled(_) => err.to_string(),
            _ => format!("{}: {}", self.stage, err),
        };
        self.processing_end_time = Some(Utc::now());
        self.metadata
            .insert("failed_stage".to_string(), Value::from(self.stage.as_str()));
    }
}

/// A queue state change: the full queue after the change plus the item
/// that changed.
#[derive(Debug, Clone)]
pub struct QueueChanged {
    pub snapshot: Arc<[Arc<QueueItem>]>,
    pub changed: Arc<QueueItem>,
}

/// Totals for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchProcessResult {
    pub processed: usize,
    pub failed: usize,
    #[serde(with = "duration_ms")]
    pub total_batch_time: Duration,
    /// Time spent in the summary stage, summed over items.
    #[serde(with = "duration_ms")]
    pub total_summary_time: Duration,
    pub total_tokens: u64,
}

impl BatchProcessResult {
    /// Items that reached a terminal status.
    pub fn total(&self) -> usize {
        self.processed + self.failed
    }

    /// Batch wall time per item, processed or failed.
    pub fn average_file_time_ms(&self) -> u64 {
        average(self.total_batch_time.as_millis() as u64, self.total())
    }

    /// Summary time per processed item.
    pub fn average_summary_time_ms(&self) -> u64 {
        average(self.total_summary_time.as_millis() as u64, self.processed)
    }

    /// Tokens per processed item.
    pub fn average_tokens(&self) -> u64 {
        average(self.total_tokens, self.processed)
    }

    /// One-line rollup of the batch.
    pub fn summary(&self) -> String {
        format!(
            "Processed {} of {} files ({} failed) in {} ms; average {} ms per file, \
             {} ms summarizing and {} tokens per processed file; {} tokens total.",
            self.processed,
            self.total(),
            self.failed,
            self.total_batch_time.as_millis(),
            self.average_file_time_ms(),
            self.average_summary_time_ms(),
            self.average_tokens(),
            self.total_tokens
        )
    }
}

fn average(total: u64, count: usize) -> u64 {
    if count == 0 {
        0
    } else {
        total / count as u64
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// External services the pipeline calls.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub summarizer: Arc<dyn Summarizer>,
    /// `None` skips link creation (the stage still runs).
    pub share_links: Option<Arc<dyn ShareLinkProvider>>,
    pub store: Arc<dyn MetadataStore>,
}

#[derive(Default)]
struct BatchCounters {
    processed: AtomicUsize,
    failed: AtomicUsize,
    summary_nanos: AtomicU64,
    tokens: AtomicU64,
}

/// State shared with worker tasks.
struct Shared {
    ctx: VaultContext,
    collaborators: Collaborators,
    chunking: ChunkingConfig,
    notes: NoteBuilder,
    items: Mutex<Vec<Arc<QueueItem>>>,
    events: broadcast::Sender<QueueChanged>,
    /// Token of the running (or next) batch.
    cancel: Mutex<CancellationToken>,
}

pub struct ProcessingQueue {
    shared: Arc<Shared>,
    pending: Mutex<Vec<QueueItem>>,
    failed: Mutex<Vec<QueueItem>>,
}

impl ProcessingQueue {
    /// With `overwrite_notes` unset, notes that already exist are kept.
    pub fn new(
        ctx: VaultContext,
        collaborators: Collaborators,
        chunking: ChunkingConfig,
        overwrite_notes: bool,
        locks: PathLocks,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let notes = NoteBuilder::new(collaborators.store.clone(), locks, overwrite_notes);
        Self {
            shared: Arc::new(Shared {
                ctx,
                collaborators,
                chunking,
                notes,
                items: Mutex::new(Vec::new()),
                events,
                cancel: Mutex::new(CancellationToken::new()),
            }),
            pending: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to queue changes.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueChanged> {
        self.shared.events.subscribe()
    }

    /// Token that stops the running batch (or, between batches, the next
    /// one) at the next stage boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        lock(&self.shared.cancel).clone()
    }

    /// Add a document to the pending list.
    pub fn enqueue(&self, file_path: impl Into<PathBuf>, document_type: DocumentType) -> QueueItem {
        let item = QueueItem::new(file_path, document_type);
        lock(&self.pending).push(item.clone());
        debug!(path = %item.file_path.display(), %document_type, "enqueued");
        item
    }

    /// Remove and return everything enqueued so far.
    pub fn take_pending(&self) -> Vec<QueueItem> {
        std::mem::take(&mut *lock(&self.pending))
    }

    /// Run everything enqueued so far.
    pub async fn run_pending(&self, concurrency: usize) -> Result<BatchProcessResult> {
        let items = self.take_pending();
        self.run_batch(items, concurrency).await
    }

    /// Items that failed in the most recent batch.
    pub fn failed_items(&self) -> Vec<QueueItem> {
        lock(&self.failed).clone()
    }

    /// Current state of the most recent batch.
    pub fn items(&self) -> Vec<QueueItem> {
        lock(&self.shared.items)
            .iter()
            .map(|item| QueueItem::clone(item))
            .collect()
    }

    /// Drive `items` through every stage with at most `concurrency` items in
    /// flight. Items are reset to `Waiting`/`NotStarted` first, so failed
    /// items from an earlier batch can be passed straight back in.
    pub async fn run_batch(
        &self,
        items: Vec<QueueItem>,
        concurrency: usize,
    ) -> Result<BatchProcessResult> {
        if concurrency == 0 {
            return Err(VaultError::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let items: Vec<Arc<QueueItem>> = items
            .into_iter()
            .map(|mut item| {
                item.reset();
                Arc::new(item)
            })
            .collect();
        let total = items.len();
        *lock(&self.shared.items) = items;

        let started = Instant::now();
        let counters = Arc::new(BatchCounters::default());
        info!(items = total, concurrency, "starting batch");

        let (tx, rx) = mpsc::channel::<usize>(total.max(1));
        for index in 0..total {
            // Capacity covers every index, so this never waits.
            if tx.send(index).await.is_err() {
                break;
            }
        }
        drop(tx);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = Vec::new();
        for worker_id in 0..concurrency.min(total) {
            let rx = rx.clone();
            let shared = self.shared.clone();
            let counters = counters.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(index) = next else {
                        debug!(worker_id, "worker finished");
                        break;
                    };
                    shared.process_item(worker_id, index, &counters).await;
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "queue worker panicked");
            }
        }

        {
            let mut cancel = lock(&self.shared.cancel);
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
        }

        let failed: Vec<QueueItem> = lock(&self.shared.items)
            .iter()
            .filter(|item| item.status == QueueStatus::Failed)
            .map(|item| QueueItem::clone(item))
            .collect();
        *lock(&self.failed) = failed;

        let result = BatchProcessResult {
            processed: counters.processed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            total_batch_time: started.elapsed(),
            total_summary_time: Duration::from_nanos(counters.summary_nanos.load(Ordering::SeqCst)),
            total_tokens: counters.tokens.load(Ordering::SeqCst),
        };
        info!(
            processed = result.processed,
            failed = result.failed,
            tokens = result.total_tokens,
            "batch finished"
        );
        Ok(result)
    }

    /// Write `result` (with its derived averages) as JSON.
    pub fn write_results(&self, result: &BatchProcessResult, path: &Path) -> Result<()> {
        let json = serde_json::json!({
            "processed": result.processed,
            "failed": result.failed,
            "total_batch_time": result.total_batch_time.as_millis() as u64,
            "total_summary_time": result.total_summary_time.as_millis() as u64,
            "total_tokens": result.total_tokens,
            "average_file_time_ms": result.average_file_time_ms(),
            "average_summary_time_ms": result.average_summary_time_ms(),
            "average_tokens": result.average_tokens(),
            "summary": result.summary(),
            "items": self.items(),
        });
        write_json(path, &json)
    }

    /// Write the failed items of the last batch for a later `retry`.
    pub fn write_failed_items(&self, path: &Path) -> Result<()> {
        write_json(path, &self.failed_items())
    }

    /// Read a failed-items file written by [`write_failed_items`](Self::write_failed_items).
    pub fn load_failed_items(path: &Path) -> Result<Vec<QueueItem>> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(path.to_path_buf())
            } else {
                VaultError::io(path, e)
            }
        })?;
        serde_json::from_str(&text).map_err(|e| VaultError::parse(path, e.to_string()))
    }
}

impl Shared {
    async fn process_item(&self, worker_id: usize, index: usize, counters: &BatchCounters) {
        let mut item = match lock(&self.items).get(index) {
            Some(item) => QueueItem::clone(item),
            None => return,
        };
        info!(worker_id, path = %item.file_path.display(), "processing item");

        item.status = QueueStatus::Processing;
        item.status_message = "processing".to_string();
        item.processing_start_time = Some(Utc::now());
        self.publish(index, &item);

        let outcome = match self.run_stages(&mut item, index, counters).await {
            Ok(()) => item.complete(),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                counters.processed.fetch_add(1, Ordering::SeqCst);
                info!(worker_id, path = %item.file_path.display(), "item completed");
            }
            Err(e) => {
                item.fail(&e);
                counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    worker_id,
                    path = %item.file_path.display(),
                    stage = %item.stage,
                    error = %e,
                    "item failed"
                );
            }
        }
        self.publish(index, &item);
    }

    async fn run_stages(
        &self,
        item: &mut QueueItem,
        index: usize,
        counters: &BatchCounters,
    ) -> Result<()> {
        let c = &self.collaborators;

        self.enter(item, index, ProcessingStage::ContentExtraction, "extracting text")?;
        let extraction = c.extractor.extract(&item.file_path, item.document_type).await?;
        item.metadata.extend(extraction.metadata);
        item.metadata
            .insert("size_bytes".to_string(), Value::from(extraction.size_bytes));

        self.enter(item, index, ProcessingStage::AiSummaryGeneration, "generating summary")?;
        let summary_started = Instant::now();
        let summary = self.summarize(&extraction.text, item).await;
        counters
            .summary_nanos
            .fetch_add(summary_started.elapsed().as_nanos() as u64, Ordering::SeqCst);
        let summary = summary?;
        counters.tokens.fetch_add(summary.tokens, Ordering::SeqCst);
        item.metadata
            .insert("tokens".to_string(), Value::from(summary.tokens));

        self.enter(item, index, ProcessingStage::MarkdownCreation, "creating note")?;
        let note = self
            .notes
            .create_note(&self.ctx, &item.file_path, item.document_type, &summary.text)
            .await?;
        item.metadata.insert(
            "note_path".to_string(),
            Value::from(note.path.to_string_lossy().into_owned()),
        );
        item.metadata
            .insert("note_written".to_string(), Value::from(note.written));

        self.enter(item, index, ProcessingStage::ShareLinkGeneration, "creating share link")?;
        match &c.share_links {
            Some(provider) => {
                let link = provider.get_or_create_share_link(&item.file_path).await?;
                self.notes
                    .record_share_link(&note.path, &item.file_path, &link)
                    .await?;
                item.metadata
                    .insert("share_link".to_string(), Value::from(link));
            }
            None => debug!(path = %item.file_path.display(), "sharing disabled"),
        }

        Ok(())
    }

    /// Summarize in one call, or per chunk followed by a merge call.
    async fn summarize(&self, text: &str, item: &mut QueueItem) -> Result<Summary> {
        let plan = ChunkPlan::for_text(
            text,
            self.chunking.max_single_pass_tokens,
            self.chunking.chunk_size,
            self.chunking.overlap,
        )?;
        item.metadata
            .insert("estimated_tokens".to_string(), Value::from(plan.estimated_tokens));
        item.metadata
            .insert("chunks".to_string(), Value::from(plan.chunks.len()));

        let summarizer = &self.collaborators.summarizer;
        if let [single] = plan.chunks.as_slice() {
            return summarizer.summarize(single).await;
        }

        let mut partials = Vec::with_capacity(plan.chunks.len());
        let mut tokens = 0;
        for chunk in &plan.chunks {
            let part = summarizer.summarize(chunk).await?;
            tokens += part.tokens;
            partials.push(part.text);
        }
        let merged = summarizer.synthesize(&partials).await?;
        Ok(Summary {
            text: merged.text,
            tokens: tokens + merged.tokens,
        })
    }

    /// Stage boundary: honour cancellation, advance, publish.
    fn enter(
        &self,
        item: &mut QueueItem,
        index: usize,
        stage: ProcessingStage,
        message: &str,
    ) -> Result<()> {
        if lock(&self.cancel).is_cancelled() {
            return Err(VaultError::Cancelled(stage.to_string()));
        }
        item.advance(stage)?;
        item.status_message = message.to_string();
        self.publish(index, item);
        Ok(())
    }

    fn publish(&self, index: usize, item: &QueueItem) {
        let changed = Arc::new(item.clone());
        let snapshot: Arc<[Arc<QueueItem>]> = {
            let mut items = lock(&self.items);
            if let Some(slot) = items.get_mut(index) {
                *slot = changed.clone();
            }
            items.iter().cloned().collect()
        };
        // No subscribers is fine.
        let _ = self.events.send(QueueChanged { snapshot, changed });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
    }
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| VaultError::parse(path, e.to_string()))?;
    std::fs::write(path, text).map_err(|e| VaultError::io(path, e))
}
