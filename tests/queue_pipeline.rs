//! End-to-end batch runs through [`ProcessingQueue`] with in-memory
//! extraction, summarization and share links. Notes are written to a
//! temporary vault through the real frontmatter store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use notebook_automation::config::ChunkingConfig;
use notebook_automation::error::{Result, VaultError};
use notebook_automation::extract::{Extraction, Extractor};
use notebook_automation::frontmatter::{FrontmatterStore, MetadataStore};
use notebook_automation::metadata::PathLocks;
use notebook_automation::note::SOURCE_FILE_KEY;
use notebook_automation::queue::{
    Collaborators, DocumentType, ProcessingQueue, ProcessingStage, QueueItem, QueueStatus,
};
use notebook_automation::share::ShareLinkProvider;
use notebook_automation::summarize::{Summarizer, Summary};
use notebook_automation::vault::VaultContext;

struct FakeExtractor {
    calls: AtomicUsize,
    long_text: bool,
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, path: &Path, _document_type: DocumentType) -> Result<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let text = if self.long_text {
            format!("Lecture text for {}. ", name).repeat(40)
        } else {
            format!("Lecture text for {}", name)
        };
        Ok(Extraction {
            text,
            size_bytes: 0,
            metadata: BTreeMap::new(),
        })
    }
}

/// Fails any chunk mentioning `doc-05` while `fail_doc5` is set.
struct FakeSummarizer {
    fail_doc5: AtomicBool,
    summarize_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
    /// Cancelled on the first call once set.
    cancel_on_call: OnceLock<CancellationToken>,
}

impl FakeSummarizer {
    fn new(fail_doc5: bool) -> Self {
        Self {
            fail_doc5: AtomicBool::new(fail_doc5),
            summarize_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
            cancel_on_call: OnceLock::new(),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, chunk: &str) -> Result<Summary> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.cancel_on_call.get() {
            token.cancel();
        }
        if self.fail_doc5.load(Ordering::SeqCst) && chunk.contains("doc-05") {
            return Err(VaultError::external("openai", "rate limited"));
        }
        Ok(Summary {
            text: format!("Summary of {}", chunk.lines().next().unwrap_or("")),
            tokens: 100,
        })
    }

    async fn synthesize(&self, partials: &[String]) -> Result<Summary> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Summary {
            text: format!("Merged {} partial summaries", partials.len()),
            tokens: 50,
        })
    }
}

struct FakeShareLinks;

#[async_trait]
impl ShareLinkProvider for FakeShareLinks {
    async fn get_or_create_share_link(&self, path: &Path) -> Result<String> {
        Ok(format!(
            "https://share.example/{}",
            path.file_name().unwrap().to_string_lossy()
        ))
    }
}

struct Harness {
    tmp: TempDir,
    vault: PathBuf,
    sources: Vec<PathBuf>,
    extractor: Arc<FakeExtractor>,
    summarizer: Arc<FakeSummarizer>,
    queue: ProcessingQueue,
}

fn harness(summarizer: FakeSummarizer, chunking: ChunkingConfig, long_text: bool) -> Harness {
    let tmp = TempDir::new().unwrap();
    let vault = tmp.path().join("vault");
    let resources = tmp.path().join("resources");
    std::fs::create_dir_all(&vault).unwrap();

    let ctx = VaultContext::new(&vault).with_resources_root(&resources);
    let extractor = Arc::new(FakeExtractor {
        calls: AtomicUsize::new(0),
        long_text,
    });
    let summarizer = Arc::new(summarizer);
    let store: Arc<dyn MetadataStore> = Arc::new(FrontmatterStore::new());
    let collaborators = Collaborators {
        extractor: extractor.clone(),
        summarizer: summarizer.clone(),
        share_links: Some(Arc::new(FakeShareLinks)),
        store,
    };
    let queue = ProcessingQueue::new(ctx, collaborators, chunking, false, PathLocks::new());

    let sources = (1..=10)
        .map(|n| resources.join("MBA/Finance").join(format!("doc-{:02}.pdf", n)))
        .collect();

    Harness {
        tmp,
        vault,
        sources,
        extractor,
        summarizer,
        queue,
    }
}

fn enqueue_all(h: &Harness) {
    for source in &h.sources {
        h.queue.enqueue(source.clone(), DocumentType::Pdf);
    }
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let h = harness(FakeSummarizer::new(true), ChunkingConfig::default(), false);
    enqueue_all(&h);

    let result = h.queue.run_pending(1).await.unwrap();
    assert_eq!(result.processed, 9);
    assert_eq!(result.failed, 1);
    assert_eq!(result.total_tokens, 900);
    assert_eq!(result.average_tokens(), 100);

    let items = h.queue.items();
    assert_eq!(items.len(), 10);
    let failed = &items[4];
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.stage, ProcessingStage::AiSummaryGeneration);
    assert!(failed
        .status_message
        .starts_with("AISummaryGeneration: "));
    assert!(failed.processing_end_time.is_some());
    for item in &items[5..] {
        assert_eq!(item.status, QueueStatus::Completed);
        assert_eq!(item.stage, ProcessingStage::Completed);
        assert!(item.processing_end_time.is_some());
    }

    assert_eq!(h.queue.failed_items().len(), 1);
    assert!(!h.vault.join("MBA/Finance/doc-05.md").exists());
}

#[tokio::test]
async fn notes_carry_summary_hierarchy_and_share_link() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    enqueue_all(&h);
    let result = h.queue.run_pending(4).await.unwrap();
    assert_eq!(result.processed, 10);

    let note = h.vault.join("MBA/Finance/doc-01.md");
    let store = FrontmatterStore::new();
    let doc = store.read(&note).await.unwrap();
    assert_eq!(doc.metadata.get_str("type"), Some("pdf-reference"));
    assert_eq!(doc.metadata.get_str("program"), Some("MBA"));
    assert_eq!(doc.metadata.get_str("course"), Some("Finance"));
    assert_eq!(
        doc.metadata.get_str("share-link"),
        Some("https://share.example/doc-01.pdf")
    );
    assert!(doc.body.contains("## Summary"));
    assert!(doc.body.contains("Summary of Lecture text for doc-01.pdf"));

    let item = &h.queue.items()[0];
    assert_eq!(
        item.metadata.get("share_link"),
        Some(&Value::from("https://share.example/doc-01.pdf"))
    );
    assert_eq!(item.metadata.get("note_written"), Some(&Value::from(true)));
}

#[tokio::test]
async fn stages_only_move_forward() {
    let h = harness(FakeSummarizer::new(true), ChunkingConfig::default(), false);
    let mut events = h.queue.subscribe();
    enqueue_all(&h);
    h.queue.run_pending(3).await.unwrap();

    let mut seen: HashMap<PathBuf, Vec<ProcessingStage>> = HashMap::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.snapshot.len(), 10);
        seen.entry(event.changed.file_path.clone())
            .or_default()
            .push(event.changed.stage);
    }
    assert_eq!(seen.len(), 10);
    for (path, stages) in &seen {
        assert!(
            stages.windows(2).all(|w| w[0] <= w[1]),
            "{} went backwards: {:?}",
            path.display(),
            stages
        );
    }
    let completed = seen[&h.sources[0]].last().copied();
    assert_eq!(completed, Some(ProcessingStage::Completed));
}

#[tokio::test]
async fn cancelled_batch_fails_every_item() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    enqueue_all(&h);
    h.queue.cancel_token().cancel();

    let result = h.queue.run_pending(2).await.unwrap();
    assert_eq!(result.processed, 0);
    assert_eq!(result.failed, 10);
    for item in h.queue.items() {
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.status_message, "cancelled before ContentExtraction");
    }
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_stops_at_the_next_stage_boundary() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    let _ = h.summarizer.cancel_on_call.set(h.queue.cancel_token());
    enqueue_all(&h);

    let result = h.queue.run_pending(1).await.unwrap();
    assert_eq!(result.processed, 0);
    assert_eq!(result.failed, 10);

    let items = h.queue.items();
    // The in-flight item finishes its summary and stops before the note.
    assert_eq!(items[0].status_message, "cancelled before MarkdownCreation");
    for item in &items[1..] {
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.status_message, "cancelled before ContentExtraction");
    }
    assert_eq!(h.summarizer.summarize_calls.load(Ordering::SeqCst), 1);
    assert!(!h.vault.join("MBA/Finance/doc-01.md").exists());
}

#[tokio::test]
async fn retry_runs_only_failed_items() {
    let h = harness(FakeSummarizer::new(true), ChunkingConfig::default(), false);
    enqueue_all(&h);
    h.queue.run_pending(2).await.unwrap();
    let failed = h.queue.failed_items();
    assert_eq!(failed.len(), 1);

    h.summarizer.fail_doc5.store(false, Ordering::SeqCst);
    let extractions_before = h.extractor.calls.load(Ordering::SeqCst);

    let result = h.queue.run_batch(failed, 2).await.unwrap();
    assert_eq!(result.processed, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), extractions_before + 1);
    assert!(h.queue.failed_items().is_empty());
    assert!(h.vault.join("MBA/Finance/doc-05.md").exists());
}

#[tokio::test]
async fn failed_items_survive_a_round_trip() {
    let h = harness(FakeSummarizer::new(true), ChunkingConfig::default(), false);
    enqueue_all(&h);
    let result = h.queue.run_pending(2).await.unwrap();

    let dir = TempDir::new().unwrap();
    let failed_path = dir.path().join("out/failed-items.json");
    let results_path = dir.path().join("out/queue-results.json");
    h.queue.write_failed_items(&failed_path).unwrap();
    h.queue.write_results(&result, &results_path).unwrap();

    let loaded: Vec<QueueItem> = ProcessingQueue::load_failed_items(&failed_path).unwrap();
    assert_eq!(loaded, h.queue.failed_items());
    assert_eq!(
        loaded[0].metadata.get("failed_stage"),
        Some(&Value::from("AISummaryGeneration"))
    );

    let results: Value =
        serde_json::from_str(&std::fs::read_to_string(&results_path).unwrap()).unwrap();
    assert_eq!(results["processed"], 9);
    assert_eq!(results["failed"], 1);
    assert_eq!(results["items"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn long_documents_are_summarized_per_chunk() {
    let chunking = ChunkingConfig {
        chunk_size: 300,
        overlap: 30,
        max_single_pass_tokens: 50,
    };
    let h = harness(FakeSummarizer::new(false), chunking, true);
    h.queue.enqueue(h.sources[0].clone(), DocumentType::Pdf);

    let result = h.queue.run_pending(1).await.unwrap();
    assert_eq!(result.processed, 1);

    let calls = h.summarizer.summarize_calls.load(Ordering::SeqCst);
    assert!(calls > 1, "expected several chunk calls, got {}", calls);
    assert_eq!(h.summarizer.synthesize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.total_tokens, calls as u64 * 100 + 50);

    let item = &h.queue.items()[0];
    assert_eq!(item.metadata.get("chunks"), Some(&Value::from(calls)));

    let doc = FrontmatterStore::new()
        .read(&h.vault.join("MBA/Finance/doc-01.md"))
        .await
        .unwrap();
    assert!(doc.body.contains(&format!("Merged {} partial summaries", calls)));
}

#[tokio::test]
async fn existing_notes_are_kept() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    let note = h.vault.join("MBA/Finance/doc-01.md");
    std::fs::create_dir_all(note.parent().unwrap()).unwrap();
    std::fs::write(&note, "---\ntitle: Mine\n---\n# Hand written\n").unwrap();

    h.queue.enqueue(h.sources[0].clone(), DocumentType::Pdf);
    h.queue.run_pending(1).await.unwrap();

    let doc = FrontmatterStore::new().read(&note).await.unwrap();
    assert_eq!(doc.body.trim(), "# Hand written");
    assert_eq!(doc.metadata.get_str("title"), Some("Mine"));
    assert_eq!(
        doc.metadata.get_str("share-link"),
        Some("https://share.example/doc-01.pdf")
    );
    let item = &h.queue.items()[0];
    assert_eq!(item.metadata.get("note_written"), Some(&Value::from(false)));
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    enqueue_all(&h);
    let err = h.queue.run_pending(0).await.unwrap_err();
    assert!(matches!(err, VaultError::Validation(_)));
}

#[tokio::test]
async fn retry_after_cancelled_batch_completes() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    enqueue_all(&h);
    h.queue.cancel_token().cancel();
    let result = h.queue.run_pending(2).await.unwrap();
    assert_eq!(result.failed, 10);

    assert!(!h.queue.cancel_token().is_cancelled());
    let result = h.queue.run_batch(h.queue.failed_items(), 2).await.unwrap();
    assert_eq!(result.processed, 10);
    assert_eq!(result.failed, 0);
    assert!(h
        .queue
        .items()
        .iter()
        .all(|item| item.status == QueueStatus::Completed));
}

#[tokio::test]
async fn same_named_sources_never_share_a_note() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    let elsewhere = h.tmp.path().join("elsewhere");
    let sources = ["a", "b", "c"].map(|dir| elsewhere.join(dir).join("week1.pdf"));
    for source in &sources {
        h.queue.enqueue(source.clone(), DocumentType::Pdf);
    }

    let result = h.queue.run_pending(1).await.unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(result.failed, 1);

    let items = h.queue.items();
    assert_eq!(
        items[0].metadata.get("note_path"),
        Some(&Value::from(h.vault.join("week1.md").to_string_lossy().into_owned()))
    );
    assert_eq!(
        items[1].metadata.get("note_path"),
        Some(&Value::from(h.vault.join("week1-pdf.md").to_string_lossy().into_owned()))
    );
    assert_eq!(items[2].status, QueueStatus::Failed);
    assert_eq!(items[2].stage, ProcessingStage::MarkdownCreation);
    assert!(items[2].status_message.contains("collides"), "{}", items[2].status_message);

    let store = FrontmatterStore::new();
    for (note, source) in [("week1.md", &sources[0]), ("week1-pdf.md", &sources[1])] {
        let doc = store.read(&h.vault.join(note)).await.unwrap();
        assert_eq!(
            doc.metadata.get_str(SOURCE_FILE_KEY),
            Some(source.to_string_lossy().as_ref())
        );
    }
}

#[tokio::test]
async fn snapshots_share_unchanged_items() {
    let h = harness(FakeSummarizer::new(false), ChunkingConfig::default(), false);
    let mut events = h.queue.subscribe();
    enqueue_all(&h);
    h.queue.run_pending(1).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(received.len() > 10);
    for event in &received {
        let slot = event
            .snapshot
            .iter()
            .find(|item| item.file_path == event.changed.file_path)
            .unwrap();
        assert!(Arc::ptr_eq(slot, &event.changed));
    }
    for pair in received.windows(2) {
        for (before, after) in pair[0].snapshot.iter().zip(pair[1].snapshot.iter()) {
            if after.file_path != pair[1].changed.file_path {
                assert!(Arc::ptr_eq(before, after));
            }
        }
    }
}
