//! Queue progress reporting.
//!
//! Reports observable progress during `na process` and `na retry` so users
//! see which document is in which stage and how much of the batch is done.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::queue::{QueueChanged, QueueStatus};

/// Reports queue progress. Implementations write to stderr (human or JSON).
pub trait QueueProgressReporter: Send + Sync {
    /// Emit one queue change.
    fn report(&self, event: &QueueChanged);
}

/// Counts of terminal items in a snapshot: `(done, total)`.
fn done_of(event: &QueueChanged) -> (u64, u64) {
    let done = event
        .snapshot
        .iter()
        .filter(|item| item.status.is_terminal())
        .count();
    (done as u64, event.snapshot.len() as u64)
}

/// Human-friendly progress on stderr:
/// `process  3 / 10  AISummaryGeneration  /resources/MBA/week1.pdf`.
pub struct StderrProgress;

impl QueueProgressReporter for StderrProgress {
    fn report(&self, event: &QueueChanged) {
        let (done, total) = done_of(event);
        let item = &event.changed;
        let state = match item.status {
            QueueStatus::Failed => format!("FAILED ({})", item.status_message),
            QueueStatus::Completed => "completed".to_string(),
            _ => item.stage.to_string(),
        };
        let line = format!(
            "process  {} / {}  {}  {}\n",
            format_number(done),
            format_number(total),
            state,
            item.file_path.display()
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl QueueProgressReporter for JsonProgress {
    fn report(&self, event: &QueueChanged) {
        let (done, total) = done_of(event);
        let item = &event.changed;
        let obj = serde_json::json!({
            "event": "progress",
            "path": item.file_path,
            "status": item.status,
            "stage": item.stage,
            "message": item.status_message,
            "done": done,
            "total": total
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl QueueProgressReporter for NoProgress {
    fn report(&self, _event: &QueueChanged) {}
}

/// Forward queue changes to `reporter` until the queue's sender is dropped.
///
/// A lagging reporter skips the events it missed.
pub fn spawn_reporter(
    mut events: broadcast::Receiver<QueueChanged>,
    reporter: Box<dyn QueueProgressReporter>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => reporter.report(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress reporter lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueProgressMode {
    Off,
    Human,
    Json,
}

impl QueueProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            QueueProgressMode::Human
        } else {
            QueueProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn QueueProgressReporter> {
        match self {
            QueueProgressMode::Off => Box::new(NoProgress),
            QueueProgressMode::Human => Box::new(StderrProgress),
            QueueProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
