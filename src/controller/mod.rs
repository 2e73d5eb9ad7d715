//! Controller-side state: a reducer over worker events plus user actions.
//!
//! `ChatState` is pure — applying an event mutates the snapshot and nothing
//! else. The only outgoing effect a frontend performs is posting the
//! [`WorkerCommand`]s returned by the action methods. Presentation layers
//! render the snapshot; they carry no business logic of their own.

use crate::worker::messages::{ChatMessage, Role, WorkerCommand, WorkerEvent};
use serde::Serialize;

/// Overall worker readiness. Absent means "not started".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Loading,
    Ready,
}

/// Per-file download progress shown during model acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressItem {
    pub file: String,
    /// Percent complete, 0–100.
    pub progress: f32,
    /// Total byte count, when the downloader knows it.
    pub total: Option<u64>,
}

/// Derived throughput counters, recomputed on every update event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GenerationStats {
    /// Tokens per second since the first token of the current response.
    pub tps: Option<f64>,
    /// Tokens produced for the current response.
    pub num_tokens: u64,
}

/// The complete UI-facing state snapshot.
#[derive(Debug, Default)]
pub struct ChatState {
    /// Ordered transcript. Append-only except the last assistant message,
    /// whose content grows while a response streams in.
    pub messages: Vec<ChatMessage>,
    /// Worker readiness; `None` until a load begins.
    pub status: Option<WorkerStatus>,
    /// Terminal error text, once anything has failed.
    pub error: Option<String>,
    /// Human-readable label for the current load phase.
    pub loading_message: String,
    /// Active downloads, keyed by file, in insertion order.
    pub progress_items: Vec<ProgressItem>,
    /// Throughput of the current/most recent generation.
    pub stats: GenerationStats,
    /// Whether a response is currently streaming in.
    pub is_generating: bool,
    /// Whether the capability probe has passed.
    pub capable: bool,
    request_in_flight: bool,
}

impl ChatState {
    /// Reduce one worker event into the state.
    pub fn apply(&mut self, event: &WorkerEvent) {
        match event {
            WorkerEvent::Loading { data } => {
                self.status = Some(WorkerStatus::Loading);
                self.loading_message = data.clone();
            }
            WorkerEvent::Initiate {
                file,
                progress,
                total,
            } => {
                let item = ProgressItem {
                    file: file.clone(),
                    progress: *progress,
                    total: *total,
                };
                // Set semantics: at most one active entry per file.
                match self.progress_items.iter_mut().find(|i| i.file == *file) {
                    Some(existing) => *existing = item,
                    None => self.progress_items.push(item),
                }
            }
            WorkerEvent::Progress {
                file,
                progress,
                total,
            } => {
                // Last write wins; unknown files are ignored.
                if let Some(item) = self.progress_items.iter_mut().find(|i| i.file == *file) {
                    item.progress = *progress;
                    item.total = *total;
                }
            }
            WorkerEvent::Done { file } => {
                self.progress_items.retain(|i| i.file != *file);
            }
            WorkerEvent::Ready => {
                self.status = Some(WorkerStatus::Ready);
            }
            WorkerEvent::Start => {
                self.messages.push(ChatMessage::assistant(""));
            }
            WorkerEvent::Update {
                output,
                tps,
                num_tokens,
            } => {
                self.stats = GenerationStats {
                    tps: *tps,
                    num_tokens: *num_tokens,
                };
                // Append to the in-progress assistant message; an empty
                // transcript makes this a no-op, not a crash.
                if let Some(last) = self.messages.last_mut() {
                    last.content.push_str(output);
                }
            }
            WorkerEvent::Complete { .. } => {
                // Content is already assembled from update events; the
                // complete payload is informational only.
                self.is_generating = false;
                self.request_in_flight = false;
            }
            WorkerEvent::Error { data } => {
                self.error = Some(data.clone());
                self.status = None;
                self.is_generating = false;
                self.request_in_flight = false;
            }
            WorkerEvent::CheckOk => {
                self.capable = true;
            }
        }
    }

    /// Append a user message from the input box.
    ///
    /// Returns `false` (and changes nothing) for blank input or while a
    /// response is streaming. Whether input is accepted before the model is
    /// ready is the presentation layer's concern, not the reducer's.
    pub fn submit(&mut self, input: &str) -> bool {
        let trimmed = input.trim();
        if trimmed.is_empty() || self.is_generating {
            return false;
        }
        self.messages.push(ChatMessage::user(trimmed));
        self.stats = GenerationStats::default();
        self.is_generating = true;
        true
    }

    /// Produce the next generate command, if one is due.
    ///
    /// Fires exactly when the transcript ends in a user message and no
    /// request is outstanding — the explicit form of "re-render effect that
    /// must not double-fire". Callers post the returned command to the
    /// worker.
    pub fn take_generate_request(&mut self) -> Option<WorkerCommand> {
        if self.request_in_flight {
            return None;
        }
        if self.messages.last().map(|m| m.role) != Some(Role::User) {
            return None;
        }
        self.request_in_flight = true;
        Some(WorkerCommand::Generate {
            data: self.messages.clone(),
        })
    }

    /// Stop the in-flight response. Clears the generating flag optimistically;
    /// the worker still delivers its normal `complete` event.
    pub fn interrupt(&mut self) -> WorkerCommand {
        self.is_generating = false;
        WorkerCommand::Interrupt
    }

    /// Clear the finished conversation.
    pub fn reset(&mut self) -> WorkerCommand {
        self.messages.clear();
        self.stats = GenerationStats::default();
        WorkerCommand::Reset
    }
}
