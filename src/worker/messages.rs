//! Typed message contract between the controller and the generation worker.
//!
//! Commands flow controller → worker, events flow worker → controller. Both
//! serialize to the wire as newline-delimited JSON, discriminated by `type`
//! (commands) and `status` (events), so the `plauder-host` bridge speaks the
//! same shapes a frontend expects.

use serde::{Deserialize, Serialize};

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry.
///
/// The transcript is append-only except for the last assistant message,
/// whose `content` grows while a response streams in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Commands accepted by the generation worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerCommand {
    /// Probe host capability; answered by `check-ok` or `error`.
    Check,
    /// Download/construct the model, then warm it up; ends in `ready` or `error`.
    Load,
    /// Stream a response to the transcript's latest user message.
    Generate { data: Vec<ChatMessage> },
    /// Set the stopping flag; the in-flight generation completes early.
    Interrupt,
    /// Clear the stopping flag (used when clearing a finished conversation).
    Reset,
}

/// Events emitted by the generation worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorkerEvent {
    /// A load phase began; `data` is a human-readable phase label.
    Loading { data: String },
    /// A model file download started.
    Initiate {
        file: String,
        progress: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    /// Download progress for a file, `progress` in percent (0–100).
    Progress {
        file: String,
        progress: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    /// A file finished downloading.
    Done { file: String },
    /// Model constructed and warmed up; generation is available.
    Ready,
    /// A generation began; the controller appends an empty assistant message.
    Start,
    /// One streamed chunk of decoded text plus throughput counters.
    Update {
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tps: Option<f64>,
        #[serde(rename = "numTokens")]
        num_tokens: u64,
    },
    /// Generation finished (normally or via interrupt); `output` is the full text.
    Complete { output: String },
    /// Any failure; the payload is a human-readable description.
    Error { data: String },
    /// The capability probe succeeded.
    CheckOk,
}
