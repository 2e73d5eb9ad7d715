//! Progress event types for model download and initialization.
//!
//! Provides callback-based progress reporting that decouples model
//! acquisition from presentation (CLI indicatif bars vs worker events).

/// A single file in the download plan.
#[derive(Debug, Clone)]
pub struct DownloadFile {
    /// HuggingFace repo ID (e.g. `"unsloth/Llama-3.2-1B-Instruct-GGUF"`).
    pub repo_id: String,
    /// Filename within the repo.
    pub filename: String,
    /// File size in bytes, if known from Hub metadata.
    pub size_bytes: Option<u64>,
    /// Whether this file is already cached locally.
    pub cached: bool,
}

/// A plan of all files needed before the model can be constructed.
///
/// Built before downloads begin so frontends can show total download size.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    /// All files the engine needs.
    pub files: Vec<DownloadFile>,
}

impl DownloadPlan {
    /// Returns `true` if any file still needs to be downloaded.
    pub fn needs_download(&self) -> bool {
        self.files.iter().any(|f| !f.cached)
    }

    /// Total bytes that need to be downloaded (non-cached files only).
    ///
    /// Files with unknown size contribute 0 to the total.
    pub fn download_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| !f.cached)
            .filter_map(|f| f.size_bytes)
            .sum()
    }

    /// Number of files that still need to be downloaded.
    pub fn files_to_download(&self) -> usize {
        self.files.iter().filter(|f| !f.cached).count()
    }

    /// Total number of files in the plan.
    pub fn total_files(&self) -> usize {
        self.files.len()
    }
}

/// Progress events emitted while acquiring model files.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A model file download has started.
    DownloadStarted {
        /// Filename within the repo.
        filename: String,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// Download progress update.
    DownloadProgress {
        /// Filename within the repo.
        filename: String,
        /// Bytes downloaded so far.
        bytes_downloaded: u64,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// A model file download completed.
    DownloadComplete {
        /// Filename within the repo.
        filename: String,
    },

    /// A model file was already cached (no download needed).
    Cached {
        /// Filename within the repo.
        filename: String,
    },
}

/// Percentage (0–100) for a byte count against an optional total.
///
/// Unknown totals report 0 — the wire protocol's `progress` field is
/// always present, and consumers treat 0 with no total as indeterminate.
#[must_use]
pub fn percent(bytes_downloaded: u64, total_bytes: Option<u64>) -> f32 {
    match total_bytes {
        Some(total) if total > 0 => {
            let pct = bytes_downloaded as f64 / total as f64 * 100.0;
            pct.min(100.0) as f32
        }
        _ => 0.0,
    }
}

/// Callback type for receiving progress events.
///
/// Both the CLI (indicatif) and the generation worker (wire events)
/// implement this to receive updates from model acquisition.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::{Arc, Mutex};

    fn make_file(repo: &str, name: &str, size: Option<u64>, cached: bool) -> DownloadFile {
        DownloadFile {
            repo_id: repo.to_owned(),
            filename: name.to_owned(),
            size_bytes: size,
            cached,
        }
    }

    #[test]
    fn callback_receives_events() {
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let callback: ProgressCallback = Box::new(move |event| {
            let label = match &event {
                ProgressEvent::DownloadStarted { .. } => "started",
                ProgressEvent::DownloadProgress { .. } => "progress",
                ProgressEvent::DownloadComplete { .. } => "complete",
                ProgressEvent::Cached { .. } => "cached",
            };
            let Ok(mut guard) = events_clone.lock() else {
                return;
            };
            guard.push(label.to_owned());
        });

        callback(ProgressEvent::DownloadStarted {
            filename: "model.gguf".into(),
            total_bytes: Some(1000),
        });
        callback(ProgressEvent::DownloadProgress {
            filename: "model.gguf".into(),
            bytes_downloaded: 500,
            total_bytes: Some(1000),
        });
        callback(ProgressEvent::DownloadComplete {
            filename: "model.gguf".into(),
        });

        let guard = events.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(*guard, ["started", "progress", "complete"]);
    }

    #[test]
    fn download_plan_needs_download_when_uncached() {
        let plan = DownloadPlan {
            files: vec![
                make_file("repo/a", "model.gguf", Some(1000), false),
                make_file("repo/b", "tokenizer.json", Some(100), true),
            ],
        };
        assert!(plan.needs_download());
        assert_eq!(plan.files_to_download(), 1);
        assert_eq!(plan.total_files(), 2);
        assert_eq!(plan.download_bytes(), 1000);
    }

    #[test]
    fn download_plan_no_download_when_all_cached() {
        let plan = DownloadPlan {
            files: vec![
                make_file("repo/a", "model.gguf", Some(1000), true),
                make_file("repo/b", "tokenizer.json", None, true),
            ],
        };
        assert!(!plan.needs_download());
        assert_eq!(plan.download_bytes(), 0);
    }

    #[test]
    fn download_plan_empty() {
        let plan = DownloadPlan { files: vec![] };
        assert!(!plan.needs_download());
        assert_eq!(plan.download_bytes(), 0);
        assert_eq!(plan.files_to_download(), 0);
        assert_eq!(plan.total_files(), 0);
    }

    #[test]
    fn percent_handles_unknown_and_overshoot() {
        assert_eq!(percent(0, Some(200)), 0.0);
        assert_eq!(percent(100, Some(200)), 50.0);
        assert_eq!(percent(400, Some(200)), 100.0);
        assert_eq!(percent(50, None), 0.0);
        assert_eq!(percent(50, Some(0)), 0.0);
    }
}
