//! Inference engine seam.
//!
//! The worker treats the ML runtime as an opaque collaborator behind
//! [`TextEngine`]: a capability probe, an idempotent construct-if-absent
//! acquisition step, a warm-up pass, and a streaming generate call. The
//! production implementation is [`LocalEngine`] (GGUF via `mistralrs`);
//! tests substitute scripted engines.

pub mod local;

pub use local::LocalEngine;

use crate::error::Result;
use crate::progress::ProgressCallback;
use crate::stopping::StoppingCriteria;
use crate::worker::messages::ChatMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// The generation worker's view of the model runtime.
#[async_trait]
pub trait TextEngine: Send + Sync + 'static {
    /// Probe whether this host can run the engine at all.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error when the host is unsupported; the caller
    /// treats this as terminal for the feature.
    async fn check(&self) -> Result<()>;

    /// Download model files and construct tokenizer + model.
    ///
    /// Construct-if-absent: the first call does the work, later calls return
    /// immediately, and concurrent callers never duplicate construction.
    /// Per-file download progress is reported through `progress`.
    ///
    /// # Errors
    ///
    /// Returns an error if any download or the model build fails.
    async fn acquire(&self, progress: &ProgressCallback) -> Result<()>;

    /// Run one throwaway single-token generation to absorb one-time
    /// compilation and cache-priming costs.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not acquired or the pass fails.
    async fn warm_up(&self) -> Result<()>;

    /// Stream a response to the transcript's latest user message.
    ///
    /// Each decoded fragment is sent on `output` as it is produced. The
    /// `stopping` flag is polled between steps; observing the set state ends
    /// the decode loop early without corrupting produced output. Returns the
    /// fully decoded response text (partial when interrupted).
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails. Interruption is not an error.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        stopping: StoppingCriteria,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<String>;
}
