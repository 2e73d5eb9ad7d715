//! Background generation worker.
//!
//! A dedicated tokio task owns the inference engine and is driven entirely
//! by [`WorkerCommand`]s; everything it has to say goes out as
//! [`WorkerEvent`]s. Commands are processed in arrival order; `generate`
//! runs on its own task so `interrupt` can be observed mid-stream. Events
//! for one generation are emitted strictly as `start` → `update`* →
//! `complete`.

pub mod messages;

use crate::engine::TextEngine;
use crate::error::{ChatError, Result};
use crate::progress::{ProgressCallback, ProgressEvent, percent};
use crate::stopping::StoppingCriteria;
use messages::{ChatMessage, WorkerCommand, WorkerEvent};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Phase label emitted before model files are fetched and constructed.
const LOADING_MODEL_LABEL: &str = "Loading model...";
/// Phase label emitted before the warm-up generation.
const WARMING_UP_LABEL: &str = "Compiling kernels and warming up the model...";

/// Controller-side handle to a spawned worker.
#[derive(Clone)]
pub struct WorkerHandle {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    /// Post a command to the worker.
    ///
    /// # Errors
    ///
    /// Returns a channel error if the worker task has exited.
    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| ChatError::Channel(format!("worker command channel closed: {e}")))
    }

    /// Token cancelled when the worker should shut down.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the worker task. In-flight generation is aborted.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the generation worker, returning its handle and event stream.
pub fn spawn<E: TextEngine>(engine: Arc<E>) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    tokio::spawn(run_worker(engine, command_rx, event_tx, cancel.clone()));

    (WorkerHandle { command_tx, cancel }, event_rx)
}

async fn run_worker<E: TextEngine>(
    engine: Arc<E>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: CancellationToken,
) {
    // One flag per worker lifetime: cleared before each generation, set by
    // interrupt, polled by the decode loop.
    let stopping = StoppingCriteria::new();
    let mut generation: Option<JoinHandle<()>> = None;

    info!("generation worker started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    WorkerCommand::Check => handle_check(engine.as_ref(), &events).await,
                    WorkerCommand::Load => handle_load(engine.as_ref(), &events).await,
                    WorkerCommand::Generate { data } => {
                        // Single-flight: a second generate while one is in
                        // flight is rejected, not raced.
                        if generation.as_ref().is_some_and(|h| !h.is_finished()) {
                            let _ = events.send(WorkerEvent::Error {
                                data: "generation already in progress".to_owned(),
                            });
                            continue;
                        }
                        stopping.reset();
                        generation = Some(tokio::spawn(run_generation(
                            Arc::clone(&engine),
                            data,
                            stopping.clone(),
                            events.clone(),
                        )));
                    }
                    WorkerCommand::Interrupt => stopping.interrupt(),
                    WorkerCommand::Reset => stopping.reset(),
                }
            }
        }
    }

    if let Some(handle) = generation {
        handle.abort();
    }
    info!("generation worker stopped");
}

async fn handle_check<E: TextEngine>(engine: &E, events: &mpsc::UnboundedSender<WorkerEvent>) {
    match engine.check().await {
        Ok(()) => {
            let _ = events.send(WorkerEvent::CheckOk);
        }
        Err(e) => {
            let _ = events.send(WorkerEvent::Error {
                data: e.to_string(),
            });
        }
    }
}

async fn handle_load<E: TextEngine>(engine: &E, events: &mpsc::UnboundedSender<WorkerEvent>) {
    let _ = events.send(WorkerEvent::Loading {
        data: LOADING_MODEL_LABEL.to_owned(),
    });

    let progress = wire_progress(events.clone());
    if let Err(e) = engine.acquire(&progress).await {
        let _ = events.send(WorkerEvent::Error {
            data: e.to_string(),
        });
        return;
    }

    let _ = events.send(WorkerEvent::Loading {
        data: WARMING_UP_LABEL.to_owned(),
    });
    if let Err(e) = engine.warm_up().await {
        let _ = events.send(WorkerEvent::Error {
            data: e.to_string(),
        });
        return;
    }

    let _ = events.send(WorkerEvent::Ready);
}

/// Adapt downloader progress into wire events, keyed by file.
///
/// Cached files never enter the progress list, so they produce no events.
fn wire_progress(events: mpsc::UnboundedSender<WorkerEvent>) -> ProgressCallback {
    Box::new(move |event| {
        let wire = match event {
            ProgressEvent::DownloadStarted {
                filename,
                total_bytes,
            } => WorkerEvent::Initiate {
                file: filename,
                progress: 0.0,
                total: total_bytes,
            },
            ProgressEvent::DownloadProgress {
                filename,
                bytes_downloaded,
                total_bytes,
            } => WorkerEvent::Progress {
                file: filename,
                progress: percent(bytes_downloaded, total_bytes),
                total: total_bytes,
            },
            ProgressEvent::DownloadComplete { filename } => WorkerEvent::Done { file: filename },
            ProgressEvent::Cached { .. } => return,
        };
        let _ = events.send(wire);
    })
}

async fn run_generation<E: TextEngine>(
    engine: Arc<E>,
    messages: Vec<ChatMessage>,
    stopping: StoppingCriteria,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let _ = events.send(WorkerEvent::Start);

    let (token_tx, mut token_rx) = mpsc::unbounded_channel::<String>();
    let generation = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.generate(messages, stopping, token_tx).await }
    });

    let mut meter = ThroughputMeter::default();
    while let Some(fragment) = token_rx.recv().await {
        let sample = meter.record(Instant::now());
        let _ = events.send(WorkerEvent::Update {
            output: fragment,
            tps: sample.tps,
            num_tokens: sample.num_tokens,
        });
    }

    // The token channel closed, so the engine call has returned (or died).
    // Interruption arrives here as a normal Ok with partial text.
    match generation.await {
        Ok(Ok(full_text)) => {
            let _ = events.send(WorkerEvent::Complete { output: full_text });
        }
        Ok(Err(e)) => {
            let _ = events.send(WorkerEvent::Error {
                data: e.to_string(),
            });
        }
        Err(e) => {
            let _ = events.send(WorkerEvent::Error {
                data: format!("generation task failed: {e}"),
            });
        }
    }
}

/// Tokens-per-second accounting for one generation.
///
/// Timing starts at the first produced token; the rate is defined once a
/// second token exists. This avoids a divide-by-zero and keeps prompt
/// processing out of the reported rate.
#[derive(Debug, Default)]
pub struct ThroughputMeter {
    started_at: Option<Instant>,
    num_tokens: u64,
    tps: Option<f64>,
}

/// Counters after recording one token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Tokens per second since the first token, if defined yet.
    pub tps: Option<f64>,
    /// Tokens produced so far.
    pub num_tokens: u64,
}

impl ThroughputMeter {
    /// Record one produced token at `now` and return the current counters.
    pub fn record(&mut self, now: Instant) -> ThroughputSample {
        let started_at = *self.started_at.get_or_insert(now);
        self.num_tokens += 1;
        if self.num_tokens > 1 {
            let elapsed_ms = now.duration_since(started_at).as_secs_f64() * 1000.0;
            if elapsed_ms > 0.0 {
                self.tps = Some(self.num_tokens as f64 / elapsed_ms * 1000.0);
            }
        }
        ThroughputSample {
            tps: self.tps,
            num_tokens: self.num_tokens,
        }
    }
}
