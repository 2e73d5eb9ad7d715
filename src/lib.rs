//! Plauder: local chat with a quantized language model.
//!
//! A background worker task owns the model (GGUF via `mistralrs`) and speaks
//! a typed streaming protocol; a controller reduces worker events into UI
//! state.
//!
//! # Architecture
//!
//! Two concurrent contexts connected by async channels:
//! - **Controller**: owns the transcript, load status, download progress,
//!   and throughput stats; turns user actions into [`worker::messages::WorkerCommand`]s.
//! - **Worker**: owns tokenizer + model (constructed at most once), handles
//!   capability probing, model acquisition with per-file progress, warm-up,
//!   and cancellable streaming generation.
//!
//! Frontends: a terminal REPL (`plauder`) and a newline-delimited JSON
//! stdin/stdout bridge (`plauder-host`) for embedding under a native shell.

// Fail early with a clear message when the metal feature is enabled but the
// Metal Toolchain is not installed. Without this, mistralrs panics deep in a
// build script with an opaque error.
#[cfg(missing_metal_toolchain)]
compile_error!(
    "The `metal` feature requires Apple's Metal Toolchain. Install it with:\n\n    \
     xcodebuild -downloadComponent MetalToolchain\n\n\
     This is a one-time ~700 MB download."
);

pub mod capability;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod models;
pub mod progress;
pub mod render;
pub mod stopping;
pub mod worker;

pub use config::ChatConfig;
pub use controller::{ChatState, WorkerStatus};
pub use engine::{LocalEngine, TextEngine};
pub use error::{ChatError, Result};
pub use progress::{ProgressCallback, ProgressEvent};
pub use stopping::StoppingCriteria;
pub use worker::WorkerHandle;
pub use worker::messages::{ChatMessage, Role, WorkerCommand, WorkerEvent};
