//! Headless host bridge: stdin/stdout newline-delimited JSON.
//!
//! Reads [`WorkerCommand`] messages as JSON lines from stdin and writes
//! [`WorkerEvent`] messages as JSON lines to stdout — the same protocol a
//! frontend speaks to the generation worker, lifted onto pipes so a native
//! shell can embed the worker as a subprocess.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) is routed to stderr.

use plauder::worker;
use plauder::{ChatConfig, LocalEngine, WorkerCommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("plauder-host starting");

    let config = match std::env::args().nth(1) {
        Some(path) => ChatConfig::from_file(&PathBuf::from(path))?,
        None => {
            let default_path = ChatConfig::default_config_path();
            if default_path.exists() {
                ChatConfig::from_file(&default_path)?
            } else {
                ChatConfig::default()
            }
        }
    };

    let engine = Arc::new(LocalEngine::new(config));
    let (handle, mut events) = worker::spawn(engine);

    // Event forwarder: worker events → stdout JSON lines.
    let forwarder = tokio::spawn(async move {
        let mut writer = BufWriter::new(tokio::io::stdout());
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize worker event; skipping");
                    continue;
                }
            };
            if let Err(e) = write_line(&mut writer, &json).await {
                tracing::warn!(error = %e, "failed to write event to stdout; stopping forwarder");
                break;
            }
        }
    });

    // Reader: stdin JSON lines → worker commands. Runs on the current task
    // so finishing it (EOF) drives shutdown.
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        // EOF
        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down host bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command: WorkerCommand = match serde_json::from_str(trimmed) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse worker command from stdin"
                );
                continue;
            }
        };

        if handle.send(command).is_err() {
            tracing::error!("worker exited; shutting down host bridge");
            break;
        }
    }

    handle.shutdown();
    forwarder.abort();
    let _ = forwarder.await;

    tracing::info!("plauder-host shut down cleanly");
    Ok(())
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line(
    writer: &mut BufWriter<tokio::io::Stdout>,
    json: &str,
) -> std::io::Result<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
