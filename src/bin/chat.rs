//! Terminal chat REPL.
//!
//! Loads the model with visible download progress, then reads user turns
//! from stdin and streams the reply tokens to stdout. Ctrl+C while a reply
//! is streaming interrupts it; Ctrl+C at the prompt exits.

use plauder::worker::{self, WorkerHandle};
use plauder::{ChatConfig, ChatState, LocalEngine, WorkerCommand, WorkerEvent};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing — suppress noisy dependency logs by default.
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plauder=info,hf_hub=warn,mistralrs=warn")),
        )
        .init();

    // Optional config path as the first argument, else the default location
    // when it exists, else built-in defaults.
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

    println!("Plauder v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Model: {} ({})",
        config.llm.model_id, config.llm.gguf_file
    );

    let engine = Arc::new(LocalEngine::new(config));
    let (handle, mut events) = worker::spawn(engine);
    let mut state = ChatState::default();

    // Probe first; a machine that can't run the model never starts a download.
    handle.send(WorkerCommand::Check)?;
    wait_for_check(&mut state, &mut events).await?;

    handle.send(WorkerCommand::Load)?;
    wait_until_ready(&mut state, &mut events).await?;

    println!("\nReady! Type a message and press Enter.");
    println!("Ctrl+C stops a running answer; /reset clears the conversation; /quit exits.\n");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = stdin.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                handle.send(state.reset())?;
                println!("(conversation cleared)");
                continue;
            }
            input => {
                if !state.submit(input) {
                    continue;
                }
                if let Some(request) = state.take_generate_request() {
                    handle.send(request)?;
                    stream_reply(&handle, &mut state, &mut events).await?;
                }
            }
        }
    }

    handle.shutdown();
    println!("\nBye!");
    Ok(())
}

/// Wait for the capability probe result.
async fn wait_for_check(
    state: &mut ChatState,
    events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
) -> anyhow::Result<()> {
    while let Some(event) = events.recv().await {
        state.apply(&event);
        match &event {
            WorkerEvent::CheckOk => return Ok(()),
            WorkerEvent::Error { data } => {
                anyhow::bail!("this machine cannot run the model: {data}")
            }
            _ => {}
        }
    }
    anyhow::bail!("worker exited during capability probe")
}

/// Drain events until the model is ready, printing load phase labels.
///
/// Download bars are drawn to stderr by the model manager; this only echoes
/// the phase labels and surfaces errors.
async fn wait_until_ready(
    state: &mut ChatState,
    events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
) -> anyhow::Result<()> {
    while let Some(event) = events.recv().await {
        state.apply(&event);
        match &event {
            WorkerEvent::Loading { data } => println!("{data}"),
            WorkerEvent::Ready => return Ok(()),
            WorkerEvent::Error { data } => anyhow::bail!("startup failed: {data}"),
            _ => {}
        }
    }
    anyhow::bail!("worker exited before becoming ready")
}

/// Stream one reply to stdout; Ctrl+C interrupts it.
async fn stream_reply(
    handle: &WorkerHandle,
    state: &mut ChatState,
    events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    anyhow::bail!("worker exited mid-generation");
                };
                event
            }
            _ = tokio::signal::ctrl_c() => {
                handle.send(state.interrupt())?;
                continue;
            }
        };

        state.apply(&event);
        match event {
            WorkerEvent::Update { output, .. } => {
                print!("{output}");
                std::io::stdout().flush()?;
            }
            WorkerEvent::Complete { .. } => {
                println!();
                if let Some(tps) = state.stats.tps {
                    println!(
                        "({} tokens, {:.2} tokens/s)",
                        state.stats.num_tokens, tps
                    );
                }
                return Ok(());
            }
            WorkerEvent::Error { data } => {
                println!();
                eprintln!("generation failed: {data}");
                return Ok(());
            }
            _ => {}
        }
    }
}
