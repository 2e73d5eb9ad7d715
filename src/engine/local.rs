//! Local GGUF inference via `mistralrs`.

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::models::ModelManager;
use crate::progress::ProgressCallback;
use crate::stopping::StoppingCriteria;
use crate::worker::messages::{ChatMessage, Role};
use async_trait::async_trait;
use mistralrs::{
    GgufModelBuilder, MemoryGpuConfig, Model, PagedAttentionMetaBuilder, RequestBuilder, Response,
    TextMessageRole, TextMessages,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, mpsc};
use tracing::{info, warn};

/// Minimum allowed context size.
const MIN_CONTEXT_SIZE_TOKENS: usize = 1024;

/// Tokenizer files pulled from the tokenizer repo (when one is configured).
const TOKENIZER_FILES: &[&str] = &["tokenizer.json", "tokenizer_config.json"];

/// Maximum time to wait for the first token before giving up.
///
/// Prompt processing on CPU can be slow but shouldn't take more than
/// two minutes for a single-turn prompt.
const FIRST_TOKEN_TIMEOUT: Duration = Duration::from_secs(120);

/// GGUF model engine, constructed at most once per process.
///
/// The tokenizer and model live behind a `OnceCell`, so `acquire` is an
/// idempotent construct-if-absent operation: concurrent callers await the
/// same initialization instead of building twice.
pub struct LocalEngine {
    config: ChatConfig,
    model: OnceCell<Arc<Model>>,
}

impl LocalEngine {
    /// Create an engine for the given configuration. No work happens until
    /// [`TextEngine::acquire`] is called.
    #[must_use]
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
        }
    }

    fn instance(&self) -> Result<Arc<Model>> {
        self.model
            .get()
            .cloned()
            .ok_or_else(|| ChatError::Model("model not loaded — send `load` first".to_owned()))
    }

    /// Pre-download model files so mistralrs finds them in the shared
    /// hf-hub cache. This gives us per-file progress visibility instead of
    /// a frozen "loading" phase.
    fn download_files(&self, progress: &ProgressCallback) -> Result<()> {
        let llm = &self.config.llm;
        let manager = ModelManager::new(&self.config.models)?;

        let mut pending: u64 = 0;
        if !ModelManager::is_file_cached(&llm.model_id, &llm.gguf_file) {
            let sizes = ModelManager::query_file_sizes(&llm.model_id, &[llm.gguf_file.as_str()]);
            pending += sizes.iter().filter_map(|(_, s)| *s).sum::<u64>();
        }

        let space = crate::models::check_disk_space(pending)?;
        if !space.has_enough_space() {
            return Err(ChatError::Model(format!(
                "not enough disk space: need {:.1} GB, have {:.1} GB free",
                space.required_bytes as f64 / 1_000_000_000.0,
                space.free_bytes as f64 / 1_000_000_000.0,
            )));
        }

        manager.download_with_progress(&llm.model_id, &llm.gguf_file, Some(progress))?;

        if !llm.tokenizer_id.is_empty() {
            for filename in TOKENIZER_FILES {
                manager.download_with_progress(&llm.tokenizer_id, filename, Some(progress))?;
            }
        }

        Ok(())
    }

    async fn build_model(&self) -> Result<Arc<Model>> {
        let llm = &self.config.llm;
        info!("loading local LLM: {} / {}", llm.model_id, llm.gguf_file);

        let mut builder =
            GgufModelBuilder::new(&llm.model_id, vec![&llm.gguf_file]).with_logging();

        if !llm.tokenizer_id.is_empty() {
            builder = builder.with_tok_model_id(&llm.tokenizer_id);
        }

        let context_size = effective_context_size_tokens(&self.config);
        info!("local LLM context_size_tokens={context_size}");

        let model = builder
            .with_paged_attn(|| {
                PagedAttentionMetaBuilder::default()
                    .with_gpu_memory(MemoryGpuConfig::ContextSize(context_size))
                    .build()
            })
            .map_err(|e| ChatError::Model(format!("paged attention config failed: {e}")))?
            .build()
            .await
            .map_err(|e| ChatError::Model(format!("model build failed: {e}")))?;

        info!("local LLM loaded successfully");
        Ok(Arc::new(model))
    }

    fn build_request(&self, user_content: &str, max_tokens: usize) -> RequestBuilder {
        let llm = &self.config.llm;
        let messages = TextMessages::new()
            .add_message(TextMessageRole::System, &llm.system_prompt)
            .add_message(TextMessageRole::User, user_content);

        RequestBuilder::from(messages)
            .set_sampler_temperature(llm.temperature)
            .set_sampler_topp(llm.top_p)
            .set_sampler_max_len(max_tokens)
    }
}

#[async_trait]
impl super::TextEngine for LocalEngine {
    async fn check(&self) -> Result<()> {
        crate::capability::probe(&self.config.capability)
    }

    async fn acquire(&self, progress: &ProgressCallback) -> Result<()> {
        self.model
            .get_or_try_init(|| async {
                self.download_files(progress)?;
                self.build_model().await
            })
            .await?;
        Ok(())
    }

    async fn warm_up(&self) -> Result<()> {
        let model = self.instance()?;
        let started = Instant::now();

        // A single-token generation forces prompt-processing kernels to
        // compile and primes the KV cache allocator.
        let request = self.build_request("a", 1);
        let mut stream = model
            .stream_chat_request(request)
            .await
            .map_err(|e| ChatError::Generation(format!("warm-up request failed: {e}")))?;

        while let Some(response) = stream.next().await {
            match response {
                Response::ModelError(msg, _) => {
                    return Err(ChatError::Generation(format!("warm-up model error: {msg}")));
                }
                Response::InternalError(e) => {
                    return Err(ChatError::Generation(format!("warm-up internal error: {e}")));
                }
                Response::Done(_) => break,
                _ => {}
            }
        }

        info!("warm-up finished in {:.1}s", started.elapsed().as_secs_f64());
        Ok(())
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        stopping: StoppingCriteria,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let model = self.instance()?;

        // Single-turn context: the fixed system instruction plus the most
        // recent user message. Prior turns are not resent to the model.
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| ChatError::Generation("no user message to respond to".to_owned()))?;

        let gen_start = Instant::now();
        let request = self.build_request(&user.content, self.config.llm.max_new_tokens);

        let mut stream = model
            .stream_chat_request(request)
            .await
            .map_err(|e| ChatError::Generation(format!("stream request failed: {e}")))?;

        let mut generated_text = String::new();
        let mut token_count: usize = 0;
        let mut was_interrupted = false;
        let mut first_token_received = false;

        loop {
            let response = if !first_token_received {
                match tokio::time::timeout(FIRST_TOKEN_TIMEOUT, stream.next()).await {
                    Ok(Some(r)) => r,
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            "first token timeout after {}s",
                            FIRST_TOKEN_TIMEOUT.as_secs()
                        );
                        return Err(ChatError::Generation(
                            "first token timeout — model did not produce output in time"
                                .to_owned(),
                        ));
                    }
                }
            } else {
                match stream.next().await {
                    Some(r) => r,
                    None => break,
                }
            };

            // Cooperative cancellation: polled once per produced chunk.
            if stopping.is_interrupted() {
                info!("generation interrupted after {token_count} tokens");
                was_interrupted = true;
                break;
            }

            match response {
                Response::Chunk(chunk) => {
                    if let Some(choice) = chunk.choices.first() {
                        let content = choice.delta.content.as_deref().unwrap_or_default();
                        if content.is_empty() {
                            continue;
                        }
                        if !first_token_received {
                            first_token_received = true;
                            info!(
                                "first token received in {:.1}s",
                                gen_start.elapsed().as_secs_f64()
                            );
                        }

                        token_count += 1;
                        generated_text.push_str(content);
                        output.send(content.to_owned()).map_err(|e| {
                            ChatError::Channel(format!("generation output channel closed: {e}"))
                        })?;
                    }
                }
                Response::Done(done) => {
                    if let Some(choice) = done.choices.first() {
                        let content = choice.message.content.as_deref().unwrap_or_default();
                        // Any tail not already streamed as a chunk.
                        if let Some(tail) = content.strip_prefix(generated_text.as_str())
                            && !tail.is_empty()
                        {
                            generated_text.push_str(tail);
                            output.send(tail.to_owned()).map_err(|e| {
                                ChatError::Channel(format!(
                                    "generation output channel closed: {e}"
                                ))
                            })?;
                        }
                    }
                    break;
                }
                Response::ModelError(msg, _) => {
                    return Err(ChatError::Generation(format!("model error: {msg}")));
                }
                Response::InternalError(e) => {
                    return Err(ChatError::Generation(format!("internal error: {e}")));
                }
                Response::ValidationError(e) => {
                    return Err(ChatError::Generation(format!("validation error: {e}")));
                }
                _ => {}
            }
        }

        let elapsed = gen_start.elapsed();
        let tokens_per_sec = if elapsed.as_secs_f64() > 0.0 {
            token_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            "generated {token_count} tokens in {:.1}s ({:.1} tok/s){}",
            elapsed.as_secs_f64(),
            tokens_per_sec,
            if was_interrupted { " [interrupted]" } else { "" },
        );

        Ok(generated_text)
    }
}

fn effective_context_size_tokens(config: &ChatConfig) -> usize {
    if config.llm.context_size_tokens < MIN_CONTEXT_SIZE_TOKENS {
        warn!(
            "llm.context_size_tokens={} too small, clamping to {}",
            config.llm.context_size_tokens, MIN_CONTEXT_SIZE_TOKENS
        );
        return MIN_CONTEXT_SIZE_TOKENS;
    }
    config.llm.context_size_tokens
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn effective_context_size_uses_config_value() {
        let mut config = ChatConfig::default();
        config.llm.context_size_tokens = 65_536;
        assert_eq!(effective_context_size_tokens(&config), 65_536);
    }

    #[test]
    fn effective_context_size_clamps_small_values() {
        let mut config = ChatConfig::default();
        config.llm.context_size_tokens = 0;
        assert_eq!(
            effective_context_size_tokens(&config),
            MIN_CONTEXT_SIZE_TOKENS
        );
    }

    #[test]
    fn instance_before_acquire_is_an_error() {
        let engine = LocalEngine::new(ChatConfig::default());
        let err = engine.instance().expect_err("must not have a model yet");
        assert!(matches!(err, ChatError::Model(_)));
    }
}
