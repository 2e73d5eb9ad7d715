//! Configuration types for the chat orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Language model settings.
    pub llm: LlmConfig,
    /// Model download/cache settings.
    pub models: ModelConfig,
    /// Host capability probe thresholds.
    pub capability: CapabilityConfig,
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// HuggingFace model repo ID containing the GGUF file.
    pub model_id: String,
    /// GGUF filename within the model repo.
    pub gguf_file: String,
    /// HuggingFace repo ID for the tokenizer.
    /// Leave empty to use the tokenizer bundled with the GGUF repo.
    pub tokenizer_id: String,
    /// Maximum tokens to generate per response.
    pub max_new_tokens: usize,
    /// Context window size for GGUF inference (tokens).
    ///
    /// Controls KV cache sizing and how much prompt can be processed
    /// in one request.
    pub context_size_tokens: usize,
    /// Sampling temperature (0.0 = greedy, higher = more random).
    pub temperature: f64,
    /// Top-p (nucleus) sampling threshold.
    pub top_p: f64,
    /// Fixed system instruction prepended to every request.
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // Quantized Llama-3.2-1B: small enough to stream tokens quickly on CPU.
            model_id: "unsloth/Llama-3.2-1B-Instruct-GGUF".to_owned(),
            gguf_file: "Llama-3.2-1B-Instruct-Q4_K_M.gguf".to_owned(),
            // GGUF repo doesn't include a tokenizer — pull from the original repo.
            tokenizer_id: "unsloth/Llama-3.2-1B-Instruct".to_owned(),
            max_new_tokens: 1024,
            context_size_tokens: 4096,
            // Greedy decoding for reproducible answers.
            temperature: 0.0,
            top_p: 1.0,
            system_prompt: "Du bist ein präzises, kreatives und sachkundiges \
                            KI-Sprachmodell. Antworte stets klar, strukturiert, kurz \
                            gefasst und faktenbasiert. Vermeide Spekulationen und gib \
                            an, wenn Informationen fehlen oder unklar sind. Bei \
                            technischen Fragen liefere vollständige, getestete \
                            Codebeispiele und erkläre diese verständlich. Bei Bedarf \
                            bitte um Klarstellung."
                .to_owned(),
        }
    }
}

/// Model download and cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory for auxiliary model files (hf-hub keeps its own cache).
    pub cache_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

/// Thresholds for the host capability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Minimum total system memory required to load the model, in bytes.
    pub min_total_memory_bytes: u64,
    /// Free-space headroom required on the cache filesystem, in bytes.
    pub min_free_disk_bytes: u64,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            // A Q4 1B model plus KV cache fits comfortably in 3 GB.
            min_total_memory_bytes: 3 * 1024 * 1024 * 1024,
            min_free_disk_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Returns the default cache directory: platform cache dir + `plauder`.
fn default_cache_dir() -> PathBuf {
    if let Some(cache) = dirs::cache_dir() {
        cache.join("plauder")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".plauder")
    } else {
        PathBuf::from("/tmp").join(".plauder")
    }
}

impl ChatConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ChatError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/plauder/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("plauder").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("plauder")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/plauder-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ChatConfig::default();
        assert!(!config.llm.model_id.is_empty());
        assert!(!config.llm.gguf_file.is_empty());
        assert!(config.llm.max_new_tokens > 0);
        assert!(config.llm.context_size_tokens > 0);
        assert!(config.llm.temperature >= 0.0);
        assert!(config.llm.top_p >= 0.0 && config.llm.top_p <= 1.0);
        assert!(!config.llm.system_prompt.is_empty());
        assert!(config.capability.min_total_memory_bytes > 0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.toml");

        let mut config = ChatConfig::default();
        config.llm.max_new_tokens = 256;
        config.llm.model_id = "example/model-GGUF".to_owned();
        config.save_to_file(&path).expect("save config");

        let loaded = ChatConfig::from_file(&path).expect("load config");
        assert_eq!(loaded.llm.max_new_tokens, 256);
        assert_eq!(loaded.llm.model_id, "example/model-GGUF");
        // Untouched sections keep their defaults.
        assert_eq!(
            loaded.capability.min_total_memory_bytes,
            ChatConfig::default().capability.min_total_memory_bytes
        );
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = ChatConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "llm = not valid toml [").expect("write bad toml");
        let result = ChatConfig::from_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[llm]\nmax_new_tokens = 64\n").expect("write partial toml");
        let loaded = ChatConfig::from_file(&path).expect("load partial config");
        assert_eq!(loaded.llm.max_new_tokens, 64);
        assert_eq!(loaded.llm.model_id, LlmConfig::default().model_id);
    }
}
