//! Host capability probe.
//!
//! The model runs in-process, so "can this machine run the feature at all"
//! comes down to total system memory and free space on the model cache
//! filesystem. A failed probe is terminal: the frontend shows an unsupported
//! state and nothing short of a restart re-enables loading.

use crate::config::CapabilityConfig;
use crate::error::{ChatError, Result};
use tracing::info;

/// Probe the host for the resources the engine needs.
///
/// # Errors
///
/// Returns [`ChatError::Capability`] with a human-readable description when
/// the machine does not meet the configured minima, or when the probe itself
/// cannot run.
pub fn probe(config: &CapabilityConfig) -> Result<()> {
    let total_memory = detect_total_memory_bytes().ok_or_else(|| {
        ChatError::Capability("could not determine total system memory".to_owned())
    })?;

    if total_memory < config.min_total_memory_bytes {
        return Err(ChatError::Capability(format!(
            "not enough system memory: {:.1} GB available, {:.1} GB required",
            total_memory as f64 / 1_000_000_000.0,
            config.min_total_memory_bytes as f64 / 1_000_000_000.0,
        )));
    }

    let cache_dir = hf_hub::Cache::default().path().to_path_buf();
    std::fs::create_dir_all(&cache_dir)
        .map_err(|e| ChatError::Capability(format!("model cache dir unavailable: {e}")))?;
    let free = crate::models::available_disk_space(&cache_dir)
        .map_err(|e| ChatError::Capability(format!("disk probe failed: {e}")))?;
    if free < config.min_free_disk_bytes {
        return Err(ChatError::Capability(format!(
            "not enough free disk space for the model cache: {:.1} GB free, {:.1} GB required",
            free as f64 / 1_000_000_000.0,
            config.min_free_disk_bytes as f64 / 1_000_000_000.0,
        )));
    }

    info!(
        "capability probe ok: {:.1} GB memory, {:.1} GB free disk",
        total_memory as f64 / 1_000_000_000.0,
        free as f64 / 1_000_000_000.0,
    );
    Ok(())
}

/// Best-effort total system memory detection.
pub fn detect_total_memory_bytes() -> Option<u64> {
    // macOS: sysctl hw.memsize
    if cfg!(target_os = "macos") {
        let out = std::process::Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let s = String::from_utf8(out.stdout).ok()?;
        return s.trim().parse::<u64>().ok();
    }
    // Linux: /proc/meminfo MemTotal in kB
    if cfg!(target_os = "linux") {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                let parts = rest.split_whitespace().collect::<Vec<_>>();
                if parts.len() >= 2
                    && let Ok(kb) = parts[0].parse::<u64>()
                {
                    return Some(kb.saturating_mul(1024));
                }
            }
        }
    }
    None
}
