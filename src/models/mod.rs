//! Model downloading, caching, and disk-space checks via hf-hub.

use crate::config::ModelConfig;
use crate::error::{ChatError, Result};
use crate::progress::{ProgressCallback, ProgressEvent};
use hf_hub::api::Progress;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

/// Free-space headroom kept beyond the bytes strictly required.
const DISK_SPACE_HEADROOM: u64 = 500 * 1024 * 1024;

/// Manages downloading and caching of model files.
pub struct ModelManager {
    cache_dir: PathBuf,
}

impl ModelManager {
    /// Create a new model manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        info!("model cache directory: {}", config.cache_dir.display());

        Ok(Self {
            cache_dir: config.cache_dir.clone(),
        })
    }

    /// Download a model file with a visible progress bar.
    ///
    /// If the file is already cached, returns immediately without showing a bar.
    /// An optional `callback` receives [`ProgressEvent`]s for programmatic
    /// consumers (the generation worker relays them onto the wire).
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails.
    pub fn download_with_progress(
        &self,
        repo_id: &str,
        filename: &str,
        callback: Option<&ProgressCallback>,
    ) -> Result<PathBuf> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| ChatError::Model(format!("failed to create HF API: {e}")))?;

        // Check if already cached — avoid showing a progress bar for cached files.
        let cache = hf_hub::Cache::default();
        if let Some(path) = cache.model(repo_id.to_owned()).get(filename) {
            println!("  {repo_id}/{filename}  [cached]");
            if let Some(cb) = callback {
                cb(ProgressEvent::Cached {
                    filename: filename.to_owned(),
                });
            }
            return Ok(path);
        }

        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        ) {
            pb.set_style(style);
        }
        pb.set_message(format!("{repo_id}/{filename}"));

        let progress = MirroredProgress {
            filename: filename.to_owned(),
            bar: pb,
            callback,
            bytes_downloaded: 0,
            total_bytes: None,
        };

        let repo = api.model(repo_id.to_owned());
        let path = repo
            .download_with_progress(filename, progress)
            .map_err(|e| ChatError::Model(format!("failed to download {filename}: {e}")))?;

        Ok(path)
    }

    /// Check whether a file is already cached locally for a HuggingFace repo.
    pub fn is_file_cached(repo_id: &str, filename: &str) -> bool {
        hf_hub::Cache::default()
            .model(repo_id.to_owned())
            .get(filename)
            .is_some()
    }

    /// Query file sizes from HuggingFace Hub via HTTP HEAD requests.
    ///
    /// Returns a list of `(filename, size_bytes)` pairs. If a HEAD request
    /// fails for any file, its size is `None` (graceful degradation).
    pub fn query_file_sizes(repo_id: &str, filenames: &[&str]) -> Vec<(String, Option<u64>)> {
        filenames
            .iter()
            .map(|f| {
                let size = query_single_file_size(repo_id, f);
                ((*f).to_owned(), size)
            })
            .collect()
    }

    /// Get the cache directory path.
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}

/// Drives an indicatif bar and mirrors byte counts into a [`ProgressCallback`].
struct MirroredProgress<'a> {
    filename: String,
    bar: ProgressBar,
    callback: Option<&'a ProgressCallback>,
    bytes_downloaded: u64,
    total_bytes: Option<u64>,
}

impl Progress for MirroredProgress<'_> {
    fn init(&mut self, size: usize, _filename: &str) {
        self.total_bytes = Some(size as u64);
        self.bar.set_length(size as u64);
        if let Some(cb) = self.callback {
            cb(ProgressEvent::DownloadStarted {
                filename: self.filename.clone(),
                total_bytes: self.total_bytes,
            });
        }
    }

    fn update(&mut self, size: usize) {
        self.bytes_downloaded += size as u64;
        self.bar.inc(size as u64);
        if let Some(cb) = self.callback {
            cb(ProgressEvent::DownloadProgress {
                filename: self.filename.clone(),
                bytes_downloaded: self.bytes_downloaded,
                total_bytes: self.total_bytes,
            });
        }
    }

    fn finish(&mut self) {
        self.bar.finish();
        if let Some(cb) = self.callback {
            cb(ProgressEvent::DownloadComplete {
                filename: self.filename.clone(),
            });
        }
    }
}

/// Query the size of a single file from HuggingFace Hub using a HEAD request.
///
/// Returns `None` if the request fails or the server doesn't provide
/// `content-length`. This avoids downloading the file just to check its size.
fn query_single_file_size(repo_id: &str, filename: &str) -> Option<u64> {
    let url = format!("https://huggingface.co/{repo_id}/resolve/main/{filename}");
    query_file_size_at(&url)
}

/// HEAD a URL and parse its `content-length`, if any.
fn query_file_size_at(url: &str) -> Option<u64> {
    let resp = match ureq::head(url).call() {
        Ok(r) => r,
        Err(_) => return None,
    };

    resp.header("content-length")
        .and_then(|v| v.parse::<u64>().ok())
}

/// Result of a disk space check.
pub struct DiskSpaceCheck {
    /// Free space available on the filesystem in bytes.
    pub free_bytes: u64,
    /// Required space for pending downloads in bytes.
    pub required_bytes: u64,
}

impl DiskSpaceCheck {
    /// Returns `true` if there is enough free space (with 500 MB headroom).
    pub fn has_enough_space(&self) -> bool {
        self.free_bytes >= self.required_bytes.saturating_add(DISK_SPACE_HEADROOM)
    }
}

/// Query available disk space at `path` using platform-specific APIs.
///
/// On Unix, uses `statvfs` to get the free blocks available to unprivileged
/// users. On non-Unix platforms, returns `u64::MAX` (effectively skipping
/// the check).
///
/// # Errors
///
/// Returns an error if the filesystem stats cannot be retrieved.
#[cfg(unix)]
pub fn available_disk_space(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| ChatError::Model(format!("invalid path for statvfs: {e}")))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };

    if ret != 0 {
        return Err(ChatError::Model(format!(
            "failed to check disk space at {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    // f_bavail = blocks available to unprivileged users.
    // f_frsize = fundamental file system block size.
    // The `as u64` casts are needed for macOS where these are i32/i64; on Linux
    // they are already u64.
    let bavail: u64 = stat.f_bavail as _;
    let frsize: u64 = stat.f_frsize as _;
    Ok(bavail.wrapping_mul(frsize))
}

/// Fallback for non-Unix platforms — returns `u64::MAX` (skip the check).
#[cfg(not(unix))]
pub fn available_disk_space(_path: &Path) -> Result<u64> {
    Ok(u64::MAX)
}

/// Check that enough disk space is available for pending model downloads.
///
/// Uses the hf-hub default cache directory to determine the target filesystem.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be created or the
/// filesystem stats cannot be retrieved.
pub fn check_disk_space(required_bytes: u64) -> Result<DiskSpaceCheck> {
    let cache_dir = hf_hub::Cache::default().path().to_path_buf();
    std::fs::create_dir_all(&cache_dir)?;
    let free_bytes = available_disk_space(&cache_dir)?;
    Ok(DiskSpaceCheck {
        free_bytes,
        required_bytes,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn is_file_cached_returns_false_for_nonexistent() {
        assert!(!ModelManager::is_file_cached(
            "nonexistent-org/nonexistent-model-xyz",
            "nonexistent-file.gguf"
        ));
    }

    #[test]
    fn disk_space_check_headroom() {
        let check = DiskSpaceCheck {
            free_bytes: DISK_SPACE_HEADROOM + 1000,
            required_bytes: 1000,
        };
        assert!(check.has_enough_space());

        let check = DiskSpaceCheck {
            free_bytes: 1000,
            required_bytes: 1000,
        };
        assert!(!check.has_enough_space());
    }

    #[test]
    fn available_disk_space_on_temp_dir() {
        let free = available_disk_space(&std::env::temp_dir()).expect("statvfs on temp dir");
        assert!(free > 0);
    }

    #[tokio::test]
    async fn query_file_size_parses_content_length() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        // A body sets content-length; HEAD responses carry the header without the bytes.
        Mock::given(method("HEAD"))
            .and(path("/repo/resolve/main/model.gguf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 12345]))
            .mount(&server)
            .await;

        let url = format!("{}/repo/resolve/main/model.gguf", server.uri());
        // ureq is blocking; run it off the async test runtime.
        let size = tokio::task::spawn_blocking(move || query_file_size_at(&url))
            .await
            .expect("join blocking task");
        assert_eq!(size, Some(12345));
    }

    #[tokio::test]
    async fn query_file_size_none_on_error_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        let size = tokio::task::spawn_blocking(move || query_file_size_at(&url))
            .await
            .expect("join blocking task");
        assert_eq!(size, None);
    }
}
