use std::path::PathBuf;

use crate::core::error::LauncherError;

/// A single file to fetch: where from and where to.
///
/// `url` and `local_path` never change after construction. The attempt
/// counter and the mirror-rewritten source are runtime state owned by
/// whoever is driving the download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    url: String,
    local_path: PathBuf,
    mirror_url: Option<String>,
    attempt_count: u32,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            mirror_url: None,
            attempt_count: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_path(&self) -> &std::path::Path {
        &self.local_path
    }

    /// URL actually requested: the mirror rewrite when one applied.
    pub fn effective_url(&self) -> &str {
        self.mirror_url.as_deref().unwrap_or(&self.url)
    }

    /// Number of attempts started so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub(crate) fn set_mirror_url(&mut self, mirror_url: String) {
        if mirror_url != self.url {
            self.mirror_url = Some(mirror_url);
        }
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }
}

/// Terminal outcome of one request. Never retried once returned.
#[derive(Debug)]
pub enum DownloadResult {
    Successful,
    Cancelled,
    Failed(LauncherError),
}

/// Discriminant of [`DownloadResult`] without the error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadResultType {
    Successful,
    Cancelled,
    Failed,
}

impl DownloadResult {
    pub fn result_type(&self) -> DownloadResultType {
        match self {
            DownloadResult::Successful => DownloadResultType::Successful,
            DownloadResult::Cancelled => DownloadResultType::Cancelled,
            DownloadResult::Failed(_) => DownloadResultType::Failed,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, DownloadResult::Successful)
    }

    pub fn error(&self) -> Option<&LauncherError> {
        match self {
            DownloadResult::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Receives byte/size progress and completions from the downloader.
///
/// All methods default to no-ops. Callbacks may fire from several worker
/// tasks at once and in no particular file order.
pub trait DownloadObserver: Send + Sync {
    /// Total size learned from the probe (`None` when the server did not say).
    fn on_size(&self, _url: &str, _total_bytes: Option<u64>) {}

    /// `delta` more bytes of `url` reached the disk.
    fn on_bytes(&self, _url: &str, _delta: u64) {}

    /// A request reached its terminal state.
    fn on_completed(&self, _request: &DownloadRequest, _result: &DownloadResult) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DownloadObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_url_identical_to_origin_is_not_recorded() {
        let mut request = DownloadRequest::new("https://a/b.jar", "/tmp/b.jar");
        request.set_mirror_url("https://a/b.jar".into());
        assert_eq!(request.effective_url(), "https://a/b.jar");

        request.set_mirror_url("https://mirror/b.jar".into());
        assert_eq!(request.effective_url(), "https://mirror/b.jar");
        assert_eq!(request.url(), "https://a/b.jar");
    }

    #[test]
    fn result_type_drops_payload() {
        let failed = DownloadResult::Failed(LauncherError::Other("boom".into()));
        assert_eq!(failed.result_type(), DownloadResultType::Failed);
        assert!(failed.error().is_some());
        assert_eq!(
            DownloadResult::Cancelled.result_type(),
            DownloadResultType::Cancelled
        );
    }
}
