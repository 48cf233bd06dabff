use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ChunkedDownloader;
use super::mirror::MirrorSelector;
use super::request::{DownloadObserver, DownloadRequest, DownloadResult, DownloadResultType};
use crate::core::error::LauncherError;

/// Aggregate outcome kind of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupResultType {
    Successful,
    Failed,
    Cancelled,
}

/// Outcome of [`GroupDownloader::fetch_all`].
///
/// `failed` holds every request that did not end `Successful`, paired with
/// its terminal result.
#[derive(Debug)]
pub struct GroupDownloadResult {
    pub kind: GroupResultType,
    pub failed: Vec<(DownloadRequest, DownloadResult)>,
}

impl GroupDownloadResult {
    pub fn is_successful(&self) -> bool {
        self.kind == GroupResultType::Successful
    }

    /// URLs of the requests that did not succeed.
    pub fn failed_urls(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|(request, _)| request.url().to_string())
            .collect()
    }
}

/// Runs a batch of requests concurrently through one shared downloader.
#[derive(Clone)]
pub struct GroupDownloader {
    downloader: Arc<ChunkedDownloader>,
    mirror: Arc<dyn MirrorSelector>,
}

impl GroupDownloader {
    pub fn new(downloader: Arc<ChunkedDownloader>, mirror: Arc<dyn MirrorSelector>) -> Self {
        Self { downloader, mirror }
    }

    pub fn downloader(&self) -> &Arc<ChunkedDownloader> {
        &self.downloader
    }

    /// Download every request, returning once all reached a terminal state.
    ///
    /// The observer sees `on_completed` exactly once per request. The
    /// aggregate is `Cancelled` if the token fired, otherwise `Failed` when
    /// anything failed, otherwise `Successful`.
    pub async fn fetch_all(
        &self,
        requests: Vec<DownloadRequest>,
        observer: Arc<dyn DownloadObserver>,
        cancel: &CancellationToken,
    ) -> GroupDownloadResult {
        let total = requests.len();
        if total == 0 {
            return GroupDownloadResult {
                kind: GroupResultType::Successful,
                failed: Vec::new(),
            };
        }
        info!("Downloading {} files", total);

        let mut set = JoinSet::new();
        for mut request in requests {
            request.set_mirror_url(self.mirror.rewrite(request.url()));
            let downloader = self.downloader.clone();
            let observer = observer.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let fallback = request.clone();
                let worker = tokio::spawn(async move {
                    let result = downloader.fetch(&mut request, &observer, &cancel).await;
                    observer.on_completed(&request, &result);
                    (request, result)
                });
                match worker.await {
                    Ok(done) => done,
                    Err(e) => {
                        let result = DownloadResult::Failed(LauncherError::Other(format!(
                            "download task panicked: {e}"
                        )));
                        (fallback, result)
                    }
                }
            });
        }

        let mut failed = Vec::new();
        while let Some(joined) = set.join_next().await {
            // The inner spawn turns worker panics into results, so only an
            // aborted wrapper lands here.
            let (request, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!("Download wrapper task ended without a result: {}", e);
                    continue;
                }
            };
            match result.result_type() {
                DownloadResultType::Successful => {}
                DownloadResultType::Cancelled => failed.push((request, result)),
                DownloadResultType::Failed => {
                    if let Some(e) = result.error() {
                        warn!("Download failed: {} ({})", request.url(), e);
                    }
                    failed.push((request, result));
                }
            }
        }

        let kind = if cancel.is_cancelled() {
            GroupResultType::Cancelled
        } else if !failed.is_empty() {
            GroupResultType::Failed
        } else {
            GroupResultType::Successful
        };
        debug!(
            "Batch of {} finished: {:?}, {} not successful",
            total,
            kind,
            failed.len()
        );
        GroupDownloadResult { kind, failed }
    }
}
