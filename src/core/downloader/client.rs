use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::chunk::ChunkPlan;
use super::request::{DownloadObserver, DownloadRequest, DownloadResult};
use super::cancellable;
use crate::core::config::EngineSettings;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::redirect_target;

/// Knobs of the chunked downloader.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub chunk_size: u64,
    pub workers_per_task: usize,
    pub concurrent_download_tasks: usize,
    pub max_retry_count: u32,
    pub max_redirects: usize,
    pub buffer_size: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for DownloadOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            workers_per_task: settings.workers_per_download_task,
            concurrent_download_tasks: settings.concurrent_download_tasks,
            max_retry_count: settings.max_retry_count,
            max_redirects: settings.max_redirects,
            buffer_size: settings.buffer_size,
        }
    }
}

/// What the header probe learned about a URL.
#[derive(Debug)]
struct Probe {
    /// Final URL after redirects.
    url: String,
    total_bytes: Option<u64>,
    /// The server answered a one-byte range request with 206.
    ranges: bool,
}

/// Resumable-by-retry, range-parallel single-file downloader.
///
/// One instance per launcher session: the task semaphore bounding how many
/// files are in flight is shared by every call made through it.
pub struct ChunkedDownloader {
    client: Client,
    options: DownloadOptions,
    task_permits: Arc<Semaphore>,
}

impl ChunkedDownloader {
    pub fn new(client: Client, options: DownloadOptions) -> Self {
        let permits = options.concurrent_download_tasks.max(1);
        Self {
            client,
            options,
            task_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Single file with retries ────────────────────────

    /// Download one request to its local path.
    ///
    /// Transport failures are retried up to `max_retry_count` attempts in
    /// total and never escape as errors: the outcome is always a
    /// [`DownloadResult`]. A fired token yields `Cancelled`, never `Failed`.
    pub async fn fetch(
        &self,
        request: &mut DownloadRequest,
        observer: &Arc<dyn DownloadObserver>,
        cancel: &CancellationToken,
    ) -> DownloadResult {
        let max_attempts = self.options.max_retry_count.max(1);

        loop {
            if cancel.is_cancelled() {
                return DownloadResult::Cancelled;
            }

            let attempt = request.begin_attempt();
            match self.attempt(request, observer, cancel).await {
                Ok(()) => {
                    debug!(
                        "Downloaded: {} -> {:?}",
                        request.effective_url(),
                        request.local_path()
                    );
                    return DownloadResult::Successful;
                }
                Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                    return DownloadResult::Cancelled;
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        request.effective_url(),
                        attempt,
                        e
                    );
                    return DownloadResult::Failed(e);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {} failed, retrying: {}",
                        attempt,
                        max_attempts,
                        request.effective_url(),
                        e
                    );
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &DownloadRequest,
        observer: &Arc<dyn DownloadObserver>,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let _permit = cancellable(cancel, self.task_permits.clone().acquire_owned())
            .await?
            .map_err(|_| LauncherError::Other("download semaphore closed".into()))?;

        let probe = self.probe(request.effective_url(), cancel).await?;
        observer.on_size(request.url(), probe.total_bytes);

        let dest = request.local_path();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        match probe.total_bytes {
            Some(0) => {
                tokio::fs::File::create(dest)
                    .await
                    .map_err(|e| LauncherError::io(dest, e))?;
                Ok(())
            }
            Some(total) if probe.ranges => {
                self.download_multi_part(request, &probe.url, total, observer, cancel)
                    .await
            }
            total => {
                self.download_single_part(request, &probe.url, total, observer, cancel)
                    .await
            }
        }
    }

    // ── Probe ───────────────────────────────────────────

    /// Follow redirects with HEAD, then ask for one byte to see whether the
    /// server really honours ranges. `Accept-Ranges` alone is not trusted.
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> LauncherResult<Probe> {
        let mut current = url.to_string();
        let mut redirects = 0usize;

        let head = loop {
            let response = cancellable(cancel, self.client.head(&current).send()).await??;
            if response.status().is_redirection() {
                redirects += 1;
                if redirects > self.options.max_redirects {
                    return Err(LauncherError::TooManyRedirects {
                        url: url.to_string(),
                        limit: self.options.max_redirects,
                    });
                }
                current = redirect_target(&current, response.headers())?;
                continue;
            }
            break response;
        };

        let status = head.status();
        let total_bytes = if status.is_success() {
            // `Response::content_length` reports the (empty) HEAD body, not the header.
            head.headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
        } else if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED
        {
            None
        } else {
            return Err(LauncherError::DownloadFailed {
                url: current,
                status: status.as_u16(),
            });
        };

        let ranges = match total_bytes {
            Some(total) if total > 0 => {
                let response = cancellable(
                    cancel,
                    self.client.get(&current).header(RANGE, "bytes=0-0").send(),
                )
                .await??;
                response.status() == StatusCode::PARTIAL_CONTENT
            }
            _ => false,
        };

        Ok(Probe {
            url: current,
            total_bytes,
            ranges,
        })
    }

    // ── Single part ─────────────────────────────────────

    async fn download_single_part(
        &self,
        request: &DownloadRequest,
        url: &str,
        total_bytes: Option<u64>,
        observer: &Arc<dyn DownloadObserver>,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let response = cancellable(cancel, self.client.get(url).send()).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let dest = request.local_path();
        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::io(dest, e))?;
        if let Some(total) = total_bytes {
            file.set_len(total)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
        }

        // Write inside a block so the handle is dropped before returning.
        let written = {
            let mut writer = BufWriter::with_capacity(self.options.buffer_size, file);
            let mut stream = response.bytes_stream();
            let mut written = 0u64;

            while let Some(chunk) = cancellable(cancel, stream.next()).await? {
                let chunk = chunk?;
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(dest, e))?;
                written += chunk.len() as u64;
                observer.on_bytes(request.url(), chunk.len() as u64);
            }

            writer
                .flush()
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            written
        };

        if let Some(expected) = total_bytes {
            if written != expected {
                return Err(LauncherError::LengthMismatch {
                    url: url.to_string(),
                    expected,
                    actual: written,
                });
            }
        }
        Ok(())
    }

    // ── Multi part ──────────────────────────────────────

    async fn download_multi_part(
        &self,
        request: &DownloadRequest,
        url: &str,
        total_bytes: u64,
        observer: &Arc<dyn DownloadObserver>,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let dest = request.local_path();
        // Pre-size once so concurrent workers never extend the file.
        {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            file.set_len(total_bytes)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
        }

        let plan = Arc::new(ChunkPlan::new(total_bytes, self.options.chunk_size));
        let workers = self
            .options
            .workers_per_task
            .max(1)
            .min(plan.chunk_count() as usize);
        debug!(
            "Multi-part download of {} ({} bytes, {} chunks, {} workers)",
            url,
            total_bytes,
            plan.chunk_count(),
            workers
        );

        let abort = cancel.child_token();
        let label: Arc<str> = Arc::from(request.url());
        let mut set = JoinSet::new();
        for _ in 0..workers {
            let worker = ChunkWorker {
                client: self.client.clone(),
                url: url.to_string(),
                path: dest.to_path_buf(),
                plan: plan.clone(),
                observer: observer.clone(),
                label: label.clone(),
                cancel: abort.clone(),
            };
            set.spawn(worker.run());
        }

        let mut first_error: Option<LauncherError> = None;
        while let Some(joined) = set.join_next().await {
            let outcome = joined
                .map_err(|e| LauncherError::Other(format!("chunk worker panicked: {e}")))
                .and_then(|r| r);
            if let Err(e) = outcome {
                abort.cancel();
                // Siblings stopped by `abort` report Cancelled; keep the real cause.
                let replace = match &first_error {
                    None => true,
                    Some(existing) => existing.is_cancelled() && !e.is_cancelled(),
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One range worker: claims chunks until the plan is exhausted, writing
/// each through its own handle at the chunk's offset.
struct ChunkWorker {
    client: Client,
    url: String,
    path: PathBuf,
    plan: Arc<ChunkPlan>,
    observer: Arc<dyn DownloadObserver>,
    label: Arc<str>,
    cancel: CancellationToken,
}

impl ChunkWorker {
    async fn run(self) -> LauncherResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| LauncherError::io(&self.path, e))?;

        loop {
            if self.cancel.is_cancelled() {
                return Err(LauncherError::Cancelled);
            }
            let Some(chunk) = self.plan.claim() else {
                break;
            };

            let response = cancellable(
                &self.cancel,
                self.client
                    .get(&self.url)
                    .header(RANGE, chunk.header_value())
                    .send(),
            )
            .await??;
            if response.status() != StatusCode::PARTIAL_CONTENT {
                return Err(LauncherError::RangeNotSatisfied {
                    url: self.url.clone(),
                    status: response.status().as_u16(),
                });
            }

            file.seek(SeekFrom::Start(chunk.start))
                .await
                .map_err(|e| LauncherError::io(&self.path, e))?;

            let expected = chunk.len();
            let mut written = 0u64;
            let mut stream = response.bytes_stream();
            while let Some(bytes) = cancellable(&self.cancel, stream.next()).await? {
                let bytes = bytes?;
                if written + bytes.len() as u64 > expected {
                    return Err(LauncherError::LengthMismatch {
                        url: self.url.clone(),
                        expected,
                        actual: written + bytes.len() as u64,
                    });
                }
                file.write_all(&bytes)
                    .await
                    .map_err(|e| LauncherError::io(&self.path, e))?;
                written += bytes.len() as u64;
                self.observer.on_bytes(&self.label, bytes.len() as u64);
            }
            // Settle pending writes before the next seek.
            file.flush()
                .await
                .map_err(|e| LauncherError::io(&self.path, e))?;

            if written != expected {
                return Err(LauncherError::LengthMismatch {
                    url: self.url.clone(),
                    expected,
                    actual: written,
                });
            }
        }

        file.sync_all()
            .await
            .map_err(|e| LauncherError::io(&self.path, e))
    }
}
