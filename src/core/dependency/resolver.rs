use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::layout::GameDirectory;
use super::model::Dependency;
use crate::core::downloader::{
    cancellable, DownloadObserver, DownloadRequest, DownloadResult, GroupDownloadResult,
    GroupDownloader, GroupResultType,
};
use crate::core::error::{LauncherError, LauncherResult};

/// Events of one `verify_and_fetch` run.
pub trait ResolverObserver: Send + Sync {
    /// Fires once, before any download starts, with every dependency that
    /// will be fetched.
    fn on_invalid_determined(&self, _invalid: &[Dependency]) {}

    /// Fires once per finished download of the invalid subset.
    fn on_download_completed(&self, _request: &DownloadRequest, _result: &DownloadResult) {}

    fn on_bytes(&self, _url: &str, _delta: u64) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolverObserver;

impl ResolverObserver for NoopResolverObserver {}

/// Adapts a resolver observer to the downloader's callbacks.
struct Forward(Arc<dyn ResolverObserver>);

impl DownloadObserver for Forward {
    fn on_bytes(&self, url: &str, delta: u64) {
        self.0.on_bytes(url, delta);
    }

    fn on_completed(&self, request: &DownloadRequest, result: &DownloadResult) {
        self.0.on_download_completed(request, result);
    }
}

/// Verifies dependencies on disk and downloads the ones that are missing or
/// corrupt.
///
/// The verification semaphore is shared by every call made through one
/// resolver, like the downloader's task semaphore.
pub struct DependencyResolver {
    group: GroupDownloader,
    verification_parallelism: usize,
    verify_permits: Arc<Semaphore>,
    check_all_dependencies: bool,
}

impl DependencyResolver {
    pub fn new(
        group: GroupDownloader,
        verification_parallelism: usize,
        check_all_dependencies: bool,
    ) -> Self {
        Self {
            group,
            verification_parallelism,
            verify_permits: Arc::new(Semaphore::new(verification_parallelism.max(1))),
            check_all_dependencies,
        }
    }

    pub fn group(&self) -> &GroupDownloader {
        &self.group
    }

    /// Verify every dependency under `directory` and fetch the invalid ones
    /// as one batch.
    ///
    /// A partially failed batch is not an error here; see
    /// [`Self::require_complete`].
    pub async fn verify_and_fetch(
        &self,
        directory: &GameDirectory,
        dependencies: &[Dependency],
        observer: Arc<dyn ResolverObserver>,
        cancel: &CancellationToken,
    ) -> LauncherResult<GroupDownloadResult> {
        if self.verification_parallelism == 0 {
            return Err(LauncherError::InvalidArgument(
                "file verification parallelism must be greater than zero".into(),
            ));
        }

        // One request per destination; the first dependency naming a path wins.
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            let path = directory.path_of(dep)?;
            if seen.insert(path.clone()) {
                targets.push((dep.clone(), path));
            } else {
                debug!("Duplicate dependency path: {}", path.display());
            }
        }

        let invalid = self.find_invalid(targets, cancel).await?;
        info!(
            "{} of {} dependencies need downloading",
            invalid.len(),
            dependencies.len()
        );
        let invalid_deps: Vec<Dependency> = invalid.iter().map(|(dep, _)| dep.clone()).collect();
        observer.on_invalid_determined(&invalid_deps);

        let requests: Vec<DownloadRequest> = invalid
            .into_iter()
            .map(|(dep, path)| DownloadRequest::new(dep.url(), path))
            .collect();

        let result = self
            .group
            .fetch_all(requests, Arc::new(Forward(observer)), cancel)
            .await;
        if result.kind == GroupResultType::Failed {
            warn!(
                "{} dependencies could not be downloaded",
                result.failed.len()
            );
        }
        Ok(result)
    }

    /// Apply the strict-mode policy to a batch result.
    ///
    /// Cancellation always becomes [`LauncherError::Cancelled`]. Failed
    /// entries become [`LauncherError::IncompleteDependencies`] only when
    /// `check_all_dependencies` is set.
    pub fn require_complete(&self, result: &GroupDownloadResult) -> LauncherResult<()> {
        match result.kind {
            GroupResultType::Cancelled => Err(LauncherError::Cancelled),
            GroupResultType::Failed if self.check_all_dependencies => {
                Err(LauncherError::IncompleteDependencies {
                    failed: result.failed_urls(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn find_invalid(
        &self,
        targets: Vec<(Dependency, PathBuf)>,
        cancel: &CancellationToken,
    ) -> LauncherResult<Vec<(Dependency, PathBuf)>> {
        let checks = stream::iter(targets)
            .map(|(dep, path)| {
                let permits = self.verify_permits.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(LauncherError::Cancelled);
                    }
                    let _permit = cancellable(cancel, permits.acquire_owned())
                        .await?
                        .map_err(|_| LauncherError::Other("verification semaphore closed".into()))?;
                    let valid = is_valid(path.clone(), dep.sha1(), dep.size()).await;
                    Ok((dep, path, valid))
                }
            })
            .buffer_unordered(self.verification_parallelism);

        futures_util::pin_mut!(checks);
        let mut invalid = Vec::new();
        while let Some(checked) = checks.next().await {
            let (dep, path, valid) = checked?;
            if !valid {
                debug!("Invalid dependency: {}", dep.name());
                invalid.push((dep, path));
            }
        }
        Ok(invalid)
    }
}

/// Missing files and hash mismatches are invalid. Without a hash, a known
/// size must match; otherwise existence is enough.
async fn is_valid(path: PathBuf, sha1: Option<&str>, size: Option<u64>) -> bool {
    let Ok(metadata) = tokio::fs::metadata(&path).await else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    match sha1 {
        Some(expected) => {
            let expected = expected.to_string();
            match tokio::task::spawn_blocking(move || sha1_file(&path)).await {
                Ok(Ok(actual)) => actual.eq_ignore_ascii_case(&expected),
                _ => false,
            }
        }
        None => size.map_or(true, |size| metadata.len() == size),
    }
}

pub(crate) fn sha1_file(path: &std::path::Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
