use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::dependency::{Dependency, ResolverObserver};
use crate::core::downloader::{DownloadRequest, DownloadResult};
use crate::core::error::{LauncherError, LauncherResult};

/// The closed, ordered set of stages of one installer variant.
pub trait InstallStage: Copy + Eq + Debug + Send + Sync + 'static {
    /// Every stage, in execution order.
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageProgress {
    Starting,
    UpdateTotalTasks(u64),
    UpdateFinishedTasks(u64),
    IncrementFinishedTasks(u64),
    Finished,
    Skipped,
    Failed,
}

impl StageProgress {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageProgress::Finished | StageProgress::Skipped | StageProgress::Failed
        )
    }
}

/// One progress message. `scope` names the installer that emitted it,
/// outermost first, so nested runs render as a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub scope: Vec<&'static str>,
    pub stage: &'static str,
    pub progress: StageProgress,
}

/// Receives every stage transition of an install.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: StageEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _event: StageEvent) {}
}

/// Prefixes the scope of every event with `outer` before forwarding.
pub struct ScopedSink {
    outer: &'static str,
    inner: Arc<dyn ProgressSink>,
}

impl ScopedSink {
    pub fn new(outer: &'static str, inner: Arc<dyn ProgressSink>) -> Self {
        Self { outer, inner }
    }
}

impl ProgressSink for ScopedSink {
    fn report(&self, mut event: StageEvent) {
        event.scope.insert(0, self.outer);
        self.inner.report(event);
    }
}

/// Drives the stage lifecycle of one installer run.
///
/// The current stage is recorded before it executes. Stages jumped over are
/// reported `Skipped`, and [`StageTracker::complete`] reports every stage
/// that was never reached as `Skipped` too, so each stage gets exactly one
/// terminal event on success.
pub struct StageTracker<S: InstallStage> {
    scope: &'static str,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    next: usize,
    current: Option<S>,
}

impl<S: InstallStage> StageTracker<S> {
    pub fn new(scope: &'static str, sink: Arc<dyn ProgressSink>, cancel: &CancellationToken) -> Self {
        Self {
            scope,
            sink,
            cancel: cancel.clone(),
            next: 0,
            current: None,
        }
    }

    pub fn current(&self) -> Option<S> {
        self.current
    }

    /// Finish the running stage (if any) and enter `stage`.
    pub fn begin(&mut self, stage: S) -> LauncherResult<()> {
        self.finish();
        if self.cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        self.skip_until(stage.index());
        self.next = stage.index() + 1;
        self.current = Some(stage);
        info!("[{}] {}", self.scope, stage.name());
        self.emit(stage, StageProgress::Starting);
        Ok(())
    }

    /// Report `stage` as a no-op for this run.
    pub fn skip(&mut self, stage: S) {
        self.finish();
        self.skip_until(stage.index());
        self.next = stage.index() + 1;
        debug!("[{}] {} skipped", self.scope, stage.name());
        self.emit(stage, StageProgress::Skipped);
    }

    pub fn set_total(&self, total: u64) {
        if let Some(stage) = self.current {
            self.emit(stage, StageProgress::UpdateTotalTasks(total));
        }
    }

    pub fn set_finished(&self, finished: u64) {
        if let Some(stage) = self.current {
            self.emit(stage, StageProgress::UpdateFinishedTasks(finished));
        }
    }

    pub fn increment(&self, delta: u64) {
        if let Some(stage) = self.current {
            self.emit(stage, StageProgress::IncrementFinishedTasks(delta));
        }
    }

    /// An observer that turns resolver events into task counts of the
    /// current stage.
    pub fn task_counter(&self) -> Arc<dyn ResolverObserver> {
        Arc::new(TaskCounter {
            scope: self.scope,
            stage: self.current.map(|s| s.name()).unwrap_or_default(),
            sink: self.sink.clone(),
        })
    }

    fn finish(&mut self) {
        if let Some(stage) = self.current.take() {
            self.emit(stage, StageProgress::Finished);
        }
    }

    fn skip_until(&mut self, index: usize) {
        for stage in S::ALL.iter().take(index).skip(self.next) {
            self.emit(*stage, StageProgress::Skipped);
        }
    }

    /// Successful end of the run.
    pub fn complete(mut self) {
        self.finish();
        self.skip_until(S::ALL.len());
        self.next = S::ALL.len();
    }

    /// Failed end of the run: the current stage reports `Failed` and later
    /// stages are never reported. Errors are attributed to that stage (nested
    /// runs wrap twice), except cancellation which stays bare.
    pub fn fail(mut self, error: LauncherError) -> LauncherError {
        let Some(stage) = self.current.take() else {
            return error;
        };
        self.emit(stage, StageProgress::Failed);
        if error.is_cancelled() {
            warn!("[{}] cancelled during {}", self.scope, stage.name());
            return error;
        }
        warn!("[{}] {} failed: {}", self.scope, stage.name(), error);
        LauncherError::Stage {
            stage: stage.name().to_string(),
            source: Box::new(error),
        }
    }

    fn emit(&self, stage: S, progress: StageProgress) {
        self.sink.report(StageEvent {
            scope: vec![self.scope],
            stage: stage.name(),
            progress,
        });
    }
}

struct TaskCounter {
    scope: &'static str,
    stage: &'static str,
    sink: Arc<dyn ProgressSink>,
}

impl TaskCounter {
    fn emit(&self, progress: StageProgress) {
        self.sink.report(StageEvent {
            scope: vec![self.scope],
            stage: self.stage,
            progress,
        });
    }
}

impl ResolverObserver for TaskCounter {
    fn on_invalid_determined(&self, invalid: &[Dependency]) {
        self.emit(StageProgress::UpdateTotalTasks(invalid.len() as u64));
    }

    fn on_download_completed(&self, _request: &DownloadRequest, _result: &DownloadResult) {
        self.emit(StageProgress::IncrementFinishedTasks(1));
    }
}

/// Paths created for the current install target, removed if it fails.
///
/// Only paths that did not exist when registered are recorded, so an
/// inherited instance or the shared library folder is never touched.
#[derive(Debug, Default)]
pub struct InstallCleanup {
    created: Vec<PathBuf>,
}

impl InstallCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` if it does not exist yet.
    pub fn track(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !path.exists() && !self.created.iter().any(|p| p == path) {
            self.created.push(path.to_path_buf());
        }
    }

    pub async fn create_dir_all(&mut self, dir: &Path) -> LauncherResult<()> {
        self.track(dir);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| LauncherError::io(dir, e))
    }

    pub async fn write(&mut self, path: &Path, contents: impl AsRef<[u8]>) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }
        self.track(path);
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| LauncherError::io(path, e))
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.created
    }

    /// Delete everything recorded, newest first. Failures are logged.
    pub async fn run(self) {
        for path in self.created.into_iter().rev() {
            let removed = match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
                Ok(_) => tokio::fs::remove_file(&path).await,
                Err(_) => continue,
            };
            match removed {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) => warn!("Could not remove {:?}: {}", path, e),
            }
        }
    }
}

/// Close a run: complete the tracker on success, otherwise report the
/// failure and remove what the run created.
pub async fn conclude<S: InstallStage, T>(
    tracker: StageTracker<S>,
    cleanup: InstallCleanup,
    result: LauncherResult<T>,
) -> LauncherResult<T> {
    match result {
        Ok(value) => {
            tracker.complete();
            Ok(value)
        }
        Err(e) => {
            let e = tracker.fail(e);
            cleanup.run().await;
            Err(e)
        }
    }
}
