use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::stage::{InstallStage, ProgressSink, ScopedSink, StageTracker};
use crate::core::config::EngineSettings;
use crate::core::dependency::{Dependency, DependencyResolver, GameDirectory};
use crate::core::downloader::{cancellable, DownloadRequest, DownloadResult, NoopObserver};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::get_text;

/// Everything an installer run needs, passed down explicitly.
#[derive(Clone)]
pub struct InstallContext<'a> {
    pub directory: &'a GameDirectory,
    pub settings: &'a EngineSettings,
    pub client: &'a reqwest::Client,
    pub resolver: &'a DependencyResolver,
    /// Java executable for native compile steps.
    pub java: &'a Path,
    pub sink: Arc<dyn ProgressSink>,
    pub cancel: &'a CancellationToken,
}

impl<'a> InstallContext<'a> {
    /// Same context with events namespaced under `outer`, for nested runs.
    pub fn nested(&self, outer: &'static str) -> InstallContext<'a> {
        InstallContext {
            sink: Arc::new(ScopedSink::new(outer, self.sink.clone())),
            ..self.clone()
        }
    }

    pub fn tracker<S: InstallStage>(&self, scope: &'static str) -> StageTracker<S> {
        StageTracker::new(scope, self.sink.clone(), self.cancel)
    }

    /// GET a metadata document (manifest, loader profile) as text.
    pub async fn fetch_text(&self, url: &str) -> LauncherResult<String> {
        let url = self.settings.mirror_selector().rewrite(url);
        cancellable(
            self.cancel,
            get_text(self.client, &url, self.settings.max_redirects),
        )
        .await?
    }

    /// Download one file outside any dependency batch (installer archives).
    pub async fn download_file(&self, url: &str, dest: &Path) -> LauncherResult<()> {
        let request = DownloadRequest::new(url, dest);
        let mut result = self
            .resolver
            .group()
            .fetch_all(vec![request], Arc::new(NoopObserver), self.cancel)
            .await;
        match result.failed.pop() {
            None => Ok(()),
            Some((_, DownloadResult::Failed(e))) => Err(e),
            Some(_) => Err(LauncherError::Cancelled),
        }
    }

    /// Verify and fetch `dependencies`, counting downloads as tasks of the
    /// tracker's current stage, then apply the strict-mode policy.
    pub async fn resolve<S: InstallStage>(
        &self,
        tracker: &StageTracker<S>,
        dependencies: &[Dependency],
    ) -> LauncherResult<()> {
        let result = self
            .resolver
            .verify_and_fetch(
                self.directory,
                dependencies,
                tracker.task_counter(),
                self.cancel,
            )
            .await?;
        self.resolver.require_complete(&result)
    }
}
