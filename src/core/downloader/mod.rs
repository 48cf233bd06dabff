mod chunk;
mod client;
mod group;
mod mirror;
mod request;

pub use chunk::{ChunkPlan, ChunkRange};
pub use client::{ChunkedDownloader, DownloadOptions};
pub use group::{GroupDownloadResult, GroupDownloader, GroupResultType};
pub use mirror::{MirrorSelector, NoMirror, PrefixMirror};
pub use request::{
    DownloadObserver, DownloadRequest, DownloadResult, DownloadResultType, NoopObserver,
};

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::core::error::{LauncherError, LauncherResult};

/// Race `fut` against `cancel`; a fired token wins and yields `Cancelled`.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> LauncherResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LauncherError::Cancelled),
        out = fut => Ok(out),
    }
}
