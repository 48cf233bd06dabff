use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the whole engine.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Too many redirects (> {limit}) while resolving {url}")]
    TooManyRedirects { url: String, limit: usize },

    #[error("Redirect from {url} carried no Location header")]
    MissingRedirectLocation { url: String },

    #[error("Length mismatch for {url}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("Range request to {url} was answered with HTTP {status}")]
    RangeNotSatisfied { url: String, status: u16 },

    // ── Control flow ────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{} dependencies could not be downloaded", .failed.len())]
    IncompleteDependencies { failed: Vec<String> },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: String,
        source: Box<LauncherError>,
    },

    // ── External processes ──────────────────────────────
    #[error(
        "Processor {processor} failed (code {exit_code:?}, {omitted_lines} earlier stderr lines omitted): {}",
        .stderr.join("\n")
    )]
    ProcessorFailed {
        processor: String,
        exit_code: Option<i32>,
        /// Last lines written to stderr.
        stderr: Vec<String>,
        omitted_lines: usize,
    },

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Versions / loaders ──────────────────────────────
    #[error("Minecraft version {0} not found in manifest")]
    VersionNotFound(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// True for a user abort, including one surfaced through a stage wrapper.
    pub fn is_cancelled(&self) -> bool {
        match self {
            LauncherError::Cancelled => true,
            LauncherError::Stage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Name of the stage a failure is attributed to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            LauncherError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
