use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use launcher_engine::core::config::{default_game_root, EngineSettings};
use launcher_engine::core::dependency::{DependencyResolver, GameDirectory};
use launcher_engine::core::downloader::{ChunkedDownloader, DownloadOptions, GroupDownloader};
use launcher_engine::core::http::build_http_client;
use launcher_engine::{
    InstallContext, Installer, LauncherResult, LoaderType, MinecraftInstance, ProgressSink,
    StageEvent, StageProgress,
};

/// Install Minecraft versions and mod loaders into a game folder.
#[derive(Debug, Parser)]
#[command(name = "mc-install", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Game root (defaults to `<data dir>/.minecraft`).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Settings file (defaults to `<root>/engine_settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Java executable for Forge, NeoForge and OptiFine compile steps.
    #[arg(long, global = true, default_value = "java")]
    java: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install a vanilla version (an id, `latest-release` or `latest-snapshot`)
    Vanilla { version: String },
    /// Install Fabric over a game version
    Fabric { game_version: String, loader_version: String },
    /// Install Quilt over a game version
    Quilt { game_version: String, loader_version: String },
    /// Install Forge over a game version
    Forge { game_version: String, loader_version: String },
    /// Install NeoForge over a game version
    Neoforge { game_version: String, loader_version: String },
    /// Install OptiFine (edition such as `HD_U_I6`) over a game version
    Optifine { game_version: String, edition: String },
}

impl Command {
    fn installer(&self) -> LauncherResult<Installer> {
        match self {
            Command::Vanilla { version } => Installer::new(LoaderType::Vanilla, version, None),
            Command::Fabric { game_version, loader_version } => {
                Installer::new(LoaderType::Fabric, game_version, Some(loader_version.as_str()))
            }
            Command::Quilt { game_version, loader_version } => {
                Installer::new(LoaderType::Quilt, game_version, Some(loader_version.as_str()))
            }
            Command::Forge { game_version, loader_version } => {
                Installer::new(LoaderType::Forge, game_version, Some(loader_version.as_str()))
            }
            Command::Neoforge { game_version, loader_version } => {
                Installer::new(LoaderType::NeoForge, game_version, Some(loader_version.as_str()))
            }
            Command::Optifine { game_version, edition } => {
                Installer::new(LoaderType::OptiFine, game_version, Some(edition.as_str()))
            }
        }
    }
}

/// Renders stage events as log lines.
struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, event: StageEvent) {
        let scope = event.scope.join("/");
        match event.progress {
            StageProgress::UpdateTotalTasks(total) if total > 0 => {
                info!("[{}] {}: {} tasks", scope, event.stage, total)
            }
            StageProgress::UpdateFinishedTasks(done) => {
                info!("[{}] {}: {} done", scope, event.stage, done)
            }
            StageProgress::Failed => warn!("[{}] {} failed", scope, event.stage),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,launcher_engine=debug")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(instance) => {
            info!(
                "{} ready at {}",
                instance.id,
                instance.manifest_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) if e.is_cancelled() => {
            warn!("Installation cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("Installation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> LauncherResult<MinecraftInstance> {
    let root = cli.root.unwrap_or_else(default_game_root);
    let settings = match &cli.config {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::load_or_default(&root),
    };
    let installer = cli.command.installer()?;

    let client = build_http_client(&settings)?;
    let downloader = Arc::new(ChunkedDownloader::new(
        client.clone(),
        DownloadOptions::from(&settings),
    ));
    let group = GroupDownloader::new(downloader, settings.mirror_selector());
    let resolver = DependencyResolver::new(
        group,
        settings.file_verification_parallelism,
        settings.check_all_dependencies,
    );
    let directory = GameDirectory::new(&root);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling");
            on_ctrl_c.cancel();
        }
    });

    info!("Game root: {}", root.display());
    let ctx = InstallContext {
        directory: &directory,
        settings: &settings,
        client: &client,
        resolver: &resolver,
        java: &cli.java,
        sink: Arc::new(LogSink),
        cancel: &cancel,
    };
    installer.install(&ctx).await
}
