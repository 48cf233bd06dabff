use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::context::InstallContext;
use super::installer::LoaderInstaller;
use super::stage::{conclude, InstallCleanup, InstallStage, StageTracker};
use crate::core::dependency::ensure_relative;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::MinecraftInstance;
use crate::core::version::{AssetIndexDocument, VersionJson, VersionManifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VanillaStage {
    DownloadVersionManifest,
    ParseInstance,
    DownloadAssetIndex,
    DownloadDependencies,
}

impl InstallStage for VanillaStage {
    const ALL: &'static [Self] = &[
        VanillaStage::DownloadVersionManifest,
        VanillaStage::ParseInstance,
        VanillaStage::DownloadAssetIndex,
        VanillaStage::DownloadDependencies,
    ];

    fn name(self) -> &'static str {
        match self {
            VanillaStage::DownloadVersionManifest => "DownloadVersionManifest",
            VanillaStage::ParseInstance => "ParseInstance",
            VanillaStage::DownloadAssetIndex => "DownloadAssetIndex",
            VanillaStage::DownloadDependencies => "DownloadDependencies",
        }
    }
}

/// Installs an official game version: version JSON, client jar, libraries,
/// asset index and asset objects.
pub struct VanillaInstaller {
    version: String,
}

impl VanillaInstaller {
    /// `version` may be an id or `latest-release` / `latest-snapshot`.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    async fn run(
        &self,
        ctx: &InstallContext<'_>,
        tracker: &mut StageTracker<VanillaStage>,
        cleanup: &mut InstallCleanup,
    ) -> LauncherResult<MinecraftInstance> {
        let dir = ctx.directory;

        tracker.begin(VanillaStage::DownloadVersionManifest)?;
        let manifest_raw = ctx.fetch_text(&ctx.settings.version_manifest_url).await?;
        let manifest = VersionManifest::parse(&manifest_raw)?;
        let entry = manifest.resolve(&self.version)?;
        let version_raw = ctx.fetch_text(&entry.url).await?;

        tracker.begin(VanillaStage::ParseInstance)?;
        let version = VersionJson::parse(&version_raw)?;
        let id = version.id.clone();
        ensure_relative(Path::new(&id))?;
        cleanup.create_dir_all(&dir.version_dir(&id)).await?;
        cleanup.write(&dir.version_json(&id), &version_raw).await?;

        let mut dependencies = Vec::new();
        match version.asset_index_dependency() {
            Some(index) => {
                tracker.begin(VanillaStage::DownloadAssetIndex)?;
                let index_path = dir.path_of(&index)?;
                ctx.resolve(tracker, std::slice::from_ref(&index)).await?;
                let raw = tokio::fs::read_to_string(&index_path)
                    .await
                    .map_err(|e| LauncherError::io(&index_path, e))?;
                let assets = AssetIndexDocument::parse(&raw)?;
                dependencies.extend(assets.dependencies(&ctx.settings.resources_url));
            }
            None => tracker.skip(VanillaStage::DownloadAssetIndex),
        }

        tracker.begin(VanillaStage::DownloadDependencies)?;
        if let Some(client) = version.client_dependency() {
            cleanup.track(dir.path_of(&client)?);
            dependencies.push(client);
        }
        dependencies.extend(version.library_dependencies(&ctx.settings.mojang_libraries_url)?);
        ctx.resolve(tracker, &dependencies).await?;

        info!("Vanilla {} installed", id);
        Ok(MinecraftInstance::vanilla(dir, &id))
    }
}

#[async_trait]
impl LoaderInstaller for VanillaInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<MinecraftInstance> {
        info!("Installing Vanilla {}", self.version);
        let mut tracker = ctx.tracker::<VanillaStage>("vanilla");
        let mut cleanup = InstallCleanup::new();
        let result = self.run(ctx, &mut tracker, &mut cleanup).await;
        conclude(tracker, cleanup, result).await
    }
}

/// The vanilla parent of a modified instance: the caller's, or one installed
/// by a nested run whose events are scoped under `outer`.
pub(crate) async fn inherit_vanilla(
    ctx: &InstallContext<'_>,
    outer: &'static str,
    game_version: &str,
    supplied: Option<&Arc<MinecraftInstance>>,
) -> LauncherResult<Arc<MinecraftInstance>> {
    if let Some(parent) = supplied {
        if parent.id != game_version {
            return Err(LauncherError::InvalidArgument(format!(
                "inherited instance {} does not match game version {}",
                parent.id, game_version
            )));
        }
        return Ok(parent.clone());
    }
    let nested = ctx.nested(outer);
    VanillaInstaller::new(game_version)
        .install(&nested)
        .await
        .map(Arc::new)
}
