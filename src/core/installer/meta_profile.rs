use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::context::InstallContext;
use super::installer::LoaderInstaller;
use super::stage::{conclude, InstallCleanup, InstallStage, StageTracker};
use super::vanilla::inherit_vanilla;
use crate::core::dependency::ensure_relative;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{LoaderType, MinecraftInstance};
use crate::core::maven::{FABRIC_MAVEN, QUILT_MAVEN};
use crate::core::version::VersionJson;

/// Loaders whose meta service serves a ready-made version JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaLoader {
    Fabric,
    Quilt,
}

impl MetaLoader {
    fn scope(self) -> &'static str {
        match self {
            MetaLoader::Fabric => "fabric",
            MetaLoader::Quilt => "quilt",
        }
    }

    fn loader_type(self) -> LoaderType {
        match self {
            MetaLoader::Fabric => LoaderType::Fabric,
            MetaLoader::Quilt => LoaderType::Quilt,
        }
    }

    /// Repository for profile libraries that do not name their own.
    fn default_maven(self) -> &'static str {
        match self {
            MetaLoader::Fabric => FABRIC_MAVEN,
            MetaLoader::Quilt => QUILT_MAVEN,
        }
    }

    fn profile_url(self, ctx: &InstallContext<'_>, game: &str, loader: &str) -> String {
        let base = match self {
            MetaLoader::Fabric => &ctx.settings.fabric_meta_url,
            MetaLoader::Quilt => &ctx.settings.quilt_meta_url,
        };
        format!(
            "{}/versions/loader/{}/{}/profile/json",
            base.trim_end_matches('/'),
            game,
            loader
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaProfileStage {
    ParseOrInstallVanillaInstance,
    DownloadLoaderManifest,
    WriteVersionJson,
    DownloadLibraries,
}

impl InstallStage for MetaProfileStage {
    const ALL: &'static [Self] = &[
        MetaProfileStage::ParseOrInstallVanillaInstance,
        MetaProfileStage::DownloadLoaderManifest,
        MetaProfileStage::WriteVersionJson,
        MetaProfileStage::DownloadLibraries,
    ];

    fn name(self) -> &'static str {
        match self {
            MetaProfileStage::ParseOrInstallVanillaInstance => "ParseOrInstallVanillaInstance",
            MetaProfileStage::DownloadLoaderManifest => "DownloadLoaderManifest",
            MetaProfileStage::WriteVersionJson => "WriteVersionJson",
            MetaProfileStage::DownloadLibraries => "DownloadLibraries",
        }
    }
}

/// Fabric and Quilt: fetch the loader profile, store it as the instance's
/// version JSON and download its libraries.
pub struct MetaProfileInstaller {
    loader: MetaLoader,
    game_version: String,
    loader_version: String,
    vanilla: Option<Arc<MinecraftInstance>>,
}

impl MetaProfileInstaller {
    pub fn new(
        loader: MetaLoader,
        game_version: impl Into<String>,
        loader_version: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            game_version: game_version.into(),
            loader_version: loader_version.into(),
            vanilla: None,
        }
    }

    /// Inherit from an already installed vanilla instance instead of
    /// installing one.
    pub fn with_vanilla(mut self, vanilla: Arc<MinecraftInstance>) -> Self {
        self.vanilla = Some(vanilla);
        self
    }

    async fn run(
        &self,
        ctx: &InstallContext<'_>,
        tracker: &mut StageTracker<MetaProfileStage>,
        cleanup: &mut InstallCleanup,
    ) -> LauncherResult<MinecraftInstance> {
        tracker.begin(MetaProfileStage::ParseOrInstallVanillaInstance)?;
        let parent = inherit_vanilla(
            ctx,
            self.loader.scope(),
            &self.game_version,
            self.vanilla.as_ref(),
        )
        .await?;

        tracker.begin(MetaProfileStage::DownloadLoaderManifest)?;
        let url = self
            .loader
            .profile_url(ctx, &self.game_version, &self.loader_version);
        let raw = ctx.fetch_text(&url).await.map_err(|e| match e {
            LauncherError::DownloadFailed { url, status } => LauncherError::LoaderApi(format!(
                "{} meta returned {} for {}",
                self.loader.scope(),
                status,
                url
            )),
            other => other,
        })?;
        let profile = VersionJson::parse(&raw)?;
        if profile.main_class.as_deref().unwrap_or_default().is_empty() {
            return Err(LauncherError::LoaderApi(format!(
                "{} profile {} has no main class",
                self.loader.scope(),
                profile.id
            )));
        }

        tracker.begin(MetaProfileStage::WriteVersionJson)?;
        let id = profile.id.clone();
        ensure_relative(Path::new(&id))?;
        cleanup
            .create_dir_all(&ctx.directory.version_dir(&id))
            .await?;
        cleanup.write(&ctx.directory.version_json(&id), &raw).await?;

        tracker.begin(MetaProfileStage::DownloadLibraries)?;
        let libraries = profile.library_dependencies(self.loader.default_maven())?;
        ctx.resolve(tracker, &libraries).await?;

        info!("{} {} installed as {}", self.loader.scope(), self.loader_version, id);
        Ok(MinecraftInstance::modified(
            ctx.directory,
            &id,
            self.loader.loader_type(),
            &self.loader_version,
            parent,
        ))
    }
}

#[async_trait]
impl LoaderInstaller for MetaProfileInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<MinecraftInstance> {
        info!(
            "Installing {} {} for Minecraft {}",
            self.loader.scope(),
            self.loader_version,
            self.game_version
        );
        let mut tracker = ctx.tracker::<MetaProfileStage>(self.loader.scope());
        let mut cleanup = InstallCleanup::new();
        let result = self.run(ctx, &mut tracker, &mut cleanup).await;
        conclude(tracker, cleanup, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::installer::stage::tests::RecordingSink;
    use crate::core::installer::stage::StageProgress;
    use crate::core::installer::testkit::{Fixture, GAME_VERSION};
    use crate::core::instance::InstanceKind;
    use crate::core::test_support::{payload, Served};
    use std::time::Duration;
    use serde_json::json;

    const LOADER: &str = "0.15.0";

    fn serve_fabric(fx: &Fixture) -> String {
        let id = format!("fabric-loader-{LOADER}-{GAME_VERSION}");
        fx.origin.serve(
            "/fabric-maven/net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar",
            payload(3_000),
        );
        fx.origin.serve(
            "/fabric-maven/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar",
            payload(900),
        );
        let profile = json!({
            "id": id,
            "inheritsFrom": GAME_VERSION,
            "type": "release",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "libraries": [
                {"name": "net.fabricmc:fabric-loader:0.15.0", "url": fx.origin.url("/fabric-maven/")},
                {"name": "net.fabricmc:intermediary:1.20.1", "url": fx.origin.url("/fabric-maven/")}
            ]
        });
        fx.origin.serve(
            &format!("/fabric-meta/v2/versions/loader/{GAME_VERSION}/{LOADER}/profile/json"),
            serde_json::to_vec(&profile).unwrap(),
        );
        id
    }

    #[tokio::test]
    async fn installs_vanilla_first_with_scoped_events() {
        let fx = Fixture::start().await;
        fx.serve_vanilla();
        let id = serve_fabric(&fx);
        let sink = Arc::new(RecordingSink::default());

        let instance = MetaProfileInstaller::new(MetaLoader::Fabric, GAME_VERSION, LOADER)
            .install(&fx.context(sink.clone()))
            .await
            .unwrap();

        assert_eq!(instance.id, id);
        assert_eq!(
            instance.kind,
            InstanceKind::Modified {
                loader: LoaderType::Fabric,
                loader_version: LOADER.into()
            }
        );
        assert_eq!(instance.inherits_from.as_ref().unwrap().id, GAME_VERSION);
        assert!(fx.game.version_json(&id).exists());
        assert!(fx
            .game
            .libraries_dir()
            .join("net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar")
            .exists());

        assert_eq!(sink.terminals(&["fabric"]).len(), MetaProfileStage::ALL.len());
        assert_eq!(sink.terminals(&["fabric", "vanilla"]).len(), 4);
    }

    #[tokio::test]
    async fn supplied_vanilla_is_reused_without_nested_run() {
        let fx = Fixture::start().await;
        let id = serve_fabric(&fx);
        let vanilla = Arc::new(MinecraftInstance::vanilla(&fx.game, GAME_VERSION));
        let sink = Arc::new(RecordingSink::default());

        let instance = MetaProfileInstaller::new(MetaLoader::Fabric, GAME_VERSION, LOADER)
            .with_vanilla(vanilla.clone())
            .install(&fx.context(sink.clone()))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(instance.inherits_from.as_ref().unwrap(), &vanilla));
        assert!(sink.of(&["fabric", "vanilla"]).is_empty());
        assert!(fx.game.version_json(&id).exists());
    }

    #[tokio::test]
    async fn unknown_loader_fails_and_keeps_inherited_vanilla() {
        let fx = Fixture::start().await;
        fx.serve_vanilla();
        let sink = Arc::new(RecordingSink::default());

        let err = MetaProfileInstaller::new(MetaLoader::Quilt, GAME_VERSION, "9.9.9")
            .install(&fx.context(sink.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("DownloadLoaderManifest"));
        assert_eq!(
            sink.terminals(&["quilt"]),
            vec![
                ("ParseOrInstallVanillaInstance", StageProgress::Finished),
                ("DownloadLoaderManifest", StageProgress::Failed),
            ]
        );
        assert!(fx.game.version_json(GAME_VERSION).exists());
        assert!(fx.game.client_jar(GAME_VERSION).exists());
    }

    #[tokio::test]
    async fn cancel_during_libraries_keeps_the_vanilla_parent() {
        let fx = Fixture::start().await;
        fx.serve_vanilla();
        let id = serve_fabric(&fx);
        let vanilla = Arc::new(
            crate::core::installer::VanillaInstaller::new(GAME_VERSION)
                .install(&fx.context(Arc::new(RecordingSink::default())))
                .await
                .unwrap(),
        );
        fx.origin.serve_with(
            "/fabric-maven/net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar",
            Served {
                delay: Some(Duration::from_millis(100)),
                ..Served::file(payload(3_000))
            },
        );
        let sink = Arc::new(RecordingSink::default());
        let watcher = fx.cancel_on_start(sink.clone(), &["fabric"], "DownloadLibraries");

        let err = MetaProfileInstaller::new(MetaLoader::Fabric, GAME_VERSION, LOADER)
            .with_vanilla(vanilla.clone())
            .install(&fx.context(sink.clone()))
            .await
            .unwrap_err();
        watcher.await.unwrap();

        assert!(matches!(err, LauncherError::Cancelled));
        assert_eq!(
            sink.terminals(&["fabric"]).last(),
            Some(&("DownloadLibraries", StageProgress::Failed))
        );
        assert!(!fx.game.version_dir(&id).exists());
        assert!(fx.game.version_json(GAME_VERSION).exists());
        assert!(fx.game.client_jar(GAME_VERSION).exists());
        assert!(vanilla.is_present());
    }
}
