use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::context::InstallContext;
use super::forge::{display, remove_quietly, InstallerArchive};
use super::installer::LoaderInstaller;
use super::processor::Processor;
use super::stage::{conclude, InstallCleanup, InstallStage, StageTracker};
use super::vanilla::inherit_vanilla;
use crate::core::dependency::{join_confined, Dependency};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{LoaderType, MinecraftInstance};
use crate::core::maven::MavenArtifact;

const LAUNCH_WRAPPER_MAIN: &str = "net.minecraft.launchwrapper.Launch";
const TWEAK_CLASS: &str = "optifine.OptiFineTweaker";
const PATCHER_CLASS: &str = "optifine.Patcher";
/// Used when the installer does not bundle its own launchwrapper build.
const MOJANG_LAUNCH_WRAPPER: &str = "net.minecraft:launchwrapper:1.12";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptiFineStage {
    ParseOrInstallVanillaInstance,
    DownloadInstaller,
    WriteVersionJson,
    DownloadLibraries,
    RunCompileProcess,
}

impl InstallStage for OptiFineStage {
    const ALL: &'static [Self] = &[
        OptiFineStage::ParseOrInstallVanillaInstance,
        OptiFineStage::DownloadInstaller,
        OptiFineStage::WriteVersionJson,
        OptiFineStage::DownloadLibraries,
        OptiFineStage::RunCompileProcess,
    ];

    fn name(self) -> &'static str {
        match self {
            OptiFineStage::ParseOrInstallVanillaInstance => "ParseOrInstallVanillaInstance",
            OptiFineStage::DownloadInstaller => "DownloadInstaller",
            OptiFineStage::WriteVersionJson => "WriteVersionJson",
            OptiFineStage::DownloadLibraries => "DownloadLibraries",
            OptiFineStage::RunCompileProcess => "RunCompileProcess",
        }
    }
}

/// OptiFine as a launchwrapper tweak over vanilla.
///
/// `edition` is the full OptiFine name without the game version, e.g.
/// `HD_U_I6`: everything before the last `_` is the type, the rest the patch.
pub struct OptiFineInstaller {
    game_version: String,
    edition: String,
    vanilla: Option<Arc<MinecraftInstance>>,
}

impl OptiFineInstaller {
    pub fn new(game_version: impl Into<String>, edition: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            edition: edition.into(),
            vanilla: None,
        }
    }

    pub fn with_vanilla(mut self, vanilla: Arc<MinecraftInstance>) -> Self {
        self.vanilla = Some(vanilla);
        self
    }

    fn download_url(&self, template: &str) -> LauncherResult<String> {
        let (kind, patch) = self
            .edition
            .rsplit_once('_')
            .filter(|(kind, patch)| !kind.is_empty() && !patch.is_empty())
            .ok_or_else(|| {
                LauncherError::InvalidArgument(format!(
                    "OptiFine edition {} is not of the form TYPE_PATCH",
                    self.edition
                ))
            })?;
        Ok(template
            .replace("{mc}", &self.game_version)
            .replace("{type}", kind)
            .replace("{patch}", patch))
    }

    fn library(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&format!(
            "optifine:OptiFine:{}_{}",
            self.game_version, self.edition
        ))
    }

    async fn run(
        &self,
        ctx: &InstallContext<'_>,
        tracker: &mut StageTracker<OptiFineStage>,
        cleanup: &mut InstallCleanup,
    ) -> LauncherResult<MinecraftInstance> {
        let dir = ctx.directory;
        let libraries = dir.libraries_dir();

        tracker.begin(OptiFineStage::ParseOrInstallVanillaInstance)?;
        let parent = inherit_vanilla(ctx, "optifine", &self.game_version, self.vanilla.as_ref()).await?;

        tracker.begin(OptiFineStage::DownloadInstaller)?;
        let url = self.download_url(&ctx.settings.optifine_download_url)?;
        let cache = dir.root().join(".cache");
        cleanup.create_dir_all(&cache).await?;
        let installer_path = cache.join(format!("OptiFine_{}_{}.jar", self.game_version, self.edition));
        cleanup.track(&installer_path);
        ctx.download_file(&url, &installer_path).await?;
        let bytes = tokio::fs::read(&installer_path)
            .await
            .map_err(|e| LauncherError::io(&installer_path, e))?;
        let mut archive = InstallerArchive::open(bytes)?;

        tracker.begin(OptiFineStage::WriteVersionJson)?;
        let bundled_wrapper = archive
            .read("launchwrapper-of.txt")?
            .map(|raw| String::from_utf8_lossy(&raw).trim().to_string());
        let wrapper = match &bundled_wrapper {
            Some(version) => MavenArtifact::parse(&format!("optifine:launchwrapper-of:{version}"))?,
            None => MavenArtifact::parse(MOJANG_LAUNCH_WRAPPER)?,
        };
        let optifine = self.library()?;
        let id = format!("{}-OptiFine_{}", self.game_version, self.edition);
        let raw = self.version_json(&id, &parent, &optifine, &wrapper).await?;
        cleanup.create_dir_all(&dir.version_dir(&id)).await?;
        cleanup.write(&dir.version_json(&id), raw).await?;

        tracker.begin(OptiFineStage::DownloadLibraries)?;
        match &bundled_wrapper {
            Some(version) => {
                let dest = join_confined(&libraries, &wrapper.local_path())?;
                if !dest.exists() {
                    let jar = archive.read_required(&format!("launchwrapper-of-{version}.jar"))?;
                    cleanup.write(&dest, jar).await?;
                }
            }
            None => {
                let dependency = Dependency::library(wrapper, &ctx.settings.mojang_libraries_url);
                ctx.resolve(tracker, std::slice::from_ref(&dependency)).await?;
            }
        }

        let library_path = libraries.join(optifine.local_path());
        if let Some(parent_dir) = library_path.parent() {
            cleanup.create_dir_all(parent_dir).await?;
        }
        cleanup.track(&library_path);
        if archive.read("optifine/Patcher.class")?.is_some() {
            tracker.begin(OptiFineStage::RunCompileProcess)?;
            let patcher = Processor {
                name: PATCHER_CLASS.to_string(),
                jar: installer_path.clone(),
                classpath: Vec::new(),
                main_class: PATCHER_CLASS.to_string(),
                args: vec![
                    display(&parent.client_jar_path),
                    display(&installer_path),
                    display(&library_path),
                ],
            };
            patcher.run(ctx.java, dir.root(), ctx.cancel).await?;
        } else {
            debug!("OptiFine {} ships unpatched; using the installer as the library", self.edition);
            tokio::fs::copy(&installer_path, &library_path)
                .await
                .map_err(|e| LauncherError::io(&library_path, e))?;
            tracker.skip(OptiFineStage::RunCompileProcess);
        }

        remove_quietly(&installer_path).await;
        info!("OptiFine {} installed as {}", self.edition, id);
        Ok(MinecraftInstance::modified(
            dir,
            &id,
            LoaderType::OptiFine,
            &self.edition,
            parent,
        ))
    }

    /// Launchwrapper version JSON. Pre-1.13 parents pass game arguments as
    /// one `minecraftArguments` string, newer ones as an `arguments` list.
    async fn version_json(
        &self,
        id: &str,
        parent: &MinecraftInstance,
        optifine: &MavenArtifact,
        wrapper: &MavenArtifact,
    ) -> LauncherResult<String> {
        let parent_raw = tokio::fs::read_to_string(&parent.manifest_path)
            .await
            .map_err(|e| LauncherError::io(&parent.manifest_path, e))?;
        let parent_json: serde_json::Value = serde_json::from_str(&parent_raw)?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut version = json!({
            "id": id,
            "inheritsFrom": self.game_version,
            "type": "release",
            "time": now,
            "releaseTime": now,
            "mainClass": LAUNCH_WRAPPER_MAIN,
            "libraries": [
                {"name": optifine.to_string()},
                {"name": wrapper.to_string()}
            ]
        });
        match parent_json.get("minecraftArguments").and_then(|v| v.as_str()) {
            Some(args) => {
                version["minecraftArguments"] = json!(format!("{args} --tweakClass {TWEAK_CLASS}"));
            }
            None => {
                version["arguments"] = json!({"game": ["--tweakClass", TWEAK_CLASS]});
            }
        }
        Ok(serde_json::to_string_pretty(&version)?)
    }
}

#[async_trait]
impl LoaderInstaller for OptiFineInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<MinecraftInstance> {
        info!("Installing OptiFine {} for Minecraft {}", self.edition, self.game_version);
        let mut tracker = ctx.tracker::<OptiFineStage>("optifine");
        let mut cleanup = InstallCleanup::new();
        let result = self.run(ctx, &mut tracker, &mut cleanup).await;
        conclude(tracker, cleanup, result).await
    }
}

/// Where the patched OptiFine jar of an instance lives under `libraries/`.
pub fn optifine_library_path(game_version: &str, edition: &str) -> LauncherResult<PathBuf> {
    Ok(OptiFineInstaller::new(game_version, edition)
        .library()?
        .local_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::installer::stage::tests::RecordingSink;
    use crate::core::installer::stage::StageProgress;
    use crate::core::installer::testkit::{Fixture, GAME_VERSION};
    use crate::core::test_support::payload;
    use std::io::{Cursor, Write};

    const EDITION: &str = "HD_U_I6";
    const ROUTE: &str = "/optifine/1.20.1/HD_U/I6";

    fn zip_bytes(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(&body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// A vanilla parent whose manifest is on disk, without downloading it.
    fn written_vanilla(fx: &Fixture, manifest: serde_json::Value) -> Arc<MinecraftInstance> {
        let vanilla = MinecraftInstance::vanilla(&fx.game, GAME_VERSION);
        std::fs::create_dir_all(fx.game.version_dir(GAME_VERSION)).unwrap();
        std::fs::write(&vanilla.manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();
        Arc::new(vanilla)
    }

    #[test]
    fn edition_splits_at_last_underscore() {
        let installer = OptiFineInstaller::new("1.20.1", "HD_U_I6");
        assert_eq!(
            installer
                .download_url("https://mirror/optifine/{mc}/{type}/{patch}")
                .unwrap(),
            "https://mirror/optifine/1.20.1/HD_U/I6"
        );
        assert!(matches!(
            OptiFineInstaller::new("1.20.1", "I6").download_url("{mc}"),
            Err(LauncherError::InvalidArgument(_))
        ));
        assert_eq!(
            optifine_library_path("1.20.1", "HD_U_I6").unwrap(),
            PathBuf::from("optifine/OptiFine/1.20.1_HD_U_I6/OptiFine-1.20.1_HD_U_I6.jar")
        );
    }

    #[tokio::test]
    async fn unpatched_installer_becomes_the_library_with_bundled_wrapper() {
        let fx = Fixture::start().await;
        let vanilla = written_vanilla(&fx, json!({"id": GAME_VERSION, "arguments": {"game": []}}));
        let wrapper = payload(512);
        let installer = zip_bytes(vec![
            ("optifine/OptiFineTweaker.class", payload(64)),
            ("launchwrapper-of.txt", b"2.3\n".to_vec()),
            ("launchwrapper-of-2.3.jar", wrapper.clone()),
        ]);
        fx.origin.serve(ROUTE, installer.clone());
        let sink = Arc::new(RecordingSink::default());

        let instance = OptiFineInstaller::new(GAME_VERSION, EDITION)
            .with_vanilla(vanilla)
            .install(&fx.context(sink.clone()))
            .await
            .unwrap();

        assert_eq!(instance.id, "1.20.1-OptiFine_HD_U_I6");
        assert_eq!(instance.loader(), LoaderType::OptiFine);
        let libraries = fx.game.libraries_dir();
        assert_eq!(
            std::fs::read(libraries.join(optifine_library_path(GAME_VERSION, EDITION).unwrap()))
                .unwrap(),
            installer
        );
        assert_eq!(
            std::fs::read(libraries.join("optifine/launchwrapper-of/2.3/launchwrapper-of-2.3.jar"))
                .unwrap(),
            wrapper
        );

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&instance.manifest_path).unwrap()).unwrap();
        assert_eq!(written["mainClass"], LAUNCH_WRAPPER_MAIN);
        assert_eq!(written["inheritsFrom"], GAME_VERSION);
        assert_eq!(written["arguments"]["game"], json!(["--tweakClass", TWEAK_CLASS]));
        assert_eq!(written["libraries"][1]["name"], "optifine:launchwrapper-of:2.3");

        assert_eq!(
            sink.terminals(&["optifine"]).last(),
            Some(&("RunCompileProcess", StageProgress::Skipped))
        );
        assert!(!fx
            .game
            .root()
            .join(".cache/OptiFine_1.20.1_HD_U_I6.jar")
            .exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn patcher_writes_the_library_jar() {
        use std::os::unix::fs::PermissionsExt;

        let mut fx = Fixture::start().await;
        let scripts = tempfile::tempdir().unwrap();
        let java = scripts.path().join("fake-java");
        std::fs::write(&java, "#!/bin/sh\n[ \"$3\" = optifine.Patcher ] && printf patched > \"$6\"\n").unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
        fx.java = java;

        let vanilla = written_vanilla(
            &fx,
            json!({"id": GAME_VERSION, "minecraftArguments": "--username ${auth_player_name}"}),
        );
        fx.origin.serve(
            ROUTE,
            zip_bytes(vec![("optifine/Patcher.class", payload(64))]),
        );
        fx.origin.serve(
            "/libraries/net/minecraft/launchwrapper/1.12/launchwrapper-1.12.jar",
            payload(300),
        );
        let sink = Arc::new(RecordingSink::default());

        let instance = OptiFineInstaller::new(GAME_VERSION, EDITION)
            .with_vanilla(vanilla)
            .install(&fx.context(sink.clone()))
            .await
            .unwrap();

        let libraries = fx.game.libraries_dir();
        assert_eq!(
            std::fs::read_to_string(
                libraries.join(optifine_library_path(GAME_VERSION, EDITION).unwrap())
            )
            .unwrap(),
            "patched"
        );
        assert!(libraries
            .join("net/minecraft/launchwrapper/1.12/launchwrapper-1.12.jar")
            .exists());
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&instance.manifest_path).unwrap()).unwrap();
        assert_eq!(
            written["minecraftArguments"],
            "--username ${auth_player_name} --tweakClass optifine.OptiFineTweaker"
        );
        let terminals = sink.terminals(&["optifine"]);
        assert_eq!(terminals.len(), OptiFineStage::ALL.len());
        assert!(terminals.iter().all(|(_, p)| *p == StageProgress::Finished));
    }

    #[tokio::test]
    async fn malformed_edition_fails_before_downloading() {
        let fx = Fixture::start().await;
        let vanilla = written_vanilla(&fx, json!({"id": GAME_VERSION}));
        let sink = Arc::new(RecordingSink::default());

        let err = OptiFineInstaller::new(GAME_VERSION, "I6")
            .with_vanilla(vanilla)
            .install(&fx.context(sink.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some("DownloadInstaller"));
        assert_eq!(fx.origin.total_body_gets(), 0);
        assert!(!fx.game.root().join(".cache").exists());
    }
}
