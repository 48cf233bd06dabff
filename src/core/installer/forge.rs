use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::context::InstallContext;
use super::installer::LoaderInstaller;
use super::processor::{read_main_class, Processor};
use super::stage::{conclude, InstallCleanup, InstallStage, StageTracker};
use super::vanilla::inherit_vanilla;
use crate::core::dependency::{ensure_relative, join_confined, sha1_file, Dependency};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{LoaderType, MinecraftInstance};
use crate::core::maven::MavenArtifact;
use crate::core::version::{current_os_name, LibraryEntry, VersionJson};

/// Loaders distributed as an installer jar with an `install_profile.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileLoader {
    Forge,
    NeoForge,
}

impl ProfileLoader {
    fn scope(self) -> &'static str {
        match self {
            ProfileLoader::Forge => "forge",
            ProfileLoader::NeoForge => "neoforge",
        }
    }

    fn loader_type(self) -> LoaderType {
        match self {
            ProfileLoader::Forge => LoaderType::Forge,
            ProfileLoader::NeoForge => LoaderType::NeoForge,
        }
    }

    fn maven<'a>(self, ctx: &InstallContext<'a>) -> &'a str {
        match self {
            ProfileLoader::Forge => &ctx.settings.forge_maven_url,
            ProfileLoader::NeoForge => &ctx.settings.neoforge_maven_url,
        }
    }

    /// Installer coordinates to try, in order. NeoForge for 1.20.1 was still
    /// published as `net.neoforged:forge`.
    fn installer_artifacts(self, game: &str, loader: &str) -> LauncherResult<Vec<MavenArtifact>> {
        let coords = match self {
            ProfileLoader::Forge => {
                vec![format!("net.minecraftforge:forge:{game}-{loader}:installer")]
            }
            ProfileLoader::NeoForge => vec![
                format!("net.neoforged:neoforge:{loader}:installer"),
                format!("net.neoforged:forge:{game}-{loader}:installer"),
            ],
        };
        coords.iter().map(|c| MavenArtifact::parse(c)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallProfileStage {
    ParseOrInstallVanillaInstance,
    DownloadInstaller,
    ParseInstallProfile,
    WriteVersionJson,
    DownloadLibraries,
    RunCompileProcess,
}

impl InstallStage for InstallProfileStage {
    const ALL: &'static [Self] = &[
        InstallProfileStage::ParseOrInstallVanillaInstance,
        InstallProfileStage::DownloadInstaller,
        InstallProfileStage::ParseInstallProfile,
        InstallProfileStage::WriteVersionJson,
        InstallProfileStage::DownloadLibraries,
        InstallProfileStage::RunCompileProcess,
    ];

    fn name(self) -> &'static str {
        match self {
            InstallProfileStage::ParseOrInstallVanillaInstance => "ParseOrInstallVanillaInstance",
            InstallProfileStage::DownloadInstaller => "DownloadInstaller",
            InstallProfileStage::ParseInstallProfile => "ParseInstallProfile",
            InstallProfileStage::WriteVersionJson => "WriteVersionJson",
            InstallProfileStage::DownloadLibraries => "DownloadLibraries",
            InstallProfileStage::RunCompileProcess => "RunCompileProcess",
        }
    }
}

/// Subset of `install_profile.json` (spec 0 and 1 layouts).
#[derive(Debug, Deserialize)]
struct InstallProfile {
    /// Archive entry of the version JSON, e.g. `/version.json`.
    #[serde(default)]
    json: Option<String>,
    #[serde(default)]
    libraries: Vec<LibraryEntry>,
    #[serde(default)]
    processors: Vec<ProfileProcessor>,
    #[serde(default)]
    data: HashMap<String, SidedData>,
}

#[derive(Debug, Deserialize)]
struct SidedData {
    #[serde(default)]
    client: String,
}

#[derive(Debug, Deserialize)]
struct ProfileProcessor {
    jar: String,
    #[serde(default)]
    sides: Option<Vec<String>>,
    #[serde(default)]
    classpath: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
    /// Output path to expected SHA-1, both subject to substitution.
    #[serde(default)]
    outputs: HashMap<String, String>,
}

impl ProfileProcessor {
    fn runs_on_client(&self) -> bool {
        self.sides
            .as_ref()
            .map_or(true, |sides| sides.iter().any(|s| s == "client"))
    }
}

fn parse_install_profile(raw: &[u8]) -> LauncherResult<InstallProfile> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    if value.get("install").is_some() && value.get("versionInfo").is_some() {
        return Err(LauncherError::Loader(
            "legacy install profiles (Forge 1.12.2 and older) are not supported".into(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

/// A downloaded installer jar, held in memory.
pub(super) struct InstallerArchive(zip::ZipArchive<Cursor<Vec<u8>>>);

impl InstallerArchive {
    pub(super) fn open(bytes: Vec<u8>) -> LauncherResult<Self> {
        Ok(Self(zip::ZipArchive::new(Cursor::new(bytes))?))
    }

    /// Entry contents, `None` if the archive has no such entry.
    pub(super) fn read(&mut self, name: &str) -> LauncherResult<Option<Vec<u8>>> {
        let mut entry = match self.0.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    pub(super) fn read_required(&mut self, name: &str) -> LauncherResult<Vec<u8>> {
        self.read(name)?
            .ok_or_else(|| LauncherError::Loader(format!("installer has no {name}")))
    }
}

/// Forge and NeoForge: run the official installer's steps without its UI.
///
/// The installer jar is downloaded to `<root>/.cache/`, its version JSON is
/// stored as the instance's, libraries are fetched (or taken from the jar's
/// `maven/` folder) and the client-side processors are run with the
/// configured Java. The cached installer is removed afterwards.
pub struct InstallProfileInstaller {
    loader: ProfileLoader,
    game_version: String,
    loader_version: String,
    vanilla: Option<Arc<MinecraftInstance>>,
}

impl InstallProfileInstaller {
    pub fn new(
        loader: ProfileLoader,
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

    pub fn with_vanilla(mut self, vanilla: Arc<MinecraftInstance>) -> Self {
        self.vanilla = Some(vanilla);
        self
    }

    async fn run(
        &self,
        ctx: &InstallContext<'_>,
        tracker: &mut StageTracker<InstallProfileStage>,
        cleanup: &mut InstallCleanup,
    ) -> LauncherResult<MinecraftInstance> {
        let dir = ctx.directory;

        tracker.begin(InstallProfileStage::ParseOrInstallVanillaInstance)?;
        let parent = inherit_vanilla(
            ctx,
            self.loader.scope(),
            &self.game_version,
            self.vanilla.as_ref(),
        )
        .await?;

        tracker.begin(InstallProfileStage::DownloadInstaller)?;
        let installer_path = self.download_installer(ctx, cleanup).await?;

        tracker.begin(InstallProfileStage::ParseInstallProfile)?;
        let bytes = tokio::fs::read(&installer_path)
            .await
            .map_err(|e| LauncherError::io(&installer_path, e))?;
        let mut archive = InstallerArchive::open(bytes)?;
        let profile = parse_install_profile(&archive.read_required("install_profile.json")?)?;
        let entry = profile
            .json
            .as_deref()
            .unwrap_or("/version.json")
            .trim_start_matches('/')
            .to_string();
        let version_raw = String::from_utf8(archive.read_required(&entry)?)
            .map_err(|e| LauncherError::Loader(format!("{entry} is not UTF-8: {e}")))?;
        let version = VersionJson::parse(&version_raw)?;
        if version.main_class.as_deref().unwrap_or_default().is_empty() {
            return Err(LauncherError::Loader(format!(
                "{} has no main class",
                version.id
            )));
        }

        tracker.begin(InstallProfileStage::WriteVersionJson)?;
        let id = version.id.clone();
        ensure_relative(Path::new(&id))?;
        cleanup.create_dir_all(&dir.version_dir(&id)).await?;
        cleanup.write(&dir.version_json(&id), &version_raw).await?;

        tracker.begin(InstallProfileStage::DownloadLibraries)?;
        let maven = self.loader.maven(ctx);
        let os = current_os_name();
        let mut libraries = version.library_dependencies_for(os, maven)?;
        for lib in profile.libraries.iter().filter(|l| l.is_allowed_for(os)) {
            libraries.extend(lib.dependencies_for(os, maven)?);
        }
        let (bundled, remote): (Vec<_>, Vec<_>) =
            libraries.into_iter().partition(|dep| !dep.is_downloadable());
        extract_bundled(ctx, &mut archive, &bundled, cleanup).await?;
        ctx.resolve(tracker, &remote).await?;

        let processors: Vec<&ProfileProcessor> = profile
            .processors
            .iter()
            .filter(|p| p.runs_on_client())
            .collect();
        if processors.is_empty() {
            tracker.skip(InstallProfileStage::RunCompileProcess);
        } else {
            tracker.begin(InstallProfileStage::RunCompileProcess)?;
            let work_dir = installer_path.with_file_name(format!("{id}-data"));
            cleanup.track(&work_dir);
            let vars = self
                .processor_variables(ctx, &mut archive, &profile, &parent, &installer_path, &work_dir)
                .await?;
            run_processors(ctx, tracker, &processors, &vars).await?;
            remove_quietly(&work_dir).await;
        }

        remove_quietly(&installer_path).await;
        info!("{} {} installed as {}", self.loader.scope(), self.loader_version, id);
        Ok(MinecraftInstance::modified(
            dir,
            &id,
            self.loader.loader_type(),
            &self.loader_version,
            parent,
        ))
    }

    async fn download_installer(
        &self,
        ctx: &InstallContext<'_>,
        cleanup: &mut InstallCleanup,
    ) -> LauncherResult<PathBuf> {
        let cache = ctx.directory.root().join(".cache");
        cleanup.create_dir_all(&cache).await?;

        let mut last_error = None;
        for artifact in self
            .loader
            .installer_artifacts(&self.game_version, &self.loader_version)?
        {
            let url = artifact.url(self.loader.maven(ctx));
            let dest = cache.join(artifact.file_name());
            cleanup.track(&dest);
            match ctx.download_file(&url, &dest).await {
                Ok(()) => return Ok(dest),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("No installer at {}: {}", url, e);
                    remove_quietly(&dest).await;
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            LauncherError::Loader(format!("no installer for {}", self.loader_version))
        }))
    }

    /// Built-in variables plus the client side of the profile's `data`.
    async fn processor_variables(
        &self,
        ctx: &InstallContext<'_>,
        archive: &mut InstallerArchive,
        profile: &InstallProfile,
        parent: &MinecraftInstance,
        installer_path: &Path,
        work_dir: &Path,
    ) -> LauncherResult<HashMap<String, String>> {
        let dir = ctx.directory;
        let libraries = dir.libraries_dir();
        let mut vars: HashMap<String, String> = [
            ("SIDE", "client".to_string()),
            ("MINECRAFT_JAR", display(&parent.client_jar_path)),
            ("MINECRAFT_VERSION", self.game_version.clone()),
            ("ROOT", display(dir.root())),
            ("INSTALLER", display(installer_path)),
            ("LIBRARY_DIR", display(&libraries)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut data = HashMap::new();
        for (key, value) in &profile.data {
            let resolved = match value.client.strip_prefix('/') {
                Some(entry) => {
                    let bytes = archive.read_required(entry)?;
                    let dest = join_confined(work_dir, Path::new(entry))?;
                    if let Some(parent) = dest.parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| LauncherError::io(parent, e))?;
                    }
                    tokio::fs::write(&dest, bytes)
                        .await
                        .map_err(|e| LauncherError::io(&dest, e))?;
                    display(&dest)
                }
                None => expand(&value.client, &vars, &libraries)?,
            };
            data.insert(key.clone(), resolved);
        }
        for (key, value) in data {
            vars.entry(key).or_insert(value);
        }
        Ok(vars)
    }
}

#[async_trait]
impl LoaderInstaller for InstallProfileInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<MinecraftInstance> {
        info!(
            "Installing {} {} for Minecraft {}",
            self.loader.scope(),
            self.loader_version,
            self.game_version
        );
        let mut tracker = ctx.tracker::<InstallProfileStage>(self.loader.scope());
        let mut cleanup = InstallCleanup::new();
        let result = self.run(ctx, &mut tracker, &mut cleanup).await;
        conclude(tracker, cleanup, result).await
    }
}

/// Write libraries shipped inside the installer's `maven/` folder.
async fn extract_bundled(
    ctx: &InstallContext<'_>,
    archive: &mut InstallerArchive,
    bundled: &[Dependency],
    cleanup: &mut InstallCleanup,
) -> LauncherResult<()> {
    for dep in bundled {
        let dest = ctx.directory.path_of(dep)?;
        if dest.exists() {
            continue;
        }
        let entry = format!("maven/{}", archive_path(&dep.file_path()));
        match archive.read(&entry)? {
            Some(bytes) => {
                debug!("Extracting {} from installer", entry);
                cleanup.write(&dest, bytes).await?;
            }
            None => warn!("{} is neither downloadable nor bundled", dep.name()),
        }
    }
    Ok(())
}

async fn run_processors(
    ctx: &InstallContext<'_>,
    tracker: &StageTracker<InstallProfileStage>,
    processors: &[&ProfileProcessor],
    vars: &HashMap<String, String>,
) -> LauncherResult<()> {
    let libraries = ctx.directory.libraries_dir();
    tracker.set_total(processors.len() as u64);

    for (done, step) in processors.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        let outputs = step
            .outputs
            .iter()
            .map(|(path, sha1)| Ok((expand(path, vars, &libraries)?, expand(sha1, vars, &libraries)?)))
            .collect::<LauncherResult<Vec<_>>>()?;

        if outputs_up_to_date(outputs).await {
            debug!("Outputs of {} are up to date", step.jar);
        } else {
            let jar = library_path(&libraries, &step.jar)?;
            let processor = Processor {
                name: step.jar.clone(),
                main_class: read_main_class(&jar)?,
                jar,
                classpath: step
                    .classpath
                    .iter()
                    .map(|c| library_path(&libraries, c))
                    .collect::<LauncherResult<_>>()?,
                args: step
                    .args
                    .iter()
                    .map(|a| expand(a, vars, &libraries))
                    .collect::<LauncherResult<_>>()?,
            };
            processor
                .run(ctx.java, ctx.directory.root(), ctx.cancel)
                .await?;
        }
        tracker.set_finished(done as u64 + 1);
    }
    Ok(())
}

/// True when every declared output exists with its expected SHA-1.
async fn outputs_up_to_date(outputs: Vec<(String, String)>) -> bool {
    if outputs.is_empty() {
        return false;
    }
    tokio::task::spawn_blocking(move || {
        outputs.iter().all(|(path, expected)| {
            sha1_file(Path::new(path)).is_ok_and(|actual| actual.eq_ignore_ascii_case(expected))
        })
    })
    .await
    .unwrap_or(false)
}

/// `[coordinate]` becomes a library path, `'text'` becomes `text`, anything
/// else has its `{KEY}` references replaced.
fn expand(value: &str, vars: &HashMap<String, String>, libraries: &Path) -> LauncherResult<String> {
    if let Some(coord) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        return Ok(display(&library_path(libraries, coord)?));
    }
    if let Some(literal) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        return Ok(literal.to_string());
    }
    substitute(value, vars)
}

fn substitute(value: &str, vars: &HashMap<String, String>) -> LauncherResult<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let key = &after[..end];
        let replacement = vars.get(key).ok_or_else(|| {
            LauncherError::Loader(format!("unknown processor variable {{{key}}}"))
        })?;
        out.push_str(replacement);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn library_path(libraries: &Path, coord: &str) -> LauncherResult<PathBuf> {
    join_confined(libraries, &MavenArtifact::parse(coord)?.local_path())
}

/// Forward-slash form of a relative path, as stored in jar entries.
fn archive_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(super) fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(super) async fn remove_quietly(path: &Path) {
    let removed = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match removed {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {:?}: {}", path, e),
    }
}
