use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::downloader::{MirrorSelector, NoMirror, PrefixMirror};
use crate::core::error::{LauncherError, LauncherResult};

const SETTINGS_FILE: &str = "engine_settings.json";
const GAME_DIR_NAME: &str = ".minecraft";

/// Which origin rewrite table downloads go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorPreference {
    Official,
    Bmclapi,
}

/// Every tunable knob of the engine, persisted as `engine_settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // ── Downloader ──
    pub chunk_size: u64,
    pub workers_per_download_task: usize,
    pub concurrent_download_tasks: usize,
    pub max_retry_count: u32,
    pub max_redirects: usize,
    pub buffer_size: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,

    // ── Resolver ──
    pub file_verification_parallelism: usize,
    /// Turn a partially failed dependency batch into a hard error.
    pub check_all_dependencies: bool,

    pub mirror: MirrorPreference,

    // ── Metadata endpoints ──
    pub version_manifest_url: String,
    pub mojang_libraries_url: String,
    pub resources_url: String,
    pub fabric_meta_url: String,
    pub quilt_meta_url: String,
    pub forge_maven_url: String,
    pub neoforge_maven_url: String,
    /// OptiFine download template with `{mc}`, `{type}` and `{patch}` slots.
    pub optifine_download_url: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            workers_per_download_task: 16,
            concurrent_download_tasks: 64,
            max_retry_count: 3,
            max_redirects: 10,
            buffer_size: 64 * 1024,
            connect_timeout_secs: 15,
            read_timeout_secs: 60,
            user_agent: format!("launcher-engine/{}", env!("CARGO_PKG_VERSION")),
            file_verification_parallelism: 32,
            check_all_dependencies: false,
            mirror: MirrorPreference::Official,
            version_manifest_url:
                "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json".into(),
            mojang_libraries_url: crate::core::maven::MOJANG_LIBRARIES.into(),
            resources_url: "https://resources.download.minecraft.net".into(),
            fabric_meta_url: "https://meta.fabricmc.net/v2".into(),
            quilt_meta_url: "https://meta.quiltmc.org/v3".into(),
            forge_maven_url: crate::core::maven::FORGE_MAVEN.into(),
            neoforge_maven_url: crate::core::maven::NEOFORGE_MAVEN.into(),
            optifine_download_url: "https://bmclapi2.bangbang93.com/optifine/{mc}/{type}/{patch}"
                .into(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> LauncherResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| LauncherError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load `engine_settings.json` from `dir`, or defaults when it is absent or unreadable.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE);
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("Ignoring unreadable settings at {:?}: {}", path, e);
                }
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| LauncherError::io(path, e))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Build the mirror strategy selected by [`EngineSettings::mirror`].
    pub fn mirror_selector(&self) -> std::sync::Arc<dyn MirrorSelector> {
        match self.mirror {
            MirrorPreference::Official => std::sync::Arc::new(NoMirror),
            MirrorPreference::Bmclapi => std::sync::Arc::new(PrefixMirror::bmclapi()),
        }
    }
}

/// Default game root (`<data dir>/.minecraft`).
pub fn default_game_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(GAME_DIR_NAME)
}

/// Default location of the settings file inside a game root.
pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "max_retry_count": 7, "mirror": "bmclapi" }"#).unwrap();

        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.max_retry_count, 7);
        assert_eq!(settings.mirror, MirrorPreference::Bmclapi);
        assert_eq!(settings.chunk_size, 1024 * 1024);
        assert!(!settings.check_all_dependencies);
    }

    #[test]
    fn save_then_load_or_default_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::default();
        settings.workers_per_download_task = 4;
        settings.save(&settings_path(dir.path())).unwrap();

        let loaded = EngineSettings::load_or_default(dir.path());
        assert_eq!(loaded.workers_per_download_task, 4);
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = EngineSettings::load_or_default(dir.path());
        assert_eq!(loaded.file_verification_parallelism, 32);
    }
}
