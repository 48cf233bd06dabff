// ─── Version File ───
// Parses a version JSON (Mojang or loader profile) and evaluates OS rules
// for libraries.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::core::dependency::Dependency;
use crate::core::error::LauncherResult;
use crate::core::maven::MavenArtifact;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: String,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    pub client: Option<DownloadArtifact>,
}

/// A downloadable file as listed in version documents. `url` may be empty
/// for files that only exist inside an installer archive.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    /// Repository base (loader profiles list libraries this way).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    /// OS name → classifier template, e.g. `"windows": "natives-windows-${arch}"`.
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<DownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, DownloadArtifact>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

/// Mojang's name for the running platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

impl LibraryEntry {
    /// Rules are applied top to bottom starting from "disallowed"; the last
    /// matching rule wins. No rules at all means allowed.
    pub fn is_allowed_for(&self, os: &str) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };
        let mut allowed = false;
        for rule in rules {
            let matches = match rule.os.as_ref().and_then(|o| o.name.as_deref()) {
                None => true,
                Some(name) => name == os,
            };
            if matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }

    pub fn native_classifier_for(&self, os: &str) -> Option<String> {
        let template = self.natives.as_ref()?.get(os)?;
        let arch = if cfg!(target_pointer_width = "64") {
            "64"
        } else {
            "32"
        };
        Some(template.replace("${arch}", arch))
    }

    /// Main artifact plus the native classifier for `os`, if any.
    pub fn dependencies_for(
        &self,
        os: &str,
        default_repository: &str,
    ) -> LauncherResult<Vec<Dependency>> {
        let artifact = MavenArtifact::parse(&self.name)?;
        let repository = self
            .url
            .clone()
            .unwrap_or_else(|| default_repository.to_string());
        let mut out = Vec::new();

        let listed = self.downloads.as_ref().and_then(|d| d.artifact.as_ref());
        match listed {
            Some(listed) => out.push(listed_library(&artifact, &repository, listed)),
            // Natives-only entries of old versions carry no main jar.
            None if self.natives.is_none() => out.push(Dependency::Library {
                artifact: artifact.clone(),
                repository: repository.clone(),
                url: None,
                path: None,
                sha1: self.sha1.clone(),
                size: self.size,
            }),
            None => {}
        }

        if let Some(classifier) = self.native_classifier_for(os) {
            let native = artifact.with_classifier(&classifier);
            let listed = self
                .downloads
                .as_ref()
                .and_then(|d| d.classifiers.as_ref())
                .and_then(|c| c.get(&classifier));
            out.push(match listed {
                Some(listed) => listed_library(&native, &repository, listed),
                None => Dependency::library(native, repository),
            });
        }
        Ok(out)
    }
}

fn listed_library(
    artifact: &MavenArtifact,
    repository: &str,
    listed: &DownloadArtifact,
) -> Dependency {
    Dependency::Library {
        artifact: artifact.clone(),
        repository: repository.to_string(),
        url: Some(listed.url.clone()),
        path: listed.path.clone(),
        sha1: listed.sha1.clone(),
        size: listed.size,
    }
}

impl VersionJson {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn client_dependency(&self) -> Option<Dependency> {
        let client = self.downloads.as_ref()?.client.as_ref()?;
        Some(Dependency::Client {
            version_id: self.id.clone(),
            url: client.url.clone(),
            sha1: client.sha1.clone(),
            size: client.size,
        })
    }

    pub fn asset_index_dependency(&self) -> Option<Dependency> {
        let index = self.asset_index.as_ref()?;
        Some(Dependency::AssetIndex {
            id: index.id.clone(),
            url: index.url.clone(),
            sha1: index.sha1.clone(),
            size: index.size,
        })
    }

    /// Libraries allowed on the running OS, natives included.
    pub fn library_dependencies(&self, default_repository: &str) -> LauncherResult<Vec<Dependency>> {
        self.library_dependencies_for(current_os_name(), default_repository)
    }

    pub fn library_dependencies_for(
        &self,
        os: &str,
        default_repository: &str,
    ) -> LauncherResult<Vec<Dependency>> {
        let mut out = Vec::new();
        for lib in &self.libraries {
            if !lib.is_allowed_for(os) {
                debug!("Skipping library (OS rule): {}", lib.name);
                continue;
            }
            out.extend(lib.dependencies_for(os, default_repository)?);
        }
        Ok(out)
    }
}
