use std::path::PathBuf;

use crate::core::maven::MavenArtifact;

/// One required file of an installation.
///
/// `base_path`, `file_path` and `url` are pure functions of the variant's
/// fields; there is no way to set them independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Library {
        artifact: MavenArtifact,
        /// Maven repository base used when no explicit `url` is known.
        repository: String,
        /// Download URL taken verbatim from a version document. Empty means
        /// the file is not downloadable and must be provided locally.
        url: Option<String>,
        /// Path under `libraries/` taken verbatim from a version document.
        path: Option<String>,
        sha1: Option<String>,
        size: Option<u64>,
    },
    Asset {
        hash: String,
        size: u64,
        resources_url: String,
    },
    AssetIndex {
        id: String,
        url: String,
        sha1: Option<String>,
        size: Option<u64>,
    },
    Client {
        version_id: String,
        url: String,
        sha1: Option<String>,
        size: Option<u64>,
    },
}

impl Dependency {
    /// A library resolved through `repository` with nothing to verify but existence.
    pub fn library(artifact: MavenArtifact, repository: impl Into<String>) -> Self {
        Dependency::Library {
            artifact,
            repository: repository.into(),
            url: None,
            path: None,
            sha1: None,
            size: None,
        }
    }

    /// Category folder under the game root.
    pub fn base_path(&self) -> PathBuf {
        match self {
            Dependency::Library { .. } => PathBuf::from("libraries"),
            Dependency::Asset { .. } => ["assets", "objects"].iter().collect(),
            Dependency::AssetIndex { .. } => ["assets", "indexes"].iter().collect(),
            Dependency::Client { .. } => PathBuf::from("versions"),
        }
    }

    /// Path relative to [`Self::base_path`].
    pub fn file_path(&self) -> PathBuf {
        match self {
            Dependency::Library {
                path: Some(path), ..
            } if !path.is_empty() => path.split('/').collect(),
            Dependency::Library { artifact, .. } => artifact.local_path(),
            Dependency::Asset { hash, .. } => {
                let prefix = hash.get(..2).unwrap_or(hash);
                [prefix, hash.as_str()].iter().collect()
            }
            Dependency::AssetIndex { id, .. } => PathBuf::from(format!("{id}.json")),
            Dependency::Client { version_id, .. } => {
                [version_id.clone(), format!("{version_id}.jar")].iter().collect()
            }
        }
    }

    pub fn url(&self) -> String {
        match self {
            Dependency::Library { url: Some(url), .. } => url.clone(),
            Dependency::Library {
                artifact,
                repository,
                ..
            } => artifact.url(repository),
            Dependency::Asset {
                hash,
                resources_url,
                ..
            } => {
                let prefix = hash.get(..2).unwrap_or(hash);
                format!("{}/{}/{}", resources_url.trim_end_matches('/'), prefix, hash)
            }
            Dependency::AssetIndex { url, .. } | Dependency::Client { url, .. } => url.clone(),
        }
    }

    /// Whether the file can be fetched at all.
    pub fn is_downloadable(&self) -> bool {
        !self.url().is_empty()
    }

    pub fn sha1(&self) -> Option<&str> {
        match self {
            Dependency::Asset { hash, .. } => Some(hash),
            Dependency::Library { sha1, .. }
            | Dependency::AssetIndex { sha1, .. }
            | Dependency::Client { sha1, .. } => sha1.as_deref(),
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            Dependency::Asset { size, .. } => Some(*size),
            Dependency::Library { size, .. }
            | Dependency::AssetIndex { size, .. }
            | Dependency::Client { size, .. } => *size,
        }
    }

    /// Human-readable identity for logs and error lists.
    pub fn name(&self) -> String {
        match self {
            Dependency::Library { artifact, .. } => artifact.to_string(),
            Dependency::Asset { hash, .. } => hash.clone(),
            Dependency::AssetIndex { id, .. } => format!("asset index {id}"),
            Dependency::Client { version_id, .. } => format!("client {version_id}"),
        }
    }
}
