use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::dependency::GameDirectory;

/// Supported mod loaders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Vanilla,
    Forge,
    Fabric,
    NeoForge,
    Quilt,
    OptiFine,
}

impl std::fmt::Display for LoaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoaderType::Vanilla => "vanilla",
            LoaderType::Forge => "forge",
            LoaderType::Fabric => "fabric",
            LoaderType::NeoForge => "neoforge",
            LoaderType::Quilt => "quilt",
            LoaderType::OptiFine => "optifine",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKind {
    Vanilla,
    /// A loader layered over the vanilla instance it inherits from.
    Modified {
        loader: LoaderType,
        loader_version: String,
    },
}

/// An installed version folder under `<root>/versions/<id>/`.
///
/// A modified instance keeps a shared reference to the vanilla instance it
/// borrows the client jar and assets from; it never owns or deletes it.
#[derive(Debug, Clone)]
pub struct MinecraftInstance {
    pub id: String,
    pub kind: InstanceKind,
    pub manifest_path: PathBuf,
    pub client_jar_path: PathBuf,
    pub inherits_from: Option<Arc<MinecraftInstance>>,
    pub installed_at: DateTime<Utc>,
}

impl MinecraftInstance {
    pub fn vanilla(directory: &GameDirectory, id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: InstanceKind::Vanilla,
            manifest_path: directory.version_json(id),
            client_jar_path: directory.client_jar(id),
            inherits_from: None,
            installed_at: Utc::now(),
        }
    }

    /// A loader instance. Its client binary is the inherited one unless the
    /// loader writes its own jar.
    pub fn modified(
        directory: &GameDirectory,
        id: &str,
        loader: LoaderType,
        loader_version: &str,
        parent: Arc<MinecraftInstance>,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind: InstanceKind::Modified {
                loader,
                loader_version: loader_version.to_string(),
            },
            manifest_path: directory.version_json(id),
            client_jar_path: parent.client_jar_path.clone(),
            inherits_from: Some(parent),
            installed_at: Utc::now(),
        }
    }

    pub fn loader(&self) -> LoaderType {
        match &self.kind {
            InstanceKind::Vanilla => LoaderType::Vanilla,
            InstanceKind::Modified { loader, .. } => *loader,
        }
    }

    /// The vanilla game version at the root of the inheritance chain.
    pub fn game_version(&self) -> &str {
        match &self.inherits_from {
            Some(parent) => parent.game_version(),
            None => &self.id,
        }
    }

    /// Whether the manifest (and client jar, for vanilla) are on disk.
    pub fn is_present(&self) -> bool {
        self.manifest_path.is_file() && self.client_jar_path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_instance_borrows_parent_client() {
        let dir = GameDirectory::new("/mc");
        let vanilla = Arc::new(MinecraftInstance::vanilla(&dir, "1.20.1"));
        let fabric = MinecraftInstance::modified(
            &dir,
            "fabric-loader-0.15.0-1.20.1",
            LoaderType::Fabric,
            "0.15.0",
            vanilla.clone(),
        );

        assert_eq!(fabric.client_jar_path, vanilla.client_jar_path);
        assert_eq!(fabric.game_version(), "1.20.1");
        assert_eq!(fabric.loader(), LoaderType::Fabric);
        assert_eq!(
            fabric.manifest_path,
            PathBuf::from("/mc/versions/fabric-loader-0.15.0-1.20.1/fabric-loader-0.15.0-1.20.1.json")
        );
        assert_eq!(LoaderType::NeoForge.to_string(), "neoforge");
    }
}
