use std::path::{Component, Path, PathBuf};

use super::model::Dependency;
use crate::core::error::{LauncherError, LauncherResult};

/// The on-disk layout under one game root.
///
/// ```text
/// <root>/versions/<id>/<id>.json|.jar
/// <root>/libraries/<maven path>
/// <root>/assets/objects/<sha1[0:2]>/<sha1>
/// <root>/assets/indexes/<id>.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDirectory {
    root: PathBuf,
}

impl GameDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn version_json(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.json"))
    }

    pub fn client_jar(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.jar"))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index(&self, id: &str) -> PathBuf {
        self.assets_dir().join("indexes").join(format!("{id}.json"))
    }

    /// Absolute location of a dependency: `<root>/<base_path>/<file_path>`.
    ///
    /// Fails when the document-supplied part would leave its category folder.
    pub fn path_of(&self, dependency: &Dependency) -> LauncherResult<PathBuf> {
        join_confined(&self.root.join(dependency.base_path()), &dependency.file_path())
    }
}

/// Reject paths that are empty, absolute or contain `..`.
pub fn ensure_relative(path: &Path) -> LauncherResult<()> {
    let confined = path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if confined {
        Ok(())
    } else {
        Err(LauncherError::InvalidArgument(format!(
            "unsafe relative path: {}",
            path.display()
        )))
    }
}

/// `base.join(relative)` for a `relative` that came from a version document
/// or installer archive.
pub fn join_confined(base: &Path, relative: &Path) -> LauncherResult<PathBuf> {
    ensure_relative(relative)?;
    Ok(base.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::maven::MavenArtifact;

    #[test]
    fn version_files_share_a_folder() {
        let dir = GameDirectory::new("/games/mc");
        assert_eq!(
            dir.version_json("1.20.1"),
            PathBuf::from("/games/mc/versions/1.20.1/1.20.1.json")
        );
        assert_eq!(
            dir.client_jar("1.20.1"),
            PathBuf::from("/games/mc/versions/1.20.1/1.20.1.jar")
        );
        assert_eq!(
            dir.asset_index("5"),
            PathBuf::from("/games/mc/assets/indexes/5.json")
        );
    }

    #[test]
    fn document_paths_cannot_leave_the_root() {
        let dir = GameDirectory::new("/games/mc");
        let escaping = Dependency::Library {
            artifact: MavenArtifact::parse("com.example:lib:1.0").unwrap(),
            repository: "https://maven.example".into(),
            url: None,
            path: Some("../../outside.txt".into()),
            sha1: None,
            size: None,
        };
        assert!(matches!(
            dir.path_of(&escaping),
            Err(LauncherError::InvalidArgument(_))
        ));

        let client = Dependency::Client {
            version_id: "..".into(),
            url: "https://piston-data.mojang.com/client.jar".into(),
            sha1: None,
            size: None,
        };
        assert!(dir.path_of(&client).is_err());

        assert!(join_confined(Path::new("/w"), Path::new("/etc/passwd")).is_err());
        assert!(join_confined(Path::new("/w"), Path::new("")).is_err());
        assert_eq!(
            join_confined(Path::new("/w"), Path::new("data/client.lzma")).unwrap(),
            PathBuf::from("/w/data/client.lzma")
        );
    }
}
