//! Thin manifest collaborator: turns Mojang/loader version documents into
//! flat [`Dependency`](crate::core::dependency::Dependency) lists.

mod asset_index;
mod manifest;
mod version_file;

pub use asset_index::{AssetIndexDocument, AssetObject};
pub use manifest::{LatestVersions, VersionEntry, VersionManifest};
pub use version_file::{
    current_os_name, AssetIndexInfo, DownloadArtifact, LibraryEntry, LibraryRule, OsRule,
    RuleAction, VersionDownloads, VersionJson,
};
