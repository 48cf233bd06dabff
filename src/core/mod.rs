// ─── Launcher Engine Core ───
// Download, verification and staged installation of Minecraft versions.
//
// Architecture:
//   core/
//     config/      EngineSettings, persisted as JSON
//     http/        Shared reqwest client, manual redirects
//     downloader/  Chunked single-file downloads + batch coordinator + mirrors
//     dependency/  Dependency records, game folder layout, verify-and-fetch
//     maven/       Artifact coordinates and repository constants
//     version/     Version manifest, version JSON and asset index documents
//     instance/    Installed instance model
//     installer/   Stage framework, processors, Vanilla/Fabric/Quilt/Forge/NeoForge/OptiFine

pub mod config;
pub mod dependency;
pub mod downloader;
pub mod error;
pub mod http;
pub mod installer;
pub mod instance;
pub mod maven;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;
