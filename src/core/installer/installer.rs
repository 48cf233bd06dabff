use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{LoaderType, MinecraftInstance};

use super::{
    context::InstallContext,
    forge::{InstallProfileInstaller, ProfileLoader},
    meta_profile::{MetaLoader, MetaProfileInstaller},
    optifine::OptiFineInstaller,
    vanilla::VanillaInstaller,
};

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<MinecraftInstance>;
}

/// Dispatcher without `Box<dyn>`.
pub enum Installer {
    Vanilla(VanillaInstaller),
    Fabric(MetaProfileInstaller),
    Quilt(MetaProfileInstaller),
    Forge(InstallProfileInstaller),
    NeoForge(InstallProfileInstaller),
    OptiFine(OptiFineInstaller),
}

impl Installer {
    /// Pick the installer for `loader`. Every loader except vanilla needs a
    /// loader version.
    pub fn new(
        loader: LoaderType,
        game_version: &str,
        loader_version: Option<&str>,
    ) -> LauncherResult<Self> {
        let required = || {
            loader_version
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    LauncherError::InvalidArgument(format!("{loader} requires a loader version"))
                })
        };

        Ok(match loader {
            LoaderType::Vanilla => Self::Vanilla(VanillaInstaller::new(game_version)),
            LoaderType::Fabric => Self::Fabric(MetaProfileInstaller::new(
                MetaLoader::Fabric,
                game_version,
                required()?,
            )),
            LoaderType::Quilt => Self::Quilt(MetaProfileInstaller::new(
                MetaLoader::Quilt,
                game_version,
                required()?,
            )),
            LoaderType::Forge => Self::Forge(InstallProfileInstaller::new(
                ProfileLoader::Forge,
                game_version,
                required()?,
            )),
            LoaderType::NeoForge => Self::NeoForge(InstallProfileInstaller::new(
                ProfileLoader::NeoForge,
                game_version,
                required()?,
            )),
            LoaderType::OptiFine => {
                Self::OptiFine(OptiFineInstaller::new(game_version, required()?))
            }
        })
    }

    /// Reuse an installed vanilla instance as the parent. Ignored for vanilla.
    pub fn with_vanilla(self, vanilla: Arc<MinecraftInstance>) -> Self {
        match self {
            Installer::Vanilla(i) => Installer::Vanilla(i),
            Installer::Fabric(i) => Installer::Fabric(i.with_vanilla(vanilla)),
            Installer::Quilt(i) => Installer::Quilt(i.with_vanilla(vanilla)),
            Installer::Forge(i) => Installer::Forge(i.with_vanilla(vanilla)),
            Installer::NeoForge(i) => Installer::NeoForge(i.with_vanilla(vanilla)),
            Installer::OptiFine(i) => Installer::OptiFine(i.with_vanilla(vanilla)),
        }
    }

    pub async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<MinecraftInstance> {
        match self {
            Installer::Vanilla(i) => i.install(ctx).await,
            Installer::Fabric(i) => i.install(ctx).await,
            Installer::Quilt(i) => i.install(ctx).await,
            Installer::Forge(i) => i.install(ctx).await,
            Installer::NeoForge(i) => i.install(ctx).await,
            Installer::OptiFine(i) => i.install(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaders_other_than_vanilla_need_a_version() {
        assert!(matches!(
            Installer::new(LoaderType::Vanilla, "1.20.1", None),
            Ok(Installer::Vanilla(_))
        ));
        assert!(matches!(
            Installer::new(LoaderType::Fabric, "1.20.1", Some(" ")),
            Err(LauncherError::InvalidArgument(_))
        ));
        assert!(matches!(
            Installer::new(LoaderType::NeoForge, "1.20.1", Some("47.1.3")),
            Ok(Installer::NeoForge(_))
        ));
        assert!(matches!(
            Installer::new(LoaderType::OptiFine, "1.20.1", Some("HD_U_I6")),
            Ok(Installer::OptiFine(_))
        ));
    }
}
