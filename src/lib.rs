pub mod core;

pub use crate::core::config::EngineSettings;
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::installer::{InstallContext, Installer, ProgressSink, StageEvent, StageProgress};
pub use crate::core::instance::{LoaderType, MinecraftInstance};
