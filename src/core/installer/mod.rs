mod context;
mod forge;
mod installer;
mod meta_profile;
mod optifine;
mod processor;
mod stage;
mod vanilla;

#[cfg(test)]
mod testkit;

pub use context::InstallContext;
pub use forge::{InstallProfileInstaller, InstallProfileStage, ProfileLoader};
pub use installer::{Installer, LoaderInstaller};
pub use meta_profile::{MetaLoader, MetaProfileInstaller, MetaProfileStage};
pub use optifine::{optifine_library_path, OptiFineInstaller, OptiFineStage};
pub use processor::{read_main_class, run_captured, Processor};
pub use stage::{
    conclude, InstallCleanup, InstallStage, NoopSink, ProgressSink, ScopedSink, StageEvent,
    StageProgress, StageTracker,
};
pub use vanilla::{VanillaInstaller, VanillaStage};
