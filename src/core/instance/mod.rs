mod model;

pub use model::{InstanceKind, LoaderType, MinecraftInstance};
