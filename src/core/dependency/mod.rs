mod layout;
mod model;
mod resolver;

pub use layout::{ensure_relative, join_confined, GameDirectory};
pub use model::Dependency;
pub use resolver::{DependencyResolver, NoopResolverObserver, ResolverObserver};
pub(crate) use resolver::sha1_file;
