pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod mounts;
pub mod repository;
pub mod scratch;
pub mod tags;
pub mod tree;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{Archive, ArchiveEngine, CreateOptions};
pub use codec::{CodecFactory, ContainerCodec};
pub use config::Settings;
pub use error::{Error, Result};
pub use mounts::{MountRecord, MountRegistry};
pub use repository::RepositoryAdapter;
pub use tags::TagRegistry;
pub use types::*;
