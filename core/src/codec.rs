use crate::{CodecBackend, Result, format};
use async_trait::async_trait;
use std::path::Path;

/// Converts between a repository directory and a single container file.
///
/// Implementations must preserve file bytes, tree shape, empty directories,
/// symlinks and permission bits, and must refuse entries they cannot
/// represent instead of dropping them.
#[async_trait]
pub trait ContainerCodec: Send + Sync {
    fn backend(&self) -> CodecBackend;

    /// Writes the full contents of `source_dir` to the file at `output`,
    /// replacing whatever bytes it held.
    async fn pack(&self, source_dir: &Path, output: &Path) -> Result<()>;

    /// Recreates the tree stored in `input` at `dest_dir`, which must be
    /// absent or empty.
    async fn unpack(&self, input: &Path, dest_dir: &Path) -> Result<()>;
}

/// Hands out codecs for a backend resolved once per process.
pub trait CodecFactory: Send + Sync {
    /// Backend used when writing new archives.
    fn preferred(&self) -> CodecBackend;

    /// Codec able to read or write `backend`. Binaries are looked up again
    /// when `pack` or `unpack` runs, so only the direction actually used
    /// needs its tools installed.
    fn codec(&self, backend: CodecBackend) -> Result<Box<dyn ContainerCodec>>;
}

/// Picks the codec matching the format marker of an existing archive.
pub async fn reader_for(
    factory: &dyn CodecFactory,
    archive: &Path,
) -> Result<Box<dyn ContainerCodec>> {
    let backend = format::sniff(archive).await?;
    tracing::debug!(archive = %archive.display(), %backend, "detected archive format");
    factory.codec(backend)
}

pub fn writer(factory: &dyn CodecFactory) -> Result<Box<dyn ContainerCodec>> {
    factory.codec(factory.preferred())
}
