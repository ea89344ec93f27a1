use crate::locator::ToolLocator;
use crate::process::{Stage, pipeline};
use async_trait::async_trait;
use borgpack_core::codec::ContainerCodec;
use borgpack_core::{CodecBackend, Compressor, Error, PackTool, Result, tree};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// `tar --format=pax` streamed through an external compressor.
///
/// The archive holds a single top-level directory named after the packed
/// directory; unpacking renames it to the destination.
pub struct TarCodec {
    locator: ToolLocator,
    compressor: Compressor,
    level: u32,
}

impl TarCodec {
    pub fn new(locator: ToolLocator, compressor: Compressor, level: u32) -> Self {
        Self {
            locator,
            compressor,
            level,
        }
    }
}

#[async_trait]
impl ContainerCodec for TarCodec {
    fn backend(&self) -> CodecBackend {
        CodecBackend::new(PackTool::Tar, self.compressor)
    }

    async fn pack(&self, source_dir: &Path, output: &Path) -> Result<()> {
        tree::ensure_representable(source_dir)?;
        let tar = self.locator.require("tar")?;
        let compressor = self.locator.require(self.compressor.as_str())?;

        let source = std::fs::canonicalize(source_dir)?;
        let (parent, name) = match (source.parent(), source.file_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(Error::InvalidSource {
                    path: source_dir.to_path_buf(),
                });
            }
        };

        let mut archive = Command::new(tar);
        archive
            .current_dir(parent)
            .arg("--format=pax")
            .arg("-cf")
            .arg("-")
            .arg(name)
            .stdin(Stdio::null());

        let mut compress = Command::new(compressor);
        compress
            .arg(format!("-{}", self.level))
            .arg("-c")
            .stdout(std::fs::File::create(output)?);
        if self.compressor == Compressor::Zstd {
            compress.arg("-q");
        }

        debug!(source = %source.display(), output = %output.display(), compressor = %self.compressor, "packing with tar");
        pipeline(
            Stage::new("tar", archive),
            Stage::new(self.compressor.as_str(), compress),
        )
        .await
    }

    async fn unpack(&self, input: &Path, dest_dir: &Path) -> Result<()> {
        tree::ensure_vacant(dest_dir)?;
        let tar = self.locator.require("tar")?;
        let compressor = self.locator.require(self.compressor.as_str())?;
        let stream = std::fs::File::open(input).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ArchiveNotFound {
                path: input.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;

        // The top-level entry carries the packed directory's own mode, so it
        // is extracted whole next to the destination and moved into place.
        let parent = match dest_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".borgpack-unpack-")
            .tempdir_in(&parent)?;

        let mut decompress = Command::new(compressor);
        decompress.arg("-d").arg("-c").stdin(stream);
        if self.compressor == Compressor::Zstd {
            decompress.arg("-q");
        }

        let mut archive = Command::new(tar);
        archive
            .arg("-xpf")
            .arg("-")
            .arg("-C")
            .arg(staging.path())
            .stdout(Stdio::null());

        debug!(input = %input.display(), dest = %dest_dir.display(), compressor = %self.compressor, "unpacking with tar");
        pipeline(
            Stage::new(self.compressor.as_str(), decompress),
            Stage::new("tar", archive),
        )
        .await?;

        let root = single_root(staging.path(), input)?;
        if dest_dir.exists() {
            std::fs::remove_dir(dest_dir)?;
        }
        std::fs::rename(&root, dest_dir)?;
        Ok(())
    }
}

/// The one directory a tar archive written by `pack` holds at its top level.
fn single_root(staging: &Path, input: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(staging)?.collect::<std::io::Result<Vec<_>>>()?;
    let root = match entries.pop() {
        Some(entry) if entries.is_empty() => Some(entry.path()),
        _ => None,
    };
    match root {
        Some(path) if path.symlink_metadata().is_ok_and(|m| m.is_dir()) => Ok(path),
        _ => Err(Error::corrupt(
            input,
            "expected a single top-level directory in the tar stream",
        )),
    }
}
