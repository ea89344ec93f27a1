use crate::locator::ToolLocator;
use crate::process::run_codec;
use async_trait::async_trait;
use borgpack_core::codec::ContainerCodec;
use borgpack_core::{CodecBackend, Compressor, PackTool, Result, tree};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// SquashFS image built by `mksquashfs` and read back by `unsquashfs`.
///
/// Compression happens inside the image, so no separate compressor binary
/// is involved. Reading only needs `unsquashfs`.
pub struct SquashfsCodec {
    locator: ToolLocator,
    compressor: Compressor,
    level: u32,
}

impl SquashfsCodec {
    pub fn new(locator: ToolLocator, compressor: Compressor, level: u32) -> Self {
        let compressor = match compressor {
            Compressor::Zstd => Compressor::Zstd,
            Compressor::Pigz | Compressor::Gzip => Compressor::Gzip,
        };
        Self {
            locator,
            compressor,
            level,
        }
    }
}

#[async_trait]
impl ContainerCodec for SquashfsCodec {
    fn backend(&self) -> CodecBackend {
        CodecBackend::new(PackTool::Squashfs, self.compressor)
    }

    async fn pack(&self, source_dir: &Path, output: &Path) -> Result<()> {
        tree::ensure_representable(source_dir)?;
        let mksquashfs = self.locator.require("mksquashfs")?;

        let mut command = Command::new(mksquashfs);
        command
            .arg(source_dir)
            .arg(output)
            .args(["-quiet", "-noappend", "-no-xattrs", "-comp"])
            .arg(self.compressor.as_str())
            .arg("-Xcompression-level")
            .arg(self.level.to_string());

        debug!(source = %source_dir.display(), output = %output.display(), compressor = %self.compressor, "packing with mksquashfs");
        run_codec("mksquashfs", &mut command).await?;
        Ok(())
    }

    async fn unpack(&self, input: &Path, dest_dir: &Path) -> Result<()> {
        tree::ensure_vacant(dest_dir)?;
        let unsquashfs = self.locator.require("unsquashfs")?;

        let mut command = Command::new(unsquashfs);
        command
            .args(["-no-progress", "-quiet", "-f", "-dest"])
            .arg(dest_dir)
            .arg(input);

        debug!(input = %input.display(), dest = %dest_dir.display(), "unpacking with unsquashfs");
        run_codec("unsquashfs", &mut command).await?;
        Ok(())
    }
}
