//! Identifies which codec backend produced an archive by looking at the
//! container's own leading bytes, so reading never has to guess or probe
//! every installed tool.

use crate::{CodecBackend, Compressor, Error, PackTool, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

const SQUASHFS_MAGIC: &[u8; 4] = b"hsqs";
const ZSTD_MAGIC: &[u8; 4] = &[0x28, 0xB5, 0x2F, 0xFD];
const GZIP_MAGIC: &[u8; 2] = &[0x1F, 0x8B];

/// Offset of the little-endian compression id in a SquashFS 4 superblock.
const SQUASHFS_COMPRESSION_OFFSET: usize = 20;
const SQUASHFS_GZIP: u16 = 1;
const SQUASHFS_ZSTD: u16 = 6;

const HEADER_LEN: usize = SQUASHFS_COMPRESSION_OFFSET + 2;

/// Reads the header of `path` and reports its backend.
pub async fn sniff(path: &Path) -> Result<CodecBackend> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ArchiveNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let read = file.read(&mut header[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    identify(&header[..filled]).map_err(|reason| Error::corrupt(path, reason))
}

/// Maps raw header bytes to a backend, or explains why they are not
/// recognised.
pub fn identify(header: &[u8]) -> std::result::Result<CodecBackend, String> {
    if header.starts_with(SQUASHFS_MAGIC) {
        if header.len() < HEADER_LEN {
            return Err("truncated squashfs superblock".to_string());
        }
        let id = u16::from_le_bytes([
            header[SQUASHFS_COMPRESSION_OFFSET],
            header[SQUASHFS_COMPRESSION_OFFSET + 1],
        ]);
        let compressor = match id {
            SQUASHFS_GZIP => Compressor::Gzip,
            SQUASHFS_ZSTD => Compressor::Zstd,
            other => return Err(format!("unsupported squashfs compression id {}", other)),
        };
        return Ok(CodecBackend::new(PackTool::Squashfs, compressor));
    }
    if header.starts_with(ZSTD_MAGIC) {
        return Ok(CodecBackend::new(PackTool::Tar, Compressor::Zstd));
    }
    if header.starts_with(GZIP_MAGIC) {
        return Ok(CodecBackend::new(PackTool::Tar, Compressor::Gzip));
    }
    if header.is_empty() {
        return Err("file is empty".to_string());
    }
    Err("unrecognised format marker".to_string())
}
