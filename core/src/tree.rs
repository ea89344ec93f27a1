use crate::{Error, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Walks `root` without following links and fails on the first entry a
/// container cannot faithfully represent.
///
/// Regular files, directories and symlinks are accepted. Sockets, FIFOs and
/// device nodes are rejected rather than skipped, so a repository is never
/// collapsed with silently missing entries.
pub fn ensure_representable(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => Error::Io(io),
            None => Error::Io(std::io::Error::other(format!(
                "filesystem loop under {}",
                root.display()
            ))),
        })?;
        if let Some(kind) = unsupported_kind(&entry.file_type()) {
            return Err(Error::UnsupportedEntry {
                path: entry.path().to_path_buf(),
                kind: kind.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(unix)]
fn unsupported_kind(file_type: &std::fs::FileType) -> Option<&'static str> {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_socket() {
        Some("socket")
    } else if file_type.is_fifo() {
        Some("fifo")
    } else if file_type.is_block_device() {
        Some("block device")
    } else if file_type.is_char_device() {
        Some("character device")
    } else {
        None
    }
}

#[cfg(not(unix))]
fn unsupported_kind(file_type: &std::fs::FileType) -> Option<&'static str> {
    if file_type.is_file() || file_type.is_dir() || file_type.is_symlink() {
        None
    } else {
        Some("special file")
    }
}

/// Succeeds when `path` does not exist or is an empty directory.
pub fn ensure_vacant(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() && std::fs::read_dir(path)?.next().is_none() {
        return Ok(());
    }
    Err(Error::DestinationNotEmpty {
        path: path.to_path_buf(),
    })
}

/// Whether `path` is an existing, non-empty directory.
pub fn is_populated_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
