use borgpack_core::{CodecBackend, Compressor, Error, PackTool, Result, Settings};
use serde::Serialize;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// Every external binary borgpack may invoke, in probing order.
pub const KNOWN_TOOLS: &[&str] = &["mksquashfs", "unsquashfs", "tar", "zstd", "pigz", "gzip", "borg"];

/// Resolves tool names to executables, either on `PATH` or on an explicit
/// search path.
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    search_path: Option<OsString>,
}

/// Presence of one external binary.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<PathBuf>,
}

/// Backend chosen for this process together with the locator that found it.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub backend: CodecBackend,
    pub locator: ToolLocator,
}

impl ToolLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts lookups to `search_path` (a `PATH`-style list).
    pub fn with_search_path<S: Into<OsString>>(search_path: S) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    pub fn find(&self, tool: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                which::which_in(tool, Some(paths), cwd)
            }
            None => which::which(tool),
        };
        found.ok()
    }

    /// Like `find`, failing with `ToolUnavailable` when the tool is missing.
    pub fn require(&self, tool: &str) -> Result<PathBuf> {
        self.find(tool).ok_or_else(|| Error::tool_unavailable(tool))
    }

    pub fn has(&self, tool: &str) -> bool {
        self.find(tool).is_some()
    }

    pub fn report(&self) -> Vec<ToolStatus> {
        KNOWN_TOOLS
            .iter()
            .map(|name| ToolStatus {
                name: name.to_string(),
                path: self.find(name),
            })
            .collect()
    }

    /// Picks the pack tool and compressor for new archives.
    ///
    /// SquashFS wins when both of its binaries are installed, tar otherwise.
    /// Compressors rank zstd, pigz, gzip. SquashFS compresses internally and
    /// only knows zstd and gzip, so pigz maps to gzip there. Forced choices
    /// in `settings` are honoured and must be installed.
    pub fn probe(&self, settings: &Settings) -> Result<Toolchain> {
        let pack_tool = match settings.packer {
            Some(PackTool::Squashfs) => {
                self.require("mksquashfs")?;
                self.require("unsquashfs")?;
                PackTool::Squashfs
            }
            Some(PackTool::Tar) => {
                self.require("tar")?;
                PackTool::Tar
            }
            None if self.has("mksquashfs") && self.has("unsquashfs") => PackTool::Squashfs,
            None => {
                self.require("tar")?;
                PackTool::Tar
            }
        };

        let compressor = match (pack_tool, settings.compressor) {
            (PackTool::Squashfs, Some(Compressor::Zstd)) => Compressor::Zstd,
            (PackTool::Squashfs, Some(_)) => Compressor::Gzip,
            (PackTool::Squashfs, None) if self.has("zstd") => Compressor::Zstd,
            (PackTool::Squashfs, None) => Compressor::Gzip,
            (PackTool::Tar, Some(forced)) => {
                self.require(forced.as_str())?;
                forced
            }
            (PackTool::Tar, None) => [Compressor::Zstd, Compressor::Pigz, Compressor::Gzip]
                .into_iter()
                .find(|candidate| self.has(candidate.as_str()))
                .ok_or_else(|| Error::tool_unavailable("gzip"))?,
        };

        let backend = CodecBackend::new(pack_tool, compressor);
        debug!(%backend, "selected codec backend");
        Ok(Toolchain {
            backend,
            locator: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn fake_tools(dir: &Path, names: &[&str]) -> ToolLocator {
        for name in names {
            let path = dir.join(name);
            std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        ToolLocator::with_search_path(dir.as_os_str())
    }

    #[test]
    fn test_prefers_squashfs_and_zstd() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_tools(
            dir.path(),
            &["mksquashfs", "unsquashfs", "tar", "zstd", "gzip"],
        );
        let toolchain = locator.probe(&Settings::default()).unwrap();
        assert_eq!(
            toolchain.backend,
            CodecBackend::new(PackTool::Squashfs, Compressor::Zstd)
        );
    }

    #[test]
    fn test_half_installed_squashfs_falls_back_to_tar() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_tools(dir.path(), &["mksquashfs", "tar", "pigz", "gzip"]);
        let toolchain = locator.probe(&Settings::default()).unwrap();
        assert_eq!(
            toolchain.backend,
            CodecBackend::new(PackTool::Tar, Compressor::Pigz)
        );
    }

    #[test]
    fn test_bare_host_gets_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_tools(dir.path(), &["tar", "gzip"]);
        let toolchain = locator.probe(&Settings::default()).unwrap();
        assert_eq!(toolchain.backend, CodecBackend::baseline());
    }

    #[test]
    fn test_nothing_installed() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_tools(dir.path(), &[]);
        let err = locator.probe(&Settings::default()).unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable { tool } if tool == "tar"));
    }

    #[test]
    fn test_forced_choices() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_tools(
            dir.path(),
            &["mksquashfs", "unsquashfs", "tar", "zstd", "gzip"],
        );

        let settings = Settings {
            packer: Some(PackTool::Tar),
            compressor: Some(Compressor::Gzip),
            ..Default::default()
        };
        assert_eq!(
            locator.probe(&settings).unwrap().backend,
            CodecBackend::baseline()
        );

        let settings = Settings {
            packer: Some(PackTool::Tar),
            compressor: Some(Compressor::Pigz),
            ..Default::default()
        };
        let err = locator.probe(&settings).unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable { tool } if tool == "pigz"));

        let settings = Settings {
            compressor: Some(Compressor::Pigz),
            ..Default::default()
        };
        assert_eq!(
            locator.probe(&settings).unwrap().backend,
            CodecBackend::new(PackTool::Squashfs, Compressor::Gzip)
        );
    }

    #[test]
    fn test_report_lists_every_tool() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_tools(dir.path(), &["tar"]);
        let report = locator.report();
        assert_eq!(report.len(), KNOWN_TOOLS.len());
        let tar = report.iter().find(|status| status.name == "tar").unwrap();
        assert!(tar.path.as_ref().unwrap().ends_with("tar"));
        assert_eq!(report.iter().filter(|status| status.path.is_some()).count(), 1);
    }
}
