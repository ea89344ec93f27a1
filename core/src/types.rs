use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tool that turns a repository directory into a single container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackTool {
    Squashfs,
    Tar,
}

/// Stream compressor applied to the container.
///
/// `Pigz` and `Gzip` produce the same on-disk format; the distinction only
/// matters for which binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compressor {
    Zstd,
    Pigz,
    Gzip,
}

impl PackTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackTool::Squashfs => "squashfs",
            PackTool::Tar => "tar",
        }
    }
}

impl Compressor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compressor::Zstd => "zstd",
            Compressor::Pigz => "pigz",
            Compressor::Gzip => "gzip",
        }
    }

    /// Whether two compressors write interchangeable streams.
    pub fn same_format(&self, other: Compressor) -> bool {
        match (self, other) {
            (Compressor::Zstd, Compressor::Zstd) => true,
            (Compressor::Zstd, _) | (_, Compressor::Zstd) => false,
            _ => true,
        }
    }
}

impl fmt::Display for PackTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackTool {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "squashfs" | "sqfs" => Ok(PackTool::Squashfs),
            "tar" => Ok(PackTool::Tar),
            other => Err(crate::Error::Config(format!(
                "Unknown packer '{}' (expected squashfs or tar)",
                other
            ))),
        }
    }
}

impl FromStr for Compressor {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zstd" => Ok(Compressor::Zstd),
            "pigz" => Ok(Compressor::Pigz),
            "gzip" | "gz" => Ok(Compressor::Gzip),
            other => Err(crate::Error::Config(format!(
                "Unknown compressor '{}' (expected zstd, pigz or gzip)",
                other
            ))),
        }
    }
}

/// The pack tool and compressor pairing that produced, or will produce, an
/// archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecBackend {
    pub pack_tool: PackTool,
    pub compressor: Compressor,
}

impl CodecBackend {
    pub fn new(pack_tool: PackTool, compressor: Compressor) -> Self {
        Self {
            pack_tool,
            compressor,
        }
    }

    /// Conventional fallback that every supported host provides.
    pub fn baseline() -> Self {
        Self::new(PackTool::Tar, Compressor::Gzip)
    }
}

impl fmt::Display for CodecBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.pack_tool, self.compressor)
    }
}

/// A named snapshot inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,
    /// Creation time as reported by the backup tool (host local time).
    pub created: NaiveDateTime,
}

impl TagRecord {
    pub fn new(name: impl Into<String>, created: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            created,
        }
    }
}

/// Lifecycle position of an archive handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Collapsed,
    Expanding,
    Expanded,
    Collapsing,
    Error,
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveState::Collapsed => "collapsed",
            ArchiveState::Expanding => "expanding",
            ArchiveState::Expanded => "expanded",
            ArchiveState::Collapsing => "collapsing",
            ArchiveState::Error => "error",
        };
        f.write_str(name)
    }
}
