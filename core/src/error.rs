use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Required tool '{tool}' not found in PATH")]
    ToolUnavailable { tool: String },

    #[error("{tool} failed ({status}): {diagnostic}")]
    CodecFailure {
        tool: String,
        status: String,
        diagnostic: String,
    },

    #[error("Archive {path} is unreadable: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("Archive not found at {path}")]
    ArchiveNotFound { path: PathBuf },

    #[error("Archive already exists at {path}")]
    ArchiveExists { path: PathBuf },

    #[error("Destination {path} exists and is not empty")]
    DestinationNotEmpty { path: PathBuf },

    #[error("Tag not found: {tag}")]
    TagNotFound { tag: String },

    #[error("Tag \"{tag}\" already exists")]
    TagAlreadyExists { tag: String },

    #[error("Invalid tag \"{tag}\": {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("Repository already exists at {path}")]
    RepositoryExists { path: PathBuf },

    #[error("Not a repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Repository {path} is locked, possibly because it is mounted")]
    RepositoryLocked { path: PathBuf },

    #[error("Repository operation '{step}' failed: {diagnostic}")]
    RepositoryFailure { step: String, diagnostic: String },

    #[error("Mounting is unavailable: {0}")]
    MountUnavailable(String),

    #[error("Nothing is mounted at {path}")]
    NotMounted { path: PathBuf },

    #[error("Cannot archive {kind} at {path}")]
    UnsupportedEntry { path: PathBuf, kind: String },

    #[error("Source directory {path} does not exist or is not a directory")]
    InvalidSource { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable short name of the failure category, suitable for user-facing
    /// reports and scripting.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::ToolUnavailable { .. } => "tool-unavailable",
            Error::CodecFailure { .. } => "codec-failure",
            Error::CorruptArchive { .. } => "corrupt-archive",
            Error::ArchiveNotFound { .. } => "archive-not-found",
            Error::ArchiveExists { .. } => "archive-exists",
            Error::DestinationNotEmpty { .. } => "destination-not-empty",
            Error::TagNotFound { .. } => "tag-not-found",
            Error::TagAlreadyExists { .. } => "tag-already-exists",
            Error::InvalidTag { .. } => "invalid-tag",
            Error::RepositoryExists { .. } => "repository-exists",
            Error::NotARepository { .. } => "not-a-repository",
            Error::RepositoryLocked { .. } => "repository-locked",
            Error::RepositoryFailure { .. } => "repository-failure",
            Error::MountUnavailable(_) => "mount-unavailable",
            Error::NotMounted { .. } => "not-mounted",
            Error::UnsupportedEntry { .. } => "unsupported-entry",
            Error::InvalidSource { .. } => "invalid-source",
            Error::Config(_) => "config",
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Error::CorruptArchive {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn tool_unavailable(tool: impl Into<String>) -> Self {
        Error::ToolUnavailable { tool: tool.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_diagnostics() {
        let err = Error::CodecFailure {
            tool: "zstd".to_string(),
            status: "exit status: 1".to_string(),
            diagnostic: "zstd: /dev/stdin: unexpected end of file".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("zstd failed"));
        assert!(message.contains("unexpected end of file"));
        assert_eq!(err.kind(), "codec-failure");
    }

    #[test]
    fn test_io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "io");
    }
}
