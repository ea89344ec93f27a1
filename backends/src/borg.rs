use crate::process::{Captured, capture};
use crate::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use borgpack_core::repository::RepositoryAdapter;
use borgpack_core::{Error, Result, Settings, TagRecord, tree};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::ffi::OsString;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

const FUSE_DEVICE: &str = "/dev/fuse";

/// Borg prints archive times in host local time without an offset.
const BORG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Deserialize)]
struct ArchiveEntry {
    name: String,
    start: String,
}

#[derive(Debug, Deserialize)]
struct CreateOutput {
    archive: ArchiveEntry,
}

#[derive(Debug, Deserialize)]
struct ListOutput {
    archives: Vec<ArchiveEntry>,
}

#[derive(Debug, Deserialize)]
struct CacheInfo {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct InfoOutput {
    cache: Option<CacheInfo>,
    security_dir: Option<PathBuf>,
}

impl ArchiveEntry {
    fn into_record(self, step: &str) -> Result<TagRecord> {
        let created = NaiveDateTime::parse_from_str(&self.start, BORG_TIME_FORMAT).map_err(|e| {
            Error::RepositoryFailure {
                step: step.to_string(),
                diagnostic: format!(
                    "archive {} has an unreadable start time '{}': {}",
                    self.name, self.start, e
                ),
            }
        })?;
        Ok(TagRecord::new(self.name, created))
    }
}

/// `RepositoryAdapter` that shells out to the `borg` binary.
///
/// Repositories are created unencrypted; they live inside the archive file
/// and move between hosts and paths, so every call allows relocated and
/// unencrypted repository access.
pub struct BorgRepository {
    binary: String,
    compression: String,
    create_args: Vec<OsString>,
    fuse_device: PathBuf,
    unmount_retry: RetryConfig,
}

impl BorgRepository {
    pub fn new(settings: &Settings) -> Self {
        Self {
            binary: settings.borg_binary.clone(),
            compression: settings.borg_compression.clone(),
            create_args: Vec::new(),
            fuse_device: PathBuf::from(FUSE_DEVICE),
            unmount_retry: RetryConfig::unmount(),
        }
    }

    /// Extra arguments appended to every `borg create`.
    pub fn with_create_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.create_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .env("BORG_RELOCATED_REPO_ACCESS_IS_OK", "yes")
            .env("BORG_UNKNOWN_UNENCRYPTED_REPO_ACCESS_IS_OK", "yes");
        command
    }

    /// Runs borg, mapping a non-zero exit to `RepositoryFailure`.
    async fn run(&self, step: &str, command: &mut Command) -> Result<Captured> {
        let captured = capture(&self.binary, command).await?;
        if !captured.success() {
            return Err(Error::RepositoryFailure {
                step: step.to_string(),
                diagnostic: captured.diagnostic(),
            });
        }
        Ok(captured)
    }

    async fn remove_host_dir(&self, kind: &str, path: &Path) {
        if !path.is_absolute() || path.parent().is_none() {
            warn!(path = %path.display(), "refusing to remove suspicious {} path", kind);
            return;
        }
        match fs::remove_dir_all(path).await {
            Ok(()) => debug!(path = %path.display(), "removed borg {} directory", kind),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove borg {} directory", kind),
        }
    }
}

/// Repository path as borg should see it when run from another directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn archive_ref(repo_dir: &Path, tag: &str) -> Result<OsString> {
    let mut reference = absolute(repo_dir)?.into_os_string();
    reference.push("::");
    reference.push(tag);
    Ok(reference)
}

#[async_trait]
impl RepositoryAdapter for BorgRepository {
    async fn init(&self, repo_dir: &Path) -> Result<()> {
        if tree::is_populated_dir(repo_dir) {
            return Err(Error::RepositoryExists {
                path: repo_dir.to_path_buf(),
            });
        }
        let mut command = self.command();
        command
            .args(["init", "--error", "--encryption", "none"])
            .arg(absolute(repo_dir)?);
        self.run("init", &mut command).await?;
        debug!(repo = %repo_dir.display(), "initialised borg repository");
        Ok(())
    }

    async fn is_repository(&self, dir: &Path) -> bool {
        match fs::read_to_string(dir.join("config")).await {
            Ok(config) => config.starts_with("[repository]"),
            Err(_) => false,
        }
    }

    async fn is_locked(&self, repo_dir: &Path) -> bool {
        fs::try_exists(repo_dir.join("lock.roster"))
            .await
            .unwrap_or(false)
    }

    async fn snapshot(&self, repo_dir: &Path, source_dir: &Path, tag: &str) -> Result<TagRecord> {
        let source = fs::canonicalize(source_dir)
            .await
            .map_err(|_| Error::InvalidSource {
                path: source_dir.to_path_buf(),
            })?;
        let (parent, name) = match (source.parent(), source.file_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(Error::InvalidSource {
                    path: source_dir.to_path_buf(),
                });
            }
        };

        let mut command = self.command();
        command
            .current_dir(parent)
            .args(["create", "--json", "--error", "--compression"])
            .arg(&self.compression)
            .args(&self.create_args)
            .arg(archive_ref(repo_dir, tag)?)
            .arg(name);
        let captured = self.run("create", &mut command).await?;

        let output: CreateOutput = serde_json::from_slice(&captured.stdout)?;
        let record = output.archive.into_record("create")?;
        info!(tag = %record.name, source = %source.display(), "borg snapshot created");
        Ok(record)
    }

    async fn list(&self, repo_dir: &Path) -> Result<Vec<TagRecord>> {
        let mut command = self.command();
        command
            .args(["list", "--json", "--error"])
            .arg(absolute(repo_dir)?);
        let captured = self.run("list", &mut command).await?;

        let output: ListOutput = serde_json::from_slice(&captured.stdout)?;
        output
            .archives
            .into_iter()
            .map(|entry| entry.into_record("list"))
            .collect()
    }

    async fn extract(&self, repo_dir: &Path, tag: &str, dest_dir: &Path) -> Result<()> {
        if !self.list(repo_dir).await?.iter().any(|record| record.name == tag) {
            return Err(Error::TagNotFound {
                tag: tag.to_string(),
            });
        }
        tree::ensure_vacant(dest_dir)?;
        fs::create_dir_all(dest_dir).await?;

        let mut command = self.command();
        command
            .current_dir(dest_dir)
            .args(["extract", "--error"])
            .arg(archive_ref(repo_dir, tag)?);
        self.run("extract", &mut command).await?;
        Ok(())
    }

    async fn mount(&self, repo_dir: &Path, tag: &str, mount_point: &Path) -> Result<()> {
        if !fs::try_exists(&self.fuse_device).await.unwrap_or(false) {
            return Err(Error::MountUnavailable(format!(
                "{} is not present",
                self.fuse_device.display()
            )));
        }

        let mut command = self.command();
        command
            .args(["mount", "--error"])
            .arg(archive_ref(repo_dir, tag)?)
            .arg(absolute(mount_point)?);
        match self.run("mount", &mut command).await {
            Err(Error::RepositoryFailure { diagnostic, .. })
                if diagnostic.to_ascii_lowercase().contains("fuse") =>
            {
                Err(Error::MountUnavailable(diagnostic))
            }
            other => other.map(|_| ()),
        }
    }

    async fn unmount(&self, mount_point: &Path) -> Result<()> {
        if !self.is_mounted(mount_point).await {
            return Err(Error::NotMounted {
                path: mount_point.to_path_buf(),
            });
        }
        let target = absolute(mount_point)?;
        retry_with_backoff(&self.unmount_retry, "borg umount", || {
            let target = target.clone();
            async move {
                let mut command = self.command();
                command.args(["umount", "--error"]).arg(&target);
                self.run("umount", &mut command).await.map(|_| ())
            }
        })
        .await
    }

    async fn is_mounted(&self, mount_point: &Path) -> bool {
        let Ok(point) = fs::metadata(mount_point).await else {
            return false;
        };
        if !point.is_dir() {
            return false;
        }
        match fs::metadata(mount_point.join("..")).await {
            Ok(parent) => parent.dev() != point.dev() || parent.ino() == point.ino(),
            Err(_) => false,
        }
    }

    async fn check(&self, repo_dir: &Path) -> Result<()> {
        let mut command = self.command();
        command.args(["check", "--error"]).arg(absolute(repo_dir)?);
        self.run("check", &mut command).await?;
        Ok(())
    }

    async fn release(&self, repo_dir: &Path) -> Result<()> {
        let mut command = self.command();
        command
            .args(["info", "--error", "--json"])
            .arg(absolute(repo_dir)?);
        let captured = self.run("info", &mut command).await?;
        let info: InfoOutput = serde_json::from_slice(&captured.stdout)?;

        if let Some(cache) = info.cache {
            self.remove_host_dir("cache", &cache.path).await;
        }
        if let Some(security_dir) = info.security_dir {
            self.remove_host_dir("security", &security_dir).await;
        }
        Ok(())
    }
}
