use crate::tags::TagRegistry;
use crate::{Error, Result, TagRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;

/// Typed access to an expanded repository directory.
///
/// Every operation works on a live repository on local disk; whether it is
/// backed by an external backup tool or a native store is up to the
/// implementation. Failures of the underlying tool are wrapped with their
/// diagnostic text.
///
/// # Repository lifecycle
///
/// ```text
/// init ──▶ snapshot* ──▶ list / extract / mount / check ──▶ release
/// ```
#[async_trait]
pub trait RepositoryAdapter: Send + Sync {
    /// Creates an empty repository at `repo_dir`, which must be absent or
    /// empty (`RepositoryExists` otherwise).
    async fn init(&self, repo_dir: &Path) -> Result<()>;

    /// Cheap structural test; does not verify repository contents.
    async fn is_repository(&self, dir: &Path) -> bool;

    /// Whether another process (usually a mount) holds the repository lock.
    async fn is_locked(&self, repo_dir: &Path) -> bool;

    /// Captures `source_dir` as a new snapshot named `tag`.
    async fn snapshot(&self, repo_dir: &Path, source_dir: &Path, tag: &str) -> Result<TagRecord>;

    /// All snapshots in creation order.
    async fn list(&self, repo_dir: &Path) -> Result<Vec<TagRecord>>;

    async fn extract(&self, repo_dir: &Path, tag: &str, dest_dir: &Path) -> Result<()>;

    /// Exposes one snapshot read-only at `mount_point`.
    async fn mount(&self, repo_dir: &Path, tag: &str, mount_point: &Path) -> Result<()>;

    async fn unmount(&self, mount_point: &Path) -> Result<()>;

    async fn is_mounted(&self, mount_point: &Path) -> bool;

    /// Full consistency check of the repository.
    async fn check(&self, repo_dir: &Path) -> Result<()>;

    /// Drops host-side state (caches, security records) tied to a repository
    /// that is about to be deleted.
    async fn release(&self, _repo_dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Snapshots under `requested`, or under a freshly generated tag that is
    /// unique within the repository.
    async fn snapshot_reserved(
        &self,
        repo_dir: &Path,
        source_dir: &Path,
        requested: Option<&str>,
    ) -> Result<TagRecord> {
        let existing: HashSet<String> = self
            .list(repo_dir)
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect();
        let tag = TagRegistry::reserve(&existing, requested)?;
        self.snapshot(repo_dir, source_dir, &tag).await
    }

    /// Confirms `requested` exists, or picks the most recently created tag.
    async fn resolve_tag(&self, repo_dir: &Path, requested: Option<&str>) -> Result<String> {
        let tags = self.list(repo_dir).await?;
        match requested {
            Some(tag) if tags.iter().any(|record| record.name == tag) => Ok(tag.to_string()),
            Some(tag) => Err(Error::TagNotFound {
                tag: tag.to_string(),
            }),
            None => latest(&tags)
                .map(|record| record.name.clone())
                .ok_or_else(|| Error::TagNotFound {
                    tag: "latest".to_string(),
                }),
        }
    }
}

/// Most recently created snapshot, given tags in creation order.
pub fn latest(tags: &[TagRecord]) -> Option<&TagRecord> {
    tags.last()
}
