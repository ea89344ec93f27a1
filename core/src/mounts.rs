use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const REGISTRY_FILE: &str = "mounts.json";
const REGISTRY_VERSION: u32 = 1;

/// Association between an active mount point and the scratch repository
/// backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub mount_point: PathBuf,
    pub repo_dir: PathBuf,
    pub scratch_root: PathBuf,
    pub archive: PathBuf,
    pub tag: String,
    pub mounted_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MountTable {
    version: u32,
    mounts: BTreeMap<String, MountRecord>,
}

/// Durable mount point → scratch repository map.
///
/// Mounting and unmounting usually happen in different processes, so the
/// association lives in a small JSON file under the state directory rather
/// than in memory. Each write replaces the file atomically.
#[derive(Debug, Clone)]
pub struct MountRegistry {
    path: PathBuf,
}

impl MountRegistry {
    pub fn new<P: AsRef<Path>>(state_dir: P) -> Self {
        Self {
            path: state_dir.as_ref().join(REGISTRY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, record: MountRecord) -> Result<()> {
        let mut table = self.load().await?;
        table
            .mounts
            .insert(registry_key(&record.mount_point), record);
        self.save(&table).await
    }

    pub async fn lookup(&self, mount_point: &Path) -> Result<Option<MountRecord>> {
        let table = self.load().await?;
        Ok(table.mounts.get(&registry_key(mount_point)).cloned())
    }

    pub async fn remove(&self, mount_point: &Path) -> Result<Option<MountRecord>> {
        let mut table = self.load().await?;
        let removed = table.mounts.remove(&registry_key(mount_point));
        if removed.is_some() {
            self.save(&table).await?;
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<MountRecord>> {
        Ok(self.load().await?.mounts.into_values().collect())
    }

    async fn load(&self) -> Result<MountTable> {
        match fs::read(&self.path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MountTable {
                version: REGISTRY_VERSION,
                ..Default::default()
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &MountTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(table)?;
        let staged = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&staged, data).await?;
        if let Err(e) = fs::rename(&staged, &self.path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Canonical form of a mount point. Falls back to the absolute path when
/// the mount point cannot be resolved, e.g. a disconnected FUSE endpoint.
pub fn registry_key(mount_point: &Path) -> String {
    std::fs::canonicalize(mount_point)
        .or_else(|_| std::path::absolute(mount_point))
        .unwrap_or_else(|_| mount_point.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
