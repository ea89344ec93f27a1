//! In-process stand-ins for the external tools, used by the engine tests.

use crate::codec::{CodecFactory, ContainerCodec};
use crate::mounts::{MountRegistry, registry_key};
use crate::repository::RepositoryAdapter;
use crate::{ArchiveEngine, CodecBackend, Error, Result, TagRecord, tree};
use async_trait::async_trait;
use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use walkdir::WalkDir;

#[derive(Serialize, Deserialize)]
enum EntryKind {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

#[derive(Serialize, Deserialize)]
struct Entry {
    path: String,
    mode: u32,
    kind: EntryKind,
}

/// Gzip-compressed JSON listing of a tree. Starts with the gzip magic, so
/// format detection sees it as tar+gzip.
pub struct FakeCodec {
    fail_pack: Arc<AtomicBool>,
}

#[async_trait]
impl ContainerCodec for FakeCodec {
    fn backend(&self) -> CodecBackend {
        CodecBackend::baseline()
    }

    async fn pack(&self, source_dir: &Path, output: &Path) -> Result<()> {
        if self.fail_pack.load(Ordering::SeqCst) {
            std::fs::write(output, b"\x1f\x8bpartial")?;
            return Err(Error::CodecFailure {
                tool: "fake".to_string(),
                status: "exit status: 1".to_string(),
                diagnostic: "injected failure".to_string(),
            });
        }
        tree::ensure_representable(source_dir)?;

        let mut entries = Vec::new();
        for entry in WalkDir::new(source_dir).follow_links(false).sort_by_file_name() {
            let entry = entry.unwrap();
            let metadata = entry.path().symlink_metadata()?;
            let kind = if metadata.file_type().is_symlink() {
                EntryKind::Symlink(std::fs::read_link(entry.path())?)
            } else if metadata.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File(std::fs::read(entry.path())?)
            };
            entries.push(Entry {
                path: entry
                    .path()
                    .strip_prefix(source_dir)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned(),
                mode: metadata.permissions().mode() & 0o7777,
                kind,
            });
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&serde_json::to_vec(&entries)?)?;
        std::fs::write(output, encoder.finish()?)?;
        Ok(())
    }

    async fn unpack(&self, input: &Path, dest_dir: &Path) -> Result<()> {
        tree::ensure_vacant(dest_dir)?;
        let mut json = Vec::new();
        GzDecoder::new(std::fs::File::open(input)?)
            .read_to_end(&mut json)
            .map_err(|e| Error::corrupt(input, e.to_string()))?;
        let entries: Vec<Entry> =
            serde_json::from_slice(&json).map_err(|e| Error::corrupt(input, e.to_string()))?;

        std::fs::create_dir_all(dest_dir)?;
        let mut dirs = Vec::new();
        for entry in entries {
            let path = if entry.path.is_empty() {
                dest_dir.to_path_buf()
            } else {
                dest_dir.join(&entry.path)
            };
            match entry.kind {
                EntryKind::Dir => {
                    std::fs::create_dir_all(&path)?;
                    dirs.push((path, entry.mode));
                }
                EntryKind::File(data) => {
                    std::fs::write(&path, data)?;
                    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(entry.mode))?;
                }
                EntryKind::Symlink(target) => std::os::unix::fs::symlink(target, &path)?,
            }
        }
        for (path, mode) in dirs.into_iter().rev() {
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCodecs {
    fail_pack: Arc<AtomicBool>,
}

impl FakeCodecs {
    pub fn fail_packing(&self, fail: bool) {
        self.fail_pack.store(fail, Ordering::SeqCst);
    }
}

impl CodecFactory for FakeCodecs {
    fn preferred(&self) -> CodecBackend {
        CodecBackend::baseline()
    }

    fn codec(&self, _backend: CodecBackend) -> Result<Box<dyn ContainerCodec>> {
        Ok(Box::new(FakeCodec {
            fail_pack: self.fail_pack.clone(),
        }))
    }
}

/// Repository that stores each snapshot as a plain directory copy.
///
/// Layout: `config`, `tags.json` and `snapshots/<tag>/<source name>/...`.
#[derive(Default)]
pub struct FakeRepository {
    mounted: Mutex<HashSet<String>>,
    pub releases: AtomicUsize,
    pub mount_unavailable: AtomicBool,
}

impl FakeRepository {
    fn save_tags(repo_dir: &Path, tags: &[TagRecord]) -> Result<()> {
        std::fs::write(repo_dir.join("tags.json"), serde_json::to_vec(tags)?)?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryAdapter for FakeRepository {
    async fn init(&self, repo_dir: &Path) -> Result<()> {
        if tree::is_populated_dir(repo_dir) {
            return Err(Error::RepositoryExists {
                path: repo_dir.to_path_buf(),
            });
        }
        std::fs::create_dir_all(repo_dir.join("snapshots"))?;
        std::fs::write(repo_dir.join("config"), b"[repository]\nversion = 1\n")?;
        Self::save_tags(repo_dir, &[])
    }

    async fn is_repository(&self, dir: &Path) -> bool {
        std::fs::read_to_string(dir.join("config"))
            .map(|config| config.starts_with("[repository]"))
            .unwrap_or(false)
    }

    async fn is_locked(&self, repo_dir: &Path) -> bool {
        repo_dir.join("lock.roster").exists()
    }

    async fn snapshot(&self, repo_dir: &Path, source_dir: &Path, tag: &str) -> Result<TagRecord> {
        let mut tags = self.list(repo_dir).await?;
        if tags.iter().any(|record| record.name == tag) {
            return Err(Error::TagAlreadyExists {
                tag: tag.to_string(),
            });
        }
        let name = source_dir.file_name().unwrap();
        copy_tree(source_dir, &repo_dir.join("snapshots").join(tag).join(name))?;

        let record = TagRecord::new(tag, Utc::now().naive_utc());
        tags.push(record.clone());
        Self::save_tags(repo_dir, &tags)?;
        Ok(record)
    }

    async fn list(&self, repo_dir: &Path) -> Result<Vec<TagRecord>> {
        let data = std::fs::read(repo_dir.join("tags.json")).map_err(|e| {
            Error::RepositoryFailure {
                step: "list".to_string(),
                diagnostic: e.to_string(),
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn extract(&self, repo_dir: &Path, tag: &str, dest_dir: &Path) -> Result<()> {
        tree::ensure_vacant(dest_dir)?;
        let snapshot = repo_dir.join("snapshots").join(tag);
        if !snapshot.is_dir() {
            return Err(Error::TagNotFound {
                tag: tag.to_string(),
            });
        }
        copy_tree(&snapshot, dest_dir)
    }

    async fn mount(&self, _repo_dir: &Path, _tag: &str, mount_point: &Path) -> Result<()> {
        if self.mount_unavailable.load(Ordering::SeqCst) {
            return Err(Error::MountUnavailable("no FUSE in tests".to_string()));
        }
        self.mounted.lock().unwrap().insert(registry_key(mount_point));
        Ok(())
    }

    async fn unmount(&self, mount_point: &Path) -> Result<()> {
        if self.mounted.lock().unwrap().remove(&registry_key(mount_point)) {
            Ok(())
        } else {
            Err(Error::NotMounted {
                path: mount_point.to_path_buf(),
            })
        }
    }

    async fn is_mounted(&self, mount_point: &Path) -> bool {
        self.mounted
            .lock()
            .unwrap()
            .contains(&registry_key(mount_point))
    }

    async fn check(&self, repo_dir: &Path) -> Result<()> {
        for record in self.list(repo_dir).await? {
            if !repo_dir.join("snapshots").join(&record.name).is_dir() {
                return Err(Error::RepositoryFailure {
                    step: "check".to_string(),
                    diagnostic: format!("snapshot {} has no data", record.name),
                });
            }
        }
        Ok(())
    }

    async fn release(&self, _repo_dir: &Path) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.unwrap();
        let target = dst.join(entry.path().strip_prefix(src).unwrap());
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            std::os::unix::fs::symlink(std::fs::read_link(entry.path())?, &target)?;
        } else if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Relative path → contents of every regular file under `root`.
pub fn read_tree(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (rel, std::fs::read_to_string(entry.path()).unwrap())
        })
        .collect()
}

/// Engine wired to the fakes inside a private temp directory.
pub struct Fixture {
    pub dir: TempDir,
    pub codecs: Arc<FakeCodecs>,
    pub repository: Arc<FakeRepository>,
    pub engine: ArchiveEngine,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let codecs = Arc::new(FakeCodecs::default());
        let repository = Arc::new(FakeRepository::default());
        let engine = ArchiveEngine::new(
            codecs.clone(),
            repository.clone(),
            MountRegistry::new(dir.path().join("state")),
        )
        .with_scratch_dir(Some(dir.path().join("scratch")));
        Self {
            dir,
            codecs,
            repository,
            engine,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Creates `<tmp>/<name>` holding the given files.
    pub fn source(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = self.path(name);
        std::fs::create_dir_all(&root).unwrap();
        for (rel, contents) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        root
    }

    /// Number of scratch roots still present.
    pub fn scratch_count(&self) -> usize {
        std::fs::read_dir(self.path("scratch"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Names of leftover staging files next to archives.
    pub fn staged_leftovers(&self) -> Vec<String> {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".borgpack-"))
            .collect()
    }
}
