use crate::codec::{self, CodecFactory};
use crate::mounts::{MountRecord, MountRegistry, registry_key};
use crate::repository::RepositoryAdapter;
use crate::scratch::{REPO_DIR_NAME, ScratchRepo};
use crate::tree;
use crate::{ArchiveState, Error, Result, TagRecord};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Options for writing a brand new archive.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Replace an existing archive file instead of failing.
    pub overwrite: bool,
    /// Name of the first snapshot; generated when unset.
    pub tag: Option<String>,
}

/// Drives the collapse/expand lifecycle of archive files.
///
/// The engine never writes to an archive path directly: new contents are
/// packed into a temporary file in the same directory and renamed over the
/// destination only once packing succeeded. Temporary repositories are
/// removed on every exit path unless promoted to persistent state by
/// `mount`, `expand` or `create_expanded`.
///
/// Concurrent invocations against the same archive file are not
/// coordinated; callers that need that must hold an external lock.
///
/// # Examples
///
/// ```no_run
/// # use borgpack_core::archive::{ArchiveEngine, CreateOptions};
/// # use std::path::Path;
/// # async fn demo(engine: &ArchiveEngine) -> borgpack_core::Result<()> {
/// engine.create(Path::new("data.baz"), Path::new("data"), &CreateOptions::default()).await?;
///
/// let mut archive = engine.open("data.baz");
/// for tag in archive.list_tags().await? {
///     println!("{}", tag.name);
/// }
/// archive.extract(Path::new("restored"), None).await?;
/// archive.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ArchiveEngine {
    codecs: Arc<dyn CodecFactory>,
    repository: Arc<dyn RepositoryAdapter>,
    mounts: MountRegistry,
    scratch_dir: Option<PathBuf>,
}

impl ArchiveEngine {
    pub fn new(
        codecs: Arc<dyn CodecFactory>,
        repository: Arc<dyn RepositoryAdapter>,
        mounts: MountRegistry,
    ) -> Self {
        Self {
            codecs,
            repository,
            mounts,
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: Option<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    /// Binds a handle to one archive path. Nothing is touched on disk until
    /// an operation runs.
    pub fn open<P: AsRef<Path>>(&self, archive: P) -> Archive<'_> {
        Archive {
            engine: self,
            path: archive.as_ref().to_path_buf(),
            state: ArchiveState::Collapsed,
            expanded: None,
        }
    }

    pub fn repository(&self) -> &dyn RepositoryAdapter {
        self.repository.as_ref()
    }

    pub fn mounts(&self) -> &MountRegistry {
        &self.mounts
    }

    pub async fn create(
        &self,
        archive: &Path,
        source_dir: &Path,
        options: &CreateOptions,
    ) -> Result<TagRecord> {
        let mut handle = self.open(archive);
        let result = handle.create(source_dir, options).await;
        handle.close().await;
        result
    }

    pub async fn update(
        &self,
        archive: &Path,
        source_dir: &Path,
        tag: Option<&str>,
    ) -> Result<TagRecord> {
        let mut handle = self.open(archive);
        let result = handle.update(source_dir, tag).await;
        handle.close().await;
        result
    }

    /// Returns the tag that was extracted.
    pub async fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        tag: Option<&str>,
    ) -> Result<String> {
        let mut handle = self.open(archive);
        let result = handle.extract(dest_dir, tag).await;
        handle.close().await;
        result
    }

    pub async fn list_tags(&self, archive: &Path) -> Result<Vec<TagRecord>> {
        let mut handle = self.open(archive);
        let result = handle.list_tags().await;
        handle.close().await;
        result
    }

    pub async fn mount(
        &self,
        archive: &Path,
        mount_point: &Path,
        tag: Option<&str>,
    ) -> Result<MountRecord> {
        let mut handle = self.open(archive);
        let result = handle.mount(mount_point, tag).await;
        handle.close().await;
        result
    }

    pub async fn verify(&self, archive: &Path) -> Result<()> {
        let mut handle = self.open(archive);
        let result = handle.verify().await;
        handle.close().await;
        result
    }

    /// Releases a mount made by `mount`, possibly in another process, and
    /// removes the scratch repository that backed it.
    ///
    /// A registry record whose mount is gone is stale: its scratch directory
    /// is cleaned up and `NotMounted` is still reported.
    pub async fn umount(&self, mount_point: &Path) -> Result<Option<MountRecord>> {
        if !self.repository.is_mounted(mount_point).await {
            if let Some(stale) = self.mounts.remove(mount_point).await? {
                warn!(
                    mount_point = %mount_point.display(),
                    scratch = %stale.scratch_root.display(),
                    "dropping stale mount record"
                );
                self.remove_mount_scratch(&stale).await;
            }
            return Err(Error::NotMounted {
                path: mount_point.to_path_buf(),
            });
        }

        let record = self.mounts.lookup(mount_point).await?;
        self.repository.unmount(mount_point).await?;
        info!(mount_point = %mount_point.display(), "unmounted");

        if let Some(record) = &record {
            self.mounts.remove(mount_point).await?;
            self.remove_mount_scratch(record).await;
        }
        Ok(record)
    }

    /// Unpacks `archive` into `repo_dir`, which persists afterwards.
    pub async fn expand(&self, archive: &Path, repo_dir: &Path) -> Result<()> {
        tree::ensure_vacant(repo_dir)?;
        let codec = codec::reader_for(self.codecs.as_ref(), archive).await?;

        let parent = parent_dir(repo_dir);
        fs::create_dir_all(&parent).await?;
        let staging = tempfile::Builder::new()
            .prefix(".borgpack-expand-")
            .tempdir_in(&parent)?;
        let staged_repo = staging.path().join(REPO_DIR_NAME);

        codec.unpack(archive, &staged_repo).await?;
        if !self.repository.is_repository(&staged_repo).await {
            return Err(Error::corrupt(archive, "container does not hold a repository"));
        }
        fs::rename(&staged_repo, repo_dir).await?;

        info!(archive = %archive.display(), repo = %repo_dir.display(), "expanded archive");
        Ok(())
    }

    /// Packs an expanded repository into `archive`, removing the repository
    /// afterwards unless `keep_repo` is set.
    pub async fn collapse(&self, repo_dir: &Path, archive: &Path, keep_repo: bool) -> Result<()> {
        self.ensure_usable_repository(repo_dir).await?;
        self.collapse_into(repo_dir, archive).await?;
        info!(repo = %repo_dir.display(), archive = %archive.display(), "collapsed repository");

        if !keep_repo {
            if let Err(e) = self.repository.release(repo_dir).await {
                warn!(repo = %repo_dir.display(), error = %e, "failed to release repository state");
            }
            fs::remove_dir_all(repo_dir).await?;
            debug!(repo = %repo_dir.display(), "removed collapsed repository");
        }
        Ok(())
    }

    /// Creates a persistent expanded repository holding one snapshot of
    /// `source_dir`.
    pub async fn create_expanded(
        &self,
        repo_dir: &Path,
        source_dir: &Path,
        tag: Option<&str>,
    ) -> Result<TagRecord> {
        ensure_source(source_dir).await?;
        let existed = fs::try_exists(repo_dir).await?;
        if existed && !is_empty_dir(repo_dir).await {
            return Err(Error::RepositoryExists {
                path: repo_dir.to_path_buf(),
            });
        }

        let result: Result<TagRecord> = async {
            self.repository.init(repo_dir).await?;
            self.repository
                .snapshot_reserved(repo_dir, source_dir, tag)
                .await
        }
        .await;

        if result.is_err() {
            if let Err(e) = fs::remove_dir_all(repo_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(repo = %repo_dir.display(), error = %e, "failed to remove partial repository");
                }
            }
            if existed {
                if let Err(e) = fs::create_dir_all(repo_dir).await {
                    warn!(repo = %repo_dir.display(), error = %e, "failed to restore empty repository directory");
                }
            }
        }
        result
    }

    /// Adds a snapshot to an expanded repository in place.
    pub async fn update_expanded(
        &self,
        repo_dir: &Path,
        source_dir: &Path,
        tag: Option<&str>,
    ) -> Result<TagRecord> {
        ensure_source(source_dir).await?;
        self.ensure_usable_repository(repo_dir).await?;
        self.repository
            .snapshot_reserved(repo_dir, source_dir, tag)
            .await
    }

    pub async fn list_expanded(&self, repo_dir: &Path) -> Result<Vec<TagRecord>> {
        if !self.repository.is_repository(repo_dir).await {
            return Err(Error::NotARepository {
                path: repo_dir.to_path_buf(),
            });
        }
        self.repository.list(repo_dir).await
    }

    fn scratch(&self) -> Result<ScratchRepo> {
        ScratchRepo::create(self.scratch_dir.as_deref())
    }

    async fn ensure_usable_repository(&self, repo_dir: &Path) -> Result<()> {
        if !self.repository.is_repository(repo_dir).await {
            return Err(Error::NotARepository {
                path: repo_dir.to_path_buf(),
            });
        }
        if self.repository.is_locked(repo_dir).await {
            return Err(Error::RepositoryLocked {
                path: repo_dir.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Unpacks `archive` into a fresh scratch repository.
    async fn expand_scratch(&self, archive: &Path) -> Result<ScratchRepo> {
        let codec = codec::reader_for(self.codecs.as_ref(), archive).await?;
        let scratch = self.scratch()?;

        if let Err(e) = codec.unpack(archive, scratch.repo_dir()).await {
            scratch.discard(self.repository.as_ref()).await;
            return Err(e);
        }
        if !self.repository.is_repository(scratch.repo_dir()).await {
            scratch.discard(self.repository.as_ref()).await;
            return Err(Error::corrupt(archive, "container does not hold a repository"));
        }
        debug!(archive = %archive.display(), repo = %scratch.repo_dir().display(), "expanded to scratch");
        Ok(scratch)
    }

    /// Atomically replaces `archive` with a container of `repo_dir`.
    async fn collapse_into(&self, repo_dir: &Path, archive: &Path) -> Result<()> {
        let codec = codec::writer(self.codecs.as_ref())?;
        let parent = parent_dir(archive);
        let permissions = match fs::metadata(archive).await {
            Ok(metadata) => metadata.permissions(),
            Err(_) => default_permissions(),
        };

        let staged = tempfile::Builder::new()
            .prefix(".borgpack-")
            .suffix(".partial")
            .tempfile_in(&parent)?;
        debug!(staged = %staged.path().display(), backend = %codec.backend(), "packing repository");

        codec.pack(repo_dir, staged.path()).await?;
        staged.as_file().sync_all()?;
        fs::set_permissions(staged.path(), permissions).await?;
        staged
            .persist(archive)
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    async fn remove_mount_scratch(&self, record: &MountRecord) {
        if self.repository.is_repository(&record.repo_dir).await {
            if let Err(e) = self.repository.release(&record.repo_dir).await {
                warn!(repo = %record.repo_dir.display(), error = %e, "failed to release repository state");
            }
        }
        let owned = record
            .scratch_root
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("borgpack-"));
        if !owned {
            warn!(scratch = %record.scratch_root.display(), "refusing to remove unrecognised scratch directory");
            return;
        }
        match fs::remove_dir_all(&record.scratch_root).await {
            Ok(()) => debug!(scratch = %record.scratch_root.display(), "removed mount scratch"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(scratch = %record.scratch_root.display(), error = %e, "failed to remove mount scratch"),
        }
    }
}

/// Handle bound to a single archive path.
///
/// An expansion made for `list_tags`, `extract` or `verify` is cached and
/// reused by later calls on the same handle. `close` removes it with
/// logged cleanup; dropping the handle removes it silently.
pub struct Archive<'a> {
    engine: &'a ArchiveEngine,
    path: PathBuf,
    state: ArchiveState,
    expanded: Option<ScratchRepo>,
}

impl Archive<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Scratch repository currently backing the handle, if expanded.
    pub fn expanded_repo(&self) -> Option<&Path> {
        self.expanded.as_ref().map(ScratchRepo::repo_dir)
    }

    pub async fn create(&mut self, source_dir: &Path, options: &CreateOptions) -> Result<TagRecord> {
        ensure_source(source_dir).await?;
        if !options.overwrite && fs::try_exists(&self.path).await? {
            return Err(Error::ArchiveExists {
                path: self.path.clone(),
            });
        }
        self.drop_expansion().await;

        let engine = self.engine;
        let scratch = engine.scratch()?;
        let repo_dir = scratch.repo_dir().to_path_buf();

        let result = match engine.repository.init(&repo_dir).await {
            Ok(()) => {
                self.transition(ArchiveState::Expanded);
                self.snapshot_and_collapse(&repo_dir, source_dir, options.tag.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };
        scratch.discard(engine.repository.as_ref()).await;
        self.settle(result)
    }

    pub async fn update(&mut self, source_dir: &Path, tag: Option<&str>) -> Result<TagRecord> {
        ensure_source(source_dir).await?;
        let repo_dir = self.ensure_expanded().await?;
        let result = self.snapshot_and_collapse(&repo_dir, source_dir, tag).await;
        // On success the scratch copy matches the new archive, on failure it
        // may hold a snapshot the archive lacks; either way it is spent.
        self.drop_expansion().await;
        self.settle(result)
    }

    /// Materialises one snapshot (the latest when `tag` is `None`) at
    /// `dest_dir` and returns its tag.
    pub async fn extract(&mut self, dest_dir: &Path, tag: Option<&str>) -> Result<String> {
        tree::ensure_vacant(dest_dir)?;
        let created_dest = !fs::try_exists(dest_dir).await?;
        let repo_dir = self.ensure_expanded().await?;
        let repository = self.engine.repository.as_ref();

        let result: Result<String> = async {
            let tag = repository.resolve_tag(&repo_dir, tag).await?;
            repository.extract(&repo_dir, &tag, dest_dir).await?;
            Ok(tag)
        }
        .await;

        match &result {
            Ok(tag) => info!(archive = %self.path.display(), %tag, dest = %dest_dir.display(), "extracted"),
            Err(_) if created_dest => {
                if let Err(e) = fs::remove_dir_all(dest_dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(dest = %dest_dir.display(), error = %e, "failed to remove partial extraction");
                    }
                }
            }
            Err(_) => {}
        }
        result
    }

    pub async fn list_tags(&mut self) -> Result<Vec<TagRecord>> {
        let repo_dir = self.ensure_expanded().await?;
        self.engine.repository.list(&repo_dir).await
    }

    pub async fn verify(&mut self) -> Result<()> {
        let repo_dir = self.ensure_expanded().await?;
        self.engine.repository.check(&repo_dir).await
    }

    /// Mounts one snapshot read-only at `mount_point`. The backing scratch
    /// repository is handed over to the mount registry and outlives the
    /// handle until `ArchiveEngine::umount`.
    pub async fn mount(&mut self, mount_point: &Path, tag: Option<&str>) -> Result<MountRecord> {
        let created = !fs::try_exists(mount_point).await?;
        fs::create_dir_all(mount_point).await?;
        let result = self.mount_at(mount_point, tag).await;
        if result.is_err() && created {
            if let Err(e) = fs::remove_dir(mount_point).await {
                warn!(mount_point = %mount_point.display(), error = %e, "failed to remove mount point");
            }
        }
        result
    }

    async fn mount_at(&mut self, mount_point: &Path, tag: Option<&str>) -> Result<MountRecord> {
        let engine = self.engine;
        if engine.repository.is_mounted(mount_point).await {
            return Err(Error::MountUnavailable(format!(
                "{} is already a mount point",
                mount_point.display()
            )));
        }

        let scratch = match self.expanded.take() {
            Some(scratch) => scratch,
            None => {
                self.transition(ArchiveState::Expanding);
                match engine.expand_scratch(&self.path).await {
                    Ok(scratch) => scratch,
                    Err(e) => {
                        self.transition(ArchiveState::Error);
                        return Err(e);
                    }
                }
            }
        };

        let repo_dir = scratch.repo_dir().to_path_buf();
        let mounted: Result<String> = async {
            let tag = engine.repository.resolve_tag(&repo_dir, tag).await?;
            engine.repository.mount(&repo_dir, &tag, mount_point).await?;
            Ok(tag)
        }
        .await;
        let tag = match mounted {
            Ok(tag) => tag,
            Err(e) => {
                scratch.discard(engine.repository.as_ref()).await;
                self.transition(ArchiveState::Collapsed);
                return Err(e);
            }
        };

        let (scratch_root, repo_dir) = scratch.keep();
        let record = MountRecord {
            mount_point: PathBuf::from(registry_key(mount_point)),
            repo_dir,
            scratch_root,
            archive: std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone()),
            tag,
            mounted_at: Utc::now(),
        };
        if let Err(e) = engine.mounts.record(record.clone()).await {
            warn!(mount_point = %mount_point.display(), error = %e, "failed to record mount, rolling back");
            if let Err(unmount_err) = engine.repository.unmount(mount_point).await {
                warn!(mount_point = %mount_point.display(), error = %unmount_err, "rollback unmount failed");
            }
            engine.remove_mount_scratch(&record).await;
            self.transition(ArchiveState::Collapsed);
            return Err(e);
        }

        self.transition(ArchiveState::Collapsed);
        info!(archive = %self.path.display(), tag = %record.tag, mount_point = %record.mount_point.display(), "mounted");
        Ok(record)
    }

    /// Removes any cached expansion, logging cleanup problems.
    pub async fn close(mut self) {
        self.drop_expansion().await;
    }

    async fn ensure_expanded(&mut self) -> Result<PathBuf> {
        if let Some(scratch) = &self.expanded {
            return Ok(scratch.repo_dir().to_path_buf());
        }
        self.transition(ArchiveState::Expanding);
        match self.engine.expand_scratch(&self.path).await {
            Ok(scratch) => {
                let repo_dir = scratch.repo_dir().to_path_buf();
                self.expanded = Some(scratch);
                self.transition(ArchiveState::Expanded);
                Ok(repo_dir)
            }
            Err(e) => {
                self.transition(ArchiveState::Error);
                Err(e)
            }
        }
    }

    async fn snapshot_and_collapse(
        &mut self,
        repo_dir: &Path,
        source_dir: &Path,
        tag: Option<&str>,
    ) -> Result<TagRecord> {
        let engine = self.engine;
        let record = engine
            .repository
            .snapshot_reserved(repo_dir, source_dir, tag)
            .await?;
        info!(archive = %self.path.display(), tag = %record.name, "snapshot created");

        self.transition(ArchiveState::Collapsing);
        engine.collapse_into(repo_dir, &self.path).await?;
        Ok(record)
    }

    async fn drop_expansion(&mut self) {
        if let Some(scratch) = self.expanded.take() {
            scratch.discard(self.engine.repository.as_ref()).await;
            self.transition(ArchiveState::Collapsed);
        }
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.transition(ArchiveState::Collapsed),
            Err(e) => {
                debug!(archive = %self.path.display(), error = %e, "archive operation failed");
                self.transition(ArchiveState::Error);
            }
        }
        result
    }

    fn transition(&mut self, next: ArchiveState) {
        if self.state != next {
            debug!(archive = %self.path.display(), from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }
}

async fn ensure_source(source_dir: &Path) -> Result<()> {
    match fs::metadata(source_dir).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        _ => Err(Error::InvalidSource {
            path: source_dir.to_path_buf(),
        }),
    }
}

async fn is_empty_dir(path: &Path) -> bool {
    match fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Mode for a freshly created archive: owner read/write, world readable.
fn default_permissions() -> std::fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    std::fs::Permissions::from_mode(0o644)
}
