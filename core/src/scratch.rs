use crate::repository::RepositoryAdapter;
use crate::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Directory name of the repository inside a scratch root. Tar containers
/// carry this as their single top-level component.
pub const REPO_DIR_NAME: &str = "borg-repo";

/// A temporary repository location that is removed on every exit path
/// unless explicitly kept.
///
/// `discard` releases host-side repository state and reports removal
/// problems through the log; dropping without `discard` still removes the
/// directory tree.
pub struct ScratchRepo {
    root: TempDir,
    repo: PathBuf,
}

impl ScratchRepo {
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("borgpack-");
        let root = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let repo = root.path().join(REPO_DIR_NAME);
        debug!(root = %root.path().display(), "created scratch directory");
        Ok(Self { root, repo })
    }

    /// Where the repository lives; not created until a codec or adapter
    /// populates it.
    pub fn repo_dir(&self) -> &Path {
        &self.repo
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub async fn discard(self, repository: &dyn RepositoryAdapter) {
        let Self { root, repo } = self;
        if repository.is_repository(&repo).await {
            if let Err(e) = repository.release(&repo).await {
                warn!(repo = %repo.display(), error = %e, "failed to release repository state");
            }
        }
        let path = root.path().to_path_buf();
        match root.close() {
            Ok(()) => debug!(root = %path.display(), "removed scratch directory"),
            Err(e) => warn!(root = %path.display(), error = %e, "failed to remove scratch directory"),
        }
    }

    /// Stops tracking the directory so it outlives this process. Returns the
    /// scratch root and the repository path inside it.
    pub fn keep(self) -> (PathBuf, PathBuf) {
        let Self { root, repo } = self;
        (root.keep(), repo)
    }
}
