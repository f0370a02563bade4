use crate::process::ProcessExecutor;
use crate::repo::GixRepo;
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::{GitBackend, GitRepository, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opens repositories with `gix` and runs mutations through the `git` executable.
pub struct GixBackend {
    git_program: PathBuf,
}

impl GixBackend {
    pub fn with_git_program(program: impl Into<PathBuf>) -> Self {
        Self {
            git_program: program.into(),
        }
    }
}

impl Default for GixBackend {
    fn default() -> Self {
        Self::with_git_program("git")
    }
}

impl GitBackend for GixBackend {
    fn open(&self, workdir: &Path) -> Result<Arc<dyn GitRepository>> {
        let workdir = workdir.canonicalize().map_err(Error::from)?;

        let repo = gix::open(&workdir).map_err(|e| match e {
            gix::open::Error::NotARepository { .. } => Error::new(ErrorKind::NotARepository),
            gix::open::Error::Io(io) => Error::from(io),
            e => Error::new(ErrorKind::Backend(format!("gix open: {e}"))),
        })?;
        let git_dir = repo.git_dir().to_path_buf();
        tracing::info!(workdir = %workdir.display(), git_dir = %git_dir.display(), "opened repository");

        let git = ProcessExecutor::new(&self.git_program, &workdir);
        Ok(Arc::new(GixRepo::new(workdir, git_dir, repo.into_sync(), git)))
    }
}
