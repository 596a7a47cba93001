use git2::{ErrorCode, Repository, Signature, Status, Tree};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Rendered verbatim: the operator may need the exact git message.
    #[error("{0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path is outside the archive: {}", .0.display())]
    OutsideArchive(PathBuf),

    #[error("Archive repository has no working directory: {}", .0.display())]
    Bare(PathBuf),
}

/// The durable, history-preserving store that completed puzzle logs are
/// committed into. Paths may be absolute or relative to the archive root.
pub trait Archive {
    fn stage_add(&mut self, path: &Path) -> Result<(), ArchiveError>;

    fn stage_remove(&mut self, path: &Path) -> Result<(), ArchiveError>;

    /// Record everything staged so far as one unit.
    fn commit(&mut self, message: &str) -> Result<(), ArchiveError>;

    /// Discard local changes to `path`, returning it to its last committed
    /// content. A path that was never committed is unstaged and removed.
    fn restore(&mut self, path: &Path) -> Result<(), ArchiveError>;

    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool, ArchiveError>;
}

/// [`Archive`] backed by a git repository.
pub struct GitArchive {
    repo: Repository,
    workdir: PathBuf,
}

impl GitArchive {
    /// Open the repository containing `root`.
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        let repo = Repository::discover(root)?;
        Self::from_repo(repo)
    }

    /// Open the repository at `root`, creating the directory and an empty
    /// repository if neither exists yet.
    pub fn open_or_init(root: &Path) -> Result<Self, ArchiveError> {
        let repo = match Repository::open(root) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                fs::create_dir_all(root)?;
                debug!(root = %root.display(), "Initializing archive repository");
                Repository::init(root)?
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_repo(repo)
    }

    fn from_repo(repo: Repository) -> Result<Self, ArchiveError> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| ArchiveError::Bare(repo.path().to_path_buf()))?
            .canonicalize()?;
        Ok(Self { repo, workdir })
    }

    /// Root of the archive's working tree.
    pub fn root(&self) -> &Path {
        &self.workdir
    }

    fn relative(&self, path: &Path) -> Result<PathBuf, ArchiveError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        };

        if let Ok(rel) = absolute.strip_prefix(&self.workdir) {
            return Ok(rel.to_path_buf());
        }

        // The caller may have come in through a symlinked prefix (e.g. a temp
        // dir); resolve the parent, which must exist for any staged path.
        let resolved = match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|parent| parent.join(name))
                .unwrap_or(absolute.clone()),
            _ => absolute.clone(),
        };

        resolved
            .strip_prefix(&self.workdir)
            .map(Path::to_path_buf)
            .map_err(|_| ArchiveError::OutsideArchive(path.to_path_buf()))
    }

    fn head_tree(&self) -> Result<Option<Tree<'_>>, ArchiveError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_tree()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Archive for GitArchive {
    fn stage_add(&mut self, path: &Path) -> Result<(), ArchiveError> {
        let rel = self.relative(path)?;
        let mut index = self.repo.index()?;
        index.add_path(&rel)?;
        index.write()?;
        debug!(path = %rel.display(), "Staged addition");
        Ok(())
    }

    fn stage_remove(&mut self, path: &Path) -> Result<(), ArchiveError> {
        let rel = self.relative(path)?;
        let mut index = self.repo.index()?;
        index.remove_path(&rel)?;
        index.write()?;
        debug!(path = %rel.display(), "Staged removal");
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<(), ArchiveError> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = match self.repo.signature() {
            Ok(sig) => sig,
            Err(_) => Signature::now("wordlog", "wordlog@localhost")?,
        };

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                None
            }
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let id = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        debug!(commit = %id, "Committed archive transaction");
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<(), ArchiveError> {
        let rel = self.relative(path)?;
        let target = self.workdir.join(&rel);
        let committed = match self.head_tree()? {
            Some(tree) => match tree.get_path(&rel) {
                Ok(entry) => Some(self.repo.find_blob(entry.id())?.content().to_vec()),
                Err(e) if e.code() == ErrorCode::NotFound => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let mut index = self.repo.index()?;
        match committed {
            Some(content) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, content)?;
                index.add_path(&rel)?;
            }
            None => {
                if index.get_path(&rel, 0).is_some() {
                    index.remove_path(&rel)?;
                }
                match fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        index.write()?;
        debug!(path = %rel.display(), "Restored to last committed content");
        Ok(())
    }

    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool, ArchiveError> {
        let rel = self.relative(path)?;
        match self.repo.status_file(&rel) {
            Ok(status) => Ok(!status.difference(Status::IGNORED).is_empty()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
