//! Workspace handles.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::client::GitClient;

/// Kind of checkout a [`Workspace`] refers to, computed once at open time.
///
/// A subrepository is addressed like an ordinary subdirectory but carries its
/// VCS metadata as a pointer file into the parent's object store instead of a
/// full metadata directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    /// A standalone checkout with its own metadata directory.
    Root,
    /// A nested checkout referenced by a pointer commit in its parent.
    Subrepository,
}

/// A directory tree containing a version-controlled checkout.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    kind: RepositoryKind,
}

impl Workspace {
    /// Opens the checkout at `path`, tagging it with its [`RepositoryKind`].
    ///
    /// Fails if the path does not exist or holds no VCS metadata.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        if !root.is_dir() {
            return Err(Error::WorkspaceMissing(root));
        }

        let metadata = root.join(".git");
        if !metadata.exists() {
            return Err(Error::WorkspaceMissing(root));
        }

        let kind = if metadata.is_file() {
            RepositoryKind::Subrepository
        } else {
            RepositoryKind::Root
        };

        Ok(Self { root, kind })
    }

    /// Returns the checkout root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the kind computed at open time.
    pub fn kind(&self) -> RepositoryKind {
        self.kind
    }

    /// Returns true if this checkout is a nested subrepository.
    pub fn is_subrepository(&self) -> bool {
        self.kind == RepositoryKind::Subrepository
    }

    /// Opens the enclosing checkout that owns this subrepository's pointer.
    pub fn parent(&self, client: &GitClient) -> Result<Workspace> {
        let above = self
            .root
            .parent()
            .ok_or_else(|| Error::WorkspaceMissing(self.root.clone()))?;
        let toplevel = client.rev_parse_toplevel(above)?;
        Workspace::open(toplevel)
    }
}
