//! Ref transport: fetching from the source and pushing to destinations.
//!
//! The engine only needs four capabilities from git, captured by
//! [`RefTransport`]. [`GitCli`] implements them by running `git`.

mod cli;
mod refs;
mod remote;

use std::path::Path;

use async_trait::async_trait;

use crate::platform::Result;

pub use cli::GitCli;
pub use refs::{MIRRORED_NAMESPACES, RefSet};
pub use remote::Remote;

/// A single-file commit recording that a repository was removed upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneCommit {
    /// Branch the commit lands on.
    pub branch: String,
    /// File path inside the tree; the file is the tree's only entry.
    pub path: String,
    /// File content.
    pub content: String,
    /// Commit message.
    pub message: String,
}

/// Ref-level operations against remote repositories.
///
/// `work_dir` is a disposable bare mirror owned by one (repository,
/// destination) pair; callers never share one between concurrent tasks.
#[async_trait]
pub trait RefTransport: Send + Sync {
    /// Branches and tags a remote advertises.
    async fn ls_remote(&self, remote: &Remote) -> Result<RefSet>;

    /// Bring `work_dir` to exactly the source's branches and tags, creating
    /// it if needed. Returns the resulting local ref set.
    async fn fetch_mirror(&self, source: &Remote, work_dir: &Path) -> Result<RefSet>;

    /// Force the destination's branches and tags to match `work_dir`,
    /// deleting any the local mirror lacks.
    async fn push_mirror(&self, work_dir: &Path, destination: &Remote) -> Result<()>;

    /// Push `commit` on top of the destination's branch head (or as a root
    /// commit if the branch is missing).
    async fn push_tombstone(
        &self,
        work_dir: &Path,
        destination: &Remote,
        commit: &TombstoneCommit,
    ) -> Result<()>;
}
