use std::path::Path;

use git2::{Repository, build::RepoBuilder};
use tracing::{debug, instrument};

use kiln_core::{domain::SourceDescriptor, error::KilnResult};

use super::unavailable;

/// Clones a repository and checks out the requested revision.
///
/// The `.git` directory is removed afterwards; only the working tree is
/// cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl GitFetcher {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub fn clone_into(&self, url: &str, rev: Option<&str>, dest: &Path) -> KilnResult<()> {
        let source = SourceDescriptor::Git {
            url: url.to_string(),
            rev: rev.map(str::to_string),
        };
        let fail = |e: git2::Error| unavailable(&source, e.message());

        let repo = RepoBuilder::new().clone(url, dest).map_err(fail)?;
        if let Some(rev) = rev {
            checkout(&repo, rev).map_err(fail)?;
        }
        drop(repo);

        let git_dir = dest.join(".git");
        std::fs::remove_dir_all(&git_dir).map_err(|e| unavailable(&source, e))?;
        debug!("Cloned");
        Ok(())
    }
}

/// Detach HEAD at `rev`: a tag, a commit, or a remote branch name.
fn checkout(repo: &Repository, rev: &str) -> Result<(), git2::Error> {
    let object = repo
        .revparse_single(rev)
        .or_else(|_| repo.revparse_single(&format!("origin/{rev}")))?;
    let commit = object.peel_to_commit()?;
    repo.checkout_tree(commit.as_object(), Some(git2::build::CheckoutBuilder::new().force()))?;
    repo.set_head_detached(commit.id())
}
