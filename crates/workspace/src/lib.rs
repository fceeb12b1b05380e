//! Isolated workspace provisioning.
//!
//! Every running task gets its own branch and linked git worktree, so
//! concurrent agents never share a checkout. Creation is atomic: a
//! failure partway through rolls back the branch and directory it
//! half-made.

#![warn(missing_docs)]

use async_trait::async_trait;
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A provisioned checkout.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Root of the worktree
    pub path: PathBuf,
    /// The branch checked out in it
    pub branch: String,
    /// The commit the branch started from
    pub commit: String,
}

/// Options for workspace creation.
#[derive(Debug, Clone)]
pub struct WorkspaceOptions {
    /// Branch to fork from; falls back to HEAD when missing
    pub base_branch: String,
    /// Namespace prefix for created branches
    pub prefix: String,
    /// Overwrite an existing branch of the same name
    pub force: bool,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            prefix: "armada".to_string(),
            force: false,
        }
    }
}

/// Creates and tears down isolated checkouts.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    /// Create a workspace for `branch_name`.
    async fn create(
        &self,
        branch_name: &str,
        options: &WorkspaceOptions,
    ) -> anyhow::Result<Workspace>;

    /// Tear a workspace down. Idempotent: a missing path is Ok.
    async fn cleanup(&self, path: &Path) -> anyhow::Result<()>;
}

/// Provisioner backed by git2 linked worktrees.
pub struct GitWorktreeProvisioner {
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
}

impl GitWorktreeProvisioner {
    /// Provision worktrees of the repository at `repo_root`, placing them
    /// under `worktrees_dir`.
    pub fn new(repo_root: impl Into<PathBuf>, worktrees_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            worktrees_dir: worktrees_dir.into(),
        }
    }
}

#[async_trait]
impl WorkspaceProvisioner for GitWorktreeProvisioner {
    async fn create(
        &self,
        branch_name: &str,
        options: &WorkspaceOptions,
    ) -> anyhow::Result<Workspace> {
        let repo_root = self.repo_root.clone();
        let worktrees_dir = self.worktrees_dir.clone();
        let branch_name = branch_name.to_string();
        let options = options.clone();

        // git2 is synchronous; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            create_blocking(&repo_root, &worktrees_dir, &branch_name, &options)
        })
        .await?
    }

    async fn cleanup(&self, path: &Path) -> anyhow::Result<()> {
        let repo_root = self.repo_root.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || cleanup_blocking(&repo_root, &path)).await?
    }
}

fn create_blocking(
    repo_root: &Path,
    worktrees_dir: &Path,
    branch_name: &str,
    options: &WorkspaceOptions,
) -> anyhow::Result<Workspace> {
    let repo = Repository::open(repo_root)?;

    let base_commit = match repo.find_branch(&options.base_branch, BranchType::Local) {
        Ok(branch) => branch.get().peel_to_commit()?,
        Err(_) => {
            debug!(
                base = %options.base_branch,
                "base branch not found, falling back to HEAD"
            );
            repo.head()?.peel_to_commit()?
        }
    };

    let full_branch = format!("{}/{}", options.prefix, branch_name);
    let worktree_name = full_branch.replace('/', "-");
    let path = worktrees_dir.join(&worktree_name);

    repo.branch(&full_branch, &base_commit, options.force)?;

    let added = (|| -> anyhow::Result<()> {
        std::fs::create_dir_all(worktrees_dir)?;
        let branch = repo.find_branch(&full_branch, BranchType::Local)?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(branch.get()));
        repo.worktree(&worktree_name, &path, Some(&opts))?;
        Ok(())
    })();

    if let Err(err) = added {
        // Roll back whatever half-exists; creation is all-or-nothing.
        warn!(branch = %full_branch, error = %err, "workspace creation failed, rolling back");
        let _ = std::fs::remove_dir_all(&path);
        if let Ok(mut branch) = repo.find_branch(&full_branch, BranchType::Local) {
            let _ = branch.delete();
        }
        return Err(err);
    }

    info!(branch = %full_branch, path = %path.display(), "workspace ready");
    Ok(Workspace {
        path,
        branch: full_branch,
        commit: base_commit.id().to_string(),
    })
}

fn cleanup_blocking(repo_root: &Path, path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }

    if let Ok(repo) = Repository::open(repo_root) {
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            if let Ok(worktree) = repo.find_worktree(name) {
                let mut opts = WorktreePruneOptions::new();
                opts.valid(true).working_tree(true);
                let _ = worktree.prune(Some(&mut opts));
            }
        }
    }

    debug!(path = %path.display(), "workspace cleaned up");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            std::fs::write(dir.join("README.md"), "hello").unwrap();
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("README.md")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = git2::Signature::now("test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn creates_an_isolated_checkout() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let provisioner =
            GitWorktreeProvisioner::new(dir.path(), dir.path().join("worktrees"));
        let ws = provisioner
            .create("task-1", &WorkspaceOptions::default())
            .await
            .unwrap();

        assert_eq!(ws.branch, "armada/task-1");
        assert!(ws.path.exists());
        assert!(ws.path.join("README.md").exists());
        assert!(!ws.commit.is_empty());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let provisioner =
            GitWorktreeProvisioner::new(dir.path(), dir.path().join("worktrees"));
        let ws = provisioner
            .create("task-2", &WorkspaceOptions::default())
            .await
            .unwrap();

        provisioner.cleanup(&ws.path).await.unwrap();
        assert!(!ws.path.exists());
        provisioner.cleanup(&ws.path).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_branch_fails_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let provisioner =
            GitWorktreeProvisioner::new(dir.path(), dir.path().join("worktrees"));
        let options = WorkspaceOptions::default();
        provisioner.create("task-3", &options).await.unwrap();
        assert!(provisioner.create("task-3", &options).await.is_err());
    }

    #[tokio::test]
    async fn reuses_the_branch_name_after_cleanup_with_force() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let provisioner =
            GitWorktreeProvisioner::new(dir.path(), dir.path().join("worktrees"));
        let mut options = WorkspaceOptions::default();
        let ws = provisioner.create("task-4", &options).await.unwrap();
        provisioner.cleanup(&ws.path).await.unwrap();

        options.force = true;
        let ws = provisioner.create("task-4", &options).await.unwrap();
        assert!(ws.path.exists());
    }
}
