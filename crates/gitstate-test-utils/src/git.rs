//! Real git repositories built with `git2`.
//!
//! Realism level: **REAL WITH HISTORY**. Commits carry explicit timestamps
//! so age-based decisions stay deterministic.

use std::fs;
use std::path::Path;

use git2::{Repository, Signature, Time};
use tempfile::TempDir;

/// A temporary repository with `main` as the initial branch.
pub struct GitFixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl GitFixture {
    /// Empty repository, HEAD on unborn `main`.
    ///
    /// # Panics
    /// Panics if the repository cannot be created.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("GitFixture: tempdir failed: {e}"));
        let repo = Repository::init(dir.path())
            .unwrap_or_else(|e| panic!("GitFixture: init failed: {e}"));
        repo.set_head("refs/heads/main")
            .unwrap_or_else(|e| panic!("GitFixture: set_head failed: {e}"));
        Self { dir, repo }
    }

    /// Repository with one commit on `main` at `secs`.
    pub fn with_commit(secs: i64) -> Self {
        let fixture = Self::new();
        fixture.commit_file("README.md", "# fixture\n", secs);
        fixture
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write and commit `file` on the current branch at time `secs`.
    ///
    /// # Panics
    /// Panics on any git failure.
    pub fn commit_file(&self, file: &str, content: &str, secs: i64) -> git2::Oid {
        let path = self.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| panic!("commit_file: mkdir failed: {e}"));
        }
        fs::write(&path, content).unwrap_or_else(|e| panic!("commit_file: write failed: {e}"));

        let mut index = self.repo.index().unwrap_or_else(|e| panic!("commit_file: index: {e}"));
        index
            .add_path(Path::new(file))
            .unwrap_or_else(|e| panic!("commit_file: add {file}: {e}"));
        index.write().unwrap_or_else(|e| panic!("commit_file: index write: {e}"));
        let tree_id = index
            .write_tree()
            .unwrap_or_else(|e| panic!("commit_file: write_tree: {e}"));
        let tree = self
            .repo
            .find_tree(tree_id)
            .unwrap_or_else(|e| panic!("commit_file: find_tree: {e}"));

        let sig = Signature::new("Fixture", "fixture@example.com", &Time::new(secs, 0))
            .unwrap_or_else(|e| panic!("commit_file: signature: {e}"));
        let parents = match self.repo.head() {
            Ok(head) => vec![
                head.peel_to_commit()
                    .unwrap_or_else(|e| panic!("commit_file: head commit: {e}")),
            ],
            Err(_) => vec![],
        };
        let parent_refs: Vec<_> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, file, &tree, &parent_refs)
            .unwrap_or_else(|e| panic!("commit_file: commit: {e}"))
    }

    /// Create `name` at HEAD without switching to it.
    pub fn create_branch(&self, name: &str) {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .unwrap_or_else(|e| panic!("create_branch: no HEAD commit: {e}"));
        self.repo
            .branch(name, &head, false)
            .unwrap_or_else(|e| panic!("create_branch: {name}: {e}"));
    }

    /// Point HEAD at `name` and force the working tree to match.
    pub fn checkout(&self, name: &str) {
        self.repo
            .set_head(&format!("refs/heads/{name}"))
            .unwrap_or_else(|e| panic!("checkout: {name}: {e}"));
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))
            .unwrap_or_else(|e| panic!("checkout: {name}: {e}"));
    }

    /// Write an uncommitted file.
    pub fn write_file(&self, file: &str, content: &str) {
        fs::write(self.path().join(file), content)
            .unwrap_or_else(|e| panic!("write_file: {file}: {e}"));
    }
}

impl Default for GitFixture {
    fn default() -> Self {
        Self::new()
    }
}
