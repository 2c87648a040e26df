#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use git2::{
    build::CheckoutBuilder, IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature,
    Time,
};
use tempfile::TempDir;

const EPOCH: i64 = 1_700_000_000;

/// A scratch repository built commit by commit with libgit2.
pub struct Fixture {
    dir: TempDir,
    repo: Repository,
    clock: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &options).expect("init repository");
        Self {
            dir,
            repo,
            clock: EPOCH,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn write(&self, path: &str, contents: impl AsRef<[u8]>) {
        let target = self.dir.path().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::write(target, contents).expect("write file");
    }

    pub fn remove(&self, path: &str) {
        fs::remove_file(self.dir.path().join(path)).expect("remove file");
    }

    pub fn rename(&self, from: &str, to: &str) {
        fs::rename(self.dir.path().join(from), self.dir.path().join(to)).expect("rename file");
    }

    /// Commit everything in the working tree on top of `HEAD`.
    pub fn commit(&mut self, message: &str) -> Oid {
        self.commit_at(message, 0)
    }

    /// Commit with author and committer dates at the given UTC offset.
    pub fn commit_at(&mut self, message: &str, offset_minutes: i32) -> Oid {
        let parents = self.head_commit().into_iter().collect::<Vec<_>>();
        self.commit_with_parents(message, &parents, offset_minutes)
    }

    /// Record a merge of `other` into `HEAD` using the current working tree.
    pub fn merge(&mut self, message: &str, other: Oid) -> Oid {
        let mut parents = self.head_commit().into_iter().collect::<Vec<_>>();
        parents.push(other);
        self.commit_with_parents(message, &parents, 0)
    }

    pub fn branch(&self, name: &str, at: Oid) {
        let commit = self.repo.find_commit(at).expect("find commit");
        self.repo.branch(name, &commit, true).expect("create branch");
    }

    pub fn checkout(&self, name: &str) {
        self.repo
            .set_head(&format!("refs/heads/{name}"))
            .expect("set head");
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force().remove_untracked(true)))
            .expect("checkout");
    }

    pub fn tag_lightweight(&self, name: &str, at: Oid) {
        let object = self.repo.find_object(at, None).expect("find object");
        self.repo
            .tag_lightweight(name, &object, false)
            .expect("lightweight tag");
    }

    pub fn tag_annotated(&mut self, name: &str, at: Oid, message: &str) -> Oid {
        let tagger = self.signature(0);
        let object = self.repo.find_object(at, None).expect("find object");
        self.repo
            .tag(name, &object, &tagger, message, false)
            .expect("annotated tag")
    }

    fn head_commit(&self) -> Option<Oid> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id())
    }

    fn signature(&mut self, offset_minutes: i32) -> Signature<'static> {
        self.clock += 60;
        Signature::new(
            "Test User",
            "test@example.com",
            &Time::new(self.clock, offset_minutes),
        )
        .expect("signature")
    }

    fn commit_with_parents(&mut self, message: &str, parents: &[Oid], offset_minutes: i32) -> Oid {
        let signature = self.signature(offset_minutes);
        let mut index = self.repo.index().expect("index");
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .expect("add all");
        index.update_all(["*"], None).expect("update all");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");

        let parents = parents
            .iter()
            .map(|oid| self.repo.find_commit(*oid).expect("find parent"))
            .collect::<Vec<_>>();
        let parent_refs = parents.iter().collect::<Vec<_>>();

        self.repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parent_refs,
            )
            .expect("commit")
    }
}

/// Hex form of an object id, as records carry it.
pub fn hex(oid: Oid) -> String {
    oid.to_string()
}
