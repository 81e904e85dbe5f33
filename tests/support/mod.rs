#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use git2::{IndexAddOption, Oid, Repository, Signature, WorktreeAddOptions};
use tempfile::TempDir;

/// Every environment variable the guard or the CLI reads
pub const GUARD_ENV: &[&str] = &[
    "WORKTREES_ENABLED",
    "AGENT_MAIL_GUARD_MODE",
    "AGENT_MAIL_BYPASS",
    "AGENT_NAME",
    "RESGUARD_STORAGE_ROOT",
    "RESGUARD_CONFIG",
    "RUST_LOG",
];

pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub fn init() -> Result<Self, git2::Error> {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let repo = Repository::init(dir.path().join("main"))?;
        set_identity(&repo)?;
        Ok(Self { dir, repo })
    }

    /// Repository with `src/shared.txt` committed on the default branch
    pub fn with_shared_file() -> Result<Self, Box<dyn std::error::Error>> {
        let repo = Self::init()?;
        repo.commit_file("src/shared.txt", "v1\n", "init")?;
        Ok(repo)
    }

    /// The main checkout
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("main")
    }

    /// Scratch space next to the checkout
    pub fn scratch(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        write_in(&self.path(), rel_path, contents)
    }

    pub fn commit_all(&self, message: &str) -> Result<Oid, git2::Error> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now("resguard-test", "resguard-test@example.com")?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| self.repo.find_commit(oid).ok());

        let oid = match parent {
            Some(parent) => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?,
            None => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
        };

        Ok(oid)
    }

    pub fn stage_path(&self, rel_path: &str) -> Result<(), git2::Error> {
        let mut index = self.repo.index()?;
        index.add_path(Path::new(rel_path))?;
        index.write()?;
        Ok(())
    }

    pub fn commit_file(
        &self,
        rel_path: &str,
        contents: &str,
        message: &str,
    ) -> Result<Oid, Box<dyn std::error::Error>> {
        self.write_file(rel_path, contents)?;
        Ok(self.commit_all(message)?)
    }

    pub fn create_branch(&self, name: &str) -> Result<(), git2::Error> {
        let commit = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }

    /// Add a linked worktree checked out on a new branch of the same name
    pub fn create_worktree(&self, name: &str) -> Result<PathBuf, git2::Error> {
        self.create_branch(name)?;
        let path = self.dir.path().join(name);
        let reference = self.repo.find_reference(&format!("refs/heads/{name}"))?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        let worktree = self.repo.worktree(name, &path, Some(&opts))?;
        Ok(worktree.path().to_path_buf())
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}

fn set_identity(repo: &Repository) -> Result<(), git2::Error> {
    let mut cfg = repo.config()?;
    cfg.set_str("user.name", "resguard-test")?;
    cfg.set_str("user.email", "resguard-test@example.com")?;
    cfg.set_bool("commit.gpgsign", false)?;
    Ok(())
}

pub fn write_in(root: &Path, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

/// Write one reservation record into a reservations directory
pub fn write_reservation(dir: &Path, name: &str, record: serde_json::Value) -> PathBuf {
    fs::create_dir_all(dir).expect("create reservations dir");
    let path = dir.join(format!("{name}.json"));
    fs::write(&path, serde_json::to_string_pretty(&record).expect("encode"))
        .expect("write reservation");
    path
}

/// An exclusive reservation by `agent` valid for another hour
pub fn live_reservation(agent: &str, pattern: &str) -> serde_json::Value {
    let expires = chrono::Utc::now() + chrono::Duration::hours(1);
    serde_json::json!({
        "agent": agent,
        "path_pattern": pattern,
        "exclusive": true,
        "expires_ts": expires.to_rfc3339(),
    })
}

/// Run the system `git` with a scrubbed guard environment
pub fn git(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir).args(args);
    for key in GUARD_ENV {
        cmd.env_remove(key);
    }
    cmd.envs(env.iter().copied());
    cmd.output().expect("spawn git")
}

/// Like [`git`] but panics on failure and returns trimmed stdout
pub fn git_ok(dir: &Path, args: &[&str]) -> String {
    let output = git(dir, args, &[]);
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// `resguard` binary command with a scrubbed environment
pub fn resguard() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("resguard").expect("binary");
    for key in GUARD_ENV {
        cmd.env_remove(key);
    }
    cmd.env("RESGUARD_CONFIG", "/nonexistent/resguard.toml");
    cmd
}
