//! Hook installation
//!
//! Writes boundary scripts into a checkout's hooks directory. Installs for
//! the same project run under the project's archive write lock; installs for
//! different projects do not contend.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::evaluate::Phase;
use crate::git::resolve_hooks_dir;
use crate::lock::write_atomic_str;
use crate::script::{is_managed_script, render_script};
use crate::storage::ProjectArchive;

/// Mode bits for installed hooks
#[cfg(unix)]
const HOOK_MODE: u32 = 0o755;

/// Install the boundary script for `phase`, returning the hook path.
///
/// An existing hook with the same name is overwritten.
pub async fn install_hook(
    archive: &ProjectArchive,
    repo_path: &Path,
    binary: &Path,
    phase: Phase,
) -> Result<PathBuf> {
    let hooks_dir = resolve_hooks_dir(repo_path);
    let hook_path = hooks_dir.join(phase.hook_name());
    let script = render_script(phase, archive, binary);

    let _guard = archive.write_lock().await?;
    fs::create_dir_all(&hooks_dir)?;
    if hook_path.exists() {
        debug!(hook = %hook_path.display(), "overwriting existing hook");
    }
    write_atomic_str(&hook_path, &script)?;
    set_executable(&hook_path)?;

    debug!(
        project = %archive.slug(),
        hook = %hook_path.display(),
        "installed boundary script"
    );
    Ok(hook_path)
}

/// Install the commit-time guard
pub async fn install_guard(
    archive: &ProjectArchive,
    repo_path: &Path,
    binary: &Path,
) -> Result<PathBuf> {
    install_hook(archive, repo_path, binary, Phase::PreCommit).await
}

/// Install the push-time guard
pub async fn install_prepush_guard(
    archive: &ProjectArchive,
    repo_path: &Path,
    binary: &Path,
) -> Result<PathBuf> {
    install_hook(archive, repo_path, binary, Phase::PrePush).await
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(HOOK_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// What `uninstall_guard` did
#[derive(Debug, Clone, Default, Serialize)]
pub struct UninstallReport {
    pub hooks_dir: PathBuf,
    /// Managed hooks that were deleted
    pub removed: Vec<PathBuf>,
    /// Hooks present but not written by resguard
    pub kept: Vec<PathBuf>,
}

/// Remove resguard-managed pre-commit and pre-push hooks from a checkout
pub fn uninstall_guard(repo_path: &Path) -> Result<UninstallReport> {
    let hooks_dir = resolve_hooks_dir(repo_path);
    let mut report = UninstallReport {
        hooks_dir: hooks_dir.clone(),
        ..Default::default()
    };

    for phase in [Phase::PreCommit, Phase::PrePush] {
        let hook_path = hooks_dir.join(phase.hook_name());
        if !hook_path.is_file() {
            continue;
        }

        let content = match fs::read_to_string(&hook_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(hook = %hook_path.display(), error = %err, "cannot read hook; leaving it");
                report.kept.push(hook_path);
                continue;
            }
        };

        if is_managed_script(&content) {
            fs::remove_file(&hook_path)?;
            report.removed.push(hook_path);
        } else {
            report.kept.push(hook_path);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::lock::FileLock;
    use crate::storage::ArchiveStore;
    use std::process::Command;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const BINARY: &str = "/opt/bin/resguard";

    fn init_repo(path: &Path) {
        fs::create_dir_all(path).unwrap();
        let status = Command::new("git")
            .args(["init", "-q"])
            .current_dir(path)
            .status()
            .unwrap();
        assert!(status.success());
    }

    fn setup() -> (TempDir, PathBuf, ProjectArchive) {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        init_repo(&repo);
        let archive = ArchiveStore::new(temp.path().join("storage"))
            .ensure_archive("demo")
            .unwrap();
        (temp, repo, archive)
    }

    #[tokio::test]
    async fn installs_executable_precommit_hook() {
        let (_temp, repo, archive) = setup();

        let hook = install_guard(&archive, &repo, Path::new(BINARY)).await.unwrap();
        assert!(hook.ends_with(".git/hooks/pre-commit"));

        let content = fs::read_to_string(&hook).unwrap();
        assert!(is_managed_script(&content));
        assert!(content.contains("check pre-commit"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&hook).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn installs_prepush_hook_into_missing_hooks_dir() {
        let (_temp, repo, archive) = setup();
        fs::remove_dir_all(repo.join(".git").join("hooks")).ok();

        let hook = install_prepush_guard(&archive, &repo, Path::new(BINARY))
            .await
            .unwrap();
        assert!(hook.ends_with(".git/hooks/pre-push"));
        assert!(fs::read_to_string(&hook).unwrap().contains("check pre-push"));
    }

    #[tokio::test]
    async fn reinstall_overwrites_existing_hook() {
        let (_temp, repo, archive) = setup();
        let hooks = repo.join(".git").join("hooks");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(hooks.join("pre-commit"), "#!/bin/sh\necho legacy\n").unwrap();

        let hook = install_guard(&archive, &repo, Path::new(BINARY)).await.unwrap();
        let content = fs::read_to_string(&hook).unwrap();
        assert!(!content.contains("legacy"));
        assert!(is_managed_script(&content));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_installs_for_one_project_leave_a_whole_script() {
        let (_temp, repo, archive) = setup();
        let archive = Arc::new(archive);
        let repo = Arc::new(repo);

        let mut tasks = Vec::new();
        for idx in 0..8 {
            let archive = Arc::clone(&archive);
            let repo = Arc::clone(&repo);
            tasks.push(tokio::spawn(async move {
                let binary = PathBuf::from(format!("/opt/bin/resguard-{idx}"));
                install_guard(&archive, &repo, &binary).await.unwrap()
            }));
        }

        let mut paths = Vec::new();
        for task in tasks {
            paths.push(task.await.unwrap());
        }
        assert!(paths.windows(2).all(|w| w[0] == w[1]));

        let content = fs::read_to_string(&paths[0]).unwrap();
        let rendered: Vec<String> = (0..8)
            .map(|idx| {
                render_script(
                    Phase::PreCommit,
                    &archive,
                    Path::new(&format!("/opt/bin/resguard-{idx}")),
                )
            })
            .collect();
        assert!(rendered.contains(&content));

        let hooks_dir = paths[0].parent().unwrap();
        let stray: Vec<_> = fs::read_dir(hooks_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .collect();
        assert!(stray.is_empty());
    }

    #[tokio::test]
    async fn held_lock_only_blocks_its_own_project() {
        let temp = TempDir::new().unwrap();
        let storage = temp.path().join("storage");
        let store = ArchiveStore::new(&storage).with_lock_timeout(5_000);
        let alpha = store.ensure_archive("alpha").unwrap();
        let beta = store.ensure_archive("beta").unwrap();
        let repo_a = temp.path().join("repo-a");
        let repo_b = temp.path().join("repo-b");
        init_repo(&repo_a);
        init_repo(&repo_b);

        let _held = FileLock::acquire(alpha.lock_path(), 1_000).unwrap();

        let started = Instant::now();
        let hook = tokio::time::timeout(
            Duration::from_secs(3),
            install_guard(&beta, &repo_b, Path::new(BINARY)),
        )
        .await
        .expect("beta install waited on alpha's lock")
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(hook.exists());

        let impatient = ArchiveStore::new(&storage)
            .with_lock_timeout(200)
            .ensure_archive("alpha")
            .unwrap();
        let err = install_guard(&impatient, &repo_a, Path::new(BINARY))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockFailed(_)), "{err:?}");
        assert!(!repo_a.join(".git/hooks/pre-commit").exists());
    }

    #[tokio::test]
    async fn uninstall_removes_only_managed_hooks() {
        let (_temp, repo, archive) = setup();
        install_guard(&archive, &repo, Path::new(BINARY)).await.unwrap();
        let hooks = repo.join(".git").join("hooks");
        fs::write(hooks.join("pre-push"), "#!/bin/sh\nexec ./ci-check\n").unwrap();

        let report = uninstall_guard(&repo).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(report.removed[0].ends_with("pre-commit"));
        assert_eq!(report.kept.len(), 1);
        assert!(report.kept[0].ends_with("pre-push"));
        assert!(!hooks.join("pre-commit").exists());
        assert!(hooks.join("pre-push").exists());
    }

    #[test]
    fn uninstall_without_hooks_is_a_noop() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        init_repo(&repo);

        let report = uninstall_guard(&repo).unwrap();
        assert!(report.removed.is_empty());
        assert!(report.kept.is_empty());
    }
}
