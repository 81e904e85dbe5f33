mod support;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin;
use resguard::error::Error;
use resguard::lock::FileLock;
use resguard::script::is_managed_script;
use resguard::storage::ArchiveStore;
use tempfile::TempDir;

use support::{resguard, TestRepo, GUARD_ENV};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(25);
const READY_TIMEOUT: Duration = Duration::from_secs(2);

fn resguard_bin() -> PathBuf {
    cargo_bin("resguard")
}

#[test]
fn lock_helper_process() {
    if std::env::var("RESGUARD_LOCK_HELPER").ok().as_deref() != Some("1") {
        return;
    }

    let path = std::env::var("RESGUARD_LOCK_PATH").expect("RESGUARD_LOCK_PATH");
    let ready = std::env::var("RESGUARD_LOCK_READY").expect("RESGUARD_LOCK_READY");

    let _lock = FileLock::acquire(&path, 5000).expect("lock helper acquire");
    std::fs::write(&ready, "ready").expect("ready write");
    thread::sleep(Duration::from_secs(2));
}

fn spawn_lock_holder(lock_path: &Path, ready_path: &Path) -> std::io::Result<std::process::Child> {
    Command::new(std::env::current_exe()?)
        .args(["--exact", "lock_helper_process", "--nocapture"])
        .env("RESGUARD_LOCK_HELPER", "1")
        .env("RESGUARD_LOCK_PATH", lock_path.display().to_string())
        .env("RESGUARD_LOCK_READY", ready_path.display().to_string())
        .spawn()
}

fn wait_ready(child: &mut std::process::Child, ready_path: &Path) -> Result<(), String> {
    let start = Instant::now();
    while !ready_path.exists() {
        if start.elapsed() > READY_TIMEOUT {
            let _ = child.kill();
            return Err("lock helper not ready".into());
        }
        thread::sleep(READY_POLL_INTERVAL);
    }
    Ok(())
}

#[test]
fn file_lock_timeout_when_held_by_other_process() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let lock_path = dir.path().join(".archive.lock");
    let ready_path = dir.path().join("ready");

    let mut child = spawn_lock_holder(&lock_path, &ready_path)?;
    wait_ready(&mut child, &ready_path)?;

    match FileLock::acquire(&lock_path, 100) {
        Ok(_) => return Err("expected lock timeout".into()),
        Err(err) => assert!(matches!(err, Error::LockFailed(_))),
    }

    child.wait()?;
    Ok(())
}

#[test]
fn install_waits_out_lock_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let repo = TestRepo::with_shared_file()?;
    let storage = repo.scratch().join("storage");
    let archive = ArchiveStore::new(&storage).ensure_archive("demo")?;
    let ready_path = repo.scratch().join("ready");
    let config_path = repo.scratch().join("resguard.toml");
    std::fs::write(&config_path, "lock_timeout_ms = 200\n")?;

    let mut child = spawn_lock_holder(&archive.lock_path(), &ready_path)?;
    wait_ready(&mut child, &ready_path)?;

    let output = resguard()
        .env("RESGUARD_CONFIG", &config_path)
        .arg("--storage-root")
        .arg(&storage)
        .args(["install", "demo"])
        .arg(repo.path())
        .output()?;
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Lock acquisition failed"));
    assert!(!repo.path().join(".git").join("hooks").join("pre-commit").exists());

    child.wait()?;
    Ok(())
}

#[test]
fn parallel_installs_for_one_project() -> Result<(), Box<dyn std::error::Error>> {
    let repo = TestRepo::with_shared_file()?;
    let storage = Arc::new(repo.scratch().join("storage"));
    let repo_path = Arc::new(repo.path());
    let bin = Arc::new(resguard_bin());
    let count = 6;

    let mut handles = Vec::new();
    for _ in 0..count {
        let storage = Arc::clone(&storage);
        let repo_path = Arc::clone(&repo_path);
        let bin = Arc::clone(&bin);
        handles.push(thread::spawn(move || {
            let mut cmd = Command::new(bin.as_ref());
            for key in GUARD_ENV {
                cmd.env_remove(key);
            }
            cmd.env("RESGUARD_CONFIG", "/nonexistent/resguard.toml")
                .arg("--quiet")
                .arg("--storage-root")
                .arg(storage.as_ref())
                .args(["install", "demo", "--prepush"])
                .arg(repo_path.as_ref())
                .status()
        }));
    }

    for handle in handles {
        let status = handle.join().expect("join thread")?;
        assert!(status.success());
    }

    let hooks = repo.path().join(".git").join("hooks");
    for hook in ["pre-commit", "pre-push"] {
        let content = std::fs::read_to_string(hooks.join(hook))?;
        assert!(is_managed_script(&content));
        assert!(content.ends_with("\"$@\"\n"));
    }
    let strays: Vec<_> = std::fs::read_dir(&hooks)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp"))
        .collect();
    assert!(strays.is_empty());
    Ok(())
}
