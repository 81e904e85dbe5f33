//! resguard install, uninstall, render and hooks-dir commands

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{Settings, ENV_AGENT, ENV_ENABLED};
use crate::error::{exit_codes, Error, Result};
use crate::evaluate::Phase;
use crate::git::resolve_hooks_dir;
use crate::install::{install_guard, install_prepush_guard, uninstall_guard};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::script::render_script;
use crate::storage::ArchiveStore;

pub struct InstallOptions {
    pub project: String,
    pub repo: PathBuf,
    pub prepush: bool,
    pub storage_root: Option<PathBuf>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct InstallReport {
    project: String,
    archive_root: PathBuf,
    reservations_dir: PathBuf,
    binary: PathBuf,
    hooks: Vec<PathBuf>,
}

pub fn run_install(options: InstallOptions) -> Result<i32> {
    if !options.repo.exists() {
        return Err(Error::InvalidArgument(format!(
            "repository path does not exist: {}",
            options.repo.display()
        )));
    }

    let settings = Settings::load_default()?;
    let store = ArchiveStore::new(settings.resolve_storage_root(options.storage_root.as_deref())?)
        .with_lock_timeout(settings.lock_timeout_ms);
    let archive = store.ensure_archive(&options.project)?;
    let binary = settings.resolve_binary()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let hooks = runtime.block_on(async {
        let mut hooks = vec![install_guard(&archive, &options.repo, &binary).await?];
        if options.prepush {
            hooks.push(install_prepush_guard(&archive, &options.repo, &binary).await?);
        }
        Ok::<_, Error>(hooks)
    })?;

    let report = InstallReport {
        project: archive.slug().to_string(),
        archive_root: archive.root().to_path_buf(),
        reservations_dir: archive.file_reservations_dir(),
        binary: binary.clone(),
        hooks: hooks.clone(),
    };

    let mut human = HumanOutput::new(format!(
        "resguard install: {} hook(s) installed for '{}'",
        hooks.len(),
        archive.slug()
    ));
    human.push_summary("archive", archive.root().display().to_string());
    human.push_summary("binary", binary.display().to_string());
    for hook in &hooks {
        human.push_detail(hook.display().to_string());
    }
    if !binary.exists() {
        human.push_warning(format!(
            "{} does not exist; hooks will skip checks until it does",
            binary.display()
        ));
    }
    human.push_next_step(format!("export {ENV_ENABLED}=1 {ENV_AGENT}=<agent>"));

    emit_success(options.output, "install", &report, Some(&human))?;
    Ok(exit_codes::SUCCESS)
}

pub fn run_uninstall(repo: PathBuf, output: OutputOptions) -> Result<i32> {
    let report = uninstall_guard(&repo)?;

    let header = if report.removed.is_empty() {
        "resguard uninstall: nothing to remove".to_string()
    } else {
        format!("resguard uninstall: removed {} hook(s)", report.removed.len())
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("hooks dir", report.hooks_dir.display().to_string());
    for hook in &report.removed {
        human.push_detail(format!("removed {}", hook.display()));
    }
    for hook in &report.kept {
        human.push_warning(format!("left {} (not managed by resguard)", hook.display()));
    }

    emit_success(output, "uninstall", &report, Some(&human))?;
    Ok(exit_codes::SUCCESS)
}

pub struct RenderOptions {
    pub phase: Phase,
    pub project: String,
    pub storage_root: Option<PathBuf>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct RenderReport {
    hook: Phase,
    project: String,
    script: String,
}

pub fn run_render(options: RenderOptions) -> Result<i32> {
    let settings = Settings::load_default()?;
    let store = ArchiveStore::new(settings.resolve_storage_root(options.storage_root.as_deref())?);
    let archive = store.archive(&options.project)?;
    let binary = settings.resolve_binary()?;
    let script = render_script(options.phase, &archive, &binary);

    if options.output.json {
        let report = RenderReport {
            hook: options.phase,
            project: archive.slug().to_string(),
            script,
        };
        emit_success(options.output, "render", &report, None)?;
    } else {
        // The script itself is the output, even with --quiet.
        print!("{script}");
    }
    Ok(exit_codes::SUCCESS)
}

#[derive(Serialize)]
struct HooksDirReport {
    repo: PathBuf,
    hooks_dir: PathBuf,
}

pub fn run_hooks_dir(repo: PathBuf, output: OutputOptions) -> Result<i32> {
    let hooks_dir = resolve_hooks_dir(&repo);

    if output.json {
        emit_success(output, "hooks-dir", &HooksDirReport { repo, hooks_dir }, None)?;
    } else {
        println!("{}", hooks_dir.display());
    }
    Ok(exit_codes::SUCCESS)
}
