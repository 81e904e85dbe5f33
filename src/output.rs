//! Output for the management commands (install, uninstall, render, hooks-dir).
//!
//! With `--json` every result is one `resguard.v1` envelope on stdout, errors
//! included. Otherwise reports are plain text on stdout and errors a short
//! `error:`/`hint:` pair on stderr. `check` never comes through here.

use serde::Serialize;

use crate::config::{ENV_CONFIG, SETTINGS_FILE};
use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "resguard.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Human-readable report: a header line followed by optional sections
#[derive(Debug, Clone, Default)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Default::default()
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    next_steps: &'a [String],
}

fn is_empty(items: &&[String]) -> bool {
    items.is_empty()
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let (warnings, next_steps) = match human {
            Some(h) => (h.warnings.as_slice(), h.next_steps.as_slice()),
            None => (&[][..], &[][..]),
        };
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data: Some(data),
            error: None,
            warnings,
            next_steps,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    if let (false, Some(human)) = (options.quiet, human) {
        println!("{}", format_human(human));
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hint = error_hint(err);

    if !json {
        eprintln!("error: {err}");
        if let Some(hint) = hint {
            eprintln!("hint: {hint}");
        }
        return Ok(());
    }

    let envelope: Envelope<'_, ()> = Envelope {
        schema_version: SCHEMA_VERSION,
        command,
        status: "error",
        data: None,
        error: Some(ErrorBody {
            message: err.to_string(),
            code: err.exit_code(),
            kind: error_kind(err),
            hint,
            details: err.details(),
        }),
        warnings: &[],
        next_steps: &[],
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    let summary: Vec<String> = output
        .summary
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect();
    push_section(&mut lines, "Summary", &summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("{title}:"));
    lines.extend(items.iter().map(|item| format!("- {item}")));
}

/// Command name for the error envelope, read from the process arguments
pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

/// First positional argument, paired with its subcommand for `check`.
/// The value of `--storage-root` is not a command.
fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut positional = Vec::with_capacity(2);
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--storage-root" {
            args.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        positional.push(arg);
        if positional[0] != "check" || positional.len() == 2 {
            break;
        }
    }

    if positional.is_empty() {
        "resguard".to_string()
    } else {
        positional.join(" ")
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        exit_codes::GUARD_FAILURE => "guard_failure",
        exit_codes::USER_ERROR => "user_error",
        _ => "operation_failed",
    }
}

fn error_hint(err: &Error) -> Option<String> {
    match err {
        Error::MissingAgent(var) => Some(format!("export {var}=<agent>")),
        Error::NotARepo(path) => Some(format!("git -C {} init", path.display())),
        Error::InvalidConfig(_) | Error::TomlParse(_) => {
            Some(format!("fix {SETTINGS_FILE} (or ${ENV_CONFIG}) then retry"))
        }
        Error::LockFailed(path) => Some(format!(
            "retry once no other install holds {}",
            path.display()
        )),
        _ => None,
    }
}
