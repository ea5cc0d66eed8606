//! External process execution: shell commands and managed scripts.
//!
//! Command handlers consume this through the `Runner` trait so tests
//! can substitute a fake. The production implementation shells out via
//! `tokio::process` and returns combined stdout + stderr; failures are
//! captured in the output struct, never propagated as handler errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of a raw console command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    pub out: String,
    pub error: String,
}

/// Captured result of a script run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub results: String,
    pub errors: Option<String>,
}

/// Subprocess capability consumed by command handlers.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a shell command line assembled from `args`.
    async fn run_command(&self, args: &[String]) -> CommandOutput;

    /// Run a managed script, choosing the interpreter by extension.
    async fn run_script(&self, script: &Path, args: &[String]) -> ScriptOutput;
}

/// Default runner backed by the host shell.
pub struct ShellRunner;

#[async_trait]
impl Runner for ShellRunner {
    async fn run_command(&self, args: &[String]) -> CommandOutput {
        if args.is_empty() {
            return CommandOutput {
                out: String::new(),
                error: "no command provided".to_string(),
            };
        }

        let line = args.join(" ");
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&line);
            c
        };

        match cmd.stdin(Stdio::null()).output().await {
            Ok(output) => CommandOutput {
                out: combined(&output.stdout, &output.stderr),
                error: exit_error(&output.status),
            },
            Err(e) => CommandOutput {
                out: String::new(),
                error: e.to_string(),
            },
        }
    }

    async fn run_script(&self, script: &Path, args: &[String]) -> ScriptOutput {
        let ext = script
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let mut cmd = match ext {
            "py" => {
                let mut c = if cfg!(target_os = "windows") {
                    Command::new("python")
                } else {
                    Command::new("python3")
                };
                c.arg(script);
                c
            }
            "sh" => {
                let mut c = Command::new("sh");
                c.arg(script);
                c
            }
            "bat" => {
                if !cfg!(target_os = "windows") {
                    return ScriptOutput {
                        results: String::new(),
                        errors: Some(".bat scripts only supported on Windows".to_string()),
                    };
                }
                let mut c = Command::new("cmd");
                c.arg("/C").arg(script);
                c
            }
            "ps1" => {
                if !cfg!(target_os = "windows") {
                    return ScriptOutput {
                        results: String::new(),
                        errors: Some(".ps1 scripts only supported on Windows".to_string()),
                    };
                }
                let mut c = Command::new("powershell");
                c.arg("-File").arg(script);
                c
            }
            // Anything else: try it as a normal executable.
            _ => Command::new(script),
        };
        cmd.args(args);

        match cmd.stdin(Stdio::null()).output().await {
            Ok(output) => {
                let error = exit_error(&output.status);
                ScriptOutput {
                    results: combined(&output.stdout, &output.stderr),
                    errors: (!error.is_empty()).then_some(error),
                }
            }
            Err(e) => ScriptOutput {
                results: String::new(),
                errors: Some(e.to_string()),
            },
        }
    }
}

fn combined(stdout: &[u8], stderr: &[u8]) -> String {
    let mut out = String::from_utf8_lossy(stdout).into_owned();
    out.push_str(&String::from_utf8_lossy(stderr));
    out
}

fn exit_error(status: &std::process::ExitStatus) -> String {
    if status.success() {
        String::new()
    } else {
        match status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
