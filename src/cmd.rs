//! Uniform external-command execution. Every package-manager, docker,
//! certbot, openssl, nginx, systemctl and crontab invocation goes through
//! the [`CommandRunner`] seam so call sites branch on one typed result
//! instead of repeating inline exit-code checks — and so tests can inject
//! scripted runners.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CmdError;

#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput, CmdError>;
}

/// Production runner — executes on the local host.
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput, CmdError> {
        let out = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| CmdError::Spawn {
                program: program.to_string(),
                source: e,
            })?;
        Ok(CmdOutput {
            status: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Run and capture — non-zero exit is a normal branch, not an error.
pub async fn run_capture(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CmdOutput, CmdError> {
    runner.run(program, args).await
}

/// Run and require success — non-zero exit becomes a `CmdError::Failed`
/// carrying the trimmed stderr for the fatal diagnostic.
pub async fn run_ok(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CmdOutput, CmdError> {
    let out = runner.run(program, args).await?;
    if !out.success() {
        return Err(CmdError::Failed {
            program: program.to_string(),
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(out)
}

/// `command -v` probe via the shell.
pub async fn command_exists(runner: &dyn CommandRunner, program: &str) -> bool {
    runner
        .run("sh", &["-c", &format!("command -v {}", program)])
        .await
        .map(|o| o.success())
        .unwrap_or(false)
}
