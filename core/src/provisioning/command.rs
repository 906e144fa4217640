// External program invocation. Programs are always started directly with an
// argument vector; nothing is ever passed through a shell.

use crate::{DriveResult, EraseError};
use std::process::Command;

/// Captured result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl ToolOutput {
    pub fn success(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    pub fn failure(code: i32, stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(code),
        }
    }

    /// Short description of a failed run for error messages
    pub fn failure_detail(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it. `Err` only when the program
    /// could not be started; a non-zero exit is reported in [`ToolOutput`].
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<ToolOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<ToolOutput> {
        tracing::debug!(program, ?args, "Running external tool");

        let output = Command::new(program).args(args).output()?;

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Run a tool for `device`, turning a start failure or non-zero exit into
/// [`EraseError::ExternalTool`]
pub fn run_checked(
    runner: &dyn CommandRunner,
    tool: &str,
    device: &str,
    args: &[String],
) -> DriveResult<ToolOutput> {
    let output = runner.run(tool, args).map_err(|e| EraseError::ExternalTool {
        tool: tool.to_string(),
        device: device.to_string(),
        detail: format!("cannot start: {}", e),
    })?;

    if !output.success {
        return Err(EraseError::ExternalTool {
            tool: tool.to_string(),
            device: device.to_string(),
            detail: output.failure_detail(),
        });
    }

    Ok(output)
}
