//! Bash tool - executes shell commands
//!
//! Each command runs in its own process group so a timeout or interrupt
//! kills the whole tree, not just the `bash` leader.

use super::{parse_input, truncate_output, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
#[allow(unused_imports)]
use std::os::unix::process::CommandExt;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SLOW_TIMEOUT: Duration = Duration::from_secs(15 * 60); // 15 minutes

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ExecutionMode {
    #[default]
    Default,
    Slow,
}

impl ExecutionMode {
    fn timeout(self) -> Duration {
        match self {
            ExecutionMode::Default => DEFAULT_TIMEOUT,
            ExecutionMode::Slow => SLOW_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    mode: ExecutionMode,
}

pub struct BashTool;

impl BashTool {
    async fn execute(
        command: &str,
        working_dir: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", command])
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                // New process group led by this process, so kill(-pgid) reaches descendants
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).ok();
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| ToolError::Failed(format!("Failed to spawn process: {e}")))?;
        let pid = child.id();

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                Self::kill_process_group(pid);
                Err(ToolError::Interrupted)
            }

            () = tokio::time::sleep(timeout) => {
                Self::kill_process_group(pid);
                Err(ToolError::Failed(format!("[command timed out after {timeout:?}]")))
            }

            result = child.wait_with_output() => {
                let output = result
                    .map_err(|e| ToolError::Failed(format!("Command execution failed: {e}")))?;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let formatted = truncate_output(&format!("{stdout}{stderr}"));

                if output.status.success() {
                    Ok(formatted)
                } else {
                    let exit_code = output.status.code().unwrap_or(-1);
                    Err(ToolError::Failed(format!(
                        "[command failed: exit code {exit_code}]\n{formatted}"
                    )))
                }
            }
        }
    }

    /// Kill a process group immediately with SIGKILL.
    #[cfg(unix)]
    fn kill_process_group(pid: Option<u32>) {
        let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        tracing::debug!(pgid = pid, "Sending SIGKILL to process group");
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    fn kill_process_group(_pid: Option<u32>) {}
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> String {
        r#"Executes shell commands via bash -c in the working directory, returning combined stdout/stderr.
Bash state changes (working dir, variables, aliases) don't persist between calls.

Use mode="slow" for potentially slow commands: builds, downloads,
installs, tests, or any other substantive operation."#
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute via bash -c"
                },
                "mode": {
                    "type": "string",
                    "enum": ["default", "slow"],
                    "description": "Execution mode: default (30s timeout), slow (15min timeout)"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: BashInput = parse_input(input)?;
        if input.command.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "Command cannot be empty".to_string(),
            ));
        }

        Self::execute(
            &input.command,
            &ctx.working_dir,
            input.mode.timeout(),
            &ctx.cancel,
        )
        .await
    }
}
