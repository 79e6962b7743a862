//! `ShellAction`: run a command through `sh -c` and check its exit code.

use crate::action::{ActionConfig, ActionContext, ActionKind};
use crate::error::{DriverError, Result};
use crate::registry::BuildContext;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

/// Cap on captured output kept per stream (the tail is kept).
const MAX_OUTPUT: usize = 10 * 1024;

struct ShellAction {
    command: String,
    expected_rc: i32,
    timeout: Option<Duration>,
    stdout_var: Option<String>,
    cwd: Option<PathBuf>,
}

pub fn shell_action(config: &ActionConfig, ctx: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let command = p.required("command")?;
    if command.trim().is_empty() {
        return Err(p.invalid("command", &command));
    }
    let timeout = match p.parse_optional::<u64>("timeout_seconds")? {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => ctx.config.shell_timeout(),
    };
    Ok(Box::new(ShellAction {
        command,
        expected_rc: p.parse_or("expected_rc", 0)?,
        timeout,
        stdout_var: p.optional("stdout_var"),
        cwd: p.optional("cwd").map(PathBuf::from),
    }))
}

impl ActionKind for ShellAction {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let command = ctx.resolve(&self.command);
        let output = execute_shell(&command, self.cwd.as_deref(), self.timeout)?;
        ctx.detail(&format!("`{command}` exited with {:?}", output.code));

        if let Some(name) = &self.stdout_var {
            ctx.store().store(name.clone(), output.stdout.clone());
        }
        if output.code != Some(self.expected_rc) {
            return Err(DriverError::ActionFailed(format!(
                "`{command}` exited with {}, expected {}: {}",
                output
                    .code
                    .map_or_else(|| "a signal".to_string(), |c| c.to_string()),
                self.expected_rc,
                output.combined()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Process plumbing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ShellOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl ShellOutput {
    fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Run `command` with an optional timeout.
///
/// stdout/stderr are drained on their own threads so a chatty child cannot
/// block on a full pipe; the wait happens on a third thread so the caller can
/// give up with `recv_timeout`.
fn execute_shell(command: &str, cwd: Option<&Path>, timeout: Option<Duration>) -> Result<ShellOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let mut child = cmd.spawn()?;
    let child_pid = child.id();

    let stdout_thread = spawn_reader(child.stdout.take());
    let stderr_thread = spawn_reader(child.stderr.take());

    let status: ExitStatus = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });
            match rx.recv_timeout(limit) {
                Ok(result) => result?,
                Err(_) => {
                    kill_process(child_pid);
                    return Err(DriverError::ActionFailed(format!(
                        "`{command}` timed out after {}s",
                        limit.as_secs()
                    )));
                }
            }
        }
    };

    Ok(ShellOutput {
        code: status.code(),
        stdout: stdout_thread.join().unwrap_or_default(),
        stderr: stderr_thread.join().unwrap_or_default(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut raw = Vec::new();
        if let Some(mut r) = source {
            let _ = r.read_to_end(&mut raw);
        }
        let mut buf = String::from_utf8_lossy(&raw).into_owned();
        if buf.len() > MAX_OUTPUT {
            let mut cut = buf.len() - MAX_OUTPUT;
            while !buf.is_char_boundary(cut) {
                cut += 1;
            }
            buf.drain(..cut);
        }
        buf
    })
}

/// Best-effort SIGKILL; errors are ignored.
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}
