use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::error::ExitError;

/// Result of running a subprocess.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Builder for running external commands.
pub struct Tool {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Tool {
    /// Create a new tool invocation.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Build from an argv vector; the first element is the program.
    pub fn from_argv(argv: &[String]) -> anyhow::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExitError::Config("command is empty".to_string()))?;
        let mut tool = Self::new(program);
        tool.args.extend(args.iter().cloned());
        Ok(tool)
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Set a timeout for the subprocess.
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        // Own process group, so a timeout can take down everything it spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    /// Run the tool, capturing stdout and stderr.
    pub fn run(&self) -> anyhow::Result<RunOutput> {
        let mut cmd = self.command();
        let child = cmd.spawn().map_err(|e| self.not_found_or_other(e))?;
        let (status, stdout, stderr) = wait_with_timeout(child, self.timeout, &self.program)?;
        Ok(RunOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    }

    fn not_found_or_other(&self, e: std::io::Error) -> anyhow::Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExitError::ToolNotFound {
                tool: self.program.clone(),
            }
            .into()
        } else {
            anyhow::Error::new(e).context(format!("spawning {}", self.program))
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = pipe {
            let _ = r.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// SIGKILL the child's whole process group, then the child itself.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
}

/// Wait for `child`, killing its process group once `timeout` passes.
///
/// Output is drained on background threads so a chatty child cannot fill
/// its pipe and stall.
fn wait_with_timeout(
    mut child: Child,
    timeout: Option<Duration>,
    tool_name: &str,
) -> anyhow::Result<(ExitStatus, String, String)> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(limit) = timeout
                    && start.elapsed() >= limit
                {
                    kill_tree(&mut child);
                    let _ = child.wait();
                    return Err(ExitError::Timeout {
                        tool: tool_name.to_string(),
                        timeout_secs: limit.as_secs(),
                    }
                    .into());
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("waiting for {tool_name}")));
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok((status, stdout, stderr))
}

/// Run `argv` to completion, returning its exit status.
///
/// Used by the supervisor, which wants the child attached to our own stdio.
pub fn run_attached(argv: &[String]) -> anyhow::Result<ExitStatus> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ExitError::Config("command is empty".to_string()))?;
    Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("running {program}"))
}
