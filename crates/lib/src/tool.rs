//! External tool invocation.
//!
//! Converters and the validator never spawn processes directly; they go
//! through a [`ToolRunner`]. [`SystemToolRunner`] is the real implementation,
//! tests substitute fakes.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// How often a child with a deadline is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
  #[error("`{program}` was not found on PATH")]
  NotFound { program: String },

  #[error("`{command}` exited with status {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("`{command}` timed out after {}s", after.as_secs())]
  TimedOut { command: String, after: Duration },

  #[error("failed to run `{command}`: {source}")]
  Io {
    command: String,
    #[source]
    source: std::io::Error,
  },
}

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<OsString>,
  pub cwd: Option<PathBuf>,
  pub timeout: Option<Duration>,
}

impl Invocation {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      timeout: None,
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// Arguments as lossy strings, for matching in tests and logs.
  pub fn args_lossy(&self) -> Vec<String> {
    self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg.to_string_lossy())?;
    }
    Ok(())
  }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
  pub stdout: String,
  pub stderr: String,
}

/// Runs external tools on behalf of converters and the validator.
///
/// Implementations must be safe to share between worker threads.
pub trait ToolRunner: Send + Sync {
  /// Whether `program` can be executed. Must not spawn anything.
  fn is_available(&self, program: &str) -> bool;

  /// Run to completion, failing on non-zero exit.
  fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as child processes of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
  fn is_available(&self, program: &str) -> bool {
    which(program).is_some()
  }

  fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
    let command_line = invocation.to_string();
    debug!(command = %command_line, cwd = ?invocation.cwd, "running tool");

    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(cwd) = &invocation.cwd {
      command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|source| {
      if source.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotFound {
          program: invocation.program.clone(),
        }
      } else {
        ToolError::Io {
          command: command_line.clone(),
          source,
        }
      }
    })?;

    let io_err = |source| ToolError::Io {
      command: command_line.clone(),
      source,
    };

    // Drain both pipes on their own threads so a chatty child cannot block
    // on a full pipe while we wait for it.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let status = match invocation.timeout {
      None => child.wait().map_err(io_err)?,
      Some(limit) => {
        let deadline = Instant::now() + limit;
        loop {
          if let Some(status) = child.try_wait().map_err(io_err)? {
            break status;
          }
          if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::TimedOut {
              command: command_line.clone(),
              after: limit,
            });
          }
          thread::sleep(POLL_INTERVAL);
        }
      }
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    if !status.success() {
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "tool stdout");
      }
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "tool stderr");
      }
      return Err(ToolError::Failed {
        command: command_line,
        code: status.code(),
        stderr: stderr.trim().to_string(),
      });
    }

    Ok(ToolOutput { stdout, stderr })
  }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
  })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
  handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Locate `program` on `PATH`.
///
/// Names containing a path separator are checked as given.
pub fn which(program: &str) -> Option<PathBuf> {
  let direct = Path::new(program);
  if direct.components().count() > 1 {
    return is_executable(direct).then(|| direct.to_path_buf());
  }

  let path = std::env::var_os("PATH")?;
  std::env::split_paths(&path).find_map(|dir| {
    executable_names(program)
      .into_iter()
      .map(|name| dir.join(name))
      .find(|candidate| is_executable(candidate))
  })
}

#[cfg(unix)]
fn executable_names(program: &str) -> Vec<String> {
  vec![program.to_string()]
}

#[cfg(windows)]
fn executable_names(program: &str) -> Vec<String> {
  let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.CMD;.BAT".to_string());
  let mut names = vec![program.to_string()];
  names.extend(exts.split(';').filter(|e| !e.is_empty()).map(|e| format!("{}{}", program, e)));
  names
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  path
    .metadata()
    .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
  path.is_file()
}
