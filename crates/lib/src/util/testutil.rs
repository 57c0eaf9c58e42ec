//! Test utilities for docmatrix-lib.
//!
//! Cross-platform shell helpers plus fakes for the tool runner and converter
//! seams, so pipeline and validator tests never depend on installed tools.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{
  BuildConfiguration, ExecutionSettings, FormatSetting, LogLevel, OutputLayout, Prerequisites, SourceLayout,
};
use crate::convert::{BuildContext, ConvertError, Converter};
use crate::tool::{Invocation, ToolError, ToolOutput, ToolRunner};

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

/// Create a language subtree with an entry document and valid metadata.
pub fn language_tree(root: &Path, language: &str) -> PathBuf {
  let dir = root.join(language);
  write_file(&dir.join("template.adoc"), "= Template\n\ninclude::chapters/01.adoc[]\n");
  write_file(
    &dir.join("version.properties"),
    "revnumber=9.0-EN\nrevdate=July 2025\nrevremark=(based upon AsciiDoc version)\n",
  );
  dir
}

/// Configuration over `source_root` with every listed format enabled at priority 1.
///
/// Outputs go to `{work}/build` and `{work}/dist`.
pub fn build_config(
  source_root: &Path,
  work: &Path,
  languages: &[&str],
  flavors: &[&str],
  formats: &[&str],
) -> BuildConfiguration {
  BuildConfiguration {
    languages: languages.iter().map(|s| s.to_string()).collect(),
    flavors: flavors.iter().map(|s| s.to_string()).collect(),
    formats: formats.iter().map(|id| (id.to_string(), FormatSetting::enabled(1))).collect(),
    execution: ExecutionSettings::default(),
    source: SourceLayout {
      root: source_root.to_path_buf(),
      entry_document: "template.adoc".into(),
      metadata_file: "version.properties".into(),
    },
    output: OutputLayout {
      build_root: work.join("build"),
      dist_root: work.join("dist"),
      artifact_prefix: "template".into(),
    },
    prerequisites: Prerequisites::default(),
    log_level: LogLevel::Info,
  }
}

/// Scripted tool runner.
///
/// Records every invocation. Programs in `missing` are unavailable; an
/// invocation fails when its command line contains any of `fail_on`. With a
/// `delay`, each call takes that long, or times out at the invocation's own
/// limit when that is shorter.
#[derive(Default)]
pub struct FakeToolRunner {
  pub missing: BTreeSet<String>,
  pub fail_on: Vec<String>,
  pub stdout: String,
  pub delay: Option<Duration>,
  pub calls: Mutex<Vec<Invocation>>,
}

impl FakeToolRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn without(mut self, program: &str) -> Self {
    self.missing.insert(program.to_string());
    self
  }

  pub fn failing_on(mut self, needle: &str) -> Self {
    self.fail_on.push(needle.to_string());
    self
  }

  pub fn with_stdout(mut self, stdout: &str) -> Self {
    self.stdout = stdout.to_string();
    self
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
    self.calls().into_iter().filter(|c| c.program == program).collect()
  }
}

impl ToolRunner for FakeToolRunner {
  fn is_available(&self, program: &str) -> bool {
    !self.missing.contains(program)
  }

  fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
    self.calls.lock().unwrap().push(invocation.clone());
    if self.missing.contains(&invocation.program) {
      return Err(ToolError::NotFound {
        program: invocation.program.clone(),
      });
    }
    let line = invocation.to_string();
    if let Some(delay) = self.delay {
      match invocation.timeout {
        Some(limit) if limit < delay => {
          std::thread::sleep(limit);
          return Err(ToolError::TimedOut {
            command: line,
            after: limit,
          });
        }
        _ => std::thread::sleep(delay),
      }
    }
    if self.fail_on.iter().any(|needle| line.contains(needle.as_str())) {
      return Err(ToolError::Failed {
        command: line,
        code: Some(1),
        stderr: "asciidoctor: WARNING: include file not found".to_string(),
      });
    }
    // Mimic tools that write to `-o <file>`.
    let args = invocation.args_lossy();
    if let Some(pos) = args.iter().position(|a| a == "-o") {
      if let Some(out) = args.get(pos + 1).filter(|o| o.as_str() != "-") {
        write_file(Path::new(out), "generated");
      }
    }
    Ok(ToolOutput {
      stdout: self.stdout.clone(),
      stderr: String::new(),
    })
  }
}

/// Converter that writes a marker file, or fails for chosen languages.
pub struct StubConverter {
  pub extension: &'static str,
  pub available: bool,
  pub fail_languages: BTreeSet<String>,
  pub panic_languages: BTreeSet<String>,
  pub convert_calls: AtomicUsize,
}

impl StubConverter {
  pub fn new(extension: &'static str) -> Self {
    Self {
      extension,
      available: true,
      fail_languages: BTreeSet::new(),
      panic_languages: BTreeSet::new(),
      convert_calls: AtomicUsize::new(0),
    }
  }

  pub fn unavailable(mut self) -> Self {
    self.available = false;
    self
  }

  pub fn failing_for(mut self, language: &str) -> Self {
    self.fail_languages.insert(language.to_string());
    self
  }

  pub fn panicking_for(mut self, language: &str) -> Self {
    self.panic_languages.insert(language.to_string());
    self
  }

  pub fn calls(&self) -> usize {
    self.convert_calls.load(Ordering::SeqCst)
  }
}

impl Converter for StubConverter {
  fn output_extension(&self) -> &str {
    self.extension
  }

  fn check_available(&self) -> bool {
    self.available
  }

  fn convert(&self, context: &BuildContext) -> Result<PathBuf, ConvertError> {
    self.convert_calls.fetch_add(1, Ordering::SeqCst);
    if self.panic_languages.contains(&context.language) {
      panic!("stub converter panicked for {}", context.language);
    }
    if self.fail_languages.contains(&context.language) {
      return Err(ConvertError::Tool(ToolError::Failed {
        command: format!("stub {}", context.language),
        code: Some(2),
        stderr: "stub failure".to_string(),
      }));
    }
    let path = context.artifact_path(self.extension);
    std::fs::write(&path, format!("{}/{}", context.language, context.flavor)).map_err(|source| ConvertError::Io {
      path: path.clone(),
      source,
    })?;
    Ok(path)
  }
}
