//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable byte/duration formatting, Unicode symbols and the
//! mapping from library errors to process exit codes.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use docmatrix_lib::config::ConfigError;
use docmatrix_lib::pipeline::{PipelineError, RunError};
use docmatrix_lib::validate::{Diagnostic, Severity, ValidationError};

#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn from_flag(json: bool) -> Self {
    if json { OutputFormat::Json } else { OutputFormat::Text }
  }

  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Process exit codes.
pub mod exit {
  pub const SUCCESS: u8 = 0;
  pub const UNEXPECTED: u8 = 1;
  pub const CONFIG: u8 = 2;
  pub const VALIDATION: u8 = 3;
  pub const BUILD_FAILED: u8 = 4;
}

/// Exit code for an error that escaped a command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
  if err.downcast_ref::<ConfigError>().is_some() {
    return exit::CONFIG;
  }
  if err.downcast_ref::<ValidationError>().is_some() {
    return exit::VALIDATION;
  }
  if err.downcast_ref::<PipelineError>().is_some() {
    return exit::BUILD_FAILED;
  }
  match err.downcast_ref::<RunError>() {
    Some(RunError::UnknownFormat(_)) => exit::CONFIG,
    Some(RunError::Validation(_)) => exit::VALIDATION,
    Some(RunError::Failed(_)) => exit::BUILD_FAILED,
    _ => exit::UNEXPECTED,
  }
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;
  const GB: u64 = MB * 1024;

  if bytes >= GB {
    format!("{:.1} GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

/// Wall-clock duration rounded to milliseconds, e.g. `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let rounded = Duration::from_millis(duration.as_millis() as u64);
  if rounded.is_zero() {
    return "0ms".to_string();
  }
  humantime::format_duration(rounded).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_diagnostic(diagnostic: &Diagnostic) {
  match diagnostic.severity {
    Severity::Error => print_error(&diagnostic.to_string()),
    Severity::Warning => print_warning(&diagnostic.to_string()),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
