//! The converter contract.
//!
//! A [`Converter`] turns one language/flavor of the document source into one
//! output format. The pipeline knows nothing about formats beyond this trait;
//! new formats are added by implementing it and registering the instance in a
//! [`crate::registry::ConverterRegistry`].

mod asciidoctor;
mod builtin;
mod pandoc;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::config::FormatOptions;
use crate::consts::{HELP_FLAVOR, IMAGES_DIR};
use crate::metadata::VersionMetadata;
use crate::tool::ToolError;

pub use asciidoctor::{AsciidoctorBackend, AsciidoctorConverter};
pub use builtin::{ASCIIDOCTOR, ASCIIDOCTOR_PDF, PANDOC, register_builtin};
pub use pandoc::PandocConverter;

/// Errors a converter reports for a single conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
  /// A tool the converter depends on is not installed.
  #[error("required tool `{0}` is not available")]
  ToolMissing(String),

  /// An external tool failed or timed out.
  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error("i/o error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The tool exited cleanly but the expected artifact is missing.
  #[error("no artifact was produced at {}", path.display())]
  MissingArtifact { path: PathBuf },
}

impl ConvertError {
  /// Whether the failure was caused by a missing dependency.
  pub fn is_dependency(&self) -> bool {
    matches!(self, ConvertError::ToolMissing(_) | ConvertError::Tool(ToolError::NotFound { .. }))
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, ConvertError::Tool(ToolError::TimedOut { .. }))
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    ConvertError::Io {
      path: path.into(),
      source,
    }
  }
}

/// Everything a converter needs for one task.
///
/// Owned by the worker running the task; never shared between tasks.
#[derive(Debug, Clone)]
pub struct BuildContext {
  pub language: String,
  pub flavor: String,
  pub format: String,
  /// The language's source subtree.
  pub source_dir: PathBuf,
  /// Entry document inside `source_dir`.
  pub entry_document: PathBuf,
  /// Unique per task. Created before `convert` is called.
  pub output_dir: PathBuf,
  pub version_metadata: VersionMetadata,
  pub format_options: FormatOptions,
  /// Leading part of artifact file names.
  pub artifact_prefix: String,
  /// Time budget for the whole task.
  pub timeout: Option<Duration>,
  /// When the budget runs out. Every tool call gets only what is left.
  pub deadline: Option<Instant>,
}

impl BuildContext {
  /// `{prefix}-{language}-{flavor}.{extension}`
  pub fn artifact_file_name(&self, extension: &str) -> String {
    format!("{}-{}-{}.{}", self.artifact_prefix, self.language, self.flavor, extension)
  }

  pub fn artifact_path(&self, extension: &str) -> PathBuf {
    self.output_dir.join(self.artifact_file_name(extension))
  }

  pub fn images_dir(&self) -> PathBuf {
    self.source_dir.join(IMAGES_DIR)
  }

  /// Metadata value, or the empty string when absent.
  pub fn metadata(&self, key: &str) -> &str {
    self.version_metadata.get(key).map(String::as_str).unwrap_or("")
  }

  pub fn option(&self, key: &str) -> Option<&Value> {
    self.format_options.get(key)
  }

  pub fn option_str(&self, key: &str) -> Option<&str> {
    self.option(key).and_then(Value::as_str)
  }

  /// Timeout for the next call to `program`: the part of the task budget
  /// that is left.
  ///
  /// Fails with [`ToolError::TimedOut`] once the deadline has passed, so the
  /// call is never started.
  pub fn tool_timeout(&self, program: &str) -> Result<Option<Duration>, ToolError> {
    let Some(deadline) = self.deadline else {
      return Ok(self.timeout);
    };
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
      return Err(ToolError::TimedOut {
        command: program.to_string(),
        after: self.timeout.unwrap_or_default(),
      });
    }
    Ok(Some(left))
  }

  /// Whether help text is rendered for this flavor.
  ///
  /// The `help_flavors` option, when present, replaces the default list.
  pub fn show_help(&self) -> bool {
    match self.option("help_flavors").and_then(Value::as_array) {
      Some(flavors) => flavors.iter().any(|f| f.as_str() == Some(self.flavor.as_str())),
      None => self.flavor == HELP_FLAVOR,
    }
  }

  /// Document attributes shared by every asciidoctor-based converter.
  pub fn document_attributes(&self) -> Vec<(String, Option<String>)> {
    let mut attrs: Vec<(String, Option<String>)> = ["revnumber", "revdate", "revremark"]
      .iter()
      .map(|key| (key.to_string(), Some(self.metadata(key).to_string())))
      .collect();
    attrs.push(("flavor".to_string(), Some(self.flavor.clone())));
    if self.show_help() {
      attrs.push(("show-help".to_string(), None));
    }
    attrs
  }
}

/// The capability contract every format plugin satisfies.
///
/// `convert` may be called concurrently for different contexts, so
/// implementations keep no mutable state across calls. Temporary files belong
/// to a single call and must be removed on every exit path.
pub trait Converter: Send + Sync {
  /// Default ordering priority (lower runs first in listings and matrices).
  fn priority(&self) -> i64 {
    1
  }

  /// File extension of the primary artifact, without the dot.
  fn output_extension(&self) -> &str;

  /// Whether the external tools this converter needs are reachable.
  ///
  /// Fast and side-effect free; never processes documents.
  fn check_available(&self) -> bool;

  /// Convert the context's sources into `context.output_dir`.
  ///
  /// Returns the path of the primary artifact.
  fn convert(&self, context: &BuildContext) -> Result<PathBuf, ConvertError>;
}

/// Render attributes as asciidoctor `-a` arguments.
pub(crate) fn attribute_args(attrs: &[(String, Option<String>)]) -> Vec<String> {
  let mut args = Vec::with_capacity(attrs.len() * 2);
  for (key, value) in attrs {
    args.push("-a".to_string());
    match value {
      Some(v) if !v.is_empty() => args.push(format!("{}={}", key, v)),
      _ => args.push(key.clone()),
    }
  }
  args
}

/// Absolute form of `path`, falling back to the input if it cannot be resolved.
pub(crate) fn absolute(path: &Path) -> PathBuf {
  dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Fail with [`ConvertError::MissingArtifact`] unless `path` exists.
pub(crate) fn ensure_artifact(path: PathBuf) -> Result<PathBuf, ConvertError> {
  if path.is_file() {
    Ok(path)
  } else {
    Err(ConvertError::MissingArtifact { path })
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use super::*;

  pub fn context(source_dir: &Path, output_dir: &Path, flavor: &str) -> BuildContext {
    let mut version_metadata = VersionMetadata::new();
    version_metadata.insert("revnumber".into(), "9.0-EN".into());
    version_metadata.insert("revdate".into(), "July 2025".into());
    BuildContext {
      language: "EN".into(),
      flavor: flavor.into(),
      format: "html".into(),
      source_dir: source_dir.to_path_buf(),
      entry_document: source_dir.join("template.adoc"),
      output_dir: output_dir.to_path_buf(),
      version_metadata,
      format_options: FormatOptions::new(),
      artifact_prefix: "template".into(),
      timeout: None,
      deadline: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::test_support::context;
  use super::*;

  #[test]
  fn artifact_path_naming() {
    let ctx = context(Path::new("/src/EN"), Path::new("/build/EN/plain/html"), "plain");
    assert_eq!(
      ctx.artifact_path("html"),
      PathBuf::from("/build/EN/plain/html/template-EN-plain.html")
    );
  }

  #[test]
  fn show_help_default_and_option() {
    let mut ctx = context(Path::new("/src"), Path::new("/out"), "withHelp");
    assert!(ctx.show_help());

    ctx.flavor = "plain".into();
    assert!(!ctx.show_help());

    ctx
      .format_options
      .insert("help_flavors".into(), serde_json::json!(["plain", "annotated"]));
    assert!(ctx.show_help());
  }

  #[test]
  fn document_attributes_render_as_args() {
    let ctx = context(Path::new("/src"), Path::new("/out"), "withHelp");
    let args = attribute_args(&ctx.document_attributes());
    assert_eq!(
      args,
      vec![
        "-a",
        "revnumber=9.0-EN",
        "-a",
        "revdate=July 2025",
        "-a",
        "revremark",
        "-a",
        "flavor=withHelp",
        "-a",
        "show-help"
      ]
    );
  }

  #[test]
  fn tool_timeout_is_what_is_left_of_the_task_budget() {
    let mut ctx = context(Path::new("/src"), Path::new("/out"), "plain");
    assert_eq!(ctx.tool_timeout("pandoc").unwrap(), None);

    ctx.timeout = Some(Duration::from_secs(60));
    ctx.deadline = Some(Instant::now() + Duration::from_secs(30));
    let left = ctx.tool_timeout("pandoc").unwrap().unwrap();
    assert!(left <= Duration::from_secs(30) && left > Duration::from_secs(20));

    ctx.deadline = Some(Instant::now());
    let err = ctx.tool_timeout("pandoc").unwrap_err();
    assert!(matches!(err, ToolError::TimedOut { ref command, after } if command == "pandoc" && after == Duration::from_secs(60)));
  }

  #[test]
  fn error_classification() {
    assert!(ConvertError::ToolMissing("pandoc".into()).is_dependency());
    assert!(
      ConvertError::Tool(ToolError::NotFound {
        program: "pandoc".into()
      })
      .is_dependency()
    );
    assert!(
      ConvertError::Tool(ToolError::TimedOut {
        command: "pandoc".into(),
        after: Duration::from_secs(1)
      })
      .is_timeout()
    );
    assert!(!ConvertError::MissingArtifact { path: "/x".into() }.is_dependency());
  }
}
