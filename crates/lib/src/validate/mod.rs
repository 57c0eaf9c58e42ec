//! Pre-build validation.
//!
//! The validator runs every check in a fixed order and collects all
//! diagnostics before producing a verdict. Only errors block a build;
//! warnings are logged and carried along with the outcome.
//!
//! [`check_artifacts`] reuses the same report type for a finished build tree.

mod artifacts;
mod checks;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::BuildConfiguration;
use crate::tool::ToolRunner;

pub use artifacts::{ArtifactError, check_artifacts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Warning,
  Error,
}

/// The check that produced a diagnostic, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
  Structure,
  Metadata,
  Reference,
  Resource,
  Environment,
  /// Post-build artifact checks.
  Artifact,
}

impl CheckKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      CheckKind::Structure => "structure",
      CheckKind::Metadata => "metadata",
      CheckKind::Reference => "reference",
      CheckKind::Resource => "resource",
      CheckKind::Environment => "environment",
      CheckKind::Artifact => "artifact",
    }
  }
}

impl fmt::Display for CheckKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One finding, tied to a language and location where known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
  pub check: CheckKind,
  pub severity: Severity,
  pub language: Option<String>,
  pub path: Option<PathBuf>,
  pub line: Option<usize>,
  pub message: String,
}

impl Diagnostic {
  pub fn error(check: CheckKind, message: impl Into<String>) -> Self {
    Self {
      check,
      severity: Severity::Error,
      language: None,
      path: None,
      line: None,
      message: message.into(),
    }
  }

  pub fn warning(check: CheckKind, message: impl Into<String>) -> Self {
    Self {
      severity: Severity::Warning,
      ..Self::error(check, message)
    }
  }

  pub fn language(mut self, language: impl Into<String>) -> Self {
    self.language = Some(language.into());
    self
  }

  pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
    self.path = Some(path.into());
    self
  }

  pub fn line(mut self, line: usize) -> Self {
    self.line = Some(line);
    self
  }
}

/// `[check] LANG path:line: message`, omitting unknown parts.
impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.check)?;
    if let Some(language) = &self.language {
      write!(f, " {}", language)?;
    }
    if let Some(path) = &self.path {
      write!(f, " {}", path.display())?;
      if let Some(line) = self.line {
        write!(f, ":{}", line)?;
      }
      f.write_str(":")?;
    } else if self.language.is_some() {
      f.write_str(":")?;
    }
    write!(f, " {}", self.message)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
  pub errors: Vec<Diagnostic>,
  pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
  pub fn push(&mut self, diagnostic: Diagnostic) {
    match diagnostic.severity {
      Severity::Error => self.errors.push(diagnostic),
      Severity::Warning => self.warnings.push(diagnostic),
    }
  }

  pub fn passed(&self) -> bool {
    self.errors.is_empty()
  }

  /// Languages named by at least one error, in first-seen order.
  pub fn failing_languages(&self) -> Vec<&str> {
    let mut languages: Vec<&str> = Vec::new();
    for lang in self.errors.iter().filter_map(|d| d.language.as_deref()) {
      if !languages.contains(&lang) {
        languages.push(lang);
      }
    }
    languages
  }
}

/// Validation found at least one error. Carries the full report.
#[derive(Debug, Error)]
#[error("validation failed with {} error(s) and {} warning(s)", report.errors.len(), report.warnings.len())]
pub struct ValidationError {
  pub report: ValidationReport,
}

/// Which checks to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationScope {
  /// Run the reference and resource checks, which read document content.
  /// The pipeline turns these off when the build matrix is empty.
  pub content_checks: bool,
}

impl Default for ValidationScope {
  fn default() -> Self {
    Self { content_checks: true }
  }
}

pub struct Validator<'a> {
  config: &'a BuildConfiguration,
  runner: &'a dyn ToolRunner,
}

impl<'a> Validator<'a> {
  pub fn new(config: &'a BuildConfiguration, runner: &'a dyn ToolRunner) -> Self {
    Self { config, runner }
  }

  /// Run every check in scope and return the collected diagnostics.
  pub fn run(&self, scope: ValidationScope) -> ValidationReport {
    info!(languages = self.config.languages.len(), content_checks = scope.content_checks, "validating sources");
    let mut report = ValidationReport::default();

    checks::structure(self.config, &mut report);
    checks::metadata(self.config, &mut report);
    if scope.content_checks {
      checks::references(self.config, self.runner, &mut report);
      checks::resources(self.config, &mut report);
    }
    checks::environment(self.config, self.runner, &mut report);

    for diagnostic in &report.warnings {
      warn!(check = %diagnostic.check, language = ?diagnostic.language, "{}", diagnostic);
    }
    for diagnostic in &report.errors {
      error!(check = %diagnostic.check, language = ?diagnostic.language, "{}", diagnostic);
    }
    info!(
      errors = report.errors.len(),
      warnings = report.warnings.len(),
      "validation finished"
    );
    report
  }

  /// Like [`Validator::run`], failing when any error was found.
  pub fn check(&self, scope: ValidationScope) -> Result<ValidationReport, ValidationError> {
    let report = self.run(scope);
    if report.passed() {
      Ok(report)
    } else {
      Err(ValidationError { report })
    }
  }
}
