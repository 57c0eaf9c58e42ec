//! Per-task results and the aggregate build outcome.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::matrix::TaskId;
use crate::package::PackageInput;
use crate::validate::Diagnostic;

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The converter's tools are not available.
  Dependency,
  /// An external tool failed or produced no artifact.
  Converter,
  /// An external tool exceeded the task deadline.
  Timeout,
  /// Reading or writing task files failed.
  Io,
  /// The converter panicked.
  Panic,
}

impl FailureKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      FailureKind::Dependency => "dependency",
      FailureKind::Converter => "converter",
      FailureKind::Timeout => "timeout",
      FailureKind::Io => "io",
      FailureKind::Panic => "panic",
    }
  }
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
  pub task: TaskId,
  pub kind: FailureKind,
  pub message: String,
}

impl fmt::Display for TaskFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} [{}]: {}", self.task, self.kind, self.message)
  }
}

/// Outcome of exactly one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildResult {
  Succeeded { task: TaskId, artifact: PathBuf },
  Failed(TaskFailure),
}

impl BuildResult {
  pub fn task(&self) -> &TaskId {
    match self {
      BuildResult::Succeeded { task, .. } => task,
      BuildResult::Failed(failure) => &failure.task,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, BuildResult::Succeeded { .. })
  }

  pub fn artifact(&self) -> Option<&Path> {
    match self {
      BuildResult::Succeeded { artifact, .. } => Some(artifact),
      BuildResult::Failed(_) => None,
    }
  }

  pub fn failure(&self) -> Option<&TaskFailure> {
    match self {
      BuildResult::Failed(failure) => Some(failure),
      BuildResult::Succeeded { .. } => None,
    }
  }
}

/// Everything a run produced. Counters are folded from `results` on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
  /// One entry per task, in matrix order.
  pub results: Vec<BuildResult>,
  /// Validator warnings from the pre-build gate.
  pub warnings: Vec<Diagnostic>,
  /// Archives written by the packager, if packaging ran.
  pub archives: Vec<PathBuf>,
}

impl BuildOutcome {
  pub fn succeeded(&self) -> usize {
    self.results.iter().filter(|r| r.is_success()).count()
  }

  pub fn failed(&self) -> usize {
    self.results.len() - self.succeeded()
  }

  pub fn all_succeeded(&self) -> bool {
    self.results.iter().all(BuildResult::is_success)
  }

  pub fn failures(&self) -> Vec<&TaskFailure> {
    self.results.iter().filter_map(BuildResult::failure).collect()
  }

  /// Successful results tagged with their coordinates and output directory.
  pub fn package_inputs(&self, output_dir: impl Fn(&TaskId) -> PathBuf) -> Vec<PackageInput> {
    self
      .results
      .iter()
      .filter_map(|result| match result {
        BuildResult::Succeeded { task, artifact } => Some(PackageInput {
          task: task.clone(),
          artifact: artifact.clone(),
          output_dir: output_dir(task),
        }),
        BuildResult::Failed(_) => None,
      })
      .collect()
  }
}

/// At least one task failed while `continue_on_error` was off.
///
/// Raised only after every task finished; carries all failures and the full
/// outcome.
#[derive(Debug, Error)]
#[error("{} of {} build task(s) failed", failures.len(), outcome.results.len())]
pub struct PipelineError {
  pub failures: Vec<TaskFailure>,
  pub outcome: BuildOutcome,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn failed(lang: &str) -> BuildResult {
    BuildResult::Failed(TaskFailure {
      task: TaskId::new(lang, "plain", "html"),
      kind: FailureKind::Converter,
      message: "exit 1".into(),
    })
  }

  fn succeeded(lang: &str) -> BuildResult {
    BuildResult::Succeeded {
      task: TaskId::new(lang, "plain", "html"),
      artifact: PathBuf::from(format!("build/{}/plain/html/template-{}-plain.html", lang, lang)),
    }
  }

  #[test]
  fn outcome_counts_fold_results() {
    let outcome = BuildOutcome {
      results: vec![succeeded("EN"), failed("DE"), succeeded("FR")],
      ..Default::default()
    };
    assert_eq!(outcome.succeeded(), 2);
    assert_eq!(outcome.failed(), 1);
    assert!(!outcome.all_succeeded());
    assert_eq!(outcome.failures()[0].task.language, "DE");
    assert!(BuildOutcome::default().all_succeeded());
  }

  #[test]
  fn package_inputs_skip_failures() {
    let outcome = BuildOutcome {
      results: vec![succeeded("EN"), failed("DE")],
      ..Default::default()
    };
    let inputs = outcome.package_inputs(|task| PathBuf::from("build").join(&task.language));
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].output_dir, PathBuf::from("build/EN"));
  }

  #[test]
  fn result_serializes_with_status_tag() {
    let json = serde_json::to_value(failed("DE")).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["kind"], "converter");
    assert_eq!(json["task"]["language"], "DE");

    let json = serde_json::to_value(succeeded("EN")).unwrap();
    assert_eq!(json["status"], "succeeded");
  }

  #[test]
  fn failure_display() {
    assert_eq!(
      failed("DE").failure().unwrap().to_string(),
      "DE/plain/html [converter]: exit 1"
    );
  }
}
