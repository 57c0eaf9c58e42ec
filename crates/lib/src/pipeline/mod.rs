//! Build pipeline.
//!
//! This module drives a complete build:
//! - resolves every enabled format against the registry before any work starts
//! - gates the run on the validator
//! - expands the build matrix and runs each task on a bounded worker pool
//! - folds per-task results into a [`BuildOutcome`] and optionally packages it
//!
//! A failing task never stops its siblings. Whether failures escalate to an
//! error is decided once, after every task has produced a result.

mod types;

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::BuildConfiguration;
use crate::consts::APP_NAME;
use crate::convert::{BuildContext, ConvertError, Converter};
use crate::matrix::{self, BuildTask};
use crate::metadata::{self, VersionMetadata};
use crate::package::{PackageError, Packager};
use crate::registry::ConverterRegistry;
use crate::tool::ToolRunner;
use crate::validate::{ValidationError, ValidationReport, ValidationScope, Validator};

pub use types::{BuildOutcome, BuildResult, FailureKind, PipelineError, TaskFailure};

/// Errors that stop a run as a whole.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("format `{0}` is enabled but no converter is registered for it")]
  UnknownFormat(String),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Failed(#[from] PipelineError),

  #[error("failed to clean {}: {source}", path.display())]
  Clean {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to start worker pool: {0}")]
  Pool(#[from] rayon::ThreadPoolBuildError),

  #[error("packaging failed: {0}")]
  Package(#[from] PackageError),
}

type Converters = BTreeMap<String, Arc<dyn Converter>>;

pub struct BuildPipeline {
  config: Arc<BuildConfiguration>,
  registry: Arc<ConverterRegistry>,
  runner: Arc<dyn ToolRunner>,
  packager: Option<Arc<dyn Packager>>,
}

impl BuildPipeline {
  pub fn new(config: Arc<BuildConfiguration>, registry: Arc<ConverterRegistry>, runner: Arc<dyn ToolRunner>) -> Self {
    Self {
      config,
      registry,
      runner,
      packager: None,
    }
  }

  /// Packager used when `build.create_archives` is set.
  pub fn with_packager(mut self, packager: Arc<dyn Packager>) -> Self {
    self.packager = Some(packager);
    self
  }

  pub fn config(&self) -> &BuildConfiguration {
    &self.config
  }

  /// Run the validator alone.
  pub fn validate(&self, scope: ValidationScope) -> Result<ValidationReport, ValidationError> {
    Validator::new(&self.config, self.runner.as_ref()).check(scope)
  }

  /// Run a full build.
  ///
  /// Steps, in order: resolve converters, validate (when enabled), clean
  /// (when enabled), generate the matrix, execute every task, then package
  /// the successes (when enabled).
  ///
  /// # Returns
  ///
  /// The outcome with one result per task. When `continue_on_error` is off
  /// and any task failed, [`RunError::Failed`] carries the same outcome plus
  /// the failure list; packaging is skipped in that case.
  pub fn run(&self) -> Result<BuildOutcome, RunError> {
    let started = Instant::now();
    let execution = &self.config.execution;

    let converters = self.resolve_converters()?;
    let tasks = matrix::generate(&self.config);

    let warnings = if execution.validate {
      let scope = ValidationScope {
        content_checks: !tasks.is_empty(),
      };
      self.validate(scope)?.warnings
    } else {
      debug!("validation disabled");
      Vec::new()
    };

    if execution.clean_before {
      self.clean()?;
    }

    if tasks.is_empty() {
      info!("no enabled formats, nothing to build");
      return Ok(BuildOutcome {
        warnings,
        ..Default::default()
      });
    }

    let metadata = self.read_metadata();
    info!(
      tasks = tasks.len(),
      parallel = execution.parallel,
      max_workers = execution.max_workers,
      "dispatching build tasks"
    );

    let results: Vec<BuildResult> = if execution.parallel {
      let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(execution.max_workers)
        .thread_name(|i| format!("{}-worker-{}", APP_NAME, i))
        .build()?;
      pool.install(|| {
        tasks
          .par_iter()
          .map(|task| self.execute_task(task, &converters, &metadata))
          .collect()
      })
    } else {
      tasks
        .iter()
        .map(|task| self.execute_task(task, &converters, &metadata))
        .collect()
    };

    let mut outcome = BuildOutcome {
      results,
      warnings,
      archives: Vec::new(),
    };
    info!(
      succeeded = outcome.succeeded(),
      failed = outcome.failed(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "build finished"
    );

    if !outcome.all_succeeded() && !execution.continue_on_error {
      let failures = outcome.failures().into_iter().cloned().collect();
      return Err(PipelineError { failures, outcome }.into());
    }

    if execution.create_archives {
      match &self.packager {
        Some(packager) => {
          let output = &self.config.output;
          let inputs = outcome.package_inputs(|t| output.task_dir(&t.language, &t.flavor, &t.format));
          outcome.archives = packager.package(&inputs)?;
        }
        None => warn!("archive creation requested but no packager is configured"),
      }
    }

    Ok(outcome)
  }

  /// Converter for every enabled format, or the first format without one.
  fn resolve_converters(&self) -> Result<Converters, RunError> {
    self
      .config
      .enabled_formats()
      .into_iter()
      .map(|(id, _)| {
        self
          .registry
          .resolve(id)
          .map(|descriptor| (id.to_string(), descriptor.instance.clone()))
          .map_err(|_| RunError::UnknownFormat(id.to_string()))
      })
      .collect()
  }

  fn clean(&self) -> Result<(), RunError> {
    for path in [&self.config.output.build_root, &self.config.output.dist_root] {
      if path.exists() {
        info!(path = %path.display(), "cleaning");
        std::fs::remove_dir_all(path).map_err(|source| RunError::Clean {
          path: path.clone(),
          source,
        })?;
      }
    }
    Ok(())
  }

  /// Metadata for every language, read once and shared by all tasks.
  fn read_metadata(&self) -> BTreeMap<String, VersionMetadata> {
    self
      .config
      .languages
      .iter()
      .map(|language| {
        let path = self.config.source.metadata_path(language);
        let values = metadata::read_lenient(&path).unwrap_or_else(|err| {
          warn!(language = %language, error = %err, "version metadata unavailable");
          VersionMetadata::new()
        });
        (language.clone(), values)
      })
      .collect()
  }

  fn context_for(&self, task: &BuildTask, metadata: &BTreeMap<String, VersionMetadata>) -> BuildContext {
    let id = &task.id;
    let mut format_options = self
      .config
      .format(&id.format)
      .map(|setting| setting.options.clone())
      .unwrap_or_default();
    if let Some(theme_dir) = &self.config.prerequisites.theme_dir {
      format_options
        .entry("theme_dir".to_string())
        .or_insert_with(|| Value::String(theme_dir.display().to_string()));
    }

    BuildContext {
      language: id.language.clone(),
      flavor: id.flavor.clone(),
      format: id.format.clone(),
      source_dir: self.config.source_dir(&id.language),
      entry_document: self.config.source.entry_path(&id.language),
      output_dir: task.output_root.clone(),
      version_metadata: metadata.get(&id.language).cloned().unwrap_or_default(),
      format_options,
      artifact_prefix: self.config.output.artifact_prefix.clone(),
      timeout: self.config.execution.timeout,
      deadline: self.config.execution.timeout.map(|limit| Instant::now() + limit),
    }
  }

  /// Run one task to a result. Never fails and never panics.
  fn execute_task(
    &self,
    task: &BuildTask,
    converters: &Converters,
    metadata: &BTreeMap<String, VersionMetadata>,
  ) -> BuildResult {
    let id = &task.id;
    let fail = |kind: FailureKind, message: String| {
      error!(
        language = %id.language,
        flavor = %id.flavor,
        format = %id.format,
        kind = %kind,
        error = %message,
        "task failed"
      );
      BuildResult::Failed(TaskFailure {
        task: id.clone(),
        kind,
        message,
      })
    };

    let Some(converter) = converters.get(&id.format) else {
      return fail(FailureKind::Converter, format!("no converter for format `{}`", id.format));
    };
    if !converter.check_available() {
      return fail(
        FailureKind::Dependency,
        format!("tools required by format `{}` are not available", id.format),
      );
    }
    if let Err(err) = std::fs::create_dir_all(&task.output_root) {
      return fail(
        FailureKind::Io,
        format!("failed to create {}: {}", task.output_root.display(), err),
      );
    }

    let context = self.context_for(task, metadata);
    let started = Instant::now();
    debug!(task = %id, output = %task.output_root.display(), "task started");

    match catch_unwind(AssertUnwindSafe(|| converter.convert(&context))) {
      Ok(Ok(artifact)) => {
        info!(
          language = %id.language,
          flavor = %id.flavor,
          format = %id.format,
          path = %artifact.display(),
          elapsed_ms = started.elapsed().as_millis() as u64,
          "task succeeded"
        );
        BuildResult::Succeeded {
          task: id.clone(),
          artifact,
        }
      }
      Ok(Err(err)) => fail(failure_kind(&err), err.to_string()),
      Err(payload) => fail(FailureKind::Panic, panic_message(payload.as_ref())),
    }
  }
}

fn failure_kind(err: &ConvertError) -> FailureKind {
  if err.is_dependency() {
    FailureKind::Dependency
  } else if err.is_timeout() {
    FailureKind::Timeout
  } else if matches!(err, ConvertError::Io { .. }) {
    FailureKind::Io
  } else {
    FailureKind::Converter
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    format!("converter panicked: {}", s)
  } else if let Some(s) = payload.downcast_ref::<String>() {
    format!("converter panicked: {}", s)
  } else {
    "converter panicked".to_string()
  }
}
