//! Implementation of the `docmatrix build` command.
//!
//! Validates the sources, expands the build matrix and runs every task, then
//! prints one line per task and the aggregate counts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use docmatrix_lib::config::BuildConfiguration;
use docmatrix_lib::matrix;
use docmatrix_lib::package::ZipPackager;
use docmatrix_lib::pipeline::{BuildOutcome, BuildPipeline, BuildResult, RunError};

use super::Toolchain;
use super::validate::print_report;
use crate::output::{
  OutputFormat, exit, format_duration, print_error, print_info, print_json, print_stat, print_success, symbols,
};

pub fn cmd_build(
  toolchain: &Toolchain,
  mut config: BuildConfiguration,
  timeout: Option<Duration>,
  output: OutputFormat,
) -> Result<u8> {
  let start = Instant::now();
  if timeout.is_some() {
    config.execution.timeout = timeout;
  }

  if !output.is_json() {
    let tasks = matrix::generate(&config).len();
    print_info(&format!(
      "Building {} task(s): {} language(s) x {} flavor(s) x {} format(s)",
      tasks,
      config.languages.len(),
      config.flavors.len(),
      config.enabled_formats().len()
    ));
  }

  let languages = config.languages.len();
  let create_archives = config.execution.create_archives;
  let packager = ZipPackager::from_config(&config);
  let mut pipeline = BuildPipeline::new(Arc::new(config), toolchain.registry.clone(), toolchain.runner.clone());
  if create_archives {
    pipeline = pipeline.with_packager(Arc::new(packager));
  }

  let outcome = match pipeline.run() {
    Ok(outcome) => outcome,
    // Every task has run; report them before failing.
    Err(RunError::Failed(err)) => err.outcome,
    Err(RunError::Validation(err)) => {
      print_report(&err.report, languages, output)?;
      return Ok(exit::VALIDATION);
    }
    Err(err) => return Err(err).context("Build failed"),
  };

  report(&outcome, start.elapsed(), output)?;

  Ok(if outcome.all_succeeded() {
    exit::SUCCESS
  } else {
    exit::BUILD_FAILED
  })
}

fn report(outcome: &BuildOutcome, elapsed: Duration, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    let json = serde_json::json!({
      "succeeded": outcome.succeeded(),
      "failed": outcome.failed(),
      "results": outcome.results,
      "warnings": outcome.warnings,
      "archives": outcome.archives,
      "elapsed_ms": elapsed.as_millis() as u64,
    });
    return print_json(&json);
  }

  println!();
  for result in &outcome.results {
    match result {
      BuildResult::Succeeded { task, artifact } => {
        print_success(&format!("{} {} {}", task, symbols::ARROW, artifact.display()));
      }
      BuildResult::Failed(failure) => print_error(&failure.to_string()),
    }
  }
  if !outcome.archives.is_empty() {
    println!();
    println!("Archives:");
    for archive in &outcome.archives {
      println!("  {} {}", symbols::INFO, archive.display());
    }
  }

  println!();
  if !outcome.warnings.is_empty() {
    print_stat("Warnings", &outcome.warnings.len().to_string());
  }
  print_stat("Duration", &format_duration(elapsed));
  println!("{} succeeded, {} failed", outcome.succeeded(), outcome.failed());
  Ok(())
}
