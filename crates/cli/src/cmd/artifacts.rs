//! Implementation of the `docmatrix test-artifacts` command.

use anyhow::{Context, Result};

use docmatrix_lib::config::BuildConfiguration;
use docmatrix_lib::validate::check_artifacts;

use super::Toolchain;
use crate::output::{OutputFormat, exit, print_diagnostic, print_json, print_success};

/// Check every artifact in the build tree. Exits with the validation code
/// when any artifact is broken.
pub fn cmd_test_artifacts(toolchain: &Toolchain, config: &BuildConfiguration, output: OutputFormat) -> Result<u8> {
  let build_root = &config.output.build_root;
  let report = check_artifacts(build_root, toolchain.runner.as_ref(), config.execution.timeout)
    .with_context(|| format!("Failed to check build tree: {}", build_root.display()))?;

  if output.is_json() {
    print_json(&serde_json::json!({
      "passed": report.passed(),
      "errors": report.errors,
      "warnings": report.warnings,
    }))?;
  } else {
    for diagnostic in report.errors.iter().chain(&report.warnings) {
      print_diagnostic(diagnostic);
    }
    if report.passed() {
      print_success(&format!(
        "All build artifacts in {} validated with {} warning(s)",
        build_root.display(),
        report.warnings.len()
      ));
    } else {
      println!("{} broken artifact issue(s)", report.errors.len());
    }
  }

  Ok(if report.passed() { exit::SUCCESS } else { exit::VALIDATION })
}
