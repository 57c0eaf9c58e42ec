//! Implementation of the `docmatrix validate` command.

use anyhow::Result;

use docmatrix_lib::config::BuildConfiguration;
use docmatrix_lib::matrix;
use docmatrix_lib::validate::{ValidationReport, ValidationScope, Validator};

use super::Toolchain;
use crate::output::{OutputFormat, exit, print_diagnostic, print_json, print_success};

/// Run every check and print all diagnostics. Exits with the validation code
/// when at least one error was found.
pub fn cmd_validate(toolchain: &Toolchain, config: &BuildConfiguration, output: OutputFormat) -> Result<u8> {
  let scope = ValidationScope {
    content_checks: !matrix::generate(config).is_empty(),
  };
  let report = Validator::new(config, toolchain.runner.as_ref()).run(scope);
  print_report(&report, config.languages.len(), output)?;
  Ok(if report.passed() { exit::SUCCESS } else { exit::VALIDATION })
}

/// Print every diagnostic followed by the summary line.
pub(super) fn print_report(report: &ValidationReport, languages: usize, output: OutputFormat) -> Result<()> {
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
        "Validation passed for {} language(s) with {} warning(s)",
        languages,
        report.warnings.len()
      ));
    } else {
      println!(
        "{} error(s), {} warning(s); failing languages: {}",
        report.errors.len(),
        report.warnings.len(),
        report.failing_languages().join(", ")
      );
    }
  }
  Ok(())
}
