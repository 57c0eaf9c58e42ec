//! Implementation of the `docmatrix package` command.
//!
//! Archives the outputs of an earlier build without rebuilding anything.

use anyhow::{Context, Result};

use docmatrix_lib::config::BuildConfiguration;
use docmatrix_lib::package::{Packager, ZipPackager, discover_outputs};

use crate::output::{OutputFormat, exit, format_bytes, print_info, print_json, print_stat, print_success};

pub fn cmd_package(config: &BuildConfiguration, output: OutputFormat) -> Result<u8> {
  let inputs = discover_outputs(&config.output)
    .with_context(|| format!("Failed to scan build tree: {}", config.output.build_root.display()))?;

  if inputs.is_empty() {
    if output.is_json() {
      print_json(&serde_json::json!({ "archives": [] }))?;
    } else {
      print_info("No build outputs found, nothing to package");
    }
    return Ok(exit::SUCCESS);
  }

  let archives = ZipPackager::from_config(config)
    .package(&inputs)
    .context("Packaging failed")?;

  if output.is_json() {
    print_json(&serde_json::json!({ "archives": archives }))?;
  } else {
    for archive in &archives {
      let size = std::fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
      println!("  {} ({})", archive.display(), format_bytes(size));
    }
    println!();
    print_success(&format!("Packaged {} archive(s)", archives.len()));
    print_stat("Dist", &config.output.dist_root.display().to_string());
  }
  Ok(exit::SUCCESS)
}
