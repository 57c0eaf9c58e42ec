mod artifacts;
mod build;
mod formats;
mod package;
mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use docmatrix_lib::config::{BuildConfiguration, ConfigLoader, ConfigOverrides};
use docmatrix_lib::registry::ConverterRegistry;
use docmatrix_lib::tool::{SystemToolRunner, ToolRunner};

pub use artifacts::cmd_test_artifacts;
pub use build::cmd_build;
pub use formats::cmd_formats;
pub use package::cmd_package;
pub use validate::cmd_validate;

/// The tool runner and the converter registry shared by every command.
pub struct Toolchain {
  pub runner: Arc<dyn ToolRunner>,
  pub registry: Arc<ConverterRegistry>,
}

impl Toolchain {
  /// Built-in converters backed by tools found on `PATH`.
  pub fn system() -> Result<Self> {
    let runner: Arc<dyn ToolRunner> = Arc::new(SystemToolRunner);
    let registry = ConverterRegistry::with_builtin(runner.clone()).context("Failed to register built-in converters")?;
    Ok(Self {
      runner,
      registry: Arc::new(registry),
    })
  }

  pub fn load_config(&self, path: &Path, overrides: &ConfigOverrides) -> Result<BuildConfiguration> {
    ConfigLoader::from_registry(&self.registry)
      .load_file(path, overrides)
      .with_context(|| format!("Failed to load configuration: {}", path.display()))
  }
}
