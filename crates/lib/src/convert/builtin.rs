//! Explicit start-up registration of the shipped converters.

use std::sync::Arc;

use super::{AsciidoctorBackend, AsciidoctorConverter, PandocConverter};
use crate::registry::{ConverterRegistry, RegistryError};
use crate::tool::ToolRunner;

pub const ASCIIDOCTOR: &str = "asciidoctor";
pub const ASCIIDOCTOR_PDF: &str = "asciidoctor-pdf";
pub const PANDOC: &str = "pandoc";

/// Register every built-in format, one call per format.
pub fn register_builtin(registry: &mut ConverterRegistry, runner: Arc<dyn ToolRunner>) -> Result<(), RegistryError> {
  let asciidoctor = |backend| Arc::new(AsciidoctorConverter::new(backend, runner.clone()));
  let pandoc = |target, ext| PandocConverter::new(target, ext, runner.clone());

  registry.register("html", asciidoctor(AsciidoctorBackend::Html))?;
  registry.register("pdf", asciidoctor(AsciidoctorBackend::Pdf))?;
  registry.register("asciidoc", asciidoctor(AsciidoctorBackend::Asciidoc))?;
  registry.register("docx", Arc::new(pandoc("docx", "docx")))?;
  registry.register("markdown", Arc::new(pandoc("markdown_strict", "md")))?;
  registry.register("github_markdown", Arc::new(pandoc("gfm", "md").with_priority(2)))?;
  registry.register(
    "markdown_mp",
    Arc::new(pandoc("markdown_strict", "md").with_priority(2).multi_page()),
  )?;
  registry.register(
    "github_markdown_mp",
    Arc::new(pandoc("gfm", "md").with_priority(2).multi_page()),
  )?;
  registry.register("rst", Arc::new(pandoc("rst", "rst").with_priority(3)))?;
  registry.register("textile", Arc::new(pandoc("textile", "textile").with_priority(3)))?;
  Ok(())
}

impl ConverterRegistry {
  /// A registry holding every built-in converter.
  pub fn with_builtin(runner: Arc<dyn ToolRunner>) -> Result<Self, RegistryError> {
    let mut registry = Self::new();
    register_builtin(&mut registry, runner)?;
    Ok(registry)
  }
}
