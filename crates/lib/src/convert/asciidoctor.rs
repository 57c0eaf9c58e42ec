//! Converters driven directly by asciidoctor backends.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use super::{BuildContext, ConvertError, Converter, absolute, attribute_args, ensure_artifact};
use crate::theme;
use crate::tool::{Invocation, ToolRunner};

use super::builtin::{ASCIIDOCTOR, ASCIIDOCTOR_PDF};

/// Which asciidoctor backend a converter drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsciidoctorBackend {
  /// Standalone HTML5 page.
  Html,
  /// PDF via asciidoctor-pdf.
  Pdf,
  /// Single AsciiDoc file with every include resolved.
  Asciidoc,
}

impl AsciidoctorBackend {
  fn program(&self) -> &'static str {
    match self {
      AsciidoctorBackend::Pdf => ASCIIDOCTOR_PDF,
      AsciidoctorBackend::Html | AsciidoctorBackend::Asciidoc => ASCIIDOCTOR,
    }
  }

  fn extension(&self) -> &'static str {
    match self {
      AsciidoctorBackend::Html => "html",
      AsciidoctorBackend::Pdf => "pdf",
      AsciidoctorBackend::Asciidoc => "adoc",
    }
  }
}

pub struct AsciidoctorConverter {
  backend: AsciidoctorBackend,
  runner: Arc<dyn ToolRunner>,
}

impl AsciidoctorConverter {
  pub fn new(backend: AsciidoctorBackend, runner: Arc<dyn ToolRunner>) -> Self {
    Self { backend, runner }
  }

  fn html(&self, context: &BuildContext) -> Result<PathBuf, ConvertError> {
    let output = context.artifact_path(self.backend.extension());
    let mut attrs = context.document_attributes();
    attrs.push((
      "imagesdir".to_string(),
      Some(absolute(&context.images_dir()).display().to_string()),
    ));

    let invocation = Invocation::new(ASCIIDOCTOR)
      .args(["-b", "html5"])
      .args(attribute_args(&attrs))
      .arg("-D")
      .arg(&context.output_dir)
      .arg("-o")
      .arg(&output)
      .arg(&context.entry_document)
      .timeout(context.tool_timeout(ASCIIDOCTOR)?);
    self.runner.run(&invocation)?;
    ensure_artifact(output)
  }

  fn pdf(&self, context: &BuildContext) -> Result<PathBuf, ConvertError> {
    let output = absolute(&context.output_dir).join(context.artifact_file_name(self.backend.extension()));

    let mut attrs = context.document_attributes();
    match context.option_str("theme_dir").map(|dir| context.source_dir.join(dir)) {
      Some(theme_dir) => match theme::resolve_theme(&theme_dir, &context.language) {
        Some(theme_file) => {
          debug!(language = %context.language, theme = %theme_file.display(), "using pdf theme");
          attrs.push(("pdf-theme".to_string(), Some(absolute(&theme_file).display().to_string())));
          let fonts = theme_dir.join("fonts");
          if fonts.is_dir() {
            attrs.push(("pdf-fontsdir".to_string(), Some(absolute(&fonts).display().to_string())));
          }
        }
        None => info!(language = %context.language, "no pdf theme found, using default theme"),
      },
      None => debug!(language = %context.language, "using default pdf theme"),
    }
    if let Some(scripts) = theme::scripts_attribute(&context.language) {
      attrs.push(("scripts".to_string(), Some(scripts.to_string())));
    }

    let invocation = Invocation::new(ASCIIDOCTOR_PDF)
      .args(["-b", "pdf"])
      .arg("-o")
      .arg(&output)
      .args(attribute_args(&attrs))
      .arg(&context.entry_document)
      .timeout(context.tool_timeout(ASCIIDOCTOR_PDF)?);
    self.runner.run(&invocation)?;
    ensure_artifact(output)
  }

  /// Render through the docbook backend so includes and conditionals are
  /// resolved, then keep the captured document.
  fn asciidoc(&self, context: &BuildContext) -> Result<PathBuf, ConvertError> {
    let output = context.artifact_path(self.backend.extension());
    let invocation = Invocation::new(ASCIIDOCTOR)
      .args(["--no-header-footer", "-b", "docbook"])
      .args(attribute_args(&context.document_attributes()))
      .arg(&context.entry_document)
      .args(["-o", "-"])
      .timeout(context.tool_timeout(ASCIIDOCTOR)?);
    let result = self.runner.run(&invocation)?;
    std::fs::write(&output, result.stdout).map_err(|source| ConvertError::io(&output, source))?;
    Ok(output)
  }
}

impl Converter for AsciidoctorConverter {
  fn output_extension(&self) -> &str {
    self.backend.extension()
  }

  fn check_available(&self) -> bool {
    self.runner.is_available(self.backend.program())
  }

  fn convert(&self, context: &BuildContext) -> Result<PathBuf, ConvertError> {
    let artifact = match self.backend {
      AsciidoctorBackend::Html => self.html(context)?,
      AsciidoctorBackend::Pdf => self.pdf(context)?,
      AsciidoctorBackend::Asciidoc => self.asciidoc(context)?,
    };
    info!(
      language = %context.language,
      flavor = %context.flavor,
      path = %artifact.display(),
      "created {} file",
      context.format
    );
    Ok(artifact)
  }
}
