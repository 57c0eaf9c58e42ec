//! Post-build checks over a finished build tree.
//!
//! Markdown must parse, HTML image references must resolve to files shipped
//! next to the page, and DOCX files must be readable archives.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{CheckKind, Diagnostic, ValidationReport};
use crate::convert::PANDOC;
use crate::tool::{Invocation, ToolError, ToolRunner};

static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("BUG: invalid IMG_SRC_RE regex literal")
});

/// Image targets that never resolve to a file in the build tree.
const REMOTE_PREFIXES: [&str; 4] = ["http://", "https://", "data:", "//"];

/// Where DOCX files keep embedded images.
const DOCX_MEDIA_DIR: &str = "word/media/";

#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("build directory {} does not exist", path.display())]
  MissingBuildRoot { path: PathBuf },

  #[error("failed to scan {}: {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

/// Artifacts found under the build root, grouped by kind.
#[derive(Debug, Default)]
struct Artifacts {
  markdown: Vec<PathBuf>,
  html: Vec<PathBuf>,
  docx: Vec<PathBuf>,
}

/// Check every artifact below `build_root`.
///
/// Problems become diagnostics of kind [`CheckKind::Artifact`], tagged with
/// the language directory they were found in. Only a missing or unreadable
/// build root is an error.
pub fn check_artifacts(
  build_root: &Path,
  runner: &dyn ToolRunner,
  timeout: Option<Duration>,
) -> Result<ValidationReport, ArtifactError> {
  if !build_root.is_dir() {
    return Err(ArtifactError::MissingBuildRoot {
      path: build_root.to_path_buf(),
    });
  }
  let artifacts = collect(build_root)?;
  info!(
    markdown = artifacts.markdown.len(),
    html = artifacts.html.len(),
    docx = artifacts.docx.len(),
    "validating build artifacts"
  );

  let mut report = ValidationReport::default();
  markdown(build_root, &artifacts.markdown, runner, timeout, &mut report);
  for page in &artifacts.html {
    html_images(build_root, page, &mut report);
  }
  for document in &artifacts.docx {
    docx(build_root, document, &mut report);
  }

  info!(
    errors = report.errors.len(),
    warnings = report.warnings.len(),
    "artifact validation finished"
  );
  Ok(report)
}

fn collect(build_root: &Path) -> Result<Artifacts, ArtifactError> {
  let mut artifacts = Artifacts::default();
  for entry in WalkDir::new(build_root).sort_by_file_name() {
    let entry = entry.map_err(|source| ArtifactError::Walk {
      path: build_root.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let path = entry.into_path();
    match path.extension().and_then(|e| e.to_str()) {
      Some("md") => artifacts.markdown.push(path),
      Some("html") => artifacts.html.push(path),
      Some("docx") => artifacts.docx.push(path),
      _ => {}
    }
  }
  Ok(artifacts)
}

/// Diagnostic for `path`, tagged with the language directory it sits in.
fn diagnostic(build_root: &Path, path: &Path, message: String) -> Diagnostic {
  let diagnostic = Diagnostic::error(CheckKind::Artifact, message).path(path);
  match path
    .strip_prefix(build_root)
    .ok()
    .and_then(|relative| relative.components().next())
  {
    Some(language) if path.parent() != Some(build_root) => {
      diagnostic.language(language.as_os_str().to_string_lossy())
    }
    _ => diagnostic,
  }
}

/// Re-parse each Markdown file with pandoc.
fn markdown(
  build_root: &Path,
  files: &[PathBuf],
  runner: &dyn ToolRunner,
  timeout: Option<Duration>,
  report: &mut ValidationReport,
) {
  if files.is_empty() {
    debug!("no markdown artifacts");
    return;
  }
  if !runner.is_available(PANDOC) {
    report.push(Diagnostic::warning(
      CheckKind::Artifact,
      format!("`{}` not found, {} markdown file(s) not checked", PANDOC, files.len()),
    ));
    return;
  }
  for file in files {
    let invocation = Invocation::new(PANDOC)
      .arg(file)
      .args(["-f", "markdown", "-t", "html"])
      .timeout(timeout);
    match runner.run(&invocation) {
      Ok(_) => debug!(path = %file.display(), "markdown parsed"),
      Err(ToolError::Failed { stderr, .. }) if !stderr.is_empty() => {
        report.push(diagnostic(build_root, file, format!("markdown does not parse: {}", stderr)));
      }
      Err(err) => report.push(diagnostic(build_root, file, format!("markdown does not parse: {}", err))),
    }
  }
}

/// Every `<img src>` must be remote or a relative path that exists.
fn html_images(build_root: &Path, page: &Path, report: &mut ValidationReport) {
  let content = match fs::read_to_string(page) {
    Ok(content) => content,
    Err(err) => {
      report.push(diagnostic(build_root, page, format!("cannot read page: {}", err)));
      return;
    }
  };
  let base = page.parent().unwrap_or(build_root);
  let mut images = 0;
  for caps in IMG_SRC_RE.captures_iter(&content) {
    let Some(src) = caps.get(1).map(|m| m.as_str().trim()) else {
      continue;
    };
    images += 1;
    if REMOTE_PREFIXES.iter().any(|prefix| src.starts_with(prefix)) {
      continue;
    }
    if src.starts_with('/') || Path::new(src).is_absolute() {
      report.push(diagnostic(build_root, page, format!("image uses absolute path `{}`", src)));
    } else if !base.join(src).exists() {
      report.push(diagnostic(build_root, page, format!("missing image `{}`", src)));
    }
  }
  debug!(path = %page.display(), images, "html images checked");
}

/// A DOCX file is a ZIP archive; anything else is corrupt.
fn docx(build_root: &Path, document: &Path, report: &mut ValidationReport) {
  let file = match fs::File::open(document) {
    Ok(file) => file,
    Err(err) => {
      report.push(diagnostic(build_root, document, format!("cannot read document: {}", err)));
      return;
    }
  };
  match zip::ZipArchive::new(file) {
    Ok(archive) => {
      let media = archive.file_names().filter(|n| n.starts_with(DOCX_MEDIA_DIR)).count();
      debug!(path = %document.display(), media, "docx archive readable");
    }
    Err(err) => report.push(diagnostic(
      build_root,
      document,
      format!("not a valid DOCX archive: {}", err),
    )),
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::TempDir;

  use super::*;
  use crate::util::testutil::{FakeToolRunner, write_file};

  fn write_docx(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = zip::write::FileOptions::<()>::default();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(b"<w:document/>").unwrap();
    writer.start_file("word/media/image1.png", options).unwrap();
    writer.write_all(b"png").unwrap();
    writer.finish().unwrap();
  }

  fn messages(report: &ValidationReport) -> Vec<String> {
    report.errors.iter().map(|d| d.message.clone()).collect()
  }

  #[test]
  fn clean_tree_passes() {
    let temp = TempDir::new().unwrap();
    let html = temp.path().join("EN/plain/html");
    write_file(&html.join("images/logo.png"), "png");
    write_file(
      &html.join("template-EN-plain.html"),
      r#"<p><img src="images/logo.png" alt="logo"><img src="https://example.org/x.png"><img src='data:image/png;base64,AA'></p>"#,
    );
    write_docx(&temp.path().join("EN/plain/docx/template-EN-plain.docx"));
    write_file(&temp.path().join("EN/plain/markdown/template-EN-plain.md"), "# Title\n");
    let runner = FakeToolRunner::new();

    let report = check_artifacts(temp.path(), &runner, None).unwrap();

    assert!(report.passed(), "{:?}", report.errors);
    assert!(report.warnings.is_empty());
    let calls = runner.calls_to(PANDOC);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].args_lossy().windows(2).any(|w| w == ["-t", "html"]));
  }

  #[test]
  fn html_absolute_and_missing_images_are_errors() {
    let temp = TempDir::new().unwrap();
    let page = temp.path().join("DE/withHelp/html/template-DE-withHelp.html");
    write_file(
      &page,
      r#"<img src="/srv/images/a.png"><IMG class="x" SRC="images/missing.png"><img src="//cdn.example.org/b.png">"#,
    );

    let report = check_artifacts(temp.path(), &FakeToolRunner::new(), None).unwrap();

    assert_eq!(
      messages(&report),
      vec![
        "image uses absolute path `/srv/images/a.png`",
        "missing image `images/missing.png`"
      ]
    );
    assert!(report.errors.iter().all(|d| d.language.as_deref() == Some("DE")));
    assert_eq!(report.failing_languages(), vec!["DE"]);
    assert_eq!(report.errors[0].path.as_deref(), Some(page.as_path()));
  }

  #[test]
  fn corrupt_docx_is_an_error() {
    let temp = TempDir::new().unwrap();
    write_docx(&temp.path().join("EN/plain/docx/good.docx"));
    write_file(&temp.path().join("EN/plain/docx/bad.docx"), "not a zip");

    let report = check_artifacts(temp.path(), &FakeToolRunner::new(), None).unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].message.starts_with("not a valid DOCX archive"));
    assert!(report.errors[0].path.as_ref().unwrap().ends_with("bad.docx"));
  }

  #[test]
  fn markdown_that_fails_to_parse_is_an_error() {
    let temp = TempDir::new().unwrap();
    let chapters = temp.path().join("EN/plain/markdown_mp/chapters");
    write_file(&chapters.join("01-intro.md"), "# Intro\n");
    write_file(&chapters.join("02-broken.md"), "# Broken\n");
    let runner = FakeToolRunner::new().failing_on("02-broken.md");

    let report = check_artifacts(temp.path(), &runner, None).unwrap();

    assert_eq!(runner.calls_to(PANDOC).len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].message.starts_with("markdown does not parse"));
    assert_eq!(report.errors[0].language.as_deref(), Some("EN"));
  }

  #[test]
  fn missing_pandoc_skips_markdown_with_warning() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("EN/plain/md/index.md"), "# x\n");
    let runner = FakeToolRunner::new().without(PANDOC);

    let report = check_artifacts(temp.path(), &runner, None).unwrap();

    assert!(report.passed());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].check, CheckKind::Artifact);
    assert!(runner.calls().is_empty());
  }

  #[test]
  fn missing_build_root_fails() {
    let temp = TempDir::new().unwrap();
    let err = check_artifacts(&temp.path().join("build"), &FakeToolRunner::new(), None).unwrap_err();
    assert!(matches!(err, ArtifactError::MissingBuildRoot { .. }));
  }
}
