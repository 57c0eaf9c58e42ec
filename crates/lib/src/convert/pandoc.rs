//! Converters that render HTML with asciidoctor and hand it to pandoc.
//!
//! The intermediate HTML lives in a [`TempDir`] owned by a single `convert`
//! call, so it is removed on success and on every error path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::builtin::{ASCIIDOCTOR, PANDOC};
use super::{BuildContext, ConvertError, Converter, absolute, attribute_args, ensure_artifact};
use crate::consts::IMAGES_DIR;
use crate::tool::{Invocation, ToolRunner};

static H2_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<h2[^>]*>(.*?)</h2>").expect("BUG: invalid H2_RE regex literal"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("BUG: invalid TAG_RE regex literal"));
static SLUG_STRIP_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("BUG: invalid SLUG_STRIP_RE regex literal"));
static SLUG_SEP_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[-\s]+").expect("BUG: invalid SLUG_SEP_RE regex literal"));

const CHAPTERS_DIR: &str = "chapters";
const INDEX_FILE: &str = "index.md";

/// A pandoc-backed format.
///
/// `target` is the pandoc writer; the `variant` format option replaces it.
pub struct PandocConverter {
  target: &'static str,
  extension: &'static str,
  priority: i64,
  multi_page: bool,
  runner: Arc<dyn ToolRunner>,
}

impl PandocConverter {
  pub fn new(target: &'static str, extension: &'static str, runner: Arc<dyn ToolRunner>) -> Self {
    Self {
      target,
      extension,
      priority: 1,
      multi_page: false,
      runner,
    }
  }

  pub fn with_priority(mut self, priority: i64) -> Self {
    self.priority = priority;
    self
  }

  /// Split the document into one file per chapter plus an index.
  pub fn multi_page(mut self) -> Self {
    self.multi_page = true;
    self
  }

  fn target<'a>(&'a self, context: &'a BuildContext) -> &'a str {
    context.option_str("variant").unwrap_or(self.target)
  }

  /// Render the entry document to a standalone HTML file inside `scratch`.
  fn intermediate_html(
    &self,
    context: &BuildContext,
    scratch: &Path,
    images_dir: &str,
  ) -> Result<PathBuf, ConvertError> {
    let html = scratch.join(format!("{}-{}.html", context.language, context.flavor));
    let mut attrs = context.document_attributes();
    attrs.push(("imagesdir".to_string(), Some(images_dir.to_string())));
    attrs.push(("sectids".to_string(), None));

    let invocation = Invocation::new(ASCIIDOCTOR)
      .args(["-b", "html5"])
      .args(attribute_args(&attrs))
      .arg("-o")
      .arg(&html)
      .arg(&context.entry_document)
      .timeout(context.tool_timeout(ASCIIDOCTOR)?);
    self.runner.run(&invocation)?;
    ensure_artifact(html)
  }

  fn pandoc(&self, context: &BuildContext, input: &Path, output: &Path, target: &str) -> Result<(), ConvertError> {
    let invocation = Invocation::new(PANDOC)
      .arg(input)
      .args(["-f", "html", "-t", target])
      .arg("-o")
      .arg(output)
      .arg("--resource-path")
      .arg(absolute(&context.images_dir()))
      .timeout(context.tool_timeout(PANDOC)?);
    self.runner.run(&invocation)?;
    Ok(())
  }

  fn single_page(&self, context: &BuildContext, scratch: &TempDir) -> Result<PathBuf, ConvertError> {
    let images = absolute(&context.images_dir()).display().to_string();
    let html = self.intermediate_html(context, scratch.path(), &images)?;
    let output = context.artifact_path(self.extension);
    self.pandoc(context, &html, &output, self.target(context))?;
    ensure_artifact(output)
  }

  fn chaptered(&self, context: &BuildContext, scratch: &TempDir) -> Result<PathBuf, ConvertError> {
    copy_images(&context.images_dir(), &context.output_dir.join(IMAGES_DIR))?;
    let html = self.intermediate_html(context, scratch.path(), IMAGES_DIR)?;
    let content = std::fs::read_to_string(&html).map_err(|source| ConvertError::io(&html, source))?;

    let chapters_dir = context.output_dir.join(CHAPTERS_DIR);
    std::fs::create_dir_all(&chapters_dir).map_err(|source| ConvertError::io(&chapters_dir, source))?;

    let target = self.target(context);
    let mut entries = Vec::new();
    for (number, chapter) in split_chapters(&content).into_iter().enumerate() {
      let number = number + 1;
      let chapter_html = scratch.path().join(format!("chapter-{:02}.html", number));
      std::fs::write(&chapter_html, &chapter.html).map_err(|source| ConvertError::io(&chapter_html, source))?;

      let file_name = format!("{:02}-{}.{}", number, slugify(&chapter.title), self.extension);
      self.pandoc(context, &chapter_html, &chapters_dir.join(&file_name), target)?;
      debug!(chapter = %file_name, "converted chapter");
      entries.push((chapter.title, file_name));
    }

    let index = context.output_dir.join(INDEX_FILE);
    std::fs::write(&index, render_index(context, &entries)).map_err(|source| ConvertError::io(&index, source))?;
    Ok(index)
  }
}

impl Converter for PandocConverter {
  fn priority(&self) -> i64 {
    self.priority
  }

  fn output_extension(&self) -> &str {
    self.extension
  }

  fn check_available(&self) -> bool {
    self.runner.is_available(ASCIIDOCTOR) && self.runner.is_available(PANDOC)
  }

  fn convert(&self, context: &BuildContext) -> Result<PathBuf, ConvertError> {
    let scratch = TempDir::new().map_err(|source| ConvertError::io(std::env::temp_dir(), source))?;
    let artifact = if self.multi_page {
      self.chaptered(context, &scratch)?
    } else {
      self.single_page(context, &scratch)?
    };
    info!(
      language = %context.language,
      flavor = %context.flavor,
      path = %artifact.display(),
      "created {} output",
      context.format
    );
    Ok(artifact)
  }
}

#[derive(Debug, PartialEq)]
struct Chapter {
  title: String,
  html: String,
}

/// Split rendered HTML at each `<h2>`. Content before the first heading is dropped.
fn split_chapters(html: &str) -> Vec<Chapter> {
  let headings: Vec<_> = H2_RE.captures_iter(html).collect();
  headings
    .iter()
    .enumerate()
    .map(|(i, caps)| {
      let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
      let body_end = headings
        .get(i + 1)
        .and_then(|next| next.get(0))
        .map(|m| m.start())
        .unwrap_or(html.len());
      let raw_title = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
      Chapter {
        title: TAG_RE.replace_all(raw_title, "").trim().to_string(),
        html: format!("<h2>{}</h2>{}", raw_title, &html[whole.1..body_end]),
      }
    })
    .collect()
}

fn slugify(title: &str) -> String {
  let stripped = SLUG_STRIP_RE.replace_all(title, "");
  let slug = SLUG_SEP_RE.replace_all(stripped.trim(), "-").to_lowercase();
  if slug.is_empty() { "chapter".to_string() } else { slug }
}

fn render_index(context: &BuildContext, entries: &[(String, String)]) -> String {
  let mut out = format!(
    "# {} - {} ({})\n\n## Chapters\n\n",
    context.artifact_prefix, context.language, context.flavor
  );
  for (title, file_name) in entries {
    out.push_str(&format!("- [{}]({}/{})\n", title, CHAPTERS_DIR, file_name));
  }
  out
}

/// Mirror the source images next to the chapters so relative links resolve.
fn copy_images(from: &Path, to: &Path) -> Result<(), ConvertError> {
  if !from.is_dir() {
    return Ok(());
  }
  for entry in WalkDir::new(from).sort_by_file_name() {
    let entry = entry.map_err(|e| {
      let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
      ConvertError::io(path, std::io::Error::other(e.to_string()))
    })?;
    let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
    let dest = to.join(relative);
    if entry.file_type().is_dir() {
      std::fs::create_dir_all(&dest).map_err(|source| ConvertError::io(&dest, source))?;
    } else {
      std::fs::copy(entry.path(), &dest).map_err(|source| ConvertError::io(&dest, source))?;
    }
  }
  Ok(())
}
