//! The individual validation checks, in execution order.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use super::{CheckKind, Diagnostic, ValidationReport};
use crate::config::BuildConfiguration;
use crate::consts::IMAGES_DIR;
use crate::convert::ASCIIDOCTOR;
use crate::metadata;
use crate::theme;
use crate::tool::{Invocation, ToolError, ToolRunner};

/// Lists installed font families.
pub(crate) const FONT_LIST_TOOL: &str = "fc-list";

static IMAGE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"image::?([^\[\]]+)\[").expect("BUG: invalid IMAGE_RE regex literal"));

/// Each language has a source subtree holding the entry document.
pub(super) fn structure(config: &BuildConfiguration, report: &mut ValidationReport) {
  for language in &config.languages {
    let dir = config.source_dir(language);
    if !dir.is_dir() {
      report.push(
        Diagnostic::error(CheckKind::Structure, "language directory is missing")
          .language(language)
          .path(dir),
      );
      continue;
    }
    let entry = config.source.entry_path(language);
    if !entry.is_file() {
      report.push(
        Diagnostic::error(CheckKind::Structure, "entry document is missing")
          .language(language)
          .path(entry),
      );
    }
  }
}

/// Each language has a well-formed metadata file with the required keys.
pub(super) fn metadata(config: &BuildConfiguration, report: &mut ValidationReport) {
  for language in &config.languages {
    let path = config.source.metadata_path(language);
    if !path.is_file() {
      report.push(
        Diagnostic::error(CheckKind::Metadata, "version metadata file is missing")
          .language(language)
          .path(path),
      );
      continue;
    }
    let parsed = match metadata::read(&path) {
      Ok(parsed) => parsed,
      Err(err) => {
        report.push(Diagnostic::error(CheckKind::Metadata, err.to_string()).language(language).path(path));
        continue;
      }
    };
    for bad in &parsed.malformed {
      report.push(
        Diagnostic::error(CheckKind::Metadata, format!("malformed line `{}`", bad.content))
          .language(language)
          .path(&path)
          .line(bad.line),
      );
    }
    for key in parsed.missing_keys() {
      report.push(
        Diagnostic::error(CheckKind::Metadata, format!("required key `{}` is missing or empty", key))
          .language(language)
          .path(&path),
      );
    }
  }
}

/// Dry-run the document processor so unresolved includes surface per language.
pub(super) fn references(config: &BuildConfiguration, runner: &dyn ToolRunner, report: &mut ValidationReport) {
  if !runner.is_available(ASCIIDOCTOR) {
    report.push(Diagnostic::warning(
      CheckKind::Reference,
      format!("`{}` not found, reference check skipped", ASCIIDOCTOR),
    ));
    return;
  }
  let scratch = match TempDir::new() {
    Ok(dir) => dir,
    Err(err) => {
      report.push(Diagnostic::warning(
        CheckKind::Reference,
        format!("could not create scratch directory, reference check skipped: {}", err),
      ));
      return;
    }
  };

  for language in &config.languages {
    let entry = config.source.entry_path(language);
    if !entry.is_file() {
      continue;
    }
    let invocation = Invocation::new(ASCIIDOCTOR)
      .args(["--failure-level", "WARN", "-o"])
      .arg(scratch.path().join(format!("{}.html", language)))
      .arg(&entry)
      .current_dir(config.source_dir(language))
      .timeout(config.execution.timeout);

    match runner.run(&invocation) {
      Ok(_) => debug!(language = %language, "references resolved"),
      Err(ToolError::NotFound { program }) => report.push(
        Diagnostic::warning(CheckKind::Reference, format!("`{}` not found, reference check skipped", program))
          .language(language),
      ),
      Err(ToolError::Failed { stderr, .. }) => {
        let detail = stderr
          .lines()
          .map(str::trim)
          .filter(|l| !l.is_empty())
          .collect::<Vec<_>>()
          .join("; ");
        let message = if detail.is_empty() {
          "unresolved references".to_string()
        } else {
          format!("unresolved references: {}", detail)
        };
        report.push(Diagnostic::error(CheckKind::Reference, message).language(language).path(&entry));
      }
      Err(other) => {
        report.push(Diagnostic::error(CheckKind::Reference, other.to_string()).language(language).path(&entry))
      }
    }
  }
}

/// Referenced images exist. Advisory only: every finding is a warning.
pub(super) fn resources(config: &BuildConfiguration, report: &mut ValidationReport) {
  for language in &config.languages {
    let dir = config.source_dir(language);
    if !dir.is_dir() {
      continue;
    }
    let images = dir.join(IMAGES_DIR);
    let mut seen = BTreeSet::new();

    let documents = WalkDir::new(&dir)
      .sort_by_file_name()
      .into_iter()
      .filter_map(Result::ok)
      .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "adoc"));

    for document in documents {
      let text = match std::fs::read_to_string(document.path()) {
        Ok(text) => text,
        Err(err) => {
          report.push(
            Diagnostic::warning(CheckKind::Resource, format!("could not read document: {}", err))
              .language(language)
              .path(document.path()),
          );
          continue;
        }
      };
      for (idx, line) in text.lines().enumerate() {
        for caps in IMAGE_RE.captures_iter(line) {
          let target = caps.get(1).map_or("", |m| m.as_str()).trim();
          if target.is_empty() || is_unresolvable(target) {
            continue;
          }
          if dir.join(target).exists() || images.join(target).exists() {
            continue;
          }
          if seen.insert((document.path().to_path_buf(), target.to_string())) {
            report.push(
              Diagnostic::warning(CheckKind::Resource, format!("referenced image `{}` not found", target))
                .language(language)
                .path(document.path())
                .line(idx + 1),
            );
          }
        }
      }
    }
  }
}

/// Remote targets and attribute references cannot be checked on disk.
fn is_unresolvable(target: &str) -> bool {
  target.contains("://") || target.starts_with("data:") || target.contains('{')
}

/// Declared fonts, assets and themes are present.
pub(super) fn environment(config: &BuildConfiguration, runner: &dyn ToolRunner, report: &mut ValidationReport) {
  let prereq = &config.prerequisites;

  if !prereq.fonts.is_empty() {
    match installed_fonts(runner) {
      Ok(installed) => {
        for font in &prereq.fonts {
          if !installed.contains(&font.to_lowercase()) {
            missing_prerequisite(config, report, format!("font `{}` is not installed", font), None);
          }
        }
      }
      Err(reason) => report.push(Diagnostic::warning(
        CheckKind::Environment,
        format!("font check skipped: {}", reason),
      )),
    }
  }

  for asset in &prereq.assets {
    let path = config.source.root.join(asset);
    if !path.exists() {
      missing_prerequisite(config, report, format!("asset `{}` not found", asset.display()), Some(path));
    }
  }

  for theme_dir in theme_dirs(config) {
    for language in &config.languages {
      let dir = config.source_dir(language);
      if !dir.is_dir() {
        continue;
      }
      let themes = dir.join(&theme_dir);
      if theme::resolve_theme(&themes, language).is_none() {
        report.push(
          Diagnostic::warning(
            CheckKind::Environment,
            format!(
              "no PDF theme found (tried {}), the default theme will be used",
              theme::theme_candidates(language).join(", ")
            ),
          )
          .language(language)
          .path(themes),
        );
      }
    }
  }
}

/// Report a missing prerequisite: an error for each mandatory language, one
/// warning covering the rest.
fn missing_prerequisite(
  config: &BuildConfiguration,
  report: &mut ValidationReport,
  message: String,
  path: Option<PathBuf>,
) {
  let with_path = |d: Diagnostic| match &path {
    Some(p) => d.path(p),
    None => d,
  };
  let mut optional = false;
  for language in &config.languages {
    if config.prerequisites.is_mandatory(language) {
      report.push(with_path(Diagnostic::error(CheckKind::Environment, message.clone()).language(language)));
    } else {
      optional = true;
    }
  }
  if optional {
    report.push(with_path(Diagnostic::warning(CheckKind::Environment, message)));
  }
}

/// Lowercased family names reported by the font list tool.
fn installed_fonts(runner: &dyn ToolRunner) -> Result<BTreeSet<String>, String> {
  if !runner.is_available(FONT_LIST_TOOL) {
    return Err(format!("`{}` not found", FONT_LIST_TOOL));
  }
  let output = runner
    .run(&Invocation::new(FONT_LIST_TOOL).args([":", "family"]))
    .map_err(|e| e.to_string())?;
  Ok(
    output
      .stdout
      .lines()
      .flat_map(|line| line.split(','))
      .map(|family| family.trim().to_lowercase())
      .filter(|family| !family.is_empty())
      .collect(),
  )
}

/// Theme directories to check: the prerequisite one plus any enabled
/// format's `theme_dir` option.
fn theme_dirs(config: &BuildConfiguration) -> BTreeSet<PathBuf> {
  let mut dirs: BTreeSet<PathBuf> = config.prerequisites.theme_dir.iter().cloned().collect();
  for (_, setting) in config.enabled_formats() {
    if let Some(dir) = setting.options.get("theme_dir").and_then(|v| v.as_str()) {
      dirs.insert(PathBuf::from(dir));
    }
  }
  dirs
}
