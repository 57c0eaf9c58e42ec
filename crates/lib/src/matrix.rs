//! Build matrix expansion.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::BuildConfiguration;

/// Coordinates of one build task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId {
  pub language: String,
  pub flavor: String,
  pub format: String,
}

impl TaskId {
  pub fn new(language: impl Into<String>, flavor: impl Into<String>, format: impl Into<String>) -> Self {
    Self {
      language: language.into(),
      flavor: flavor.into(),
      format: format.into(),
    }
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.language, self.flavor, self.format)
  }
}

/// One cell of the language x flavor x format cross product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTask {
  pub id: TaskId,
  /// `{build-root}/{language}/{flavor}/{format}`, unique per task.
  pub output_root: PathBuf,
}

/// Expand the configuration into tasks.
///
/// Languages and flavors keep their configured order; formats follow
/// [`BuildConfiguration::enabled_formats`]. No enabled formats yields no tasks.
pub fn generate(config: &BuildConfiguration) -> Vec<BuildTask> {
  let formats = config.enabled_formats();
  let mut tasks = Vec::with_capacity(config.languages.len() * config.flavors.len() * formats.len());
  for language in &config.languages {
    for flavor in &config.flavors {
      for (format, _) in &formats {
        tasks.push(BuildTask {
          id: TaskId::new(language.as_str(), flavor.as_str(), *format),
          output_root: config.output.task_dir(language, flavor, format),
        });
      }
    }
  }
  tasks
}

#[cfg(test)]
mod tests {
  use std::collections::{BTreeMap, BTreeSet};

  use super::*;
  use crate::config::{
    ExecutionSettings, FormatOptions, FormatSetting, LogLevel, OutputLayout, Prerequisites, SourceLayout,
  };

  fn config(languages: &[&str], flavors: &[&str], formats: &[(&str, bool, i64)]) -> BuildConfiguration {
    BuildConfiguration {
      languages: languages.iter().map(|s| s.to_string()).collect(),
      flavors: flavors.iter().map(|s| s.to_string()).collect(),
      formats: formats
        .iter()
        .map(|(id, enabled, priority)| {
          (
            id.to_string(),
            FormatSetting {
              enabled: *enabled,
              priority: *priority,
              options: FormatOptions::new(),
            },
          )
        })
        .collect::<BTreeMap<_, _>>(),
      execution: ExecutionSettings::default(),
      source: SourceLayout {
        root: PathBuf::from("src"),
        entry_document: "template.adoc".into(),
        metadata_file: "version.properties".into(),
      },
      output: OutputLayout {
        build_root: PathBuf::from("build"),
        dist_root: PathBuf::from("dist"),
        artifact_prefix: "template".into(),
      },
      prerequisites: Prerequisites::default(),
      log_level: LogLevel::Info,
    }
  }

  #[test]
  fn size_is_product_of_axes_with_unique_roots() {
    let config = config(
      &["EN", "DE", "FR"],
      &["plain", "withHelp"],
      &[("html", true, 1), ("pdf", true, 1), ("rst", false, 3), ("docx", true, 1)],
    );
    let tasks = generate(&config);
    assert_eq!(tasks.len(), 3 * 2 * 3);
    let roots: BTreeSet<_> = tasks.iter().map(|t| t.output_root.clone()).collect();
    assert_eq!(roots.len(), tasks.len());
  }

  #[test]
  fn order_is_language_flavor_then_format_priority() {
    let config = config(&["DE", "EN"], &["withHelp", "plain"], &[("rst", true, 3), ("pdf", true, 1), ("html", true, 1)]);
    let ids: Vec<_> = generate(&config).iter().map(|t| t.id.to_string()).collect();
    assert_eq!(&ids[..4], &["DE/withHelp/html", "DE/withHelp/pdf", "DE/withHelp/rst", "DE/plain/html"]);
    assert_eq!(ids.last().unwrap(), "EN/plain/rst");
    assert_eq!(generate(&config), generate(&config));
  }

  #[test]
  fn no_enabled_formats_is_empty() {
    let config = config(&["EN"], &["plain"], &[("html", false, 1)]);
    assert!(generate(&config).is_empty());
  }

  #[test]
  fn output_root_layout() {
    let config = config(&["A"], &["plain"], &[("x", true, 1)]);
    let tasks = generate(&config);
    assert_eq!(tasks[0].output_root, PathBuf::from("build").join("A").join("plain").join("x"));
  }
}
