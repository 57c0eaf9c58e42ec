//! Typed build configuration.
//!
//! A [`BuildConfiguration`] is produced once per run by the loader and is never
//! mutated afterwards. Workers read it concurrently without locking.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Free-form per-format options, handed to converters untouched.
pub type FormatOptions = BTreeMap<String, Value>;

/// Settings for one output format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatSetting {
  pub enabled: bool,
  pub priority: i64,
  pub options: FormatOptions,
}

impl FormatSetting {
  pub fn enabled(priority: i64) -> Self {
    Self {
      enabled: true,
      priority,
      options: FormatOptions::new(),
    }
  }
}

/// How tasks are executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSettings {
  /// Run tasks on a bounded worker pool instead of the caller's thread.
  pub parallel: bool,
  /// Worker pool size. Always greater than zero.
  pub max_workers: usize,
  /// Run the validator before dispatching tasks.
  pub validate: bool,
  /// Return normally even when some tasks failed.
  pub continue_on_error: bool,
  /// Remove the build and dist roots before a run.
  pub clean_before: bool,
  /// Hand successful results to the packager after a run.
  pub create_archives: bool,
  /// Per-task deadline for external tool invocations.
  pub timeout: Option<Duration>,
}

impl Default for ExecutionSettings {
  fn default() -> Self {
    Self {
      parallel: true,
      max_workers: crate::consts::DEFAULT_MAX_WORKERS,
      validate: true,
      continue_on_error: true,
      clean_before: false,
      create_archives: false,
      timeout: None,
    }
  }
}

/// Where the document sources live.
///
/// Each language owns the subtree `{root}/{language}`, which holds the entry
/// document and the version metadata file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLayout {
  pub root: PathBuf,
  pub entry_document: String,
  pub metadata_file: String,
}

impl SourceLayout {
  pub fn language_dir(&self, language: &str) -> PathBuf {
    self.root.join(language)
  }

  pub fn entry_path(&self, language: &str) -> PathBuf {
    self.language_dir(language).join(&self.entry_document)
  }

  pub fn metadata_path(&self, language: &str) -> PathBuf {
    self.language_dir(language).join(&self.metadata_file)
  }
}

/// Where build outputs and archives are written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputLayout {
  pub build_root: PathBuf,
  pub dist_root: PathBuf,
  pub artifact_prefix: String,
}

impl OutputLayout {
  /// `{build-root}/{language}/{flavor}/{format}`
  pub fn task_dir(&self, language: &str, flavor: &str, format: &str) -> PathBuf {
    self.build_root.join(language).join(flavor).join(format)
  }

  /// `{dist-root}/{language}/{flavor}/{format}`
  pub fn dist_dir(&self, language: &str, flavor: &str, format: &str) -> PathBuf {
    self.dist_root.join(language).join(flavor).join(format)
  }
}

/// Fonts and assets the rendering tools need.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Prerequisites {
  /// Font family names that must be installed.
  pub fonts: Vec<String>,
  /// Asset files, relative to the source root.
  pub assets: Vec<PathBuf>,
  /// Languages for which missing fonts or assets are errors rather than warnings.
  pub mandatory_languages: Vec<String>,
  /// Theme directory, relative to each language subtree.
  pub theme_dir: Option<PathBuf>,
}

impl Prerequisites {
  pub fn is_mandatory(&self, language: &str) -> bool {
    self.mandatory_languages.iter().any(|l| l == language)
  }
}

/// Log verbosity requested by the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl LogLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      LogLevel::Debug => "debug",
      LogLevel::Info => "info",
      LogLevel::Warn => "warn",
      LogLevel::Error => "error",
    }
  }
}

impl FromStr for LogLevel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "debug" => Ok(LogLevel::Debug),
      "info" => Ok(LogLevel::Info),
      "warn" | "warning" => Ok(LogLevel::Warn),
      "error" => Ok(LogLevel::Error),
      other => Err(format!("unknown log level `{}` (expected debug, info, warn or error)", other)),
    }
  }
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The complete, validated build request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildConfiguration {
  /// Language codes in build order. Never empty.
  pub languages: Vec<String>,
  /// Flavor identifiers in build order. Never empty.
  pub flavors: Vec<String>,
  /// Every configured format, enabled or not. Keys are registered format ids.
  pub formats: BTreeMap<String, FormatSetting>,
  pub execution: ExecutionSettings,
  pub source: SourceLayout,
  pub output: OutputLayout,
  pub prerequisites: Prerequisites,
  pub log_level: LogLevel,
}

impl BuildConfiguration {
  /// Enabled formats ordered by ascending priority, then identifier.
  pub fn enabled_formats(&self) -> Vec<(&str, &FormatSetting)> {
    let mut enabled: Vec<_> = self
      .formats
      .iter()
      .filter(|(_, setting)| setting.enabled)
      .map(|(id, setting)| (id.as_str(), setting))
      .collect();
    enabled.sort_by(|(a_id, a), (b_id, b)| a.priority.cmp(&b.priority).then_with(|| a_id.cmp(b_id)));
    enabled
  }

  pub fn format(&self, id: &str) -> Option<&FormatSetting> {
    self.formats.get(id)
  }

  /// Source subtree for a language.
  pub fn source_dir(&self, language: &str) -> PathBuf {
    self.source.language_dir(language)
  }
}
