//! Loading a [`BuildConfiguration`] from YAML.
//!
//! Loading happens in four steps:
//! 1. Parse the YAML into raw, schema-checked structs (unknown keys are rejected)
//! 2. Apply `DOCMATRIX_*` environment overrides
//! 3. Apply caller overrides (language/format/flavor subsets)
//! 4. Check values and resolve paths, then freeze into a [`BuildConfiguration`]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::types::{
  BuildConfiguration, ExecutionSettings, FormatOptions, FormatSetting, LogLevel, OutputLayout, Prerequisites,
  SourceLayout,
};
use crate::consts::{
  DEFAULT_ARTIFACT_PREFIX, DEFAULT_DIST_DIR, DEFAULT_ENTRY_DOCUMENT, DEFAULT_FORMAT_PRIORITY, DEFAULT_METADATA_FILE,
  DEFAULT_OUTPUT_DIR, ENV_PREFIX,
};
use crate::registry::ConverterRegistry;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read configuration {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("invalid configuration: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("invalid value for `{field}`: {message}")]
  InvalidField { field: String, message: String },

  #[error("unknown format `{format}` referenced by `{field}`")]
  UnknownFormat { field: String, format: String },

  #[error("language `{language}` has no source directory at {}", path.display())]
  MissingLanguageDir { language: String, path: PathBuf },

  #[error("invalid environment override {var}={value}: {message}")]
  InvalidEnv { var: String, value: String, message: String },
}

impl ConfigError {
  /// The configuration field this error refers to, when one is known.
  pub fn field(&self) -> Option<&str> {
    match self {
      ConfigError::InvalidField { field, .. } | ConfigError::UnknownFormat { field, .. } => Some(field),
      ConfigError::MissingLanguageDir { .. } => Some("languages"),
      ConfigError::InvalidEnv { var, .. } => Some(var),
      ConfigError::Read { .. } | ConfigError::Parse(_) => None,
    }
  }

  fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    ConfigError::InvalidField {
      field: field.into(),
      message: message.into(),
    }
  }
}

/// Caller-supplied restrictions layered over the file content.
///
/// Empty subsets leave the file's values untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
  pub languages: Vec<String>,
  pub formats: Vec<String>,
  pub flavors: Vec<String>,
  pub build_dir: Option<PathBuf>,
  pub dist_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
  #[serde(default)]
  languages: Vec<String>,
  #[serde(default)]
  flavors: Vec<String>,
  #[serde(default)]
  source: RawSource,
  #[serde(default)]
  formats: BTreeMap<String, RawFormat>,
  #[serde(default)]
  build: RawBuild,
  #[serde(default)]
  prerequisites: RawPrerequisites,
  #[serde(default)]
  logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
  root: Option<PathBuf>,
  entry_document: Option<String>,
  metadata_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFormat {
  #[serde(default)]
  enabled: bool,
  /// Falls back to the registered converter's priority.
  priority: Option<i64>,
  #[serde(default)]
  options: FormatOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuild {
  parallel: Option<bool>,
  max_workers: Option<i64>,
  validate: Option<bool>,
  continue_on_error: Option<bool>,
  clean_before: Option<bool>,
  create_archives: Option<bool>,
  timeout_secs: Option<i64>,
  output_dir: Option<PathBuf>,
  dist_dir: Option<PathBuf>,
  artifact_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrerequisites {
  #[serde(default)]
  fonts: Vec<String>,
  #[serde(default)]
  assets: Vec<PathBuf>,
  #[serde(default)]
  mandatory_languages: Vec<String>,
  theme_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLogging {
  level: Option<String>,
}

/// Loads configuration and checks it against the set of registered formats.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
  /// Known format ids and their default priority.
  known_formats: BTreeMap<String, i64>,
}

impl ConfigLoader {
  /// Create a loader that accepts the given format ids.
  pub fn new<I, S>(format_ids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      known_formats: format_ids
        .into_iter()
        .map(|id| (id.into(), DEFAULT_FORMAT_PRIORITY))
        .collect(),
    }
  }

  /// Create a loader that accepts exactly the formats in `registry`.
  pub fn from_registry(registry: &ConverterRegistry) -> Self {
    Self {
      known_formats: registry
        .list_all()
        .into_iter()
        .map(|d| (d.format_id.clone(), d.priority))
        .collect(),
    }
  }

  /// Load configuration from a file.
  ///
  /// Relative paths inside the file resolve against the file's directory.
  pub fn load_file(&self, path: &Path, overrides: &ConfigOverrides) -> Result<BuildConfiguration, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let base_dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    self.load(&raw, overrides, base_dir)
  }

  /// Load configuration from YAML text.
  ///
  /// Fails with a [`ConfigError`] naming the offending field when the content
  /// references an unknown format, `max_workers` is not positive, or a language
  /// has no source subtree under `base_dir`.
  pub fn load(&self, raw: &str, overrides: &ConfigOverrides, base_dir: &Path) -> Result<BuildConfiguration, ConfigError> {
    let mut raw: RawConfig = serde_yaml::from_str(raw)?;
    apply_env_overrides(&mut raw)?;
    // File keys are checked before a `--format` subset can drop them.
    if let Some(id) = raw.formats.keys().find(|id| !self.known_formats.contains_key(*id)) {
      return Err(ConfigError::UnknownFormat {
        field: format!("formats.{}", id),
        format: id.clone(),
      });
    }
    self.apply_overrides(&mut raw, overrides)?;
    let config = self.finish(raw, base_dir)?;
    debug!(
      languages = ?config.languages,
      flavors = ?config.flavors,
      formats = config.enabled_formats().len(),
      "configuration loaded"
    );
    Ok(config)
  }

  fn apply_overrides(&self, raw: &mut RawConfig, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
    if !overrides.languages.is_empty() {
      raw.languages = overrides.languages.clone();
    }
    if !overrides.flavors.is_empty() {
      raw.flavors = overrides.flavors.clone();
    }
    if !overrides.formats.is_empty() {
      let mut selected = BTreeMap::new();
      for id in &overrides.formats {
        let Some(default_priority) = self.known_formats.get(id) else {
          return Err(ConfigError::UnknownFormat {
            field: "--format".to_string(),
            format: id.clone(),
          });
        };
        let mut format = raw.formats.remove(id).unwrap_or(RawFormat {
          enabled: true,
          priority: Some(*default_priority),
          options: FormatOptions::new(),
        });
        format.enabled = true;
        selected.insert(id.clone(), format);
      }
      raw.formats = selected;
    }
    if let Some(dir) = &overrides.build_dir {
      raw.build.output_dir = Some(dir.clone());
    }
    if let Some(dir) = &overrides.dist_dir {
      raw.build.dist_dir = Some(dir.clone());
    }
    Ok(())
  }

  fn finish(&self, raw: RawConfig, base_dir: &Path) -> Result<BuildConfiguration, ConfigError> {
    check_codes("languages", &raw.languages)?;
    check_codes("flavors", &raw.flavors)?;

    let mut formats = BTreeMap::new();
    for (id, format) in raw.formats {
      let Some(default_priority) = self.known_formats.get(&id).copied() else {
        return Err(ConfigError::UnknownFormat {
          field: format!("formats.{}", id),
          format: id,
        });
      };
      formats.insert(
        id,
        FormatSetting {
          enabled: format.enabled,
          priority: format.priority.unwrap_or(default_priority),
          options: format.options,
        },
      );
    }

    let build = raw.build;
    let max_workers = match build.max_workers {
      Some(n) if n <= 0 => {
        return Err(ConfigError::invalid("build.max_workers", format!("must be greater than 0, got {}", n)));
      }
      Some(n) => n as usize,
      None => ExecutionSettings::default().max_workers,
    };
    let timeout = match build.timeout_secs {
      Some(n) if n <= 0 => {
        return Err(ConfigError::invalid("build.timeout_secs", format!("must be greater than 0, got {}", n)));
      }
      Some(n) => Some(Duration::from_secs(n as u64)),
      None => None,
    };
    let defaults = ExecutionSettings::default();
    let execution = ExecutionSettings {
      parallel: build.parallel.unwrap_or(defaults.parallel),
      max_workers,
      validate: build.validate.unwrap_or(defaults.validate),
      continue_on_error: build.continue_on_error.unwrap_or(defaults.continue_on_error),
      clean_before: build.clean_before.unwrap_or(defaults.clean_before),
      create_archives: build.create_archives.unwrap_or(defaults.create_archives),
      timeout,
    };

    let log_level = match raw.logging.level {
      Some(level) => level
        .parse::<LogLevel>()
        .map_err(|message| ConfigError::invalid("logging.level", message))?,
      None => LogLevel::default(),
    };

    let source = SourceLayout {
      root: resolve(base_dir, raw.source.root.unwrap_or_else(|| PathBuf::from("."))),
      entry_document: non_empty("source.entry_document", raw.source.entry_document, DEFAULT_ENTRY_DOCUMENT)?,
      metadata_file: non_empty("source.metadata_file", raw.source.metadata_file, DEFAULT_METADATA_FILE)?,
    };

    let output = OutputLayout {
      build_root: resolve(base_dir, build.output_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))),
      dist_root: resolve(base_dir, build.dist_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DIST_DIR))),
      artifact_prefix: non_empty("build.artifact_prefix", build.artifact_prefix, DEFAULT_ARTIFACT_PREFIX)?,
    };

    let prerequisites = Prerequisites {
      fonts: raw.prerequisites.fonts,
      assets: raw.prerequisites.assets,
      mandatory_languages: raw.prerequisites.mandatory_languages,
      theme_dir: raw.prerequisites.theme_dir,
    };

    for language in &raw.languages {
      let path = source.language_dir(language);
      if !path.is_dir() {
        return Err(ConfigError::MissingLanguageDir {
          language: language.clone(),
          path,
        });
      }
    }

    Ok(BuildConfiguration {
      languages: raw.languages,
      flavors: raw.flavors,
      formats,
      execution,
      source,
      output,
      prerequisites,
      log_level,
    })
  }
}

fn check_codes(field: &str, codes: &[String]) -> Result<(), ConfigError> {
  if codes.is_empty() {
    return Err(ConfigError::invalid(field, "at least one entry is required"));
  }
  let mut seen = BTreeSet::new();
  for code in codes {
    if code.trim().is_empty() || code.contains(['/', '\\']) || code == "." || code == ".." {
      return Err(ConfigError::invalid(field, format!("`{}` is not a valid identifier", code)));
    }
    if !seen.insert(code.as_str()) {
      return Err(ConfigError::invalid(field, format!("`{}` is listed more than once", code)));
    }
  }
  Ok(())
}

fn non_empty(field: &str, value: Option<String>, default: &str) -> Result<String, ConfigError> {
  match value {
    Some(v) if v.trim().is_empty() => Err(ConfigError::invalid(field, "must not be empty")),
    Some(v) => Ok(v),
    None => Ok(default.to_string()),
  }
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
  if path.is_absolute() { path } else { base_dir.join(path) }
}

/// Apply `DOCMATRIX_*` environment variables over the parsed file.
fn apply_env_overrides(raw: &mut RawConfig) -> Result<(), ConfigError> {
  if let Some(value) = env_bool("PARALLEL")? {
    raw.build.parallel = Some(value);
  }
  if let Some(value) = env_var("MAX_WORKERS") {
    let parsed = value.parse::<i64>().map_err(|e| ConfigError::InvalidEnv {
      var: format!("{}MAX_WORKERS", ENV_PREFIX),
      value: value.clone(),
      message: e.to_string(),
    })?;
    raw.build.max_workers = Some(parsed);
  }
  if let Some(value) = env_bool("VALIDATE")? {
    raw.build.validate = Some(value);
  }
  if let Some(value) = env_bool("CONTINUE_ON_ERROR")? {
    raw.build.continue_on_error = Some(value);
  }
  if let Some(value) = env_var("LOG_LEVEL") {
    raw.logging.level = Some(value);
  }
  if let Some(value) = env_var("SOURCE_ROOT") {
    raw.source.root = Some(PathBuf::from(value));
  }
  Ok(())
}

fn env_var(suffix: &str) -> Option<String> {
  std::env::var(format!("{}{}", ENV_PREFIX, suffix))
    .ok()
    .filter(|v| !v.is_empty())
}

fn env_bool(suffix: &str) -> Result<Option<bool>, ConfigError> {
  let Some(value) = env_var(suffix) else {
    return Ok(None);
  };
  match value.to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(Some(true)),
    "0" | "false" | "no" | "off" => Ok(Some(false)),
    _ => Err(ConfigError::InvalidEnv {
      var: format!("{}{}", ENV_PREFIX, suffix),
      value,
      message: "expected true or false".to_string(),
    }),
  }
}
